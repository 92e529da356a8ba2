//! Sift Analysis - one-shot classification runs from the command line.
//!
//! Reads crawled items from a JSON file, classifies them, updates the saved
//! category registry and prints the run report as JSON on stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sift_analysis::prompt::DEFAULT_SNAPSHOT_PROMPT;
use sift_analysis::snapshot::ContextSnapshotStore;
use sift_analysis::{
    format_suppressed, AnalysisOrchestrator, AnalysisRequestItem, CategoryRegistry, SuppressedItem,
};
use sift_common::config::Config;
use sift_common::logging::init_logging;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "sift-analysis")]
#[command(version)]
#[command(about = "Classify crawled market news with an LLM.", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.sift/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use canned snapshots instead of the live snapshot model
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify items and print the report
    Run {
        /// JSON array of {title, body, url, published_at}
        items: PathBuf,

        /// JSON array of recently reported {title, reported_at}
        #[arg(long)]
        suppressed: Option<PathBuf>,
    },
    /// Print the current market snapshot
    Snapshot {
        /// Drop cached snapshots first
        #[arg(long)]
        refresh: bool,
    },
    /// Show the saved category registry
    Categories {
        /// Clear the registry
        #[arg(long)]
        reset: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.simulate {
        config.snapshot.simulate = true;
    }

    init_logging(&config.observability.log_level, &config.observability.log_format);
    tracing::debug!("Sift Analysis v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run { items, suppressed } => run(&config, &items, suppressed.as_deref()),
        Commands::Snapshot { refresh } => snapshot(&config, refresh),
        Commands::Categories { reset } => categories(&config, reset),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_overrides();
            config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
            Ok(config)
        }
        None => Config::load_and_validate(),
    }
}

fn run(config: &Config, items_path: &Path, suppressed_path: Option<&Path>) -> Result<()> {
    let items: Vec<AnalysisRequestItem> = read_json(items_path)?;
    let suppressed = match suppressed_path {
        Some(path) => format_suppressed(&read_json::<Vec<SuppressedItem>>(path)?),
        None => format_suppressed(&[]),
    };

    let registry_path = config.analysis.registry_path();
    let mut registry = CategoryRegistry::load(&registry_path)?;
    registry.set_threshold(config.analysis.consistency_threshold)?;

    let mut orchestrator = AnalysisOrchestrator::from_config(config)?;
    let report = orchestrator.run(&items, &suppressed, &mut registry);

    registry
        .save(&registry_path)
        .with_context(|| format!("saving registry to {}", registry_path.display()))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn snapshot(config: &Config, refresh: bool) -> Result<()> {
    let mut store = ContextSnapshotStore::from_config(&config.snapshot);
    if refresh {
        store.invalidate();
    }
    let snapshot = store.get_snapshot(DEFAULT_SNAPSHOT_PROMPT);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn categories(config: &Config, reset: bool) -> Result<()> {
    let path = config.analysis.registry_path();
    let mut registry = CategoryRegistry::load(&path)?;
    if reset {
        registry.reset();
        registry.save(&path)?;
    }
    println!("{}", serde_json::to_string_pretty(&registry.export())?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
