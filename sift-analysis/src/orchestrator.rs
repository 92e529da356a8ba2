//! Batch analysis runs.
//!
//! One run:
//!
//! ```text
//! snapshot ──► merge(template, snapshot, suppressed) ──► system prompt
//!                                                            │
//! items ──► skip invalid ──► chunk(batch_size) ──► enforce_batch per chunk ──► ingest categories
//!                                                     │ error
//!                                                     └──► log, count, next chunk
//! ```
//!
//! Chunks run one after another on the calling thread. A failing chunk
//! contributes no results; the run itself always completes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sift_common::logging::generate_run_id;
use sift_common::util::truncate_with_ellipsis;
use sift_common::{Config, Result};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

use crate::prompt::{
    self, DEFAULT_CLASSIFICATION_TEMPLATE, DEFAULT_SNAPSHOT_PROMPT, NO_SUPPRESSED_ITEMS,
};
use crate::provider::{ChatModel, Message, OpenAiCompatibleClient};
use crate::registry::CategoryRegistry;
use crate::schema::SchemaEnforcer;
use crate::snapshot::{ContextSnapshot, ContextSnapshotStore, Provenance};
use crate::types::{AnalysisRequestItem, BatchResult, StructuredResult};

/// Body characters sent per item.
const MAX_BODY_CHARS: usize = 800;

const DEFAULT_BATCH_SIZE: usize = 10;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Snapshot details carried in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub provenance: Provenance,
    pub quality_score: f64,
    pub acquired_at: DateTime<Utc>,
}

impl From<&ContextSnapshot> for SnapshotSummary {
    fn from(snapshot: &ContextSnapshot) -> Self {
        Self {
            provenance: snapshot.provenance(),
            quality_score: snapshot.quality_score(),
            acquired_at: snapshot.acquired_at(),
        }
    }
}

/// Outcome of [`AnalysisOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub run_id: String,
    pub snapshot: SnapshotSummary,
    /// Results of all successful batches, in batch order
    pub results: Vec<StructuredResult>,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub skipped_items: usize,
    /// Active categories after the run, sorted
    pub categories: Vec<String>,
}

/// Drives snapshot acquisition, prompt composition and batch enforcement.
pub struct AnalysisOrchestrator<M> {
    snapshots: ContextSnapshotStore,
    enforcer: SchemaEnforcer<M>,
    template: String,
    snapshot_prompt: String,
    batch_size: usize,
    max_retries: u32,
    temperature: f64,
}

impl<M: ChatModel> AnalysisOrchestrator<M> {
    pub fn new(snapshots: ContextSnapshotStore, enforcer: SchemaEnforcer<M>) -> Self {
        Self {
            snapshots,
            enforcer,
            template: DEFAULT_CLASSIFICATION_TEMPLATE.to_string(),
            snapshot_prompt: DEFAULT_SNAPSHOT_PROMPT.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Use a custom classification template.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        prompt::validate_template(&template)?;
        self.template = template;
        Ok(self)
    }

    pub fn with_snapshot_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.snapshot_prompt = prompt.into();
        self
    }

    /// Items per enforcement call. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retries(mut self, max_retries: u32, temperature: f64) -> Self {
        self.max_retries = max_retries;
        self.temperature = temperature;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Current market snapshot. Never fails.
    pub fn get_market_snapshot(&mut self, prompt_template: &str) -> ContextSnapshot {
        self.snapshots.get_snapshot(prompt_template)
    }

    /// Classify one batch of items under `system_prompt`.
    pub fn analyze_batch(
        &self,
        items: &[AnalysisRequestItem],
        system_prompt: &str,
    ) -> Result<BatchResult> {
        if items.is_empty() {
            return Ok(BatchResult::default());
        }

        let messages = vec![Message::system(system_prompt), Message::user(render_items(items))];
        self.enforcer
            .enforce_batch(&messages, self.max_retries, self.temperature)
    }

    /// Run the full pipeline over `items`.
    ///
    /// `suppressed_text` describes recently reported items; an empty string
    /// is sent as `none`.
    pub fn run(
        &mut self,
        items: &[AnalysisRequestItem],
        suppressed_text: &str,
        registry: &mut CategoryRegistry,
    ) -> AnalysisReport {
        let run_id = generate_run_id();
        let span = info_span!("analysis_run", run_id = %run_id);
        let _guard = span.enter();

        let snapshot = self.snapshots.get_snapshot(&self.snapshot_prompt);
        info!(
            provenance = %snapshot.provenance(),
            quality_score = snapshot.quality_score(),
            "Market snapshot ready"
        );

        let suppressed = if suppressed_text.trim().is_empty() {
            NO_SUPPRESSED_ITEMS
        } else {
            suppressed_text
        };
        let system_prompt = prompt::merge(&self.template, snapshot.content(), suppressed);

        let accepted: Vec<AnalysisRequestItem> = items
            .iter()
            .filter(|item| match item.check() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(
                        title = %truncate_with_ellipsis(&item.title, 60),
                        %reason,
                        "Skipping invalid item"
                    );
                    false
                }
            })
            .cloned()
            .collect();
        let skipped_items = items.len() - accepted.len();

        let batches: Vec<&[AnalysisRequestItem]> = accepted.chunks(self.batch_size).collect();
        let batches_total = batches.len();
        info!(
            model = self.enforcer.model_name(),
            strategy = ?self.enforcer.strategy(),
            items = accepted.len(),
            skipped = skipped_items,
            batches = batches_total,
            "Classifying items"
        );
        let mut batches_failed = 0;
        let mut results = Vec::new();

        for (index, batch) in batches.into_iter().enumerate() {
            let batch_no = index + 1;
            debug!(batch = batch_no, of = batches_total, items = batch.len(), "Analyzing batch");

            match self.analyze_batch(batch, &system_prompt) {
                Ok(batch_result) if batch_result.is_empty() => {
                    info!(batch = batch_no, of = batches_total, "Batch produced no results");
                }
                Ok(batch_result) => {
                    let ingest = registry.ingest(&batch_result.results);
                    info!(
                        batch = batch_no,
                        of = batches_total,
                        results = batch_result.len(),
                        categories = ingest.count,
                        similarity = ingest.similarity,
                        consistent = ingest.is_consistent,
                        "Batch analyzed"
                    );
                    results.extend(batch_result);
                }
                Err(e) => {
                    batches_failed += 1;
                    error!(
                        batch = batch_no,
                        of = batches_total,
                        error = %e,
                        "Batch failed, continuing"
                    );
                }
            }
        }

        info!(
            results = results.len(),
            batches_total,
            batches_failed,
            skipped_items,
            "Analysis run complete"
        );

        AnalysisReport {
            run_id,
            snapshot: SnapshotSummary::from(&snapshot),
            results,
            batches_total,
            batches_failed,
            skipped_items,
            categories: registry.get_dynamic_categories(),
        }
    }
}

impl AnalysisOrchestrator<OpenAiCompatibleClient> {
    /// Wire an orchestrator from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = &config.llm;
        let model = OpenAiCompatibleClient::new(
            "analysis",
            &llm.base_url,
            llm.api_key.as_deref(),
            &llm.model,
            Duration::from_secs(llm.timeout_secs),
        );

        let mut orchestrator = Self::new(
            ContextSnapshotStore::from_config(&config.snapshot),
            SchemaEnforcer::new(model, llm.enforcement),
        )
        .with_batch_size(config.analysis.batch_size)
        .with_retries(llm.max_retries, llm.temperature);

        if let Some(path) = &config.analysis.template_file {
            orchestrator = orchestrator.with_template(prompt::load_template(path)?)?;
        }

        Ok(orchestrator)
    }
}

/// Numbered user message listing the items of one batch.
pub fn render_items(items: &[AnalysisRequestItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. {}\n   time: {}\n   url: {}\n   {}",
                i + 1,
                item.title.trim(),
                item.published_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                item.url.trim(),
                truncate_with_ellipsis(item.body.trim(), MAX_BODY_CHARS).replace('\n', " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
