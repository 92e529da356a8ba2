//! Category taxonomy tracking.
//!
//! The classifier invents its own category labels. The registry remembers
//! the label set of the latest batch, how often each label has been used,
//! and how much the set drifted between batches:
//!
//! ```text
//! similarity = |A ∩ B| / |A ∪ B|        (1.0 when both are empty)
//! consistent = similarity >= threshold  (always true on the first ingest)
//! ```
//!
//! Drift is reported as data; no registry call fails on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sift_common::validation::check_unit_interval;
use sift_common::{Error, Result, ResultExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::StructuredResult;

pub const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.8;

// ============================================================================
// Types
// ============================================================================

/// What a history record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// The active set was replaced
    RegistryUpdate,
    /// The replacement drifted past the threshold
    Change,
}

/// Append-only history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: HistoryKind,
    /// Active set after the ingest
    pub categories: Vec<String>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    pub similarity: f64,
}

/// Result of one [`CategoryRegistry::ingest`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    /// Active categories, sorted
    pub categories: Vec<String>,
    /// Number of active categories
    pub count: usize,
    pub similarity: f64,
    pub is_consistent: bool,
    /// Cumulative usage per category
    pub stats: BTreeMap<String, u64>,
}

/// Export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryExport {
    current_categories: Vec<String>,
    category_stats: BTreeMap<String, u64>,
    category_history: Vec<HistoryRecord>,
    consistency_threshold: f64,
    export_timestamp: DateTime<Utc>,
}

// ============================================================================
// Registry
// ============================================================================

/// Tracks the model-invented category taxonomy across batches.
///
/// One logical owner; pass it by `&mut` to whatever ingests results.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    current: BTreeSet<String>,
    counts: BTreeMap<String, u64>,
    history: Vec<HistoryRecord>,
    threshold: f64,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self {
            current: BTreeSet::new(),
            counts: BTreeMap::new(),
            history: Vec::new(),
            threshold: DEFAULT_CONSISTENCY_THRESHOLD,
        }
    }
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with a custom consistency threshold in `[0, 1]`.
    pub fn with_threshold(threshold: f64) -> Result<Self> {
        let mut registry = Self::new();
        registry.set_threshold(threshold)?;
        Ok(registry)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        check_unit_interval("consistency_threshold", threshold)?;
        self.threshold = threshold;
        Ok(())
    }

    /// Record the categories of one batch of results.
    pub fn ingest(&mut self, results: &[StructuredResult]) -> IngestReport {
        let incoming: BTreeSet<String> = results
            .iter()
            .map(|r| r.category.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        let first = self.history.is_empty() && self.current.is_empty();
        let similarity = if first { 1.0 } else { jaccard(&incoming, &self.current) };
        let is_consistent = first || similarity >= self.threshold;
        let now = Utc::now();

        let added: Vec<String> = incoming.difference(&self.current).cloned().collect();
        let removed: Vec<String> = self.current.difference(&incoming).cloned().collect();
        let categories: Vec<String> = incoming.iter().cloned().collect();

        if !is_consistent {
            warn!(
                similarity,
                threshold = self.threshold,
                added = ?added,
                removed = ?removed,
                "Category taxonomy drifted"
            );
            self.history.push(HistoryRecord {
                timestamp: now,
                kind: HistoryKind::Change,
                categories: categories.clone(),
                added: added.clone(),
                removed: removed.clone(),
                similarity,
            });
        }

        self.history.push(HistoryRecord {
            timestamp: now,
            kind: HistoryKind::RegistryUpdate,
            categories: categories.clone(),
            added,
            removed,
            similarity,
        });
        self.current = incoming;

        for result in results {
            let category = result.category.trim();
            if !category.is_empty() {
                *self.counts.entry(category.to_string()).or_insert(0) += 1;
            }
        }

        debug!(count = categories.len(), similarity, is_consistent, "Categories ingested");

        IngestReport {
            count: categories.len(),
            categories,
            similarity,
            is_consistent,
            stats: self.counts.clone(),
        }
    }

    /// Active categories, sorted.
    pub fn get_dynamic_categories(&self) -> Vec<String> {
        self.current.iter().cloned().collect()
    }

    /// Whether the model has ever used `category`.
    pub fn is_known(&self, category: &str) -> bool {
        self.counts.contains_key(category.trim())
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Clear categories, counts and history. The threshold is kept.
    pub fn reset(&mut self) {
        self.current.clear();
        self.counts.clear();
        self.history.clear();
        info!("Category registry reset");
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Snapshot the registry as a JSON blob.
    pub fn export(&self) -> Value {
        let export = RegistryExport {
            current_categories: self.get_dynamic_categories(),
            category_stats: self.counts.clone(),
            category_history: self.history.clone(),
            consistency_threshold: self.threshold,
            export_timestamp: Utc::now(),
        };
        // a struct of strings, maps and finite floats always serializes
        serde_json::to_value(export).unwrap_or(Value::Null)
    }

    /// Replace all state with an exported blob. On error the registry is unchanged.
    pub fn import(&mut self, blob: &Value) -> Result<()> {
        let export: RegistryExport = serde_json::from_value(blob.clone())?;
        check_unit_interval("consistency_threshold", export.consistency_threshold)?;

        self.current = export
            .current_categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        self.counts = export.category_stats;
        self.history = export.category_history;
        self.threshold = export.consistency_threshold;

        info!(
            categories = self.current.len(),
            history = self.history.len(),
            exported_at = %export.export_timestamp,
            "Category registry imported"
        );
        Ok(())
    }

    /// Write the export blob to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context(format!("creating {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.export())?;
        fs::write(path, json).context(format!("writing registry {}", path.display()))?;
        debug!(path = %path.display(), "Category registry saved");
        Ok(())
    }

    /// Load a registry saved with [`save`](Self::save), or a fresh one if `path` does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut registry = Self::new();
        if !path.exists() {
            debug!(path = %path.display(), "No saved registry, starting fresh");
            return Ok(registry);
        }

        let content =
            fs::read_to_string(path).context(format!("reading registry {}", path.display()))?;
        let blob: Value = serde_json::from_str(&content)
            .map_err(Error::from)
            .context(format!("parsing registry {}", path.display()))?;
        registry.import(&blob)?;
        Ok(registry)
    }
}

/// Jaccard similarity of two sets; two empty sets are identical.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
