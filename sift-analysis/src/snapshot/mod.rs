//! Market context snapshots.
//!
//! A snapshot is a short-lived text blob describing current market state. It
//! grounds every classification call, so acquiring one must never fail: the
//! store walks an ordered chain and stops at the first tier that produces a
//! valid snapshot.
//!
//! # Fallback Chain
//!
//! ```text
//! ┌────────────┐ fresh  ┌────────────┐ fresh  ┌──────────────┐ valid  ┌──────────────┐ valid
//! │ memory slot├───────►│ cache file ├───────►│ live source  ├───────►│ secondaries  ├──────► ...
//! └─────┬──────┘        └─────┬──────┘        └──────┬───────┘        └──────┬───────┘
//!       │ miss                │ miss/expired         │ error/rejected        │ exhausted
//!       └────────────────────►└─────────────────────►└──────────────────────►▼
//!                                                                   static fallback (0.7)
//! ```
//!
//! Source output is link-stripped, scored and validated before it is
//! accepted. Only validated snapshots reach the memory slot and cache file.

pub mod cache;
pub mod cleaner;
pub mod quality;
pub mod source;

pub use cache::{PersistedSnapshot, SnapshotCache};
pub use source::{ModelSnapshotSource, SimulatedSource, SnapshotSource};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sift_common::config::SnapshotConfig;
use sift_common::util::log_preview;
use sift_common::Error;
use tracing::{debug, info, warn};

use crate::provider::OpenAiCompatibleClient;

// ============================================================================
// Snapshot
// ============================================================================

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Live,
    Cached,
    Fallback,
    Simulated,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Live => write!(f, "live"),
            Provenance::Cached => write!(f, "cached"),
            Provenance::Fallback => write!(f, "fallback"),
            Provenance::Simulated => write!(f, "simulated"),
        }
    }
}

/// An immutable market context snapshot.
///
/// `quality_score` and `is_valid` are always derived from `content` by the
/// rules in [`quality`], except for the static fallback, which carries a
/// fixed score and is always valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    content: String,
    acquired_at: DateTime<Utc>,
    provenance: Provenance,
    quality_score: f64,
    is_valid: bool,
}

impl ContextSnapshot {
    /// Build a snapshot acquired now, scoring `content` as given.
    pub fn assessed(content: impl Into<String>, provenance: Provenance) -> Self {
        Self::assessed_at(content, provenance, Utc::now())
    }

    fn assessed_at(
        content: impl Into<String>,
        provenance: Provenance,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let (quality_score, is_valid) = quality::assess(&content);
        Self {
            content,
            acquired_at,
            provenance,
            quality_score,
            is_valid,
        }
    }

    /// The static last-resort snapshot.
    pub fn fallback() -> Self {
        Self {
            content: source::FALLBACK_SNAPSHOT.to_string(),
            acquired_at: Utc::now(),
            provenance: Provenance::Fallback,
            quality_score: source::FALLBACK_QUALITY,
            is_valid: true,
        }
    }

    /// Rebuild a snapshot from the cache file; the score is recomputed from content.
    fn restored(entry: PersistedSnapshot) -> Self {
        Self::assessed_at(entry.content, Provenance::Cached, entry.timestamp)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Whether less than `ttl` has elapsed since acquisition.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        Utc::now() - self.acquired_at < ttl
    }
}

// ============================================================================
// Store
// ============================================================================

/// Upper bound on the configured TTL (one year).
const MAX_TTL_MINUTES: u64 = 60 * 24 * 365;

/// Memory + file cached snapshot acquisition with an ordered fallback chain.
///
/// Single owner, no internal locking; callers sharing a store across
/// threads must serialize access.
pub struct ContextSnapshotStore {
    ttl: Duration,
    memory: Option<ContextSnapshot>,
    cache: Option<SnapshotCache>,
    sources: Vec<Box<dyn SnapshotSource>>,
}

impl ContextSnapshotStore {
    /// Create a store with no cache file and no sources (always falls back).
    pub fn new(ttl_minutes: u64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_minutes.min(MAX_TTL_MINUTES) as i64),
            memory: None,
            cache: None,
            sources: Vec::new(),
        }
    }

    /// Persist validated snapshots to `cache`.
    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Append a source to the chain. The first source added is the primary.
    pub fn with_source(mut self, source: impl SnapshotSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Build the store described by configuration.
    pub fn from_config(config: &SnapshotConfig) -> Self {
        let mut store =
            Self::new(config.ttl_minutes).with_cache(SnapshotCache::new(config.cache_path()));
        let timeout = std::time::Duration::from_secs(config.timeout_secs);

        if config.simulate {
            return store.with_source(SimulatedSource::new());
        }

        if config.enabled {
            let client = OpenAiCompatibleClient::new(
                "snapshot",
                &config.base_url,
                config.api_key.as_deref(),
                &config.model,
                timeout,
            );
            store = store
                .with_source(ModelSnapshotSource::new(client).with_temperature(config.temperature));
        }

        for secondary in &config.secondary {
            let client = OpenAiCompatibleClient::new(
                &secondary.name,
                &secondary.base_url,
                secondary.api_key.as_deref(),
                &secondary.model,
                timeout,
            );
            store = store
                .with_source(ModelSnapshotSource::new(client).with_temperature(config.temperature));
        }

        store
    }

    /// Number of sources behind the caches.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The snapshot currently held in memory, fresh or not.
    pub fn current(&self) -> Option<&ContextSnapshot> {
        self.memory.as_ref()
    }

    /// Get a snapshot, walking the fallback chain. Never fails.
    pub fn get_snapshot(&mut self, prompt_template: &str) -> ContextSnapshot {
        if let Some(snapshot) = self.memory.as_ref().filter(|s| s.is_fresh(self.ttl)) {
            debug!(provenance = %snapshot.provenance, "Using in-memory snapshot");
            return snapshot.clone();
        }

        if let Some(snapshot) = self.load_cached() {
            info!(
                quality_score = snapshot.quality_score,
                acquired_at = %snapshot.acquired_at,
                "Using cached snapshot"
            );
            self.memory = Some(snapshot.clone());
            return snapshot;
        }

        let mut acquired = None;
        for (index, source) in self.sources.iter().enumerate() {
            match Self::attempt(source.as_ref(), prompt_template) {
                Ok(snapshot) => {
                    info!(
                        source = source.name(),
                        tier = index,
                        provenance = %snapshot.provenance,
                        quality_score = snapshot.quality_score,
                        chars = snapshot.content.chars().count(),
                        "Snapshot acquired"
                    );
                    acquired = Some(snapshot);
                    break;
                }
                Err(e) => {
                    warn!(
                        source = source.name(),
                        tier = index,
                        error = %e,
                        "Snapshot source failed"
                    );
                }
            }
        }

        if let Some(snapshot) = acquired {
            self.remember(&snapshot);
            return snapshot;
        }

        warn!(
            sources = self.sources.len(),
            "All snapshot sources failed, using static fallback"
        );
        ContextSnapshot::fallback()
    }

    /// Drop the memory slot and the cache file.
    pub fn invalidate(&mut self) {
        self.memory = None;
        if let Some(cache) = &self.cache {
            cache.remove();
        }
        info!("Snapshot cache invalidated");
    }

    /// One source attempt: fetch, clean, score, validate.
    fn attempt(
        source: &dyn SnapshotSource,
        prompt_template: &str,
    ) -> Result<ContextSnapshot, Error> {
        let raw = source.fetch(prompt_template)?;
        let cleaned = cleaner::strip_links(&raw);
        let snapshot = ContextSnapshot::assessed(cleaned, source.provenance());

        if snapshot.is_valid {
            Ok(snapshot)
        } else {
            debug!(
                source = source.name(),
                preview = %log_preview(&raw),
                "Rejected snapshot content"
            );
            Err(Error::QualityRejected {
                score: snapshot.quality_score,
                reason: format!(
                    "{} chars, {} domain keyword(s)",
                    snapshot.content.chars().count(),
                    quality::keyword_count(&snapshot.content)
                ),
            })
        }
    }

    fn load_cached(&self) -> Option<ContextSnapshot> {
        let cache = self.cache.as_ref()?;
        let entry = cache.load()?;
        let snapshot = ContextSnapshot::restored(entry);

        if !snapshot.is_fresh(self.ttl) {
            debug!(acquired_at = %snapshot.acquired_at, "Cached snapshot expired, removing");
            cache.remove();
            return None;
        }
        if !snapshot.is_valid {
            warn!("Cached snapshot no longer passes validation, removing");
            cache.remove();
            return None;
        }
        Some(snapshot)
    }

    fn remember(&mut self, snapshot: &ContextSnapshot) {
        self.memory = Some(snapshot.clone());

        if snapshot.provenance == Provenance::Simulated {
            return;
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(snapshot) {
                warn!(error = %e, "Failed to persist snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_common::config::SecondarySnapshotConfig;
    use sift_common::Result;
    use std::cell::Cell;
    use std::rc::Rc;

    const GOOD: &str = "比特币 BTC 报 $68,000，24小时上涨 3%，以太坊 ETH 跟涨，\
现货 ETF 资金持续流入 [1](https://x.com/a)，美联储利率决议前市场波动加大。";

    struct ScriptedSource {
        name: &'static str,
        reply: std::result::Result<&'static str, &'static str>,
        calls: Rc<Cell<u32>>,
    }

    impl ScriptedSource {
        fn ok(name: &'static str, reply: &'static str) -> (Self, Rc<Cell<u32>>) {
            let calls = Rc::new(Cell::new(0));
            (Self { name, reply: Ok(reply), calls: Rc::clone(&calls) }, calls)
        }

        fn failing(name: &'static str) -> (Self, Rc<Cell<u32>>) {
            let calls = Rc::new(Cell::new(0));
            (Self { name, reply: Err("connection refused"), calls: Rc::clone(&calls) }, calls)
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        fn fetch(&self, _system_prompt: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            self.reply
                .map(str::to_string)
                .map_err(|e| Error::ProviderUnavailable(e.into()))
        }
    }

    #[test]
    fn test_no_sources_falls_back() {
        let mut store = ContextSnapshotStore::new(30);
        let snapshot = store.get_snapshot("prompt");

        assert_eq!(snapshot.provenance(), Provenance::Fallback);
        assert!(snapshot.is_valid());
        assert!((snapshot.quality_score() - 0.7).abs() < 1e-9);
        assert!(store.current().is_none());
    }

    #[test]
    fn test_live_snapshot_is_cleaned_and_memoized() {
        let (source, calls) = ScriptedSource::ok("primary", GOOD);
        let mut store = ContextSnapshotStore::new(30).with_source(source);

        let first = store.get_snapshot("prompt");
        assert_eq!(first.provenance(), Provenance::Live);
        assert!(first.is_valid());
        assert!(!first.content().contains("https://"));
        assert!(first.content().contains("资金持续流入"));

        let second = store.get_snapshot("prompt");
        assert_eq!(second, first);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_rejected_primary_falls_to_secondary() {
        let (primary, primary_calls) = ScriptedSource::ok("primary", "too short");
        let (secondary, secondary_calls) = ScriptedSource::ok("secondary", GOOD);
        let mut store = ContextSnapshotStore::new(30)
            .with_source(primary)
            .with_source(secondary);

        let snapshot = store.get_snapshot("prompt");
        assert_eq!(snapshot.provenance(), Provenance::Live);
        assert_eq!(primary_calls.get(), 1);
        assert_eq!(secondary_calls.get(), 1);
    }

    #[test]
    fn test_all_sources_fail_never_caches_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let (primary, _) = ScriptedSource::failing("primary");
        let mut store = ContextSnapshotStore::new(30)
            .with_cache(SnapshotCache::new(&path))
            .with_source(primary);

        let snapshot = store.get_snapshot("prompt");
        assert_eq!(snapshot.provenance(), Provenance::Fallback);
        assert!(!path.exists());
        assert!(store.current().is_none());
    }

    #[test]
    fn test_cache_file_survives_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let (source, _) = ScriptedSource::ok("primary", GOOD);
        let mut first = ContextSnapshotStore::new(30)
            .with_cache(SnapshotCache::new(&path))
            .with_source(source);
        let live = first.get_snapshot("prompt");
        assert!(path.exists());

        let (source, calls) = ScriptedSource::ok("primary", GOOD);
        let mut second = ContextSnapshotStore::new(30)
            .with_cache(SnapshotCache::new(&path))
            .with_source(source);
        let cached = second.get_snapshot("prompt");

        assert_eq!(cached.provenance(), Provenance::Cached);
        assert_eq!(cached.content(), live.content());
        assert_eq!(cached.acquired_at(), live.acquired_at());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_expired_cache_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let stale =
            ContextSnapshot::assessed_at(GOOD, Provenance::Live, Utc::now() - Duration::hours(2));
        SnapshotCache::new(&path).store(&stale).unwrap();

        let mut store = ContextSnapshotStore::new(30).with_cache(SnapshotCache::new(&path));
        let snapshot = store.get_snapshot("prompt");

        assert_eq!(snapshot.provenance(), Provenance::Fallback);
        assert!(!path.exists());
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let (source, calls) = ScriptedSource::ok("primary", GOOD);
        let mut store = ContextSnapshotStore::new(30)
            .with_cache(SnapshotCache::new(&path))
            .with_source(source);

        store.get_snapshot("prompt");
        store.invalidate();
        assert!(!path.exists());
        assert!(store.current().is_none());

        store.get_snapshot("prompt");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_simulated_snapshot_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut store = ContextSnapshotStore::new(30)
            .with_cache(SnapshotCache::new(&path))
            .with_source(SimulatedSource::new());

        let snapshot = store.get_snapshot("prompt");
        assert_eq!(snapshot.provenance(), Provenance::Simulated);
        assert!(!path.exists());
        assert!(store.current().is_some());
    }

    #[test]
    fn test_zero_ttl_never_reuses() {
        let (source, calls) = ScriptedSource::ok("primary", GOOD);
        let mut store = ContextSnapshotStore::new(0).with_source(source);
        store.get_snapshot("prompt");
        store.get_snapshot("prompt");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_quality_invariant_holds_for_assessed() {
        let snapshot = ContextSnapshot::assessed("BTC up 5%", Provenance::Live);
        assert_eq!(snapshot.is_valid(), quality::is_valid("BTC up 5%"));
        assert!((snapshot.quality_score() - quality::score("BTC up 5%")).abs() < 1e-12);
        assert!(!snapshot.is_valid());
    }

    #[test]
    fn test_from_config_source_chain() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SnapshotConfig {
            cache_file: Some(dir.path().join("market_snapshot.json")),
            secondary: vec![SecondarySnapshotConfig {
                name: "backup".into(),
                base_url: "https://api.perplexity.ai".into(),
                api_key: None,
                model: "sonar".into(),
            }],
            ..SnapshotConfig::default()
        };
        assert_eq!(ContextSnapshotStore::from_config(&config).source_count(), 2);

        config.enabled = false;
        assert_eq!(ContextSnapshotStore::from_config(&config).source_count(), 1);

        config.simulate = true;
        let mut store = ContextSnapshotStore::from_config(&config);
        assert_eq!(store.source_count(), 1);
        assert_eq!(store.get_snapshot("p").provenance(), Provenance::Simulated);
    }
}
