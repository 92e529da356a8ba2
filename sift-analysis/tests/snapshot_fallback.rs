//! Integration tests for snapshot acquisition.
//!
//! Drives the full fallback chain with model-backed sources whose replies
//! and failures are scripted.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use sift_analysis::provider::{ChatModel, ChatRequest, ChatResponse};
use sift_analysis::snapshot::{ContextSnapshotStore, ModelSnapshotSource, Provenance, SnapshotCache};
use sift_common::{Error, Result};

// ============================================================================
// Mock Models
// ============================================================================

const MARKET_REPLY: &str = "**市场快照** 比特币(BTC)报 $67,250，24小时上涨 2.4% \
[据 CoinDesk](https://www.coindesk.com/markets/btc)；以太坊 ETH 上涨 1.1%[1][2]。\
现货 ETF 净流入 3.2 亿美元，见 https://farside.co.uk/btc/ 。美联储利率决议前市场波动加大。";

/// Mock model that always replies with the same text, or always fails.
struct MockModel {
    name: &'static str,
    reply: Option<&'static str>,
    calls: AtomicU32,
}

impl MockModel {
    fn replying(name: &'static str, reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Some(reply),
            calls: AtomicU32::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: None,
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ChatModel for MockModel {
    fn name(&self) -> &str {
        self.name
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        assert!(request.web_search, "snapshot requests must enable web search");
        match self.reply {
            Some(reply) => Ok(ChatResponse {
                model: self.name.to_string(),
                content: reply.to_string(),
                ..Default::default()
            }),
            None => Err(Error::ProviderUnavailable(format!("{} is down", self.name))),
        }
    }
}

fn source(model: &Arc<MockModel>) -> ModelSnapshotSource<Arc<MockModel>> {
    ModelSnapshotSource::new(Arc::clone(model))
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_live_snapshot_is_stripped_and_scored() {
    let primary = MockModel::replying("primary", MARKET_REPLY);
    let mut store = ContextSnapshotStore::new(30).with_source(source(&primary));

    let snapshot = store.get_snapshot("market analyst");

    assert_eq!(snapshot.provenance(), Provenance::Live);
    assert!(snapshot.is_valid());
    assert!(snapshot.quality_score() > 0.7);
    assert!(snapshot.content().contains("据 CoinDesk"));
    assert!(!snapshot.content().contains("http"));
    assert!(!snapshot.content().contains("www."));
    assert!(!snapshot.content().contains("[1]"));
}

#[test]
fn test_primary_down_secondary_serves() {
    let primary = MockModel::failing("primary");
    let secondary = MockModel::replying("secondary", MARKET_REPLY);
    let mut store = ContextSnapshotStore::new(30)
        .with_source(source(&primary))
        .with_source(source(&secondary));

    let snapshot = store.get_snapshot("market analyst");

    assert_eq!(snapshot.provenance(), Provenance::Live);
    assert_eq!(primary.call_count(), 1);
    assert_eq!(secondary.call_count(), 1);
}

#[test]
fn test_low_quality_primary_falls_through() {
    let primary = MockModel::replying("primary", "No data right now.");
    let secondary = MockModel::replying("secondary", MARKET_REPLY);
    let mut store = ContextSnapshotStore::new(30)
        .with_source(source(&primary))
        .with_source(source(&secondary));

    let snapshot = store.get_snapshot("market analyst");

    assert!(snapshot.content().contains("ETF"));
    assert_eq!(secondary.call_count(), 1);
}

#[test]
fn test_provider_apology_is_not_accepted_as_live() {
    let primary = MockModel::replying(
        "primary",
        "Sorry, something went wrong on our side. Please try again in a second.",
    );
    let mut store = ContextSnapshotStore::new(30).with_source(source(&primary));

    let snapshot = store.get_snapshot("market analyst");

    assert_eq!(snapshot.provenance(), Provenance::Fallback);
    assert!(!snapshot.content().contains("Sorry"));
    assert!(store.current().is_none());
}

#[test]
fn test_everything_down_returns_static_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("market_snapshot.json");
    let primary = MockModel::failing("primary");
    let secondary = MockModel::failing("secondary");
    let mut store = ContextSnapshotStore::new(30)
        .with_cache(SnapshotCache::new(&cache_path))
        .with_source(source(&primary))
        .with_source(source(&secondary));

    let snapshot = store.get_snapshot("market analyst");

    assert_eq!(snapshot.provenance(), Provenance::Fallback);
    assert!(snapshot.is_valid());
    assert!((snapshot.quality_score() - 0.7).abs() < 1e-9);
    assert!(!cache_path.exists());

    // nothing was memoized, so the chain is walked again
    store.get_snapshot("market analyst");
    assert_eq!(primary.call_count(), 2);
}

#[test]
fn test_persisted_snapshot_shared_across_stores() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("market_snapshot.json");

    let first_model = MockModel::replying("primary", MARKET_REPLY);
    let mut first = ContextSnapshotStore::new(30)
        .with_cache(SnapshotCache::new(&cache_path))
        .with_source(source(&first_model));
    let live = first.get_snapshot("market analyst");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert_eq!(raw["source"], "live");
    assert_eq!(raw["content"], live.content());

    let second_model = MockModel::replying("primary", MARKET_REPLY);
    let mut second = ContextSnapshotStore::new(30)
        .with_cache(SnapshotCache::new(&cache_path))
        .with_source(source(&second_model));
    let cached = second.get_snapshot("market analyst");

    assert_eq!(cached.provenance(), Provenance::Cached);
    assert_eq!(cached.content(), live.content());
    assert_eq!(second_model.call_count(), 0);
}

#[test]
fn test_invalidate_then_refetch() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("market_snapshot.json");
    let primary = MockModel::replying("primary", MARKET_REPLY);
    let mut store = ContextSnapshotStore::new(30)
        .with_cache(SnapshotCache::new(&cache_path))
        .with_source(source(&primary));

    store.get_snapshot("market analyst");
    store.get_snapshot("market analyst");
    assert_eq!(primary.call_count(), 1);

    store.invalidate();
    assert!(!cache_path.exists());

    let snapshot = store.get_snapshot("market analyst");
    assert_eq!(snapshot.provenance(), Provenance::Live);
    assert_eq!(primary.call_count(), 2);
    assert!(cache_path.exists());
}
