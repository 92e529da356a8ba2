//! Snapshot sources tried by the store after its caches miss.
//!
//! Every source has the same contract: one attempt, raw text or an error.
//! Cleaning, scoring and validation are the store's job.

use sift_common::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::Provenance;
use crate::provider::{ChatModel, ChatRequest, Message};

/// Fixed user instruction sent alongside the caller's system prompt.
pub const SNAPSHOT_INSTRUCTION: &str = "请联网检索最新信息，生成一份当前时间点的市场快照。\
Produce a point-in-time market snapshot: prices and % moves of the majors, \
flows, macro and regulatory events of the last 24 hours.";

/// One tier of the snapshot fallback chain.
pub trait SnapshotSource {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Provenance stamped on snapshots produced by this source.
    fn provenance(&self) -> Provenance {
        Provenance::Live
    }

    /// Make one attempt.
    fn fetch(&self, system_prompt: &str) -> Result<String>;
}

// ============================================================================
// Model-backed source
// ============================================================================

/// Search-capable reasoning model asked for a market snapshot.
pub struct ModelSnapshotSource<M> {
    model: M,
    temperature: f64,
}

impl<M: ChatModel> ModelSnapshotSource<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            temperature: 0.3,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

impl<M: ChatModel> SnapshotSource for ModelSnapshotSource<M> {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn fetch(&self, system_prompt: &str) -> Result<String> {
        let request = ChatRequest::new(vec![
            Message::system(system_prompt),
            Message::user(SNAPSHOT_INSTRUCTION),
        ])
        .with_temperature(self.temperature)
        .with_web_search();

        let response = self.model.complete(&request)?;
        if response.content.trim().is_empty() {
            return Err(Error::ProviderUnavailable(format!(
                "{} returned an empty snapshot",
                self.model.name()
            )));
        }
        Ok(response.content)
    }
}

// ============================================================================
// Simulated source
// ============================================================================

const SIMULATED_SNAPSHOTS: &[&str] = &[
    "模拟市场快照：比特币(BTC)报 $68,400，24小时上涨 2.1%；以太坊(ETH)报 $3,520，上涨 1.4%。\
现货 ETF 连续三日净流入，资金费率小幅为正。美联储官员讲话偏鸽，市场关注下周 CPI 通胀数据。",
    "Simulated market snapshot: BTC trades near $66,900 (-1.8% 24h) and ETH near $3,410 (-2.5%). \
Spot ETF flows turned negative, funding rates cooled and volatility rose ahead of the Fed rate decision.",
];

/// Offline source that cycles through canned snapshots.
#[derive(Debug, Default)]
pub struct SimulatedSource {
    cursor: AtomicUsize,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn provenance(&self) -> Provenance {
        Provenance::Simulated
    }

    fn fetch(&self, _system_prompt: &str) -> Result<String> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % SIMULATED_SNAPSHOTS.len();
        Ok(SIMULATED_SNAPSHOTS[i].to_string())
    }
}

// ============================================================================
// Static fallback
// ============================================================================

/// Last-resort snapshot used when every source failed.
pub const FALLBACK_SNAPSHOT: &str = "市场快照暂不可用（实时数据源无法访问）。\
Live market context is unavailable. Judge each item on its own merits: weight price moves, \
fund flows, regulatory actions and macro (Fed, inflation, rates) news by their likely \
market impact, and avoid assuming any current price level.";

/// Fixed quality score of the static fallback.
pub const FALLBACK_QUALITY: f64 = 0.7;
