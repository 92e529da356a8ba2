//! Types shared between the pipeline stages.
//!
//! Content items come from external crawlers and are consumed read-only;
//! classification records are produced by the schema enforcer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A content item handed to the pipeline by a crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequestItem {
    /// Headline
    pub title: String,
    /// Article or post text
    pub body: String,
    /// Absolute link to the original item
    pub url: String,
    /// Publication time
    pub published_at: DateTime<Utc>,
}

impl AnalysisRequestItem {
    /// Check the constraints an item must meet before it is sent to a model.
    pub fn check(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("empty title".into());
        }
        if self.body.trim().is_empty() {
            return Err("empty body".into());
        }
        if !is_absolute_http_url(&self.url) {
            return Err(format!("url '{}' is not an absolute http(s) link", self.url));
        }
        Ok(())
    }
}

/// One classification record for a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Event time as reported by the model
    pub time: String,
    /// Model-invented category label
    pub category: String,
    /// Importance, 0 to 100
    pub weight: u8,
    /// One-paragraph summary
    pub summary: String,
    /// Absolute link to the source item
    pub source_url: String,
}

/// Ordered results of one batch. Empty means nothing warranted inclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<StructuredResult>,
}

impl BatchResult {
    pub fn new(results: Vec<StructuredResult>) -> Self {
        Self { results }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

impl IntoIterator for BatchResult {
    type Item = StructuredResult;
    type IntoIter = std::vec::IntoIter<StructuredResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// An item that was already reported recently and should not resurface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuppressedItem {
    pub title: String,
    pub reported_at: DateTime<Utc>,
}

pub(crate) fn is_absolute_http_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}
