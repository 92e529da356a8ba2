//! Sift Analysis Library
//!
//! Classifies crawled news and social items with a language model, grounded
//! in a cached market context snapshot, while letting the model invent and
//! evolve its own category taxonomy.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                         AnalysisOrchestrator                          │
//! ├───────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐   ┌──────────────┐   ┌────────────────────┐     │
//! │  │ ContextSnapshot  │──►│ prompt merge │──►│  SchemaEnforcer    │     │
//! │  │ Store            │   │ ${SNAPSHOT}  │   │  typed / native    │     │
//! │  │ mem→file→live→…  │   │ ${PREV}      │   │  retry + repair    │     │
//! │  └──────────────────┘   └──────────────┘   └─────────┬──────────┘     │
//! │                                                      ▼                │
//! │                                            ┌────────────────────┐     │
//! │                                            │ CategoryRegistry   │     │
//! │                                            │ Jaccard drift      │     │
//! │                                            └────────────────────┘     │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Degrade, don't fail
//! - Snapshot acquisition always returns something, ending at a static fallback
//! - A failing batch is logged and skipped; the run completes
//! - Taxonomy drift is reported as data
//!
//! ## Validated output only
//! - Every `StructuredResult` handed out passed the field constraints
//! - An empty batch is a valid answer, not an error

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod snapshot;
pub mod types;

pub use orchestrator::{AnalysisOrchestrator, AnalysisReport, SnapshotSummary};
pub use prompt::{format_suppressed, merge, validate_template};
pub use provider::{ChatModel, ChatRequest, ChatResponse, Message, OpenAiCompatibleClient};
pub use registry::{CategoryRegistry, IngestReport};
pub use schema::{
    AttemptPhase, Enforced, EnforcementOutcome, SchemaEnforcer, SchemaMode, ValidationReport,
};
pub use snapshot::{ContextSnapshot, ContextSnapshotStore, Provenance, SnapshotSource};
pub use types::{AnalysisRequestItem, BatchResult, StructuredResult, SuppressedItem};
