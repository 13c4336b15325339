//! Sanar: self-healing element location for browser test automation
//!
//! Sanar (Spanish: "to heal") finds page elements from natural-language
//! descriptions and repairs locators that stopped matching. Everything works
//! on a serialized DOM snapshot, so the engine runs against a live browser
//! (the `browser` feature) or a fixture page alike.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     IntegrationLayer (per worker)                │
//! │  ContextGate ─► IntelligentAi ─► HealingStrategy* ─► HistoryLedger│
//! │                   │    │    │                     │         │     │
//! │                   ▼    ▼    ▼                     ▼         ▼     │
//! │                 NLP  DOM  Candidates      StrategyOptimizer Predictor
//! └──────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                     PageHandle (CDP / static)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sanar::prelude::*;
//!
//! # async fn run(page: &dyn PageHandle) {
//! let mut layer = IntegrationLayer::new(WorkerContext::default());
//! let request = HealRequest::new("#save-btn", "Element not found: #save-btn")
//!     .with_description("click the save button");
//! let result = layer.heal(&request, page).await;
//! if let Some(locator) = result.healed_locator {
//!     println!("use {locator}");
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

/// Version stamped on every exported snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Candidate discovery and ranking
pub mod candidates;
/// Injectable time source
pub mod clock;
/// Healing configuration
pub mod config;
/// Per-worker context
pub mod context;
/// UI/API/database step classification
pub mod context_gate;
/// Serialized DOM model
pub mod dom;
/// Page structure analysis
#[allow(clippy::cast_precision_loss)]
pub mod dom_intelligence;
/// Failure classification
pub mod failure;
/// Element feature extraction
pub mod features;
/// Healing history, fragile elements and strategy statistics
pub mod history;
/// Per-worker façade
pub mod integration;
/// Pattern learning from observed elements
pub mod learner;
/// Description parsing
pub mod nlp;
/// Strategy ordering
pub mod optimizer;
/// Identification engine
pub mod orchestrator;
/// Browser page abstraction
pub mod page;
/// Built-in and learned UI patterns
pub mod patterns;
/// Fragility prediction
pub mod predictive;
/// Error types
pub mod result;
/// CSS selector subset with text extensions
pub mod selector;
/// Feature similarity
pub mod similarity;
/// Pluggable healing strategies
pub mod strategy;
/// Time-bounded cache
pub mod ttl_cache;

pub use config::{HealingConfig, RankingWeights};
pub use context::{WorkerContext, WorkerId};
pub use context_gate::{ContextGate, ExecutionContext};
pub use failure::{FailureAnalysis, FailureContext, FailureType};
pub use integration::{
    HealRequest, IntegrationLayer, IntegrationRegistry, IntelligentHealingResult, PredictionResult,
    WorkerSnapshot,
};
pub use orchestrator::{ElementIdentificationResult, IntelligentAi};
pub use page::{PageHandle, StaticPage};
pub use result::{HealError, HealResult};

/// Everything a test runner usually needs
pub mod prelude {
    pub use super::clock::{Clock, FakeClock, SystemClock};
    pub use super::config::*;
    pub use super::context::*;
    pub use super::context_gate::*;
    pub use super::dom::{DomNode, DomSnapshot, SnapshotBuilder};
    pub use super::failure::{
        classify_failure, DiagnosticsCollector, DiagnosticsSummary, FailureAnalysis,
        FailureContext, FailureType,
    };
    pub use super::history::{AiHistoryEntry, FragileElement, HistoryLedger, StrategyEffectiveness};
    pub use super::integration::*;
    pub use super::nlp::{parse_description, Intent, NlpResult};
    pub use super::orchestrator::{ElementIdentificationResult, IntelligentAi};
    #[cfg(feature = "browser")]
    pub use super::page::CdpPage;
    pub use super::page::{PageHandle, StaticPage};
    pub use super::predictive::FragilityScore;
    pub use super::result::{HealError, HealResult};
    pub use super::selector::Selector;
    pub use super::strategy::{HealingContext, HealingStrategy, StrategyOutcome};
    pub use super::SNAPSHOT_VERSION;
}
