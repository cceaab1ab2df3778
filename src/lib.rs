// src/lib.rs
// Public library surface for integration tests, the demo binary and callers.

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod history;
pub mod icp;
pub mod normalize;
pub mod orchestrator;
pub mod platform;
pub mod prospect;
pub mod scoring;
pub mod selector;
pub mod source;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::EngineConfig;
pub use crate::dedup::{DedupConfig, DedupEngine, SourcePriorities};
pub use crate::engine::{LeadEngine, RunOverrides};
pub use crate::error::LeadError;
pub use crate::history::PerformanceHistory;
pub use crate::icp::Icp;
pub use crate::normalize::Normalizer;
pub use crate::orchestrator::{
    MultiSourceResult, Orchestrator, OrchestratorConfig, SourceMetrics, SourceStatus,
};
pub use crate::platform::Platform;
pub use crate::prospect::{Field, Prospect, ProvenanceEntry, SourceRef};
pub use crate::scoring::{ScoreBreakdown, Scorer, ScoringConfig};
pub use crate::selector::{SelectorConfig, SourceSelector};
pub use crate::source::{
    AdapterError, AdapterRegistry, PlatformAdapter, RateLimitInfo, RawRecord, SearchStrategy,
    SourceConfig, SourceOverride,
};

// CancellationToken is part of the run API; callers need not depend on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
