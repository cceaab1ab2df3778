// src/orchestrator/report.rs
//! Per-source metrics and the run result handed back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::platform::Platform;
use crate::prospect::Prospect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// At least one usable record, no unrecovered error.
    Succeeded,
    /// At least one usable record, but some queries failed for good.
    Degraded,
    /// Nothing usable and an adapter error.
    Failed,
    /// Completed cleanly with nothing usable.
    Empty,
    /// Still running when the run returned.
    Pending,
    /// Never attempted: no adapter or no search strategy for the platform.
    Unavailable,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Succeeded => "succeeded",
            SourceStatus::Degraded => "degraded",
            SourceStatus::Failed => "failed",
            SourceStatus::Empty => "empty",
            SourceStatus::Pending => "pending",
            SourceStatus::Unavailable => "unavailable",
        }
    }

    /// Completed without failing outright.
    pub fn is_successful(&self) -> bool {
        matches!(
            self,
            SourceStatus::Succeeded | SourceStatus::Degraded | SourceStatus::Empty
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub platform: Platform,
    pub status: SourceStatus,
    pub total_queries: u32,
    pub successful_queries: u32,
    pub used_fallback: bool,
    /// Raw records kept from the adapter (after the result limit).
    pub results_returned: usize,
    pub normalized_records: usize,
    pub data_quality_failures: usize,
    pub duplicate_records: usize,
    pub error_count: u32,
    pub retries: u32,
    /// Sum over all adapter calls.
    pub latency_ms: u64,
    pub mean_latency_ms: f64,
    /// Raw records of this source that ended up in the final list.
    pub included_after_scoring: usize,
    pub average_relevance_score: f32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl SourceMetrics {
    pub fn pending(platform: Platform) -> Self {
        Self {
            platform,
            status: SourceStatus::Pending,
            total_queries: 0,
            successful_queries: 0,
            used_fallback: false,
            results_returned: 0,
            normalized_records: 0,
            data_quality_failures: 0,
            duplicate_records: 0,
            error_count: 0,
            retries: 0,
            latency_ms: 0,
            mean_latency_ms: 0.0,
            included_after_scoring: 0,
            average_relevance_score: 0.0,
            last_error: None,
            last_updated: Utc::now(),
        }
    }

    pub fn unavailable(platform: Platform, reason: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::Unavailable,
            last_error: Some(reason.into()),
            ..Self::pending(platform)
        }
    }

    pub fn failed(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            status: SourceStatus::Failed,
            error_count: 1,
            last_error: Some(error.into()),
            ..Self::pending(platform)
        }
    }

    /// Share of normalized records that made the final list, [0,1].
    pub fn inclusion_ratio(&self) -> f32 {
        if self.normalized_records == 0 {
            0.0
        } else {
            (self.included_after_scoring as f32 / self.normalized_records as f32).min(1.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSourceResult {
    /// Merged prospects, best score first.
    pub prospects: Vec<Prospect>,
    pub source_metrics: BTreeMap<Platform, SourceMetrics>,
    pub execution_time: Duration,
    pub successful_sources: Vec<Platform>,
    pub failed_sources: Vec<Platform>,
    pub pending_sources: Vec<Platform>,
    /// Enabled but never attempted (no adapter or strategy).
    #[serde(default)]
    pub unavailable_sources: Vec<Platform>,
    /// The run deadline cut in-flight sources off.
    pub timed_out: bool,
    /// The caller cancelled the run.
    pub cancelled: bool,
}

impl MultiSourceResult {
    pub fn metrics(&self, platform: Platform) -> Option<&SourceMetrics> {
        self.source_metrics.get(&platform)
    }

    pub fn is_partial(&self) -> bool {
        self.timed_out || self.cancelled || !self.pending_sources.is_empty()
    }
}
