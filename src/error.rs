// src/error.rs
//! Error taxonomy.
//!
//! Adapter-level failures are contained per source and only show up in
//! `SourceMetrics`; `InsufficientSources` is the one variant a run returns
//! to its caller.

use std::time::Duration;

use crate::platform::Platform;
use crate::source::AdapterError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeadError {
    #[error("{platform}: authentication failed: {message}")]
    AdapterAuth { platform: Platform, message: String },

    #[error("{platform}: rate limited")]
    AdapterRateLimited {
        platform: Platform,
        retry_after: Option<Duration>,
    },

    #[error("{platform}: unavailable: {message}")]
    AdapterUnavailable { platform: Platform, message: String },

    #[error("{platform}: data quality: {reason}")]
    DataQuality { platform: Platform, reason: String },

    #[error("run exceeded its deadline after {elapsed:?}")]
    RunTimeoutExceeded { elapsed: Duration },

    #[error("only {succeeded} source(s) returned usable results, {required} required")]
    InsufficientSources { required: usize, succeeded: usize },

    #[error("configuration: {0}")]
    Config(String),
}

impl LeadError {
    pub fn from_adapter(platform: Platform, err: AdapterError) -> Self {
        match err {
            AdapterError::AuthFailed(message) => LeadError::AdapterAuth { platform, message },
            AdapterError::RateLimited { retry_after } => LeadError::AdapterRateLimited {
                platform,
                retry_after,
            },
            AdapterError::Unavailable(message) => {
                LeadError::AdapterUnavailable { platform, message }
            }
            AdapterError::Malformed(reason) => LeadError::DataQuality { platform, reason },
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LeadError::AdapterAuth { .. } => "auth",
            LeadError::AdapterRateLimited { .. } => "rate_limited",
            LeadError::AdapterUnavailable { .. } => "unavailable",
            LeadError::DataQuality { .. } => "data_quality",
            LeadError::RunTimeoutExceeded { .. } => "timeout",
            LeadError::InsufficientSources { .. } => "insufficient_sources",
            LeadError::Config(_) => "config",
        }
    }
}
