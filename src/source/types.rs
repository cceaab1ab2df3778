// src/source/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::platform::Platform;

/// One platform-native result record, as returned by an adapter.
pub type RawRecord = Map<String, Value>;

/// Platform-specific filter map passed through to the adapter untouched.
pub type Filters = Map<String, Value>;

/// Longest refill period a token bucket is built with.
const MAX_RATE_PERIOD: Duration = Duration::from_secs(86_400);

/// Per-platform configuration for one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub platform: Platform,
    /// 1..=10, higher is tried first and wins merge conflicts.
    pub priority: u8,
    pub max_results: usize,
    #[serde(default)]
    pub search_parameters: Map<String, Value>,
    /// Seconds between two calls to this platform; 0 disables local limiting.
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_rate_limit_delay() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    pub fn new(platform: Platform, priority: u8) -> Self {
        Self {
            priority: priority.clamp(1, 10),
            ..super::defaults::default_config(platform)
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_rate_limit_delay(mut self, secs: f64) -> Self {
        self.rate_limit_delay = secs;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Token-bucket refill period, `None` when no local limit applies.
    pub fn rate_limit_period(&self) -> Option<Duration> {
        if self.rate_limit_delay.is_finite() && self.rate_limit_delay > 0.0 {
            Some(
                Duration::try_from_secs_f64(self.rate_limit_delay)
                    .unwrap_or(MAX_RATE_PERIOD)
                    .min(MAX_RATE_PERIOD),
            )
        } else {
            None
        }
    }
}

/// Operator settings for one platform, laid over its built-in defaults.
/// Unset fields keep the default; `search_parameters` keys are merged in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOverride {
    pub priority: Option<u8>,
    pub max_results: Option<usize>,
    pub rate_limit_delay: Option<f64>,
    /// `false` keeps the platform out of every run, `true` lets it in even
    /// under the selector's weight threshold.
    pub enabled: Option<bool>,
    pub search_parameters: Map<String, Value>,
}

impl SourceOverride {
    /// Drop values no run could use: priority outside 1..=10 is clamped,
    /// zero `max_results` and negative or non-finite delays are unset.
    pub fn sanitize(&mut self) {
        if let Some(p) = self.priority.as_mut() {
            *p = (*p).clamp(1, 10);
        }
        if self.max_results == Some(0) {
            self.max_results = None;
        }
        if self.rate_limit_delay.is_some_and(|d| !d.is_finite() || d < 0.0) {
            self.rate_limit_delay = None;
        }
    }

    pub fn apply(&self, mut cfg: SourceConfig) -> SourceConfig {
        if let Some(p) = self.priority {
            cfg.priority = p.clamp(1, 10);
        }
        if let Some(n) = self.max_results {
            cfg.max_results = n.max(1);
        }
        if let Some(d) = self.rate_limit_delay {
            cfg.rate_limit_delay = d;
        }
        if self.enabled == Some(false) {
            cfg.enabled = false;
        }
        cfg.search_parameters
            .extend(self.search_parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        cfg
    }
}

/// Queries and thresholds for one platform in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub primary_queries: Vec<String>,
    #[serde(default)]
    pub fallback_queries: Vec<String>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    /// Minimum share of primary results that must normalize cleanly before
    /// fallback queries are skipped, [0,1].
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
}

fn default_result_limit() -> usize {
    50
}

fn default_quality_threshold() -> f32 {
    0.5
}

impl SearchStrategy {
    pub fn new<I, S>(primary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            primary_queries: primary.into_iter().map(Into::into).collect(),
            fallback_queries: Vec::new(),
            filters: Filters::new(),
            result_limit: default_result_limit(),
            quality_threshold: default_quality_threshold(),
        }
    }

    pub fn with_fallback<I, S>(mut self, fallback: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_queries = fallback.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filters.insert(key.to_string(), value);
        self
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    pub fn with_quality_threshold(mut self, t: f32) -> Self {
        self.quality_threshold = t.clamp(0.0, 1.0);
        self
    }
}

/// Errors an adapter may report from `authenticate` or `search`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl AdapterError {
    /// Rate limits and outages are worth another attempt after backing off.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::Unavailable(_)
        )
    }
}

/// Remaining budget as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub remaining: Option<u32>,
    #[serde(default)]
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitInfo {
    /// How long to hold off before the next call, if the budget is spent.
    pub fn wait_hint(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.remaining != Some(0) {
            return None;
        }
        let reset = self.reset_at?;
        (reset - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Contract every platform integration satisfies. The orchestrator owns rate
/// limiting, timeouts and retries; adapters only do I/O.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn authenticate(&self) -> Result<(), AdapterError>;

    async fn search(&self, query: &str, filters: &Filters) -> Result<Vec<RawRecord>, AdapterError>;

    fn rate_limit_info(&self) -> RateLimitInfo {
        RateLimitInfo::default()
    }
}

pub type DynAdapter = Arc<dyn PlatformAdapter>;

/// Platform → adapter lookup. New platforms register here; the orchestrator
/// never names a concrete adapter.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, DynAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for its platform.
    pub fn register(&mut self, adapter: DynAdapter) -> Option<DynAdapter> {
        self.adapters.insert(adapter.platform(), adapter)
    }

    /// Builder-style registration.
    pub fn with<A: PlatformAdapter + 'static>(mut self, adapter: A) -> Self {
        self.register(Arc::new(adapter));
        self
    }

    pub fn get(&self, platform: Platform) -> Option<DynAdapter> {
        self.adapters.get(&platform).cloned()
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.adapters.contains_key(&platform)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut v: Vec<Platform> = self.adapters.keys().copied().collect();
        v.sort();
        v
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zero_delay_disables_bucket() {
        let c = SourceConfig::new(Platform::Github, 5).with_rate_limit_delay(0.0);
        assert!(c.rate_limit_period().is_none());
        let c = c.with_rate_limit_delay(1.5);
        assert_eq!(c.rate_limit_period(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn huge_delay_is_capped_not_fatal() {
        for delay in [1e300, f64::MAX] {
            let c = SourceConfig::new(Platform::Github, 5).with_rate_limit_delay(delay);
            assert_eq!(c.rate_limit_period(), Some(MAX_RATE_PERIOD));
        }
        let c = SourceConfig::new(Platform::Github, 5).with_rate_limit_delay(f64::INFINITY);
        assert!(c.rate_limit_period().is_none());
    }

    #[test]
    fn override_keeps_unset_fields() {
        let base = SourceConfig::new(Platform::Github, 6);
        let o = SourceOverride {
            max_results: Some(10),
            search_parameters: [("sort".to_string(), Value::from("updated"))].into_iter().collect(),
            ..SourceOverride::default()
        };
        let c = o.apply(base.clone());
        assert_eq!(c.max_results, 10);
        assert_eq!(c.priority, base.priority);
        assert_eq!(c.rate_limit_delay, base.rate_limit_delay);
        assert!(c.enabled);
        assert_eq!(c.search_parameters["sort"], "updated");
        assert_eq!(c.search_parameters["order"], "desc");

        let off = SourceOverride { enabled: Some(false), priority: Some(99), ..SourceOverride::default() };
        let c = off.apply(base);
        assert!(!c.enabled);
        assert_eq!(c.priority, 10);
    }

    #[test]
    fn override_sanitize_drops_unusable_values() {
        let mut o = SourceOverride {
            priority: Some(0),
            max_results: Some(0),
            rate_limit_delay: Some(f64::NAN),
            ..SourceOverride::default()
        };
        o.sanitize();
        assert_eq!(o.priority, Some(1));
        assert_eq!(o.max_results, None);
        assert_eq!(o.rate_limit_delay, None);
    }

    #[test]
    fn priority_is_clamped() {
        assert_eq!(SourceConfig::new(Platform::Reddit, 42).priority, 10);
        assert_eq!(SourceConfig::new(Platform::Reddit, 0).priority, 1);
    }

    #[test]
    fn wait_hint_only_when_budget_spent() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let reset = now + chrono::Duration::seconds(30);
        let spent = RateLimitInfo {
            requests_per_minute: Some(60),
            remaining: Some(0),
            reset_at: Some(reset),
        };
        assert_eq!(spent.wait_hint(now), Some(Duration::from_secs(30)));

        let left = RateLimitInfo {
            remaining: Some(3),
            ..spent.clone()
        };
        assert_eq!(left.wait_hint(now), None);

        // Reset already passed.
        assert_eq!(spent.wait_hint(reset + chrono::Duration::seconds(1)), None);
    }

    #[test]
    fn transient_errors() {
        assert!(AdapterError::RateLimited { retry_after: None }.is_transient());
        assert!(AdapterError::Unavailable("503".into()).is_transient());
        assert!(!AdapterError::AuthFailed("x".into()).is_transient());
        assert!(!AdapterError::Malformed("x".into()).is_transient());
    }
}
