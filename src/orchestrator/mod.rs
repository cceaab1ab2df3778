// src/orchestrator/mod.rs
//! # Search Orchestrator
//!
//! Fans one search out to every enabled source at once:
//! - one spawned task per source, at most `max_concurrency` running (semaphore)
//! - per-platform token buckets shared across runs ([`RateLimiterPool`])
//! - per-call timeout, backoff with jitter, re-authentication
//! - reports stream back over an mpsc channel as tasks finish
//!
//! The loop ends when every task has reported, when `fail_fast` is on and
//! enough sources returned usable records, at the run deadline, or when the
//! caller cancels. Whatever arrived is then normalized in a fixed order,
//! scored, deduplicated and rescored, so network timing never changes the
//! output for equal inputs.

pub mod rate_limit;
pub mod report;
pub mod retry;
mod task;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::{DedupEngine, SourcePriorities};
use crate::error::LeadError;
use crate::icp::Icp;
use crate::normalize::Normalizer;
use crate::platform::Platform;
use crate::prospect::Prospect;
use crate::scoring::Scorer;
use crate::source::{AdapterRegistry, SearchStrategy, SourceConfig};
use crate::telemetry::ensure_metrics_described;

pub use rate_limit::RateLimiterPool;
pub use report::{MultiSourceResult, SourceMetrics, SourceStatus};
use task::{SourceOutcome, SourceTask};

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
pub const DEFAULT_MIN_SOURCES: usize = 2;
pub const DEFAULT_RUN_DEADLINE_SECS: f64 = 120.0;

/// Longest duration any configured interval is allowed to reach.
const MAX_INTERVAL: Duration = Duration::from_secs(86_400 * 365);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    /// Sources that must return usable records for the run to count.
    pub min_sources: usize,
    pub call_timeout_secs: f64,
    pub run_deadline_secs: f64,
    pub max_attempts: u32,
    pub auth_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Return as soon as `min_sources` are satisfied.
    pub fail_fast: bool,
    pub max_queries_per_source: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            min_sources: DEFAULT_MIN_SOURCES,
            call_timeout_secs: 30.0,
            run_deadline_secs: DEFAULT_RUN_DEADLINE_SECS,
            max_attempts: 3,
            auth_retries: 1,
            backoff_base_ms: 250,
            backoff_max_ms: 8_000,
            fail_fast: false,
            max_queries_per_source: 3,
        }
    }
}

fn secs(v: f64) -> Duration {
    if v.is_finite() && v > 0.0 {
        Duration::try_from_secs_f64(v)
            .unwrap_or(MAX_INTERVAL)
            .min(MAX_INTERVAL)
    } else {
        Duration::ZERO
    }
}

impl OrchestratorConfig {
    pub fn call_timeout(&self) -> Duration {
        secs(self.call_timeout_secs)
    }

    pub fn run_deadline(&self) -> Duration {
        secs(self.run_deadline_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms).min(MAX_INTERVAL)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms).min(MAX_INTERVAL)
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    cfg: Arc<OrchestratorConfig>,
    normalizer: Normalizer,
    scorer: Scorer,
    dedup: DedupEngine,
    limiters: Arc<RateLimiterPool>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

impl Orchestrator {
    pub fn new(cfg: OrchestratorConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            normalizer: Normalizer::new(),
            scorer: Scorer::default(),
            dedup: DedupEngine::default(),
            limiters: Arc::new(RateLimiterPool::new()),
        }
    }

    pub fn with_scorer(mut self, scorer: Scorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_dedup(mut self, dedup: DedupEngine) -> Self {
        self.dedup = dedup;
        self
    }

    /// Same scorer, dedup engine and token buckets, different run settings.
    pub fn reconfigured(&self, cfg: OrchestratorConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.cfg
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn limiters(&self) -> &RateLimiterPool {
        &self.limiters
    }

    pub async fn run(
        &self,
        sources: &[SourceConfig],
        strategies: &BTreeMap<Platform, SearchStrategy>,
        registry: &AdapterRegistry,
        icp: &Icp,
    ) -> Result<MultiSourceResult, LeadError> {
        self.run_with_cancel(sources, strategies, registry, icp, &CancellationToken::new())
            .await
    }

    /// Run one orchestration. Cancelling `cancel` stops every in-flight
    /// source; whatever already arrived is still scored and returned.
    pub async fn run_with_cancel(
        &self,
        sources: &[SourceConfig],
        strategies: &BTreeMap<Platform, SearchStrategy>,
        registry: &AdapterRegistry,
        icp: &Icp,
        cancel: &CancellationToken,
    ) -> Result<MultiSourceResult, LeadError> {
        ensure_metrics_described();
        let started = Instant::now();
        let settings = Arc::clone(&self.cfg);
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(settings.run_deadline())
            .unwrap_or(now + MAX_INTERVAL);
        let run_token = cancel.child_token();

        // Enabled sources, first config per platform wins.
        let mut metrics: BTreeMap<Platform, SourceMetrics> = BTreeMap::new();
        let mut active: Vec<&SourceConfig> = Vec::new();
        let mut tasks: Vec<SourceTask> = Vec::new();
        for config in sources.iter().filter(|c| c.enabled) {
            if metrics.contains_key(&config.platform) {
                continue;
            }
            let platform = config.platform;
            let Some(adapter) = registry.get(platform) else {
                warn!(target: "orchestrator", platform = %platform, "no adapter registered");
                metrics.insert(platform, SourceMetrics::unavailable(platform, "no adapter registered"));
                continue;
            };
            let Some(strategy) = strategies.get(&platform) else {
                warn!(target: "orchestrator", platform = %platform, "no search strategy");
                metrics.insert(platform, SourceMetrics::unavailable(platform, "no search strategy"));
                continue;
            };
            metrics.insert(platform, SourceMetrics::pending(platform));
            active.push(config);
            tasks.push(SourceTask {
                platform,
                adapter,
                config: config.clone(),
                strategy: strategy.clone(),
                limiter: self.limiters.limiter_for(platform, config.rate_limit_period()),
                settings: Arc::clone(&settings),
                normalizer: self.normalizer,
                cancel: run_token.child_token(),
            });
        }

        let expected = tasks.len();
        info!(
            target: "orchestrator",
            sources = expected,
            unavailable = metrics.len() - expected,
            deadline_ms = settings.run_deadline().as_millis() as u64,
            "run started"
        );

        let permits = Arc::new(Semaphore::new(
            settings.max_concurrency.max(1).min(expected.max(1)),
        ));
        let (tx, mut rx) = mpsc::channel::<SourceOutcome>(expected.max(1));
        for task in tasks {
            let permits = Arc::clone(&permits);
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = task.cancel.cancelled() => return,
                    p = permits.acquire_owned() => match p {
                        Ok(p) => p,
                        Err(_) => return,
                    },
                };
                let outcome = task.run().await;
                // receiver is gone once the run returned
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut outcomes: HashMap<Platform, SourceOutcome> = HashMap::new();
        let mut timed_out = false;
        let mut cancelled = false;
        let mut returned_early = false;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        while outcomes.len() < expected {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = &mut sleep => {
                    timed_out = true;
                    break;
                }
                msg = rx.recv() => {
                    let Some(outcome) = msg else { break };
                    debug!(
                        target: "orchestrator",
                        platform = %outcome.platform,
                        records = outcome.records.len(),
                        errors = outcome.error_count,
                        "source reported"
                    );
                    outcomes.insert(outcome.platform, outcome);
                    if settings.fail_fast
                        && outcomes.len() < expected
                        && self.usable_sources(&outcomes) >= settings.min_sources
                    {
                        returned_early = true;
                        break;
                    }
                }
            }
        }

        if returned_early {
            // stragglers keep running until the deadline
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => token.cancel(),
                }
            });
            info!(target: "orchestrator", reported = outcomes.len(), expected, "minimum sources met, returning early");
        } else {
            run_token.cancel();
        }
        if timed_out {
            let err = LeadError::RunTimeoutExceeded { elapsed: started.elapsed() };
            warn!(target: "orchestrator", pending = expected - outcomes.len(), error = %err, "run deadline hit");
        }
        if cancelled {
            info!(target: "orchestrator", pending = expected - outcomes.len(), "run cancelled by caller");
        }

        self.assemble(active, outcomes, metrics, sources, icp, started, timed_out, cancelled)
    }

    fn usable_sources(&self, outcomes: &HashMap<Platform, SourceOutcome>) -> usize {
        outcomes
            .values()
            .filter(|o| o.records.iter().any(|r| self.normalizer.is_usable(o.platform, r)))
            .count()
    }

    /// Normalize, score, deduplicate and rescore what arrived; fill metrics.
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        mut active: Vec<&SourceConfig>,
        mut outcomes: HashMap<Platform, SourceOutcome>,
        mut metrics: BTreeMap<Platform, SourceMetrics>,
        sources: &[SourceConfig],
        icp: &Icp,
        started: Instant,
        timed_out: bool,
        cancelled: bool,
    ) -> Result<MultiSourceResult, LeadError> {
        active.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.platform.cmp(&b.platform))
        });

        let mut raw: Vec<Prospect> = Vec::new();
        let mut next_index = 0usize;
        for config in active {
            let platform = config.platform;
            let Some(outcome) = outcomes.remove(&platform) else {
                continue;
            };
            let batch = self
                .normalizer
                .normalize_batch(platform, &outcome.records, next_index);
            next_index += batch.prospects.len();

            let m = metrics
                .entry(platform)
                .or_insert_with(|| SourceMetrics::pending(platform));
            m.total_queries = outcome.total_queries;
            m.successful_queries = outcome.successful_queries;
            m.used_fallback = outcome.used_fallback;
            m.results_returned = outcome.records.len();
            m.normalized_records = batch.prospects.len();
            m.data_quality_failures = batch.data_quality_failures + outcome.malformed + outcome.discarded;
            m.duplicate_records = batch.duplicate_records;
            m.error_count = outcome.error_count;
            m.retries = outcome.retries;
            m.latency_ms = outcome.latency.as_millis() as u64;
            m.mean_latency_ms = if outcome.calls > 0 {
                outcome.latency.as_secs_f64() * 1000.0 / outcome.calls as f64
            } else {
                0.0
            };
            m.last_error = outcome
                .last_error
                .as_ref()
                .or(batch.last_error.as_ref())
                .map(ToString::to_string);
            m.status = match (m.normalized_records > 0, outcome.unrecovered) {
                (true, false) => SourceStatus::Succeeded,
                (true, true) => SourceStatus::Degraded,
                (false, true) => SourceStatus::Failed,
                (false, false) => SourceStatus::Empty,
            };
            m.last_updated = Utc::now();
            raw.extend(batch.prospects);
        }

        let now = Utc::now();
        for p in raw.iter_mut() {
            self.scorer.apply_at(p, icp, now);
        }
        let priorities = SourcePriorities::from_configs(sources);
        let mut prospects = self.dedup.deduplicate_with(raw, &priorities);
        for p in prospects.iter_mut() {
            self.scorer.apply_at(p, icp, now);
        }
        prospects.retain(|p| self.scorer.passes(p));
        prospects.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.discovery_index().cmp(&b.discovery_index()))
        });

        let mut included: BTreeMap<Platform, (usize, f32)> = BTreeMap::new();
        for p in &prospects {
            for s in &p.sources {
                let e = included.entry(s.platform).or_default();
                e.0 += 1;
                e.1 += p.relevance_score;
            }
        }
        for (platform, (n, sum)) in included {
            if let Some(m) = metrics.get_mut(&platform) {
                m.included_after_scoring = n;
                m.average_relevance_score = if n > 0 { sum / n as f32 } else { 0.0 };
            }
        }

        let mut successful_sources = Vec::new();
        let mut failed_sources = Vec::new();
        let mut pending_sources = Vec::new();
        let mut unavailable_sources = Vec::new();
        for m in metrics.values() {
            counter!(
                "leads_source_runs_total",
                "platform" => m.platform.as_str(),
                "status" => m.status.as_str()
            )
            .increment(1);
            match m.status {
                SourceStatus::Failed => failed_sources.push(m.platform),
                SourceStatus::Pending => pending_sources.push(m.platform),
                SourceStatus::Unavailable => unavailable_sources.push(m.platform),
                _ => successful_sources.push(m.platform),
            }
        }

        let execution_time = started.elapsed();
        histogram!("leads_run_duration_ms").record(execution_time.as_secs_f64() * 1000.0);
        gauge!("leads_last_run_ts").set(Utc::now().timestamp() as f64);

        let usable = metrics.values().filter(|m| m.normalized_records > 0).count();
        let required = self.cfg.min_sources;
        if usable < required {
            let err = LeadError::InsufficientSources {
                required,
                succeeded: usable,
            };
            warn!(target: "orchestrator", failed = failed_sources.len(), pending = pending_sources.len(), error = %err, "run failed");
            return Err(err);
        }

        info!(
            target: "orchestrator",
            prospects = prospects.len(),
            succeeded = successful_sources.len(),
            failed = failed_sources.len(),
            pending = pending_sources.len(),
            unavailable = unavailable_sources.len(),
            timed_out,
            cancelled,
            elapsed_ms = execution_time.as_millis() as u64,
            "run finished"
        );

        Ok(MultiSourceResult {
            prospects,
            source_metrics: metrics,
            execution_time,
            successful_sources,
            failed_sources,
            pending_sources,
            unavailable_sources,
            timed_out,
            cancelled,
        })
    }
}
