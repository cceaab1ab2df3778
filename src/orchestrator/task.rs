// src/orchestrator/task.rs
//! One task per source: authenticate, run the primary queries, fall back
//! when the yield is poor, report what came back.

use chrono::Utc;
use metrics::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::rate_limit::{self, DirectLimiter};
use super::retry::backoff_delay;
use super::OrchestratorConfig;
use crate::error::LeadError;
use crate::normalize::Normalizer;
use crate::platform::Platform;
use crate::source::{AdapterError, DynAdapter, RawRecord, SearchStrategy, SourceConfig};

/// Everything a source task reports back to the run loop.
#[derive(Debug)]
pub(crate) struct SourceOutcome {
    pub platform: Platform,
    pub records: Vec<RawRecord>,
    pub total_queries: u32,
    pub successful_queries: u32,
    pub used_fallback: bool,
    pub error_count: u32,
    pub retries: u32,
    /// Queries answered with a malformed payload.
    pub malformed: usize,
    /// Unusable primary records dropped before the fallback ran.
    pub discarded: usize,
    pub calls: u32,
    pub latency: Duration,
    pub last_error: Option<LeadError>,
    /// Some query (or authentication) failed for good.
    pub unrecovered: bool,
    pub cancelled: bool,
}

impl SourceOutcome {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            records: Vec::new(),
            total_queries: 0,
            successful_queries: 0,
            used_fallback: false,
            error_count: 0,
            retries: 0,
            malformed: 0,
            discarded: 0,
            calls: 0,
            latency: Duration::ZERO,
            last_error: None,
            unrecovered: false,
            cancelled: false,
        }
    }

    fn note_call(&mut self, elapsed: Duration) {
        self.calls += 1;
        self.latency += elapsed;
        histogram!("leads_source_latency_ms", "platform" => self.platform.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);
    }

    fn note_error(&mut self, err: &CallError) {
        self.error_count += 1;
        counter!(
            "leads_adapter_errors_total",
            "platform" => self.platform.as_str(),
            "kind" => err.kind()
        )
        .increment(1);
    }

    fn give_up(&mut self, err: LeadError) {
        self.unrecovered = true;
        self.last_error = Some(err);
    }
}

#[derive(Debug)]
enum CallError {
    Adapter(AdapterError),
    Timeout(Duration),
    Cancelled,
}

impl CallError {
    fn kind(&self) -> &'static str {
        match self {
            CallError::Adapter(AdapterError::AuthFailed(_)) => "auth",
            CallError::Adapter(AdapterError::RateLimited { .. }) => "rate_limited",
            CallError::Adapter(AdapterError::Unavailable(_)) => "unavailable",
            CallError::Adapter(AdapterError::Malformed(_)) => "data_quality",
            CallError::Timeout(_) => "timeout",
            CallError::Cancelled => "cancelled",
        }
    }

    fn to_lead_error(&self, platform: Platform) -> LeadError {
        match self {
            CallError::Adapter(e) => LeadError::from_adapter(platform, e.clone()),
            CallError::Timeout(d) => LeadError::AdapterUnavailable {
                platform,
                message: format!("call timed out after {}ms", d.as_millis()),
            },
            CallError::Cancelled => LeadError::AdapterUnavailable {
                platform,
                message: "cancelled".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Authenticate,
    Search,
}

pub(crate) struct SourceTask {
    pub platform: Platform,
    pub adapter: DynAdapter,
    pub config: SourceConfig,
    pub strategy: SearchStrategy,
    pub limiter: Option<Arc<DirectLimiter>>,
    pub settings: Arc<OrchestratorConfig>,
    pub normalizer: Normalizer,
    pub cancel: CancellationToken,
}

impl SourceTask {
    pub async fn run(self) -> SourceOutcome {
        let mut out = SourceOutcome::new(self.platform);

        match self
            .with_retry(Op::Authenticate, &mut out, || self.adapter.authenticate())
            .await
        {
            Ok(()) => {}
            Err(CallError::Cancelled) => {
                out.cancelled = true;
                return out;
            }
            Err(e) => {
                let err = e.to_lead_error(self.platform);
                warn!(target: "orchestrator", platform = %self.platform, error = %err, "authentication failed");
                out.give_up(err);
                return out;
            }
        }

        let limit = self.strategy.result_limit.min(self.config.max_results);
        let cap = self.settings.max_queries_per_source.max(1);

        let primary: Vec<&str> = self
            .strategy
            .primary_queries
            .iter()
            .take(cap)
            .map(String::as_str)
            .collect();
        self.run_queries(&primary, limit, &mut out).await;

        if !out.cancelled && !self.strategy.fallback_queries.is_empty() && self.needs_fallback(&out.records) {
            let before = out.records.len();
            let (platform, normalizer) = (self.platform, self.normalizer);
            out.records.retain(|r| normalizer.is_usable(platform, r));
            out.discarded += before - out.records.len();
            out.used_fallback = true;
            debug!(target: "orchestrator", platform = %self.platform, kept = out.records.len(), "running fallback queries");

            let fallback: Vec<&str> = self
                .strategy
                .fallback_queries
                .iter()
                .take(cap)
                .map(String::as_str)
                .collect();
            self.run_queries(&fallback, limit, &mut out).await;
        }

        out.records.truncate(limit);
        out
    }

    /// Empty yield, or too few records that would survive normalization.
    fn needs_fallback(&self, records: &[RawRecord]) -> bool {
        if records.is_empty() {
            return true;
        }
        let usable = records
            .iter()
            .filter(|r| self.normalizer.is_usable(self.platform, r))
            .count();
        usable == 0 || (usable as f32 / records.len() as f32) < self.strategy.quality_threshold
    }

    async fn run_queries(&self, queries: &[&str], limit: usize, out: &mut SourceOutcome) {
        for &q in queries {
            if out.records.len() >= limit {
                break;
            }
            out.total_queries += 1;
            let filters = &self.strategy.filters;
            match self
                .with_retry(Op::Search, out, || self.adapter.search(q, filters))
                .await
            {
                Ok(records) => {
                    debug!(target: "orchestrator", platform = %self.platform, query = q, n = records.len(), "query done");
                    out.successful_queries += 1;
                    out.records.extend(records);
                }
                Err(CallError::Cancelled) => {
                    out.cancelled = true;
                    return;
                }
                Err(e) => {
                    if matches!(e, CallError::Adapter(AdapterError::Malformed(_))) {
                        out.malformed += 1;
                    }
                    let err = e.to_lead_error(self.platform);
                    warn!(target: "orchestrator", platform = %self.platform, query = q, error = %err, "query failed");
                    out.give_up(err);
                }
            }
        }
    }

    /// Token, optional reset wait, then the call under a timeout. Transient
    /// failures back off up to `max_attempts`; auth failures get
    /// `auth_retries` extra attempts after re-authenticating.
    async fn with_retry<T, F, Fut>(&self, op: Op, out: &mut SourceOutcome, mut call: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let s = &self.settings;
        let max_attempts = s.max_attempts.max(1);
        let mut attempt = 0u32;
        let mut auth_left = s.auth_retries;

        loop {
            if op == Op::Search {
                self.pace().await?;
            }
            let started = Instant::now();
            let res = self.guarded(call()).await;
            if !matches!(res, Err(CallError::Cancelled)) {
                out.note_call(started.elapsed());
            }
            let err = match res {
                Ok(v) => return Ok(v),
                Err(CallError::Cancelled) => return Err(CallError::Cancelled),
                Err(e) => e,
            };
            out.note_error(&err);
            out.last_error = Some(err.to_lead_error(self.platform));
            attempt += 1;

            let delay = match &err {
                CallError::Adapter(AdapterError::AuthFailed(_)) if auth_left > 0 => {
                    auth_left -= 1;
                    if op == Op::Search {
                        self.reauthenticate(out).await?;
                    }
                    Some(Duration::ZERO)
                }
                CallError::Adapter(e) if e.is_transient() && attempt < max_attempts => {
                    let retry_after = match e {
                        AdapterError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    Some(backoff_delay(attempt - 1, s.backoff_base(), s.backoff_max(), retry_after))
                }
                CallError::Timeout(_) if attempt < max_attempts => {
                    Some(backoff_delay(attempt - 1, s.backoff_base(), s.backoff_max(), None))
                }
                _ => None,
            };

            let Some(delay) = delay else {
                return Err(err);
            };
            out.retries += 1;
            counter!("leads_retries_total", "platform" => self.platform.as_str()).increment(1);
            debug!(
                target: "orchestrator",
                platform = %self.platform,
                kind = err.kind(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying"
            );
            if !delay.is_zero() {
                self.sleep(delay).await?;
            }
        }
    }

    async fn reauthenticate(&self, out: &mut SourceOutcome) -> Result<(), CallError> {
        let started = Instant::now();
        let res = self.guarded(self.adapter.authenticate()).await;
        if let Err(CallError::Cancelled) = res {
            return Err(CallError::Cancelled);
        }
        out.note_call(started.elapsed());
        if let Err(e) = &res {
            out.note_error(e);
        }
        res
    }

    /// Rate-limit token, then the adapter's own reset hint (bounded by the
    /// call timeout).
    async fn pace(&self) -> Result<(), CallError> {
        if let Some(limiter) = &self.limiter {
            if !rate_limit::acquire(limiter, &self.cancel).await {
                return Err(CallError::Cancelled);
            }
        }
        if let Some(wait) = self.adapter.rate_limit_info().wait_hint(Utc::now()) {
            let wait = wait.min(self.settings.call_timeout());
            debug!(target: "orchestrator", platform = %self.platform, wait_ms = wait.as_millis() as u64, "waiting for platform reset");
            self.sleep(wait).await?;
        }
        Ok(())
    }

    async fn guarded<T>(&self, fut: impl Future<Output = Result<T, AdapterError>>) -> Result<T, CallError> {
        let timeout = self.settings.call_timeout();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            res = tokio::time::timeout(timeout, fut) => match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(CallError::Adapter(e)),
                Err(_) => Err(CallError::Timeout(timeout)),
            },
        }
    }

    async fn sleep(&self, d: Duration) -> Result<(), CallError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CallError::Cancelled),
            _ = tokio::time::sleep(d) => Ok(()),
        }
    }
}
