// src/engine.rs
//! # Lead Engine
//! Wires Source Selector → Orchestrator for one ICP and feeds the outcome
//! back into the caller's [`PerformanceHistory`].
//!
//! The history is passed in and out explicitly; the engine itself keeps no
//! state between runs apart from the orchestrator's token buckets.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{self, EngineConfig};
use crate::dedup::DedupEngine;
use crate::error::LeadError;
use crate::history::PerformanceHistory;
use crate::icp::Icp;
use crate::orchestrator::{MultiSourceResult, Orchestrator};
use crate::platform::Platform;
use crate::scoring::Scorer;
use crate::selector::SourceSelector;
use crate::source::{AdapterRegistry, SearchStrategy, SourceConfig};

/// Per-run adjustments on top of the engine configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub disabled_sources: BTreeSet<Platform>,
    /// Caps (never extends) the configured run deadline.
    pub max_run_time: Option<Duration>,
    pub min_sources: Option<usize>,
    pub fail_fast: Option<bool>,
}

impl RunOverrides {
    pub fn disable(mut self, platform: Platform) -> Self {
        self.disabled_sources.insert(platform);
        self
    }

    pub fn with_max_run_time(mut self, d: Duration) -> Self {
        self.max_run_time = Some(d);
        self
    }

    pub fn with_min_sources(mut self, n: usize) -> Self {
        self.min_sources = Some(n);
        self
    }

    pub fn with_fail_fast(mut self, on: bool) -> Self {
        self.fail_fast = Some(on);
        self
    }
}

pub struct LeadEngine {
    cfg: EngineConfig,
    selector: SourceSelector,
    orchestrator: Orchestrator,
    registry: AdapterRegistry,
}

impl LeadEngine {
    pub fn new(cfg: EngineConfig, registry: AdapterRegistry) -> Self {
        let orchestrator = Orchestrator::new(cfg.orchestrator.clone())
            .with_scorer(Scorer::new(cfg.scoring.clone()))
            .with_dedup(DedupEngine::new(cfg.dedup.clone()));
        Self {
            selector: SourceSelector::new(cfg.selector.clone()).with_overrides(cfg.sources.clone()),
            orchestrator,
            registry,
            cfg,
        }
    }

    /// Engine configured from `config::load_default()`.
    pub fn from_default_config(registry: AdapterRegistry) -> anyhow::Result<Self> {
        Ok(Self::new(config::load_default()?, registry))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn selector(&self) -> &SourceSelector {
        &self.selector
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Sources and strategies a run would use, overrides applied. Platforms
    /// without a registered adapter are listed disabled.
    pub fn plan(
        &self,
        icp: &Icp,
        overrides: &RunOverrides,
        history: &PerformanceHistory,
    ) -> (Vec<SourceConfig>, BTreeMap<Platform, SearchStrategy>) {
        let mut sources = self
            .selector
            .select_available(icp, history, |p| self.registry.contains(p));
        for s in sources.iter_mut() {
            if overrides.disabled_sources.contains(&s.platform) {
                s.enabled = false;
            }
        }
        let strategies = self.selector.strategies_for(&sources, icp);
        (sources, strategies)
    }

    pub async fn run_orchestration(
        &self,
        icp: &Icp,
        overrides: &RunOverrides,
        history: &mut PerformanceHistory,
    ) -> Result<MultiSourceResult, LeadError> {
        self.run_orchestration_with_cancel(icp, overrides, history, &CancellationToken::new())
            .await
    }

    pub async fn run_orchestration_with_cancel(
        &self,
        icp: &Icp,
        overrides: &RunOverrides,
        history: &mut PerformanceHistory,
        cancel: &CancellationToken,
    ) -> Result<MultiSourceResult, LeadError> {
        let (sources, strategies) = self.plan(icp, overrides, history);

        let mut run_cfg = self.cfg.orchestrator.clone();
        if let Some(d) = overrides.max_run_time {
            run_cfg.run_deadline_secs = run_cfg.run_deadline_secs.min(d.as_secs_f64());
        }
        if let Some(n) = overrides.min_sources {
            run_cfg.min_sources = n;
        }
        if let Some(f) = overrides.fail_fast {
            run_cfg.fail_fast = f;
        }
        let orchestrator = self.orchestrator.reconfigured(run_cfg);

        info!(
            target: "engine",
            enabled = sources.iter().filter(|s| s.enabled).count(),
            overridden = overrides.disabled_sources.len(),
            "starting orchestration"
        );
        match orchestrator
            .run_with_cancel(&sources, &strategies, &self.registry, icp, cancel)
            .await
        {
            Ok(result) => {
                history.record_run(result.source_metrics.values());
                Ok(result)
            }
            Err(e) => {
                warn!(target: "engine", error = %e, "orchestration failed");
                Err(e)
            }
        }
    }
}
