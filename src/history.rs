//! history.rs — výkonnostní historie zdrojů mezi běhy (explicitní hodnota, žádný singleton).
//!
//! Each run feeds back one sample per platform: the share of its normalized
//! records that made it into the final list. The selector turns a recent
//! shortfall against `floor` into a smooth downward multiplier.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::orchestrator::{SourceMetrics, SourceStatus};
use crate::platform::Platform;

pub const DEFAULT_WINDOW: usize = 10;
pub const DEFAULT_DECAY: f32 = 0.7;
pub const DEFAULT_FLOOR: f32 = 0.2;

/// Lowest multiplier a platform can be pushed down to.
pub const MIN_MULTIPLIER: f32 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHistory {
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_decay")]
    pub decay: f32,
    #[serde(default = "default_floor")]
    pub floor: f32,
    /// Oldest first.
    #[serde(default)]
    samples: BTreeMap<Platform, VecDeque<f32>>,
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn default_decay() -> f32 {
    DEFAULT_DECAY
}

fn default_floor() -> f32 {
    DEFAULT_FLOOR
}

impl Default for PerformanceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_DECAY, DEFAULT_FLOOR)
    }
}

impl PerformanceHistory {
    pub fn new(window: usize, decay: f32, floor: f32) -> Self {
        Self {
            window: window.max(1),
            decay: decay.clamp(0.0, 1.0),
            floor: floor.clamp(0.0, 1.0),
            samples: BTreeMap::new(),
        }
    }

    /// Push one inclusion ratio for a platform, evicting beyond the window.
    pub fn record_sample(&mut self, platform: Platform, ratio: f32) {
        let q = self.samples.entry(platform).or_default();
        q.push_back(if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 });
        while q.len() > self.window {
            q.pop_front();
        }
    }

    /// Fold a finished run's metrics in. Sources still pending, or never
    /// attempted for lack of an adapter, carry no signal and are skipped.
    pub fn record_run<'a, I>(&mut self, metrics: I)
    where
        I: IntoIterator<Item = &'a SourceMetrics>,
    {
        for m in metrics {
            let ratio = match m.status {
                SourceStatus::Pending | SourceStatus::Unavailable => continue,
                SourceStatus::Failed => 0.0,
                _ if m.normalized_records == 0 => 0.0,
                _ => m.included_after_scoring as f32 / m.normalized_records as f32,
            };
            self.record_sample(m.platform, ratio);
        }
    }

    pub fn samples(&self, platform: Platform) -> Vec<f32> {
        self.samples
            .get(&platform)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Exponentially weighted mean, newest sample weighs 1.
    pub fn ewma(&self, platform: Platform) -> Option<f32> {
        let q = self.samples.get(&platform)?;
        if q.is_empty() {
            return None;
        }
        let mut num = 0.0f32;
        let mut den = 0.0f32;
        let mut w = 1.0f32;
        for s in q.iter().rev() {
            num += w * s;
            den += w;
            w *= self.decay;
        }
        Some(num / den.max(1e-6))
    }

    /// Weight multiplier in `[MIN_MULTIPLIER, 1]`; 1 without history.
    pub fn multiplier(&self, platform: Platform) -> f32 {
        let Some(ewma) = self.ewma(platform) else {
            return 1.0;
        };
        if self.floor <= 0.0 {
            return 1.0;
        }
        let shortfall = ((self.floor - ewma).max(0.0) / self.floor).min(1.0);
        (-(4.0f32).ln() * shortfall).exp().clamp(MIN_MULTIPLIER, 1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.values().all(VecDeque::is_empty)
    }
}
