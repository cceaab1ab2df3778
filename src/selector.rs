//! # Source Selector
//!
//! Maps an [`Icp`] to a prioritized, bounded list of [`SourceConfig`]s and one
//! [`SearchStrategy`] per chosen platform.
//!
//! Scoring is table driven: every ICP attribute that hits a table adds a fixed
//! amount to the platforms listed for it, Google Search gets a baseline, and
//! the raw score is scaled by the caller-supplied [`PerformanceHistory`].
//! Ties are resolved by the fixed [`Platform`] declaration order, so the same
//! ICP and history always select the same sources.
//!
//! Per-platform [`SourceOverride`]s from the engine config are laid over the
//! built-in defaults before the cap is applied. Platforms the caller cannot
//! run (no adapter) never take one of the `max_sources` slots.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::history::PerformanceHistory;
use crate::icp::{Icp, SizeBand};
use crate::platform::Platform;
use crate::source::{default_config, fallback_sources, SearchStrategy, SourceConfig, SourceOverride};

pub const DEFAULT_MIN_WEIGHT: f32 = 0.25;
pub const DEFAULT_MAX_SOURCES: usize = 8;

const INDUSTRY_HIT: f32 = 3.0;
const ROLE_HIT: f32 = 2.0;
const SIZE_HIT: f32 = 1.0;
const GOOGLE_BASELINE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Normalised weight a platform needs to be enabled, [0,1].
    pub min_weight: f32,
    pub max_sources: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_weight: DEFAULT_MIN_WEIGHT,
            max_sources: DEFAULT_MAX_SOURCES,
        }
    }
}

fn industry_platforms(industry: &str) -> &'static [Platform] {
    use Platform::*;
    match industry {
        "technology" => &[Github, StackOverflow, HackerNews, Twitter, ProductHunt],
        "software" => &[Github, StackOverflow, Twitter, ProductHunt, HackerNews],
        "saas" => &[Twitter, ProductHunt, Crunchbase, HackerNews, Github],
        "ecommerce" => &[Twitter, Reddit, Youtube, Crunchbase],
        "healthcare" => &[Twitter, Medium, Eventbrite, Meetup],
        "finance" => &[Twitter, Medium, HackerNews, Crunchbase],
        "marketing" => &[Twitter, Medium, Youtube, ProductHunt],
        "consulting" => &[Twitter, Medium, Eventbrite, Meetup],
        _ => &[],
    }
}

const ROLE_TABLE: &[(&str, &[Platform])] = {
    use Platform::*;
    &[
        ("developer", &[Github, StackOverflow, HackerNews, Twitter]),
        ("engineer", &[Github, StackOverflow, Twitter, HackerNews]),
        ("founder", &[Twitter, Crunchbase, ProductHunt, HackerNews]),
        ("cto", &[Twitter, Github, HackerNews, StackOverflow]),
        ("marketing", &[Twitter, Medium, Youtube, ProductHunt]),
        ("sales", &[Twitter, Crunchbase, Eventbrite, Meetup]),
    ]
};

fn size_platforms(band: SizeBand) -> &'static [Platform] {
    use Platform::*;
    match band {
        SizeBand::Startup => &[Crunchbase, Angellist, ProductHunt, HackerNews, Twitter],
        SizeBand::Small => &[Twitter, Meetup, Eventbrite, Crunchbase],
        SizeBand::Enterprise => &[Twitter, Eventbrite, Crunchbase, JobBoards],
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceSelector {
    cfg: SelectorConfig,
    overrides: BTreeMap<Platform, SourceOverride>,
}

impl SourceSelector {
    pub fn new(cfg: SelectorConfig) -> Self {
        Self {
            cfg,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: BTreeMap<Platform, SourceOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.cfg
    }

    /// Default config for a platform with its operator override applied.
    /// `priority` stands in for the table priority unless the override pins one.
    pub fn configured(&self, platform: Platform, priority: Option<u8>) -> SourceConfig {
        let mut cfg = default_config(platform);
        if let Some(p) = priority {
            cfg.priority = p.clamp(1, 10);
        }
        match self.overrides.get(&platform) {
            Some(o) => o.apply(cfg),
            None => cfg,
        }
    }

    /// Raw table score per platform before history is applied. Empty when no
    /// ICP attribute maps to any table.
    pub fn table_scores(icp: &Icp) -> BTreeMap<Platform, f32> {
        let mut scores: BTreeMap<Platform, f32> = BTreeMap::new();

        if let Some(industry) = icp.industry_key() {
            for p in industry_platforms(&industry) {
                *scores.entry(*p).or_default() += INDUSTRY_HIT;
            }
        }
        for role in icp.role_keys() {
            for (key, platforms) in ROLE_TABLE {
                if role.contains(key) {
                    for p in *platforms {
                        *scores.entry(*p).or_default() += ROLE_HIT;
                    }
                }
            }
        }
        if let Some(band) = icp.size_band() {
            for p in size_platforms(band) {
                *scores.entry(*p).or_default() += SIZE_HIT;
            }
        }
        scores
    }

    /// Ordered source list for one run. Enabled sources come first (at most
    /// `max_sources`), then scored platforms under `min_weight` as disabled.
    pub fn select(&self, icp: &Icp, history: &PerformanceHistory) -> Vec<SourceConfig> {
        self.select_available(icp, history, |_| true)
    }

    /// Like [`select`](Self::select), but platforms for which `available`
    /// says no are listed disabled and never count against `max_sources`.
    pub fn select_available<F>(
        &self,
        icp: &Icp,
        history: &PerformanceHistory,
        available: F,
    ) -> Vec<SourceConfig>
    where
        F: Fn(Platform) -> bool,
    {
        let mut scores = Self::table_scores(icp);
        if scores.is_empty() {
            info!(target: "selector", "no mappable ICP attribute, using default source set");
            return fallback_sources()
                .into_iter()
                .map(|c| {
                    let cfg = self.configured(c.platform, None);
                    if available(cfg.platform) { cfg } else { cfg.disabled() }
                })
                .collect();
        }
        *scores.entry(Platform::GoogleSearch).or_default() += GOOGLE_BASELINE;

        let mut ranked: Vec<(Platform, f32)> = scores
            .into_iter()
            .map(|(p, s)| (p, s * history.multiplier(p)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let top = ranked.first().map(|(_, s)| *s).unwrap_or(0.0).max(f32::EPSILON);
        let mut enabled = Vec::new();
        let mut disabled = Vec::new();
        for (platform, score) in ranked {
            let weight = (score / top).clamp(0.0, 1.0);
            let priority = 1 + (9.0 * weight).round() as u8;
            let cfg = self.configured(platform, Some(priority));
            let forced = self.overrides.get(&platform).and_then(|o| o.enabled) == Some(true);
            if !cfg.enabled {
                debug!(target: "selector", platform = %platform, "disabled by source config");
                disabled.push(cfg);
            } else if !available(platform) {
                debug!(target: "selector", platform = %platform, "no adapter, not selected");
                disabled.push(cfg.disabled());
            } else if weight >= self.cfg.min_weight || forced {
                if enabled.len() < self.cfg.max_sources {
                    enabled.push(cfg);
                } else {
                    debug!(target: "selector", platform = %platform, "over source cap, dropped");
                }
            } else {
                disabled.push(cfg.disabled());
            }
        }

        debug!(
            target: "selector",
            enabled = enabled.len(),
            disabled = disabled.len(),
            top = ?enabled.first().map(|c| c.platform),
            "sources selected"
        );
        enabled.extend(disabled);
        enabled
    }

    /// One strategy per listed source (disabled ones included, they are cheap).
    pub fn strategies_for(
        &self,
        sources: &[SourceConfig],
        icp: &Icp,
    ) -> BTreeMap<Platform, SearchStrategy> {
        let terms = Terms::from_icp(icp);
        sources
            .iter()
            .map(|s| {
                let mut strategy = strategy_for(s.platform, &terms);
                let mut filters = s.search_parameters.clone();
                filters.extend(std::mem::take(&mut strategy.filters));
                strategy.filters = filters;
                strategy.result_limit = s.max_results.max(1);
                (s.platform, strategy)
            })
            .collect()
    }
}

struct Terms {
    industry: Vec<String>,
    role: Vec<String>,
    company: Vec<String>,
    descriptors: Vec<String>,
}

impl Terms {
    fn from_icp(icp: &Icp) -> Self {
        Self {
            industry: icp.industry_terms(),
            role: icp.role_terms(),
            company: icp.company_terms(),
            descriptors: icp
                .descriptors
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    fn industry_and_roles(&self) -> Vec<String> {
        self.industry.iter().chain(&self.role).cloned().collect()
    }
}

fn strategy_for(platform: Platform, t: &Terms) -> SearchStrategy {
    let limit = default_config(platform).max_results;
    let (primary, fallback, filters): (Vec<String>, Vec<String>, Value) = match platform {
        Platform::Twitter => {
            let mut q = Vec::new();
            for role in t.role.iter().take(3) {
                for industry in t.industry.iter().take(2) {
                    q.push(format!("{role} {industry}"));
                }
            }
            (q, t.industry_and_roles(), json!({ "verified": true, "min_followers": 100 }))
        }
        Platform::Github => {
            let q = t
                .industry
                .iter()
                .flat_map(|i| [format!("language:{i}"), format!("topic:{i}")])
                .collect();
            (q, t.role.clone(), json!({ "sort": "stars", "order": "desc" }))
        }
        Platform::Reddit => {
            let q = t
                .industry_and_roles()
                .iter()
                .map(|s| format!("subreddit:{s}"))
                .collect();
            (q, t.industry.clone(), json!({ "sort": "hot", "time": "month" }))
        }
        Platform::StackOverflow => {
            let q = t.industry.iter().map(|i| format!("[{i}]")).collect();
            (q, t.role.clone(), json!({ "sort": "votes", "min_reputation": 1000 }))
        }
        Platform::ProductHunt => (t.industry.clone(), t.role.clone(), json!({ "featured": true })),
        Platform::Crunchbase => {
            let mut q = Vec::new();
            for industry in &t.industry {
                for size in &t.company {
                    q.push(format!("{industry} {size}"));
                }
            }
            (
                q,
                t.industry.clone(),
                json!({ "funding_stage": "seed,series-a,series-b" }),
            )
        }
        Platform::GoogleSearch => {
            let mut q = Vec::new();
            for role in t.role.iter().take(2) {
                for industry in t.industry.iter().take(2) {
                    q.push(format!("\"{role}\" \"{industry}\" site:linkedin.com"));
                }
            }
            let fb = t
                .industry_and_roles()
                .iter()
                .map(|s| format!("\"{s}\" site:linkedin.com"))
                .collect();
            (q, fb, json!({}))
        }
        Platform::Linkedin => {
            let mut q = Vec::new();
            for role in t.role.iter().take(3) {
                for industry in t.industry.iter().take(2) {
                    q.push(format!("title:\"{role}\" industry:\"{industry}\""));
                }
            }
            (q, t.role.clone(), json!({}))
        }
        _ => (t.industry_and_roles(), t.industry.clone(), json!({})),
    };

    let mut primary = dedup_queries(primary);
    let mut fallback = dedup_queries(fallback);
    if primary.is_empty() {
        // žádný šablonový dotaz → použij cokoli, co ICP nabízí
        primary = dedup_queries(t.industry_and_roles().into_iter().chain(t.descriptors.clone()).collect());
    }
    if fallback.is_empty() {
        fallback = t.descriptors.clone();
    }

    let mut s = SearchStrategy::new(primary)
        .with_fallback(fallback)
        .with_result_limit(limit);
    if let Value::Object(m) = filters {
        s.filters = m;
    }
    s
}

fn dedup_queries(queries: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(queries.len());
    for q in queries {
        let q = q.trim().to_string();
        if !q.is_empty() && !out.contains(&q) {
            out.push(q);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tech_dev() -> Icp {
        Icp::new("technology").with_roles(["developer"])
    }

    #[test]
    fn priorities_follow_normalised_weights() {
        let sel = SourceSelector::default();
        let out = sel.select(&tech_dev(), &PerformanceHistory::default());
        let prio: BTreeMap<Platform, u8> = out.iter().map(|c| (c.platform, c.priority)).collect();

        assert_eq!(prio[&Platform::Github], 10);
        assert_eq!(prio[&Platform::StackOverflow], 10);
        assert_eq!(prio[&Platform::ProductHunt], 6);
        assert_eq!(prio[&Platform::GoogleSearch], 5);
        // tie at the top resolved by platform order
        assert_eq!(out[0].platform, Platform::Github);
        assert_eq!(out[1].platform, Platform::StackOverflow);
    }

    #[test]
    fn role_match_is_substring() {
        let icp = Icp::default().with_roles(["Co-Founder"]);
        let scores = SourceSelector::table_scores(&icp);
        assert_eq!(scores.get(&Platform::Crunchbase), Some(&ROLE_HIT));
    }

    #[test]
    fn cap_drops_overflow_and_threshold_disables() {
        let sel = SourceSelector::new(SelectorConfig {
            min_weight: 0.5,
            max_sources: 2,
        });
        let out = sel.select(&tech_dev(), &PerformanceHistory::default());
        let enabled: Vec<_> = out.iter().filter(|c| c.enabled).map(|c| c.platform).collect();
        assert_eq!(enabled, vec![Platform::Github, Platform::StackOverflow]);
        // google (weight 0.4) is under the threshold, so listed but disabled
        assert!(out.iter().any(|c| c.platform == Platform::GoogleSearch && !c.enabled));
        // hacker news is above the threshold but over the cap: dropped
        assert!(!out.iter().any(|c| c.platform == Platform::HackerNews));
    }

    #[test]
    fn unavailable_platforms_leave_cap_to_runnable_ones() {
        let sel = SourceSelector::new(SelectorConfig {
            min_weight: 0.25,
            max_sources: 2,
        });
        let runnable = [Platform::HackerNews, Platform::GoogleSearch];
        let out = sel.select_available(&tech_dev(), &PerformanceHistory::default(), |p| runnable.contains(&p));
        let enabled: Vec<_> = out.iter().filter(|c| c.enabled).map(|c| c.platform).collect();
        assert_eq!(enabled, vec![Platform::HackerNews, Platform::GoogleSearch]);
        // higher scored but unrunnable platforms stay listed, disabled
        let gh = out.iter().find(|c| c.platform == Platform::Github).unwrap();
        assert!(!gh.enabled);
    }

    #[test]
    fn overrides_pin_priority_and_switch_platforms() {
        let overrides: BTreeMap<Platform, SourceOverride> = [
            (Platform::Github, SourceOverride { enabled: Some(false), ..SourceOverride::default() }),
            (Platform::StackOverflow, SourceOverride { priority: Some(3), max_results: Some(7), ..SourceOverride::default() }),
            (Platform::ProductHunt, SourceOverride { enabled: Some(true), ..SourceOverride::default() }),
        ]
        .into_iter()
        .collect();
        let sel = SourceSelector::new(SelectorConfig { min_weight: 0.9, max_sources: 8 }).with_overrides(overrides);
        let out = sel.select(&tech_dev(), &PerformanceHistory::default());
        let by: BTreeMap<Platform, &SourceConfig> = out.iter().map(|c| (c.platform, c)).collect();

        assert!(!by[&Platform::Github].enabled);
        let so = by[&Platform::StackOverflow];
        assert!(so.enabled);
        assert_eq!(so.priority, 3);
        assert_eq!(so.max_results, 7);
        // weight 0.5 is under the threshold, but the override lets it in
        assert!(by[&Platform::ProductHunt].enabled);
        assert!(!by[&Platform::GoogleSearch].enabled);

        let st = sel.strategies_for(&out, &tech_dev());
        assert_eq!(st[&Platform::StackOverflow].result_limit, 7);
    }

    #[test]
    fn unmappable_icp_uses_default_set() {
        let icp = Icp::new("underwater basket weaving");
        let out = SourceSelector::default().select(&icp, &PerformanceHistory::default());
        assert_eq!(out, fallback_sources());
    }

    #[test]
    fn poor_history_pushes_platform_down() {
        let mut h = PerformanceHistory::default();
        for _ in 0..3 {
            h.record_sample(Platform::Github, 0.0);
        }
        let out = SourceSelector::default().select(&tech_dev(), &h);
        let gh = out.iter().find(|c| c.platform == Platform::Github).unwrap();
        assert!(gh.priority < 10);
        assert_ne!(out[0].platform, Platform::Github);
    }

    #[test]
    fn strategies_use_platform_templates() {
        let icp = tech_dev().with_company_size("startup");
        let sel = SourceSelector::default();
        let sources = sel.select(&icp, &PerformanceHistory::default());
        let st = sel.strategies_for(&sources, &icp);

        let gh = &st[&Platform::Github];
        assert_eq!(gh.primary_queries[0], "language:technology");
        assert_eq!(gh.primary_queries[1], "topic:technology");
        assert_eq!(gh.filters["sort"], "stars");

        let so = &st[&Platform::StackOverflow];
        assert_eq!(so.primary_queries[0], "[technology]");
        // template filter overrides the platform default
        assert_eq!(so.filters["min_reputation"], 1000);

        let cb = &st[&Platform::Crunchbase];
        assert_eq!(cb.primary_queries[0], "technology startup");
        assert!(cb.result_limit <= 25);
    }

    #[test]
    fn empty_templates_fall_back_to_terms() {
        let icp = Icp::default().with_roles(["sales"]);
        let st = SourceSelector::default()
            .strategies_for(&[SourceConfig::new(Platform::Github, 5)], &icp);
        // github has no industry terms to build language:/topic: from
        assert_eq!(st[&Platform::Github].primary_queries, vec!["sales"]);
    }
}
