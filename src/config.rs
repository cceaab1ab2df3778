// src/config.rs
//! Engine configuration: one file (TOML or JSON) plus a few env overrides.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::dedup::DedupConfig;
use crate::orchestrator::{OrchestratorConfig, DEFAULT_RUN_DEADLINE_SECS};
use crate::platform::Platform;
use crate::scoring::ScoringConfig;
use crate::selector::SelectorConfig;
use crate::source::SourceOverride;

pub const ENV_CONFIG_PATH: &str = "LEADS_CONFIG_PATH";
pub const ENV_MIN_SOURCES: &str = "LEADS_MIN_SOURCES";
pub const ENV_RUN_DEADLINE_SECS: &str = "LEADS_RUN_DEADLINE_SECS";
pub const ENV_MAX_CONCURRENCY: &str = "LEADS_MAX_CONCURRENCY";
pub const ENV_FUZZY_THRESHOLD: &str = "LEADS_FUZZY_THRESHOLD";

const DEFAULT_TOML: &str = "config/leads.toml";
const DEFAULT_JSON: &str = "config/leads.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub orchestrator: OrchestratorConfig,
    pub selector: SelectorConfig,
    pub scoring: ScoringConfig,
    pub dedup: DedupConfig,
    /// Per-platform overrides of the built-in source defaults.
    pub sources: BTreeMap<Platform, SourceOverride>,
}

impl EngineConfig {
    /// Apply `LEADS_*` env overrides on top of whatever was loaded.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<usize>(ENV_MIN_SOURCES)? {
            self.orchestrator.min_sources = v;
        }
        if let Some(v) = env_parse::<f64>(ENV_RUN_DEADLINE_SECS)? {
            if !v.is_finite() || v <= 0.0 {
                return Err(anyhow!("{ENV_RUN_DEADLINE_SECS} must be a positive number of seconds, got {v}"));
            }
            self.orchestrator.run_deadline_secs = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_MAX_CONCURRENCY)? {
            self.orchestrator.max_concurrency = v.max(1);
        }
        if let Some(v) = env_parse::<f64>(ENV_FUZZY_THRESHOLD)? {
            self.dedup.fuzzy_threshold = if v.is_finite() { v.clamp(0.0, 1.0) } else { self.dedup.fuzzy_threshold };
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        let o = &mut self.orchestrator;
        o.max_concurrency = o.max_concurrency.max(1);
        o.max_attempts = o.max_attempts.max(1);
        if o.backoff_base_ms > o.backoff_max_ms {
            std::mem::swap(&mut o.backoff_base_ms, &mut o.backoff_max_ms);
        }
        if !(0.0..=1.0).contains(&self.dedup.fuzzy_threshold) {
            self.dedup.fuzzy_threshold = crate::dedup::DEFAULT_FUZZY_THRESHOLD;
        }
        if !(0.0..=1.0).contains(&self.selector.min_weight) {
            self.selector.min_weight = crate::selector::DEFAULT_MIN_WEIGHT;
        }
        // nulový deadline by běh ukončil dřív, než začne
        if !o.run_deadline_secs.is_finite() || o.run_deadline_secs <= 0.0 {
            o.run_deadline_secs = DEFAULT_RUN_DEADLINE_SECS;
        }
        for source in self.sources.values_mut() {
            source.sanitize();
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("{key} has an invalid value: {raw:?}")),
        _ => Ok(None),
    }
}

/// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
pub fn load_from(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading engine config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut cfg: EngineConfig = if ext == "json" {
        serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON config {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("parsing TOML config {}", path.display()))?
    };
    cfg.sanitize();
    Ok(cfg)
}

/// Resolve the config file, then apply env overrides:
/// 1) $LEADS_CONFIG_PATH (must exist)
/// 2) config/leads.toml
/// 3) config/leads.json
/// 4) built-in defaults
pub fn load_default() -> Result<EngineConfig> {
    let mut cfg = match resolve_path()? {
        Some(p) => {
            debug!(target: "engine", path = %p.display(), "loading engine config");
            load_from(&p)?
        }
        None => EngineConfig::default(),
    };
    cfg.apply_env()?;
    cfg.sanitize();
    Ok(cfg)
}

fn resolve_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()));
    }
    for candidate in [DEFAULT_TOML, DEFAULT_JSON] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return Ok(Some(pb));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
[orchestrator]
min_sources = 3

[dedup]
fuzzy_threshold = 0.9
"#,
        )
        .unwrap();
        assert_eq!(cfg.orchestrator.min_sources, 3);
        assert_eq!(cfg.orchestrator.max_concurrency, 10);
        assert_eq!(cfg.dedup.fuzzy_threshold, 0.9);
        assert_eq!(cfg.scoring, ScoringConfig::default());
    }

    #[test]
    fn sanitize_fixes_inverted_backoff() {
        let mut cfg = EngineConfig::default();
        cfg.orchestrator.backoff_base_ms = 9_000;
        cfg.orchestrator.backoff_max_ms = 100;
        cfg.dedup.fuzzy_threshold = 4.0;
        cfg.sanitize();
        assert_eq!(cfg.orchestrator.backoff_base_ms, 100);
        assert_eq!(cfg.orchestrator.backoff_max_ms, 9_000);
        assert_eq!(cfg.dedup.fuzzy_threshold, crate::dedup::DEFAULT_FUZZY_THRESHOLD);
    }

    #[test]
    fn sanitize_resets_unusable_deadline() {
        for bad in [0.0, -5.0, f64::NAN] {
            let mut cfg = EngineConfig::default();
            cfg.orchestrator.run_deadline_secs = bad;
            cfg.sanitize();
            assert_eq!(cfg.orchestrator.run_deadline_secs, DEFAULT_RUN_DEADLINE_SECS);
        }
    }

    #[test]
    fn sources_section_parses_platform_keys() {
        let mut cfg: EngineConfig = toml::from_str(
            r#"
[sources.stack_overflow]
priority = 0
max_results = 20

[sources.github.search_parameters]
sort = "updated"
"#,
        )
        .unwrap();
        cfg.sanitize();
        let so = &cfg.sources[&Platform::StackOverflow];
        assert_eq!(so.priority, Some(1));
        assert_eq!(so.max_results, Some(20));
        assert_eq!(cfg.sources[&Platform::Github].search_parameters["sort"], "updated");
    }

    #[serial_test::serial]
    #[test]
    fn env_deadline_must_be_positive() {
        for bad in ["0", "-3", "inf"] {
            std::env::set_var(ENV_RUN_DEADLINE_SECS, bad);
            assert!(EngineConfig::default().apply_env().is_err(), "{bad}");
        }
        std::env::set_var(ENV_RUN_DEADLINE_SECS, "30");
        let mut cfg = EngineConfig::default();
        cfg.apply_env().unwrap();
        assert_eq!(cfg.orchestrator.run_deadline_secs, 30.0);
        std::env::remove_var(ENV_RUN_DEADLINE_SECS);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_clamps() {
        std::env::set_var(ENV_MIN_SOURCES, "4");
        std::env::set_var(ENV_FUZZY_THRESHOLD, "1.7");
        let mut cfg = EngineConfig::default();
        cfg.apply_env().unwrap();
        assert_eq!(cfg.orchestrator.min_sources, 4);
        assert_eq!(cfg.dedup.fuzzy_threshold, 1.0);

        std::env::set_var(ENV_MIN_SOURCES, "many");
        assert!(EngineConfig::default().apply_env().is_err());
        std::env::remove_var(ENV_MIN_SOURCES);
        std::env::remove_var(ENV_FUZZY_THRESHOLD);
    }
}
