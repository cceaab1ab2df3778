// src/source/defaults.rs
//! Built-in per-platform defaults (priority, result cap, pacing, parameters).

use serde_json::{json, Map, Value};

use super::types::SourceConfig;
use crate::platform::Platform;

/// `(priority, max_results, rate_limit_delay_secs)` per platform.
fn table(platform: Platform) -> (u8, usize, f64) {
    match platform {
        Platform::GoogleSearch => (8, 50, 1.0),
        Platform::Linkedin => (7, 50, 2.0),
        Platform::Twitter => (7, 100, 2.0),
        Platform::Github => (6, 50, 1.0),
        Platform::StackOverflow => (6, 50, 1.0),
        Platform::Crunchbase => (6, 25, 3.0),
        Platform::HackerNews => (5, 40, 1.0),
        Platform::Reddit => (5, 75, 1.5),
        Platform::JobBoards => (5, 50, 3.0),
        Platform::ProductHunt => (4, 30, 1.5),
        Platform::Medium => (4, 40, 1.5),
        Platform::Youtube => (4, 40, 1.5),
        Platform::Angellist => (4, 25, 2.0),
        Platform::Eventbrite => (3, 30, 2.0),
        Platform::Meetup => (3, 30, 2.0),
        Platform::Discord => (3, 25, 2.0),
        Platform::Substack => (3, 30, 1.5),
    }
}

fn search_parameters(platform: Platform) -> Map<String, Value> {
    let v = match platform {
        Platform::Twitter => json!({ "verified_only": false, "min_followers": 50 }),
        Platform::Github => json!({ "sort": "stars", "order": "desc" }),
        Platform::Reddit => json!({ "sort": "hot", "time_filter": "month" }),
        Platform::StackOverflow => json!({ "min_reputation": 500, "sort": "votes" }),
        Platform::ProductHunt => json!({ "featured_only": false }),
        Platform::Crunchbase => json!({ "funding_stages": ["seed", "series-a", "series-b"] }),
        Platform::JobBoards => json!({ "boards": ["linkedin", "indeed", "glassdoor"] }),
        _ => json!({}),
    };
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

/// Default configuration for a platform, enabled.
pub fn default_config(platform: Platform) -> SourceConfig {
    let (priority, max_results, delay) = table(platform);
    SourceConfig {
        platform,
        priority,
        max_results,
        search_parameters: search_parameters(platform),
        rate_limit_delay: delay,
        enabled: true,
    }
}

/// Table priority for a platform.
pub fn default_priority(platform: Platform) -> u8 {
    table(platform).0
}

/// Sources used when an ICP carries nothing the selection tables recognise.
pub fn fallback_sources() -> Vec<SourceConfig> {
    [
        Platform::GoogleSearch,
        Platform::Linkedin,
        Platform::Twitter,
        Platform::Github,
        Platform::Crunchbase,
    ]
    .into_iter()
    .map(default_config)
    .collect()
}
