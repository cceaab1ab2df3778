//! # Lead scoring
//!
//! Composite score in [0,1]:
//!
//! `w_icp*icp_match + w_eng*engagement + w_acc*accessibility + w_buy*buying_signal`
//!
//! Weights are renormalised to sum to 1, so a config that only cares about
//! ratios ("2, 1, 1, 0") still yields a score in range. All time-dependent
//! parts take an explicit `now` through the `*_at` variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::icp::Icp;
use crate::normalize::parse_timestamp;
use crate::prospect::{signals, Prospect};

/// Keywords in a bio that suggest an active buying window.
pub const BUYING_KEYWORDS: &[&str] = &[
    "hiring",
    "funding",
    "raised",
    "launch",
    "series a",
    "series b",
    "seed round",
    "expanding",
    "evaluating",
    "migrating",
    "looking for",
];

const ROLE_WEIGHT: f32 = 0.5;
const INDUSTRY_WEIGHT: f32 = 0.3;
const DESCRIPTOR_WEIGHT: f32 = 0.2;
/// Industry credit when only a related term ("software" for technology) hits.
const RELATED_INDUSTRY_CREDIT: f32 = 0.6;

const FOLLOWERS_SATURATION: f64 = 10_000.0;
const ACTIVITY_SATURATION: f64 = 1_000.0;
const UNKNOWN_RECENCY: f64 = 0.5;
const SIGNAL_STEEPNESS: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub icp_match: f32,
    pub engagement: f32,
    pub accessibility: f32,
    pub buying_signal: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            icp_match: 0.40,
            engagement: 0.25,
            accessibility: 0.20,
            buying_signal: 0.15,
        }
    }
}

impl ScoreWeights {
    /// Negative weights count as zero; an all-zero set falls back to defaults.
    pub fn normalized(&self) -> Self {
        let c = |x: f32| if x.is_finite() { x.max(0.0) } else { 0.0 };
        let (a, b, d, e) = (
            c(self.icp_match),
            c(self.engagement),
            c(self.accessibility),
            c(self.buying_signal),
        );
        let sum = a + b + d + e;
        if sum <= f32::EPSILON {
            return Self::default();
        }
        Self {
            icp_match: a / sum,
            engagement: b / sum,
            accessibility: d / sum,
            buying_signal: e / sum,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub engagement_half_life_days: f64,
    pub signal_window_days: f64,
    /// Prospects scoring below this are left out of the final list.
    pub min_score: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            engagement_half_life_days: 90.0,
            signal_window_days: 90.0,
            min_score: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub icp_match: f32,
    pub engagement: f32,
    pub accessibility: f32,
    pub buying_signal: f32,
    pub total: f32,
}

#[derive(Clone, Debug)]
pub struct Scorer {
    cfg: ScoringConfig,
    weights: ScoreWeights,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl Scorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        let weights = cfg.weights.normalized();
        Self { cfg, weights }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    pub fn score(&self, p: &Prospect, icp: &Icp) -> f32 {
        self.score_at(p, icp, Utc::now())
    }

    pub fn score_at(&self, p: &Prospect, icp: &Icp, now: DateTime<Utc>) -> f32 {
        self.breakdown_at(p, icp, now).total
    }

    pub fn breakdown(&self, p: &Prospect, icp: &Icp) -> ScoreBreakdown {
        self.breakdown_at(p, icp, Utc::now())
    }

    pub fn breakdown_at(&self, p: &Prospect, icp: &Icp, now: DateTime<Utc>) -> ScoreBreakdown {
        let icp_match = icp_match(p, icp);
        let engagement = self.engagement(p, now);
        let accessibility = accessibility(p);
        let buying_signal = self.buying_signal(p, now);
        let w = &self.weights;
        let total = (w.icp_match * icp_match
            + w.engagement * engagement
            + w.accessibility * accessibility
            + w.buying_signal * buying_signal)
            .clamp(0.0, 1.0);
        ScoreBreakdown {
            icp_match,
            engagement,
            accessibility,
            buying_signal,
            total,
        }
    }

    /// Write `relevance_score` and `engagement_score` onto the prospect.
    pub fn apply_at(&self, p: &mut Prospect, icp: &Icp, now: DateTime<Utc>) -> ScoreBreakdown {
        let b = self.breakdown_at(p, icp, now);
        p.relevance_score = b.total;
        p.engagement_score = b.engagement;
        b
    }

    pub fn passes(&self, p: &Prospect) -> bool {
        p.relevance_score >= self.cfg.min_score
    }

    fn engagement(&self, p: &Prospect, now: DateTime<Utc>) -> f32 {
        let recency = half_life_decay(p.last_activity, now, self.cfg.engagement_half_life_days)
            .unwrap_or(UNKNOWN_RECENCY);
        let volume = volume(p);
        ((0.7 * volume + 0.3) * recency).clamp(0.0, 1.0) as f32
    }

    fn buying_signal(&self, p: &Prospect, now: DateTime<Utc>) -> f32 {
        let window = self.cfg.signal_window_days;
        let bio_weight =
            half_life_decay(p.last_activity, now, window).unwrap_or(UNKNOWN_RECENCY);

        let mut sum = 0.0f64;
        if let Some(bio) = p.bio.as_deref() {
            let bio = bio.to_lowercase();
            let hits = BUYING_KEYWORDS.iter().filter(|k| bio.contains(*k)).count();
            sum += hits as f64 * bio_weight;
        }
        if let Some(Value::Array(events)) = p.additional_data.get(signals::EVENTS) {
            for ev in events {
                let at = ev.get("at").and_then(parse_timestamp).or(p.last_activity);
                sum += half_life_decay(at, now, window).unwrap_or(UNKNOWN_RECENCY);
            }
        }
        (1.0 - (-SIGNAL_STEEPNESS * sum).exp()).clamp(0.0, 1.0) as f32
    }
}

/// `0.5^(age/half_life)`; future timestamps count as fresh.
fn half_life_decay(at: Option<DateTime<Utc>>, now: DateTime<Utc>, half_life_days: f64) -> Option<f64> {
    let at = at?;
    if half_life_days <= 0.0 {
        return Some(if at >= now { 1.0 } else { 0.0 });
    }
    let age_days = ((now - at).num_seconds().max(0) as f64) / 86_400.0;
    Some(0.5f64.powf(age_days / half_life_days))
}

fn log_scaled(x: f64, saturation: f64) -> f64 {
    ((1.0 + x.max(0.0)).ln() / (1.0 + saturation).ln()).clamp(0.0, 1.0)
}

fn volume(p: &Prospect) -> f64 {
    let followers = p.signal_f64(signals::FOLLOWERS);
    let activity = p.signal_f64(signals::ACTIVITY);
    let counted = match (followers, activity) {
        (None, None) => 0.0,
        (f, a) => {
            0.6 * log_scaled(f.unwrap_or(0.0), FOLLOWERS_SATURATION)
                + 0.4 * log_scaled(a.unwrap_or(0.0), ACTIVITY_SATURATION)
        }
    };
    let platform = p
        .signal_f64(signals::PLATFORM_ENGAGEMENT)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    counted.max(platform)
}

fn accessibility(p: &Prospect) -> f32 {
    let mut s = 0.0;
    if p.email.is_some() {
        s += 0.6;
    }
    if p.linkedin_url.is_some() || p.twitter_url.is_some() || p.github_url.is_some() {
        s += 0.25;
    }
    if p.website.is_some() {
        s += 0.15;
    }
    f32::min(s, 1.0)
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// All tokens of `term` appear in the prospect's token set.
fn term_hits(term: &str, have: &HashSet<String>) -> bool {
    let t = tokens(term);
    !t.is_empty() && t.iter().all(|x| have.contains(x))
}

fn icp_match(p: &Prospect, icp: &Icp) -> f32 {
    let have: HashSet<String> = [p.title.as_deref(), p.company.as_deref(), p.industry.as_deref()]
        .into_iter()
        .flatten()
        .flat_map(tokens)
        .collect();

    let mut num = 0.0f32;
    let mut den = 0.0f32;

    let roles = icp.role_terms();
    if !roles.is_empty() {
        den += ROLE_WEIGHT;
        if roles.iter().any(|r| term_hits(r, &have)) {
            num += ROLE_WEIGHT;
        }
    }

    let industry = icp.industry_terms();
    if let Some((key, related)) = industry.split_first() {
        den += INDUSTRY_WEIGHT;
        if term_hits(key, &have) {
            num += INDUSTRY_WEIGHT;
        } else if related.iter().any(|r| term_hits(r, &have)) {
            num += INDUSTRY_WEIGHT * RELATED_INDUSTRY_CREDIT;
        }
    }

    let descriptors: Vec<&String> = icp.descriptors.iter().filter(|d| !d.trim().is_empty()).collect();
    if !descriptors.is_empty() {
        den += DESCRIPTOR_WEIGHT;
        let hit = descriptors.iter().filter(|d| term_hits(d, &have)).count();
        num += DESCRIPTOR_WEIGHT * hit as f32 / descriptors.len() as f32;
    }

    if den <= 0.0 {
        0.0
    } else {
        (num / den).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::prospect::Field;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn dev() -> Prospect {
        let mut p = Prospect::new(Platform::Github, "https://github.com/jd", 0);
        p.set_field(Field::Name, "Jane Doe", 0.9);
        p.set_field(Field::Title, "Senior Software Engineer", 0.9);
        p.set_field(Field::Company, "Acme", 0.9);
        p
    }

    #[test]
    fn weights_renormalise() {
        let w = ScoreWeights {
            icp_match: 2.0,
            engagement: 1.0,
            accessibility: 1.0,
            buying_signal: 0.0,
        }
        .normalized();
        assert!((w.icp_match - 0.5).abs() < 1e-6);
        assert_eq!(w.buying_signal, 0.0);

        let zero = ScoreWeights {
            icp_match: 0.0,
            engagement: 0.0,
            accessibility: 0.0,
            buying_signal: 0.0,
        };
        assert_eq!(zero.normalized(), ScoreWeights::default());
    }

    #[test]
    fn icp_match_uses_role_synonyms() {
        let icp = Icp::new("technology").with_roles(["developer"]);
        let b = Scorer::default().breakdown_at(&dev(), &icp, now());
        // "engineer" is a developer synonym, "software" a related industry term
        let expected = (0.5 + 0.3 * RELATED_INDUSTRY_CREDIT) / 0.8;
        assert!((b.icp_match - expected).abs() < 1e-5, "{}", b.icp_match);
    }

    #[test]
    fn empty_icp_matches_nothing() {
        assert_eq!(Scorer::default().breakdown_at(&dev(), &Icp::default(), now()).icp_match, 0.0);
    }

    #[test]
    fn accessibility_improves_with_email() {
        let s = Scorer::default();
        let mut p = dev();
        let before = s.breakdown_at(&p, &Icp::default(), now()).accessibility;
        p.set_field(Field::Email, "jane@acme.io", 0.95);
        p.set_field(Field::GithubUrl, "https://github.com/jd", 0.9);
        let after = s.breakdown_at(&p, &Icp::default(), now()).accessibility;
        assert_eq!(before, 0.0);
        assert!((after - 0.85).abs() < 1e-6);
    }

    #[test]
    fn engagement_decays_monotonically() {
        let s = Scorer::default();
        let mut p = dev();
        p.additional_data.insert(signals::FOLLOWERS.into(), json!(5000));
        let mut last = f32::MAX;
        for days in [0, 30, 90, 365] {
            p.last_activity = Some(now() - chrono::Duration::days(days));
            let e = s.breakdown_at(&p, &Icp::default(), now()).engagement;
            assert!(e < last || days == 0);
            last = e;
        }
        // unknown recency sits in the middle
        p.last_activity = None;
        let unknown = s.breakdown_at(&p, &Icp::default(), now()).engagement;
        assert!(unknown > 0.0 && unknown < 1.0);
    }

    #[test]
    fn buying_signal_blends_without_cliffs() {
        let s = Scorer::default();
        let mut p = dev();
        p.last_activity = Some(now());
        assert_eq!(s.breakdown_at(&p, &Icp::default(), now()).buying_signal, 0.0);

        p.set_field(Field::Bio, "We're hiring!", 0.9);
        let one = s.breakdown_at(&p, &Icp::default(), now()).buying_signal;
        p.set_field(Field::Bio, "We're hiring after we raised our seed round", 0.9);
        let three = s.breakdown_at(&p, &Icp::default(), now()).buying_signal;
        assert!(one > 0.4 && one < 0.6, "{one}");
        assert!(three > one && three < 1.0);

        // an old funding event counts for less than a fresh one
        let mut q = dev();
        q.additional_data.insert(
            signals::EVENTS.into(),
            json!([{ "kind": "funding", "at": "2024-06-01T00:00:00Z" }]),
        );
        let old = s.breakdown_at(&q, &Icp::default(), now()).buying_signal;
        q.additional_data.insert(
            signals::EVENTS.into(),
            json!([{ "kind": "funding", "at": "2025-05-31T00:00:00Z" }]),
        );
        let fresh = s.breakdown_at(&q, &Icp::default(), now()).buying_signal;
        assert!(fresh > old);
    }

    #[test]
    fn total_stays_in_unit_range() {
        let s = Scorer::default();
        let mut p = dev();
        p.set_field(Field::Email, "jane@acme.io", 0.95);
        p.set_field(Field::Website, "https://acme.io/", 0.9);
        p.set_field(Field::LinkedinUrl, "https://linkedin.com/in/jd", 0.9);
        p.set_field(Field::Bio, "hiring, funding, launch, series a", 0.9);
        p.last_activity = Some(now());
        p.additional_data.insert(signals::PLATFORM_ENGAGEMENT.into(), json!(1.0));
        let icp = Icp::new("software").with_roles(["engineer"]);
        let b = s.breakdown_at(&p, &icp, now());
        assert!(b.total > 0.8 && b.total <= 1.0, "{b:?}");
    }
}
