//! # Prospect
//!
//! Canonical lead record plus the provenance trail that survives merging.
//!
//! A raw prospect (straight out of the normalizer) carries exactly one
//! [`SourceRef`] and one [`ProvenanceEntry`] per non-empty field. After
//! deduplication a prospect may stand for several raw records: every
//! contributing value stays in `provenance`, and the entry whose value was
//! kept on the canonical field is flagged `selected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::platform::Platform;

/// Versioned keys inside `additional_data` that scoring is allowed to read.
/// Deduplication never looks at these.
pub mod signals {
    /// Follower / subscriber / karma style audience size (number).
    pub const FOLLOWERS: &str = "signals.v1.followers";
    /// Posts, repos, answers, tweets... (number).
    pub const ACTIVITY: &str = "signals.v1.activity";
    /// Engagement already estimated by the platform, in [0,1].
    pub const PLATFORM_ENGAGEMENT: &str = "signals.v1.platform_engagement";
    /// List of `{ "kind": "...", "at": "<rfc3339>" }` events.
    pub const EVENTS: &str = "signals.v1.events";
    /// Verified / premium account flag (bool).
    pub const VERIFIED: &str = "signals.v1.verified";
}

/// Canonical fields that carry provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Title,
    Company,
    Location,
    Industry,
    Email,
    LinkedinUrl,
    TwitterUrl,
    GithubUrl,
    Website,
    Bio,
    LastActivity,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::Name,
        Field::Title,
        Field::Company,
        Field::Location,
        Field::Industry,
        Field::Email,
        Field::LinkedinUrl,
        Field::TwitterUrl,
        Field::GithubUrl,
        Field::Website,
        Field::Bio,
        Field::LastActivity,
    ];
}

/// One contributed value for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub field: Field,
    pub platform: Platform,
    pub source_url: String,
    pub value: String,
    /// Normalizer's confidence in this value, [0,1].
    pub confidence: f32,
    /// `last_activity` of the contributing raw record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
    /// Whether this value is the one kept on the canonical field.
    #[serde(default)]
    pub selected: bool,
}

/// Identity of one raw record that contributed to a prospect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub platform: Platform,
    pub source_url: String,
    /// Position in the run's deterministic discovery order.
    pub discovery_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub engagement_score: f32,
    #[serde(default)]
    pub relevance_score: f32,
    pub source_platform: Platform,
    pub source_url: String,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub additional_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceEntry>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl Prospect {
    /// Bare raw prospect; fields are filled through [`Prospect::set_field`].
    pub fn new(platform: Platform, source_url: impl Into<String>, discovery_index: usize) -> Self {
        let source_url = source_url.into();
        Self {
            name: String::new(),
            title: None,
            company: None,
            location: None,
            industry: None,
            email: None,
            linkedin_url: None,
            twitter_url: None,
            github_url: None,
            website: None,
            bio: None,
            engagement_score: 0.0,
            relevance_score: 0.0,
            source_platform: platform,
            source_url: source_url.clone(),
            last_activity: None,
            additional_data: BTreeMap::new(),
            provenance: Vec::new(),
            sources: vec![SourceRef {
                platform,
                source_url,
                discovery_index,
            }],
        }
    }

    /// Current canonical value of a field, rendered as text.
    pub fn field(&self, field: Field) -> Option<String> {
        match field {
            Field::Name => (!self.name.is_empty()).then(|| self.name.clone()),
            Field::Title => self.title.clone(),
            Field::Company => self.company.clone(),
            Field::Location => self.location.clone(),
            Field::Industry => self.industry.clone(),
            Field::Email => self.email.clone(),
            Field::LinkedinUrl => self.linkedin_url.clone(),
            Field::TwitterUrl => self.twitter_url.clone(),
            Field::GithubUrl => self.github_url.clone(),
            Field::Website => self.website.clone(),
            Field::Bio => self.bio.clone(),
            Field::LastActivity => self.last_activity.map(|t| t.to_rfc3339()),
        }
    }

    /// Set a canonical field without touching provenance.
    pub fn assign(&mut self, field: Field, value: Option<String>) {
        match field {
            Field::Name => self.name = value.unwrap_or_default(),
            Field::Title => self.title = value,
            Field::Company => self.company = value,
            Field::Location => self.location = value,
            Field::Industry => self.industry = value,
            Field::Email => self.email = value,
            Field::LinkedinUrl => self.linkedin_url = value,
            Field::TwitterUrl => self.twitter_url = value,
            Field::GithubUrl => self.github_url = value,
            Field::Website => self.website = value,
            Field::Bio => self.bio = value,
            Field::LastActivity => {
                self.last_activity = value
                    .as_deref()
                    .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                    .map(|t| t.with_timezone(&Utc))
            }
        }
    }

    /// Set a field on a raw prospect and record where it came from.
    pub fn set_field(&mut self, field: Field, value: impl Into<String>, confidence: f32) {
        let value = value.into();
        if value.is_empty() {
            return;
        }
        self.assign(field, Some(value.clone()));
        self.provenance.retain(|e| e.field != field);
        self.provenance.push(ProvenanceEntry {
            field,
            platform: self.source_platform,
            source_url: self.source_url.clone(),
            value,
            confidence: confidence.clamp(0.0, 1.0),
            observed_at: None,
            selected: true,
        });
    }

    /// Stamp `observed_at` on all entries once `last_activity` is known.
    pub fn stamp_observed(&mut self) {
        let at = self.last_activity;
        for e in &mut self.provenance {
            if e.observed_at.is_none() {
                e.observed_at = at;
            }
        }
    }

    /// All contributed values for a field (selected or not), in entry order.
    pub fn values_of(&self, field: Field) -> impl Iterator<Item = &str> {
        self.provenance
            .iter()
            .filter(move |e| e.field == field)
            .map(|e| e.value.as_str())
    }

    /// Platforms that contributed at least one raw record.
    pub fn platforms(&self) -> Vec<Platform> {
        let mut out: Vec<Platform> = self.sources.iter().map(|s| s.platform).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Earliest discovery position among contributing records.
    pub fn discovery_index(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.discovery_index)
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Whether the record has any way of being contacted.
    pub fn has_contact_handle(&self) -> bool {
        self.email.is_some()
            || self.linkedin_url.is_some()
            || self.twitter_url.is_some()
            || self.github_url.is_some()
            || self.website.is_some()
    }

    pub fn signal_f64(&self, key: &str) -> Option<f64> {
        self.additional_data.get(key).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_field_records_single_provenance_entry() {
        let mut p = Prospect::new(Platform::Github, "https://github.com/jane", 0);
        p.set_field(Field::Name, "Jane", 0.9);
        p.set_field(Field::Name, "Jane Doe", 0.9);
        p.set_field(Field::Email, "", 0.9);

        assert_eq!(p.name, "Jane Doe");
        assert_eq!(p.values_of(Field::Name).collect::<Vec<_>>(), vec!["Jane Doe"]);
        assert!(p.email.is_none());
        assert_eq!(p.provenance.len(), 1);
    }

    #[test]
    fn last_activity_round_trips_through_field_text() {
        let mut p = Prospect::new(Platform::Twitter, "https://twitter.com/j", 3);
        p.set_field(Field::LastActivity, "2025-01-02T03:04:05+00:00", 0.9);
        assert!(p.last_activity.is_some());
        assert_eq!(
            p.field(Field::LastActivity).as_deref(),
            Some("2025-01-02T03:04:05+00:00")
        );
        assert_eq!(p.discovery_index(), 3);
    }
}
