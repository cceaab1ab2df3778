// src/normalize/mod.rs
//! # Result Normalizer
//!
//! Turns one platform-native [`RawRecord`] into a canonical [`Prospect`]
//! using the platform's mapping table. Values are cleaned and validated on
//! the way in; every field that survives gets a provenance entry with the
//! confidence of the rule that produced it.
//!
//! Records without a name and without any contact handle are rejected as
//! data quality failures. Callers count those, they never abort a run.

pub mod bio;
pub mod mappings;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::LeadError;
use crate::platform::Platform;
use crate::prospect::{signals, Field, Prospect};
use crate::source::RawRecord;
use mappings::{table_for, Transform};

pub const TEXT_MAX_CHARS: usize = 1000;

pub const CONFIDENCE_DIRECT: f32 = 0.9;
pub const CONFIDENCE_EMAIL: f32 = 0.95;
pub const CONFIDENCE_HANDLE: f32 = 0.8;
pub const CONFIDENCE_INFERRED: f32 = 0.5;

/// Normalize free text: entity decode, tag strip, quote folding, whitespace
/// collapse, length cap.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) “ ” ‘ ’ « » → ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > TEXT_MAX_CHARS {
        out = out.chars().take(TEXT_MAX_CHARS).collect();
    }
    out
}

/// Lowercased address if it looks deliverable.
pub fn clean_email(s: &str) -> Option<String> {
    static RE_EMAIL: OnceCell<Regex> = OnceCell::new();
    let re = RE_EMAIL
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").unwrap());
    let e = s.trim().trim_start_matches("mailto:").to_ascii_lowercase();
    re.is_match(&e).then_some(e)
}

/// http(s) URL with a host; bare hosts get `https://`.
pub fn clean_url(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() || s.contains(char::is_whitespace) {
        return None;
    }
    let candidate = if s.contains("://") {
        s.to_string()
    } else if s.contains('.') {
        format!("https://{}", s.trim_start_matches("//"))
    } else {
        return None;
    };
    let url = url::Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if !host.contains('.') && host != "localhost" {
        return None;
    }
    Some(url.to_string())
}

/// Profile URL from a bare handle (`@jane` → `https://twitter.com/jane`).
pub fn handle_url(template: &str, handle: &str) -> Option<String> {
    static RE_HANDLE: OnceCell<Regex> = OnceCell::new();
    let re = RE_HANDLE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").unwrap());
    let h = handle.trim().trim_start_matches('@');
    re.is_match(h).then(|| template.replace("{}", h))
}

/// RFC 3339, `YYYY-MM-DD`, or unix seconds (number or numeric string).
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return Some(t.with_timezone(&Utc));
            }
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
            }
            s.parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
        }
        _ => None,
    }
}

/// Dotted path lookup; `null` counts as absent.
pub fn lookup<'a>(raw: &'a RawRecord, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut cur = raw.get(parts.next()?)?;
    for part in parts {
        cur = cur.as_object()?.get(part)?;
    }
    (!cur.is_null()).then_some(cur)
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn apply(transform: Transform, v: &Value) -> Option<(String, f32)> {
    match transform {
        Transform::Text => {
            let t = clean_text(&scalar_text(v)?);
            (!t.is_empty()).then_some((t, CONFIDENCE_DIRECT))
        }
        Transform::Company => {
            let t = clean_text(&scalar_text(v)?);
            let t = t.trim_start_matches('@').trim().to_string();
            (!t.is_empty()).then_some((t, CONFIDENCE_DIRECT))
        }
        Transform::Email => clean_email(v.as_str()?).map(|e| (e, CONFIDENCE_EMAIL)),
        Transform::Url => clean_url(v.as_str()?).map(|u| (u, CONFIDENCE_DIRECT)),
        Transform::Handle(template) => {
            handle_url(template, v.as_str()?).map(|u| (u, CONFIDENCE_HANDLE))
        }
        Transform::Timestamp => parse_timestamp(v).map(|t| (t.to_rfc3339(), CONFIDENCE_DIRECT)),
    }
}

fn signal_value(v: &Value) -> Option<Value> {
    match v {
        Value::Number(_) | Value::Bool(_) => Some(v.clone()),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| json!(f)),
        _ => None,
    }
}

const CONTACT_FIELDS: [Field; 5] = [
    Field::Email,
    Field::LinkedinUrl,
    Field::TwitterUrl,
    Field::GithubUrl,
    Field::Website,
];

const PROFILE_FIELDS: [Field; 3] = [Field::LinkedinUrl, Field::TwitterUrl, Field::GithubUrl];

/// Outcome of normalizing all raw records of one source.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub prospects: Vec<Prospect>,
    pub data_quality_failures: usize,
    pub duplicate_records: usize,
    pub last_error: Option<LeadError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Map one raw record. `discovery_index` is the record's position in the
    /// run-wide deterministic order; it also names records without any URL.
    pub fn normalize(
        &self,
        platform: Platform,
        raw: &RawRecord,
        discovery_index: usize,
    ) -> Result<Prospect, LeadError> {
        let table = table_for(platform);
        let mut values: BTreeMap<Field, (String, f32)> = BTreeMap::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for rule in table.fields {
            if values.contains_key(&rule.field) {
                continue;
            }
            for path in rule.paths {
                let Some(v) = lookup(raw, path) else { continue };
                if let Some(out) = apply(rule.transform, v) {
                    values.insert(rule.field, out);
                    if !path.contains('.') {
                        consumed.insert(path);
                    }
                    break;
                }
            }
        }

        if let Some((bio, _)) = values.get(&Field::Bio).cloned() {
            if !values.contains_key(&Field::Title) {
                if let Some(t) = bio::infer_title(&bio) {
                    values.insert(Field::Title, (t, CONFIDENCE_INFERRED));
                }
            }
            if !values.contains_key(&Field::Company) {
                if let Some(c) = bio::infer_company(&bio) {
                    values.insert(Field::Company, (c, CONFIDENCE_INFERRED));
                }
            }
        }

        let has_contact = CONTACT_FIELDS.iter().any(|f| values.contains_key(f));
        if !values.contains_key(&Field::Name) && !has_contact {
            return Err(LeadError::DataQuality {
                platform,
                reason: "record has neither a name nor a contact handle".into(),
            });
        }

        let source_url = table
            .source_url
            .iter()
            .find_map(|path| {
                let s = lookup(raw, path)?.as_str()?.trim();
                if !path.contains('.') {
                    consumed.insert(path);
                }
                (!s.is_empty()).then(|| s.to_string())
            })
            .or_else(|| {
                PROFILE_FIELDS
                    .iter()
                    .find_map(|f| values.get(f).map(|(v, _)| v.clone()))
            })
            .unwrap_or_else(|| format!("{platform}:record:{discovery_index}"));

        let mut p = Prospect::new(platform, source_url, discovery_index);
        for (field, (value, confidence)) in values {
            p.set_field(field, value, confidence);
        }

        for rule in table.signals {
            if p.additional_data.contains_key(rule.key) {
                continue;
            }
            for path in rule.paths {
                if let Some(v) = lookup(raw, path).and_then(signal_value) {
                    p.additional_data.insert(rule.key.to_string(), v);
                    if !path.contains('.') {
                        consumed.insert(path);
                    }
                    break;
                }
            }
        }
        if !p.additional_data.contains_key(signals::PLATFORM_ENGAGEMENT) {
            if let Some(e) = platform_engagement(platform, raw) {
                p.additional_data
                    .insert(signals::PLATFORM_ENGAGEMENT.to_string(), json!(e));
            }
        }

        let events = collect_events(table.events, raw);
        if !events.is_empty() {
            consumed.insert("events");
            p.additional_data
                .insert(signals::EVENTS.to_string(), Value::Array(events));
        }

        for (k, v) in raw {
            if !consumed.contains(k.as_str()) && !v.is_null() {
                p.additional_data.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        p.stamp_observed();
        Ok(p)
    }

    /// Cheap validity probe used while a source is still searching.
    pub fn is_usable(&self, platform: Platform, raw: &RawRecord) -> bool {
        self.normalize(platform, raw, 0).is_ok()
    }

    /// Normalize all records of one source. Indices are assigned from
    /// `first_index` upward, one per accepted prospect. A repeated
    /// `source_url` within the batch is skipped and counted.
    pub fn normalize_batch(
        &self,
        platform: Platform,
        records: &[RawRecord],
        first_index: usize,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = first_index;

        for raw in records {
            match self.normalize(platform, raw, next) {
                Ok(p) => {
                    if !seen.insert(p.source_url.clone()) {
                        batch.duplicate_records += 1;
                        continue;
                    }
                    batch.prospects.push(p);
                    next += 1;
                }
                Err(e) => {
                    debug!(target: "normalize", platform = %platform, error = %e, "record dropped");
                    counter!("leads_records_dropped_total", "platform" => platform.as_str())
                        .increment(1);
                    batch.data_quality_failures += 1;
                    batch.last_error = Some(e);
                }
            }
        }
        batch
    }
}

/// Engagement estimate some platforms expose through raw counters, [0,1].
fn platform_engagement(platform: Platform, raw: &RawRecord) -> Option<f64> {
    let num = |path: &str| lookup(raw, path).and_then(Value::as_f64).unwrap_or(0.0);
    let flag = |path: &str| {
        if lookup(raw, path).and_then(Value::as_bool).unwrap_or(false) {
            1.0
        } else {
            0.0
        }
    };
    let e = match platform {
        Platform::Twitter => {
            let followers = num("user.public_metrics.followers_count");
            let tweets = num("user.public_metrics.tweet_count");
            if followers == 0.0 && tweets == 0.0 {
                return None;
            }
            followers / 10_000.0 * 0.4 + tweets / 1000.0 * 0.3 + flag("user.verified") * 0.3
        }
        Platform::Github => {
            let followers = num("followers");
            let repos = num("public_repos");
            if followers == 0.0 && repos == 0.0 {
                return None;
            }
            followers / 1000.0 * 0.3
                + repos / 50.0 * 0.3
                + num("contributions") / 100.0 * 0.2
                + flag("hireable") * 0.1
        }
        _ => return None,
    };
    Some(e.clamp(0.0, 1.0))
}

fn collect_events(rules: &[mappings::EventRule], raw: &RawRecord) -> Vec<Value> {
    let mut out = Vec::new();
    if let Some(Value::Array(items)) = raw.get("events") {
        for it in items {
            let Some(kind) = it.get("kind").and_then(Value::as_str) else {
                continue;
            };
            let at = it.get("at").and_then(parse_timestamp).map(|t| t.to_rfc3339());
            out.push(json!({ "kind": kind.to_ascii_lowercase(), "at": at }));
        }
    }
    for rule in rules {
        if let Some(at) = rule
            .paths
            .iter()
            .find_map(|p| lookup(raw, p).and_then(parse_timestamp))
        {
            out.push(json!({ "kind": rule.kind, "at": at.to_rfc3339() }));
        }
    }
    out
}
