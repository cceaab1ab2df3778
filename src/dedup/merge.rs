// src/dedup/merge.rs
//! Merge policy for one cluster of prospects that describe the same entity.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::SourcePriorities;
use crate::prospect::{signals, Field, Prospect, ProvenanceEntry, SourceRef};

/// Fold a cluster (in discovery order) into one prospect. A single-member
/// cluster comes back untouched.
pub fn merge_cluster(mut members: Vec<Prospect>, priorities: &SourcePriorities) -> Prospect {
    if members.len() == 1 {
        if let Some(p) = members.pop() {
            return p;
        }
    }
    members.sort_by_key(Prospect::discovery_index);

    // Discovery position per contributing raw record.
    let mut sources: Vec<SourceRef> = Vec::new();
    for m in &members {
        for s in &m.sources {
            if !sources.contains(s) {
                sources.push(s.clone());
            }
        }
    }
    sources.sort_by(|a, b| {
        a.discovery_index
            .cmp(&b.discovery_index)
            .then_with(|| a.platform.cmp(&b.platform))
            .then_with(|| a.source_url.cmp(&b.source_url))
    });
    let position: HashMap<(crate::platform::Platform, &str), usize> = sources
        .iter()
        .map(|s| ((s.platform, s.source_url.as_str()), s.discovery_index))
        .collect();
    let pos_of = |e: &ProvenanceEntry| {
        position
            .get(&(e.platform, e.source_url.as_str()))
            .copied()
            .unwrap_or(usize::MAX)
    };

    // Union of provenance entries, identity = (field, platform, url, value).
    let mut entries: Vec<ProvenanceEntry> = Vec::new();
    for m in &members {
        for e in &m.provenance {
            match entries.iter_mut().find(|x| {
                x.field == e.field
                    && x.platform == e.platform
                    && x.source_url == e.source_url
                    && x.value == e.value
            }) {
                Some(x) => {
                    x.confidence = x.confidence.max(e.confidence);
                    x.observed_at = x.observed_at.max(e.observed_at);
                }
                None => entries.push(ProvenanceEntry {
                    selected: false,
                    ..e.clone()
                }),
            }
        }
    }

    // Record-level winner: source_platform/source_url and additional_data precedence.
    let best_member = |a: &Prospect, b: &Prospect| {
        priorities
            .priority(b.source_platform)
            .cmp(&priorities.priority(a.source_platform))
            .then_with(|| a.discovery_index().cmp(&b.discovery_index()))
    };
    let mut by_rank: Vec<&Prospect> = members.iter().collect();
    by_rank.sort_by(|a, b| best_member(a, b));
    let head = by_rank[0];

    let mut merged = Prospect::new(head.source_platform, head.source_url.clone(), 0);
    merged.engagement_score = head.engagement_score;
    merged.relevance_score = head.relevance_score;

    let entry_order = |a: &ProvenanceEntry, b: &ProvenanceEntry| -> Ordering {
        priorities
            .priority(b.platform)
            .cmp(&priorities.priority(a.platform))
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| b.observed_at.cmp(&a.observed_at))
            .then_with(|| pos_of(a).cmp(&pos_of(b)))
    };

    for field in Field::ALL {
        let winner = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.field == field)
            .min_by(|(_, a), (_, b)| {
                if field == Field::LastActivity {
                    // latest activity wins outright
                    timestamp(b).cmp(&timestamp(a)).then_with(|| entry_order(a, b))
                } else {
                    entry_order(a, b)
                }
            })
            .map(|(i, _)| i);
        if let Some(i) = winner {
            entries[i].selected = true;
            merged.assign(field, Some(entries[i].value.clone()));
        }
    }

    // Fields carried only on the record (no provenance), e.g. hand-built input.
    for field in Field::ALL {
        if merged.field(field).is_none() {
            if let Some(v) = by_rank.iter().find_map(|m| m.field(field)) {
                merged.assign(field, Some(v));
            }
        }
    }
    if let Some(latest) = members.iter().filter_map(|m| m.last_activity).max() {
        if merged.last_activity.map_or(true, |t| t < latest) {
            merged.last_activity = Some(latest);
        }
    }

    entries.sort_by(|a, b| {
        a.field
            .cmp(&b.field)
            .then_with(|| pos_of(a).cmp(&pos_of(b)))
            .then_with(|| a.platform.cmp(&b.platform))
            .then_with(|| a.value.cmp(&b.value))
    });
    merged.provenance = entries;
    merged.sources = sources;

    merged.additional_data = merge_additional(&by_rank);
    merged
}

fn timestamp(e: &ProvenanceEntry) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(&e.value)
        .ok()
        .map(|t| t.with_timezone(&chrono::Utc))
}

/// Higher-ranked records win scalar conflicts; event lists are concatenated.
fn merge_additional(by_rank: &[&Prospect]) -> BTreeMap<String, Value> {
    let mut out: BTreeMap<String, Value> = BTreeMap::new();
    let mut events: Vec<Value> = Vec::new();
    for m in by_rank {
        for (k, v) in &m.additional_data {
            if k == signals::EVENTS {
                if let Value::Array(items) = v {
                    for it in items {
                        if !events.contains(it) {
                            events.push(it.clone());
                        }
                    }
                }
                continue;
            }
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    if !events.is_empty() {
        out.insert(signals::EVENTS.to_string(), Value::Array(events));
    }
    out
}
