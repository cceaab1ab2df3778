// src/dedup/keys.rs
//! Identity keys per tier. Every key is built from all provenance values of a
//! record, not only the selected ones; name + company pairs stay per
//! contributing raw record.

use std::collections::{BTreeMap, BTreeSet};

use crate::platform::Platform;
use crate::prospect::{Field, Prospect};

const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "miss", "dr", "prof", "sir", "madam"];
const NAME_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "phd", "md", "mba", "esq"];
const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "llc", "ltd", "corp", "corporation", "gmbh", "company", "limited", "plc", "ag", "bv",
    "sro", "co", "sa",
];

/// Lowercase, punctuation to spaces, whitespace collapsed.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Folded name without honorifics, suffixes and single-letter initials.
pub fn clean_name(s: &str) -> String {
    fold(s)
        .split(' ')
        .filter(|t| t.chars().count() > 1)
        .filter(|t| !HONORIFICS.contains(t) && !NAME_SUFFIXES.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn email_key(s: &str) -> Option<String> {
    let e = s.trim().to_lowercase();
    (e.contains('@') && !e.starts_with('@') && !e.ends_with('@')).then_some(e)
}

/// Scheme, `www.`, query, fragment and trailing slash stripped; `x.com` folded
/// into `twitter.com`.
pub fn profile_key(s: &str) -> Option<String> {
    let mut u = s.trim().to_lowercase();
    if let Some(i) = u.find("://") {
        u = u[i + 3..].to_string();
    }
    if let Some(i) = u.find(['?', '#']) {
        u.truncate(i);
    }
    let mut u = u.trim_start_matches("www.").trim_end_matches('/').to_string();
    if let Some(rest) = u.strip_prefix("x.com/") {
        u = format!("twitter.com/{rest}");
    }
    // bare host without a path is a company site, not a person
    (u.contains('/') && !u.is_empty()).then_some(u)
}

/// Company/industry tokens used to block fuzzy comparisons.
pub fn block_tokens(s: &str) -> Vec<String> {
    fold(s)
        .split(' ')
        .filter(|t| t.chars().count() >= 3 && !LEGAL_SUFFIXES.contains(t))
        .map(str::to_string)
        .collect()
}

/// Keys of one cluster, grown as clusters absorb each other.
#[derive(Debug, Clone, Default)]
pub struct ClusterKeys {
    pub emails: BTreeSet<String>,
    pub profiles: BTreeSet<(Field, String)>,
    pub name_company: BTreeSet<(String, String)>,
    pub names: BTreeSet<String>,
    pub blocks: BTreeSet<String>,
}

impl ClusterKeys {
    pub fn of(p: &Prospect) -> Self {
        let mut k = ClusterKeys::default();
        let vals = |f: Field| -> BTreeSet<String> {
            p.values_of(f)
                .map(str::to_string)
                .chain(p.field(f))
                .collect()
        };

        k.emails = vals(Field::Email).iter().filter_map(|e| email_key(e)).collect();
        for f in [Field::LinkedinUrl, Field::TwitterUrl, Field::GithubUrl] {
            for v in vals(f) {
                if let Some(key) = profile_key(&v) {
                    k.profiles.insert((f, key));
                }
            }
        }

        // (name, company) pairs only as some contributing record had them,
        // so keys of a merged record equal the union of its members' keys.
        for (names, companies) in per_record(p).into_values() {
            for n in &names {
                let folded = fold(n);
                if folded.is_empty() {
                    continue;
                }
                for c in &companies {
                    k.name_company.insert((folded.clone(), c.clone()));
                }
            }
        }
        for n in vals(Field::Name) {
            let cleaned = clean_name(&n);
            if !cleaned.is_empty() {
                k.names.insert(cleaned);
            }
        }

        for v in vals(Field::Company).iter().chain(vals(Field::Industry).iter()) {
            k.blocks.extend(block_tokens(v));
        }
        k
    }

    pub fn absorb(&mut self, other: ClusterKeys) {
        self.emails.extend(other.emails);
        self.profiles.extend(other.profiles);
        self.name_company.extend(other.name_company);
        self.names.extend(other.names);
        self.blocks.extend(other.blocks);
    }

    /// Distinct identifiers win: never join two clusters that both carry an
    /// email unless they carry the same ones.
    pub fn email_compatible(&self, other: &ClusterKeys) -> bool {
        self.emails.is_empty() || other.emails.is_empty() || self.emails == other.emails
    }
}

type RecordKey = (Platform, String);

/// Names and folded companies grouped by the raw record that contributed them.
fn per_record(p: &Prospect) -> BTreeMap<RecordKey, (BTreeSet<String>, BTreeSet<String>)> {
    let mut out: BTreeMap<RecordKey, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
    for e in &p.provenance {
        let slot = out.entry((e.platform, e.source_url.clone())).or_default();
        match e.field {
            Field::Name => {
                slot.0.insert(e.value.clone());
            }
            Field::Company => {
                let c = fold(e.value.trim_start_matches('@'));
                if !c.is_empty() {
                    slot.1.insert(c);
                }
            }
            _ => {}
        }
    }
    if out.is_empty() {
        let slot = out.entry((p.source_platform, p.source_url.clone())).or_default();
        slot.0.extend(p.field(Field::Name));
        slot.1.extend(
            p.field(Field::Company)
                .map(|c| fold(c.trim_start_matches('@')))
                .filter(|c| !c.is_empty()),
        );
    }
    out
}
