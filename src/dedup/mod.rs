// src/dedup/mod.rs
//! # Deduplication
//!
//! Four matching tiers, strongest first:
//!
//! 1. same email
//! 2. same profile URL (LinkedIn / Twitter / GitHub)
//! 3. same folded name + company
//! 4. fuzzy name (`strsim::jaro_winkler` on cleaned names), only between
//!    clusters sharing a company or industry token
//!
//! Tiers work on clusters, not single records: each union makes the merged
//! cluster's keys available to later comparisons, and the tiers are repeated
//! until nothing changes. Feeding the output back in is therefore a no-op.
//! Two clusters that both carry an email are only ever joined when the
//! emails agree.

pub mod keys;
pub mod merge;

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tracing::{debug, trace};

use crate::platform::Platform;
use crate::prospect::Prospect;
use crate::source::{default_priority, SourceConfig};
use crate::telemetry::anon_hash;
use keys::ClusterKeys;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.94;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Jaro-Winkler similarity a cleaned name pair needs, [0,1].
    pub fuzzy_threshold: f64,
    pub fuzzy_enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fuzzy_enabled: true,
        }
    }
}

/// Source priority lookup for merge decisions; unknown platforms use the
/// built-in table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePriorities(BTreeMap<Platform, u8>);

impl SourcePriorities {
    pub fn from_pairs<I: IntoIterator<Item = (Platform, u8)>>(pairs: I) -> Self {
        Self(pairs.into_iter().collect())
    }

    pub fn from_configs(configs: &[SourceConfig]) -> Self {
        Self::from_pairs(configs.iter().map(|c| (c.platform, c.priority)))
    }

    pub fn priority(&self, platform: Platform) -> u8 {
        self.0
            .get(&platform)
            .copied()
            .unwrap_or_else(|| default_priority(platform))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Email,
    Profile,
    NameCompany,
    Fuzzy,
}

impl Tier {
    fn as_str(&self) -> &'static str {
        match self {
            Tier::Email => "email",
            Tier::Profile => "profile_url",
            Tier::NameCompany => "name_company",
            Tier::Fuzzy => "fuzzy_name",
        }
    }
}

/// Union-find over record indices; the smaller index is always the root so
/// results do not depend on union order.
struct Clusters {
    parent: Vec<usize>,
    keys: Vec<ClusterKeys>,
}

impl Clusters {
    fn new(keys: Vec<ClusterKeys>) -> Self {
        Self {
            parent: (0..keys.len()).collect(),
            keys,
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn roots(&mut self) -> Vec<usize> {
        (0..self.parent.len()).filter(|&i| self.find(i) == i).collect()
    }

    /// Join two clusters unless the email guard forbids it.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb || !self.keys[ra].email_compatible(&self.keys[rb]) {
            return false;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        let absorbed = std::mem::take(&mut self.keys[child]);
        self.keys[root].absorb(absorbed);
        self.parent[child] = root;
        true
    }

    /// One pass of an exact-key tier. Returns whether anything merged.
    fn exact_pass<K, F>(&mut self, tier: Tier, keys_of: F) -> bool
    where
        K: Eq + Hash + Clone,
        F: Fn(&ClusterKeys) -> Vec<K>,
    {
        let mut changed = false;
        let mut seen: HashMap<K, Vec<usize>> = HashMap::new();
        for r in self.roots() {
            let mut r = self.find(r);
            for key in keys_of(&self.keys[r]) {
                let holders = seen.entry(key).or_default();
                let mut joined = false;
                for &h in holders.iter() {
                    if self.union(h, r) {
                        trace!(target: "dedup", tier = tier.as_str(), a = h, b = r, "clusters joined");
                        changed = true;
                        joined = true;
                        r = self.find(r);
                        break;
                    }
                }
                if !joined {
                    holders.push(r);
                }
            }
        }
        changed
    }

    fn fuzzy_pass(&mut self, threshold: f64) -> bool {
        let mut changed = false;
        let roots = self.roots();
        let mut blocks: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for &r in &roots {
            if self.keys[r].names.is_empty() {
                continue;
            }
            for b in &self.keys[r].blocks {
                blocks.entry(b.clone()).or_default().push(r);
            }
        }
        for members in blocks.values() {
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    let (ra, rb) = (self.find(a), self.find(b));
                    if ra == rb {
                        continue;
                    }
                    let sim = best_similarity(&self.keys[ra], &self.keys[rb]);
                    if sim >= threshold && self.union(ra, rb) {
                        trace!(target: "dedup", tier = Tier::Fuzzy.as_str(), a = ra, b = rb, sim, "clusters joined");
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

fn best_similarity(a: &ClusterKeys, b: &ClusterKeys) -> f64 {
    let mut best = 0.0f64;
    for x in &a.names {
        for y in &b.names {
            best = best.max(strsim::jaro_winkler(x, y));
        }
    }
    best
}

#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    cfg: DedupConfig,
}

impl DedupEngine {
    pub fn new(cfg: DedupConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.cfg
    }

    /// Merge with built-in source priorities.
    pub fn deduplicate(&self, prospects: Vec<Prospect>) -> Vec<Prospect> {
        self.deduplicate_with(prospects, &SourcePriorities::default())
    }

    /// Merge records of the same entity. Output is ordered by each cluster's
    /// earliest discovery index.
    pub fn deduplicate_with(
        &self,
        prospects: Vec<Prospect>,
        priorities: &SourcePriorities,
    ) -> Vec<Prospect> {
        let n = prospects.len();
        if n < 2 {
            return prospects;
        }

        let mut clusters = Clusters::new(prospects.iter().map(ClusterKeys::of).collect());
        let threshold = self.cfg.fuzzy_threshold.clamp(0.0, 1.0);
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            let mut changed = false;
            changed |= clusters.exact_pass(Tier::Email, |k| k.emails.iter().cloned().collect());
            changed |= clusters.exact_pass(Tier::Profile, |k| k.profiles.iter().cloned().collect());
            changed |=
                clusters.exact_pass(Tier::NameCompany, |k| k.name_company.iter().cloned().collect());
            if self.cfg.fuzzy_enabled {
                changed |= clusters.fuzzy_pass(threshold);
            }
            if !changed {
                break;
            }
        }

        let mut grouped: BTreeMap<usize, Vec<Prospect>> = BTreeMap::new();
        for (i, p) in prospects.into_iter().enumerate() {
            let root = clusters.find(i);
            grouped.entry(root).or_default().push(p);
        }

        let mut out: Vec<Prospect> = grouped
            .into_values()
            .map(|members| {
                if members.len() > 1 {
                    debug!(
                        target: "dedup",
                        size = members.len(),
                        id = %anon_hash(&members[0].name),
                        "cluster merged"
                    );
                }
                merge::merge_cluster(members, priorities)
            })
            .collect();
        out.sort_by_key(Prospect::discovery_index);

        let merged = n - out.len();
        if merged > 0 {
            counter!("leads_dedup_merged_total").increment(merged as u64);
        }
        debug!(target: "dedup", input = n, output = out.len(), rounds, "deduplication done");
        out
    }
}
