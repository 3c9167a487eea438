//! Cross-subtree relation discovery.
//!
//! Candidate pairs are bucketed by the unordered pair of their top-level
//! subtrees (`rootId.x` / `rootId.y`). A pair's similarity is computed the
//! first time the pair is observed and never again; analysis then takes the
//! best visible pair per bucket and, if it clears the threshold, asks the
//! oracle to name the relation once and keeps the name for good.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::RelationConfig;
use crate::embedding::cosine_similarity;
use crate::error::Error;
use crate::oracle::{resolve_relation, ConceptOracle};

/// A scored link between two nodes of different subtrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Lexicographically smaller node id.
    pub from: String,
    /// Lexicographically larger node id.
    pub to: String,
    /// Cosine similarity of the two nodes.
    pub score: f64,
    /// Relation phrase, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Relation {
    /// Unordered pair key.
    pub fn key(&self) -> PairKey {
        pair_key(&self.from, &self.to)
    }
}

/// A node offered for comparison.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Effective node id.
    pub id: &'a str,
    /// Node embedding.
    pub embedding: &'a [f32],
}

/// Labeled relations plus the naming failures met on the way.
#[derive(Debug, Default)]
pub struct Analysis {
    /// Best labeled relation per bucket, sorted by `(from, to)`.
    pub relations: Vec<Relation>,
    /// Relations whose label could not be resolved this time.
    pub failures: Vec<Error>,
}

/// Incremental, cache-backed relation finder.
#[derive(Debug, Default)]
pub struct RelationAnalyzer {
    config: RelationConfig,
    buckets: DashMap<PairKey, HashMap<PairKey, Relation>>,
}

impl RelationAnalyzer {
    /// Create an analyzer.
    pub fn new(config: RelationConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    /// Whether children of a node at `depth` are still compared.
    pub fn within_depth(&self, depth: usize) -> bool {
        depth < self.config.max_depth
    }

    /// Score every not-yet-known pair between `fresh` and `visible` whose
    /// members belong to different top-level subtrees. Returns the number
    /// of pairs scored now.
    ///
    /// Insertion is atomic per bucket, so concurrent callers never score
    /// the same pair twice.
    pub fn observe(&self, fresh: &[Candidate<'_>], visible: &[Candidate<'_>]) -> usize {
        #[cfg(feature = "parallel")]
        let scored = fresh.par_iter().map(|f| self.observe_one(f, visible)).sum();

        #[cfg(not(feature = "parallel"))]
        let scored = fresh.iter().map(|f| self.observe_one(f, visible)).sum();

        debug!(
            fresh = fresh.len(),
            visible = visible.len(),
            scored,
            buckets = self.buckets.len(),
            "observed relation candidates"
        );
        scored
    }

    fn observe_one(&self, fresh: &Candidate<'_>, visible: &[Candidate<'_>]) -> usize {
        let fresh_root = subtree_id(fresh.id);
        let mut scored = 0;
        for other in visible {
            let other_root = subtree_id(other.id);
            if other.id == fresh.id || other_root == fresh_root {
                continue;
            }
            let mut bucket = self
                .buckets
                .entry(pair_key(fresh_root, other_root))
                .or_default();
            let key = pair_key(fresh.id, other.id);
            if bucket.contains_key(&key) {
                continue;
            }
            match cosine_similarity(fresh.embedding, other.embedding) {
                Ok(score) => {
                    let (from, to) = ordered(fresh.id, other.id);
                    bucket.insert(
                        key,
                        Relation {
                            from: from.to_string(),
                            to: to.to_string(),
                            score,
                            label: None,
                        },
                    );
                    scored += 1;
                }
                Err(e) => debug!(a = fresh.id, b = other.id, error = %e, "pair not comparable"),
            }
        }
        scored
    }

    /// Best relation per bucket among `visible` nodes, labeled.
    ///
    /// Only a bucket's single best pair is considered, and only if its score
    /// exceeds the threshold. Unlabeled winners are named through the oracle
    /// (retried once); the name is stored on the cached relation, so a later
    /// call never asks again. Winners that cannot be named are left out and
    /// reported in [`Analysis::failures`].
    pub fn analyze(&self, visible: &HashSet<String>, oracle: &dyn ConceptOracle) -> Analysis {
        let threshold = self.config.threshold;
        let keys: Vec<PairKey> = self.buckets.iter().map(|b| b.key().clone()).collect();

        #[cfg(feature = "parallel")]
        let winners: Vec<(PairKey, Relation)> = keys
            .par_iter()
            .filter_map(|k| self.best_in_bucket(k, visible, threshold))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let winners: Vec<(PairKey, Relation)> = keys
            .iter()
            .filter_map(|k| self.best_in_bucket(k, visible, threshold))
            .collect();

        let mut analysis = Analysis::default();
        for (bucket, mut relation) in winners {
            if relation.label.is_none() {
                match resolve_relation(oracle, last_segment(&relation.from), last_segment(&relation.to)) {
                    Ok(label) => {
                        if let Some(mut b) = self.buckets.get_mut(&bucket) {
                            if let Some(cached) = b.get_mut(&relation.key()) {
                                cached.label = Some(label.clone());
                            }
                        }
                        relation.label = Some(label);
                    }
                    Err(e) => {
                        warn!(from = %relation.from, to = %relation.to, error = %e, "relation left unlabeled");
                        analysis.failures.push(e);
                        continue;
                    }
                }
            }
            analysis.relations.push(relation);
        }
        analysis
            .relations
            .sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.to.cmp(&b.to)));

        debug!(
            buckets = keys.len(),
            relations = analysis.relations.len(),
            failures = analysis.failures.len(),
            "relation analysis"
        );
        analysis
    }

    fn best_in_bucket(
        &self,
        bucket: &PairKey,
        visible: &HashSet<String>,
        threshold: f64,
    ) -> Option<(PairKey, Relation)> {
        let entries = self.buckets.get(bucket)?;
        let best = entries
            .iter()
            .filter(|(_, r)| visible.contains(&r.from) && visible.contains(&r.to))
            .max_by(|(ka, a), (kb, b)| a.score.total_cmp(&b.score).then_with(|| kb.cmp(ka)))?;
        (best.1.score > threshold).then(|| (bucket.clone(), best.1.clone()))
    }

    /// Number of scored pairs.
    pub fn known_pairs(&self) -> usize {
        self.buckets.iter().map(|b| b.value().len()).sum()
    }

    /// Number of subtree-pair buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Cached relation for a node pair, if scored.
    pub fn get(&self, a: &str, b: &str) -> Option<Relation> {
        let bucket = pair_key(subtree_id(a), subtree_id(b));
        self.buckets.get(&bucket)?.get(&pair_key(a, b)).cloned()
    }
}

/// Id of the top-level subtree containing `id`: its first two segments.
pub fn subtree_id(id: &str) -> &str {
    match id.match_indices('.').nth(1) {
        Some((pos, _)) => &id[..pos],
        None => id,
    }
}

/// Unordered pair of ids, smaller first.
pub type PairKey = (String, String);

/// Unordered key of two ids.
pub fn pair_key(a: &str, b: &str) -> PairKey {
    let (x, y) = ordered(a, b);
    (x.to_string(), y.to_string())
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn last_segment(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}
