//! Forest reduction: grouping similar top-level trees under concepts.
//!
//! A forest of `n` top-level trees is reduced toward `ceil(sqrt(n))` trees.
//! Each merge takes a group of trees, asks the [`ConceptOracle`] for a name
//! summarizing their labels, embeds that name, and replaces the group with
//! one synthetic concept node whose children are the group members. Every
//! absorbed node, and all of its descendants, gets `concept.` prefixed to
//! its path.
//!
//! # Strategies
//!
//! | Strategy | Selection | Termination |
//! |----------|-----------|-------------|
//! | [`ChunkedParallel`](MergeStrategy::ChunkedParallel) | best pair per contiguous chunk, chunks in parallel | target reached, or a round merges nothing |
//! | [`RandomizedThreshold`](MergeStrategy::RandomizedThreshold) | random reference plus its most similar trees while a dampened running product stays above threshold | target reached, or too many consecutive fruitless rounds |
//! | [`Grouped`](MergeStrategy::Grouped) | groups assigned by the [`SchemaSource`] | one pass |
//!
//! Forests smaller than [`MergeConfig::min_forest_size`] are left alone.
//!
//! # Failure Handling
//!
//! Naming goes through [`resolve_concept`], which retries the oracle once.
//! When naming (or embedding the name) still fails, the group stays
//! unmerged, the error is recorded in [`MergeReport::failures`], and the
//! merge carries on.
//!
//! # Concept Names
//!
//! Top-level labels stay unique. The oracle is free to repeat itself, so a
//! fresh concept whose name is already taken at the top level is renamed
//! `name_2`, `name_3`, ... before the next round sees it, and counted in
//! [`MergeReport::renamed`]. Input trees are never renamed.

mod chunked;
mod grouped;
mod randomized;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MergeConfig;
use crate::embedding::{similarity, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::hierarchy::{PathForest, TreeNode};
use crate::oracle::{resolve_concept, ConceptOracle, MAX_ATTEMPTS};
use crate::schema::SchemaSource;

/// Forest reduction algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Best pair per chunk, chunks merged concurrently.
    #[default]
    ChunkedParallel,
    /// Random reference with a cumulative similarity threshold.
    RandomizedThreshold,
    /// Groups assigned by the schema source.
    Grouped,
}

impl MergeStrategy {
    /// All strategies.
    pub const ALL: [MergeStrategy; 3] = [
        MergeStrategy::ChunkedParallel,
        MergeStrategy::RandomizedThreshold,
        MergeStrategy::Grouped,
    ];

    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            MergeStrategy::ChunkedParallel => "chunked_parallel",
            MergeStrategy::RandomizedThreshold => "randomized_threshold",
            MergeStrategy::Grouped => "grouped",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MergeStrategy {
    type Err = Error;

    /// Accepts the canonical names and the short class-style aliases
    /// (`ChunkMerge`, `RandomMerge`, `GroupMerge`), ignoring case, `_`
    /// and `-`.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "chunkedparallel" | "chunked" | "chunkmerge" => Ok(MergeStrategy::ChunkedParallel),
            "randomizedthreshold" | "randomized" | "randommerge" => {
                Ok(MergeStrategy::RandomizedThreshold)
            }
            "grouped" | "groupmerge" => Ok(MergeStrategy::Grouped),
            _ => Err(Error::InvalidParameter {
                name: "strategy",
                message: "expected chunked_parallel, randomized_threshold or grouped",
            }),
        }
    }
}

/// What a merge did.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Strategy that ran.
    pub strategy: MergeStrategy,
    /// Top-level trees before merging.
    pub initial_size: usize,
    /// `ceil(sqrt(initial_size))`.
    pub target: usize,
    /// Top-level trees after merging.
    pub final_size: usize,
    /// Rounds executed.
    pub rounds: usize,
    /// Concept nodes created.
    pub merges: usize,
    /// Fruitless rounds in a row when the merge stopped.
    pub consecutive_failures: usize,
    /// The forest was below the minimum size and left alone.
    pub skipped: bool,
    /// Concepts renamed because their name was already in use.
    pub renamed: usize,
    /// Naming or grouping failures that left groups unmerged.
    pub failures: Vec<Error>,
}

impl MergeReport {
    fn new(strategy: MergeStrategy, initial_size: usize) -> Self {
        Self {
            strategy,
            initial_size,
            target: target_size(initial_size),
            final_size: initial_size,
            ..Self::default()
        }
    }

    /// Whether the forest ended at or below the target size.
    pub fn reached_target(&self) -> bool {
        self.final_size <= self.target
    }
}

/// `ceil(sqrt(n))`, computed exactly.
pub fn target_size(n: usize) -> usize {
    let mut r = (n as f64).sqrt() as usize;
    while r * r > n {
        r -= 1;
    }
    if r * r < n {
        r += 1;
    }
    r
}

/// Runs one [`MergeStrategy`] over a forest.
pub struct ForestMerger<'a> {
    config: MergeConfig,
    provider: &'a dyn EmbeddingProvider,
    oracle: &'a dyn ConceptOracle,
    schema: Option<&'a dyn SchemaSource>,
}

impl<'a> ForestMerger<'a> {
    /// Create a merger naming concepts with `oracle` and embedding them with
    /// `provider`.
    pub fn new(
        config: MergeConfig,
        provider: &'a dyn EmbeddingProvider,
        oracle: &'a dyn ConceptOracle,
    ) -> Self {
        Self {
            config,
            provider,
            oracle,
            schema: None,
        }
    }

    /// Supply the grouping source needed by [`MergeStrategy::Grouped`].
    pub fn with_schema(mut self, schema: &'a dyn SchemaSource) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Reduce the forest's top-level trees in place.
    ///
    /// Fails only on invalid configuration, a missing schema source for the
    /// grouped strategy, a top-level tree that cannot be embedded, or a
    /// worker pool that cannot start. Naming failures are reported, not
    /// returned.
    pub fn merge(&self, forest: &mut PathForest) -> Result<MergeReport> {
        self.config.validate()?;
        let strategy = self.config.strategy;
        if strategy == MergeStrategy::Grouped && self.schema.is_none() {
            return Err(Error::InvalidParameter {
                name: "strategy",
                message: "grouped merge needs a schema source",
            });
        }

        let mut report = MergeReport::new(strategy, forest.len());
        if forest.len() < self.config.min_forest_size {
            info!(
                size = forest.len(),
                min = self.config.min_forest_size,
                "forest too small, skipping merge"
            );
            report.skipped = true;
            return Ok(report);
        }

        for tree in forest.trees_mut().iter_mut() {
            if tree.embedding.is_none() {
                tree.embedding = Some(embed_with_retry(self.provider, &tree.label)?);
            }
        }

        info!(
            strategy = %strategy,
            size = report.initial_size,
            target = report.target,
            "merging forest"
        );
        let trees = forest.trees_mut();
        match strategy {
            MergeStrategy::ChunkedParallel => self.merge_chunked(trees, &mut report)?,
            MergeStrategy::RandomizedThreshold => self.merge_randomized(trees, &mut report),
            MergeStrategy::Grouped => self.merge_grouped(trees, &mut report),
        }

        report.final_size = trees.len();
        info!(
            strategy = %strategy,
            initial = report.initial_size,
            final_size = report.final_size,
            rounds = report.rounds,
            merges = report.merges,
            renamed = report.renamed,
            failures = report.failures.len(),
            "forest merge finished"
        );
        Ok(report)
    }

    /// Name `members`, embed the name, and hang them under a new concept.
    /// On failure the members come back untouched with the error.
    fn absorb(
        &self,
        members: Vec<TreeNode>,
    ) -> std::result::Result<TreeNode, (Vec<TreeNode>, Error)> {
        let labels: Vec<&str> = members.iter().map(|m| m.label.as_str()).collect();
        let name = match resolve_concept(self.oracle, &labels) {
            Ok(name) => name,
            Err(e) => return Err((members, e)),
        };
        let embedding = match embed_with_retry(self.provider, &name) {
            Ok(v) => v,
            Err(e) => return Err((members, e)),
        };

        let mut concept = TreeNode::concept(name, Some(embedding));
        for mut member in members {
            member.prefix_paths(&concept.label);
            concept.children.push(member);
        }
        Ok(concept)
    }
}

/// Give every tree at `fresh` a label no other tree in `trees` carries,
/// appending `_2`, `_3`, ... on a clash. Trees not in `fresh` keep their
/// labels. Returns the number of renames.
fn disambiguate(trees: &mut [TreeNode], fresh: &[usize]) -> usize {
    let mut taken: HashSet<String> = trees
        .iter()
        .enumerate()
        .filter(|(i, _)| !fresh.contains(i))
        .map(|(_, t)| t.label.clone())
        .collect();

    let mut renamed = 0;
    for &i in fresh {
        let tree = &mut trees[i];
        if taken.insert(tree.label.clone()) {
            continue;
        }
        let mut n = 2;
        let mut label = format!("{}_{n}", tree.label);
        while taken.contains(&label) {
            n += 1;
            label = format!("{}_{n}", tree.label);
        }
        warn!(concept = %tree.label, renamed = %label, "concept name already in use");
        tree.relabel(&label);
        taken.insert(label);
        renamed += 1;
    }
    renamed
}

/// Similarity of two trees' embeddings; unusable pairs score `-1`.
fn tree_similarity(a: &TreeNode, b: &TreeNode) -> f64 {
    similarity(a.embedding.as_deref(), b.embedding.as_deref()).unwrap_or(-1.0)
}

fn embed_with_retry(provider: &dyn EmbeddingProvider, label: &str) -> Result<Vec<f32>> {
    let mut last = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match provider.embed(label) {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!(label, attempt, error = %e, "embedding attempt failed");
                last = Some(e);
            }
        }
    }
    Err(last.unwrap_or(Error::EmptyVector))
}

/// Remove the trees at `picks` (distinct indices), returned in `picks` order.
fn extract(trees: &mut Vec<TreeNode>, picks: &[usize]) -> Vec<TreeNode> {
    let mut order: Vec<(usize, usize)> = picks.iter().copied().enumerate().collect();
    order.sort_by(|a, b| b.1.cmp(&a.1));
    let mut slots: Vec<Option<TreeNode>> = picks.iter().map(|_| None).collect();
    for (slot, index) in order {
        slots[slot] = Some(trees.remove(index));
    }
    slots.into_iter().flatten().collect()
}

/// Undo [`extract`]: put `members` back at their original `picks` positions.
fn restore(trees: &mut Vec<TreeNode>, picks: &[usize], members: Vec<TreeNode>) {
    let mut placed: Vec<(usize, TreeNode)> = picks.iter().copied().zip(members).collect();
    placed.sort_by_key(|(index, _)| *index);
    for (index, member) in placed {
        trees.insert(index, member);
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::ConceptGraph;
    use crate::hierarchy::HealthCheck;

    #[test]
    fn test_target_size() {
        assert_eq!(target_size(0), 0);
        assert_eq!(target_size(1), 1);
        assert_eq!(target_size(5), 3);
        assert_eq!(target_size(16), 4);
        assert_eq!(target_size(17), 5);
        assert_eq!(target_size(100), 10);
    }

    #[test]
    fn test_strategy_names() {
        for s in MergeStrategy::ALL {
            assert_eq!(s.name().parse::<MergeStrategy>().unwrap(), s);
        }
        assert_eq!("ChunkMerge".parse::<MergeStrategy>().unwrap(), MergeStrategy::ChunkedParallel);
        assert_eq!(
            "RandomMerge".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::RandomizedThreshold
        );
        assert_eq!(
            "Randomized-Threshold".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::RandomizedThreshold
        );
        assert!("SpectralMerge".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn test_strategy_serde() {
        let json = serde_json::to_string(&MergeStrategy::RandomizedThreshold).unwrap();
        assert_eq!(json, "\"randomized_threshold\"");
        let back: MergeStrategy = serde_json::from_str("\"grouped\"").unwrap();
        assert_eq!(back, MergeStrategy::Grouped);
    }

    #[test]
    fn test_small_forest_is_skipped() {
        let (mut forest, embedder) = uniform_forest(4);
        let oracle = CountingOracle::default();
        let before = forest.clone();
        let report = ForestMerger::new(MergeConfig::default(), &embedder, &oracle)
            .merge(&mut forest)
            .unwrap();
        assert!(report.skipped);
        assert_eq!(forest, before);
        assert_eq!(oracle.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_grouped_requires_schema() {
        let (mut forest, embedder) = uniform_forest(6);
        let oracle = CountingOracle::default();
        let err = ForestMerger::new(MergeConfig::new(MergeStrategy::Grouped), &embedder, &oracle)
            .merge(&mut forest)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "strategy", .. }));
        assert_eq!(forest.len(), 6);
    }

    #[test]
    fn test_extract_restore_round_trip() {
        let (forest, _) = uniform_forest(6);
        let mut trees = forest.trees().to_vec();
        let original = trees.clone();
        let picks = [4, 1, 3];
        let members = extract(&mut trees, &picks);
        let labels: Vec<&str> = members.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["t4", "t1", "t3"]);
        assert_eq!(trees.len(), 3);
        restore(&mut trees, &picks, members);
        assert_eq!(trees, original);
    }

    #[test]
    fn test_disambiguate_renames_fresh_concepts_only() {
        let mut trees = vec![
            TreeNode::new("t0", "t0"),
            TreeNode::concept("Sensors", None),
            TreeNode::concept("Sensors", None),
            TreeNode::concept("t0", None),
            TreeNode::concept("Sensors", None),
        ];
        let renamed = disambiguate(&mut trees, &[2, 3, 4]);
        assert_eq!(renamed, 3);
        let labels: Vec<&str> = trees.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["t0", "Sensors", "Sensors_2", "t0_2", "Sensors_3"]);
        assert_eq!(trees[3].path, "t0_2");
    }

    #[test]
    fn test_repeated_concept_names_keep_every_column() {
        let (mut forest, embedder) = uniform_forest(16);
        let oracle = SameNameOracle("Sensors");
        let leaves = leaf_count(forest.trees());
        let report = ForestMerger::new(MergeConfig::default(), &embedder, &oracle)
            .merge(&mut forest)
            .unwrap();

        assert_eq!(report.final_size, 4);
        assert_eq!(report.renamed, 10);
        assert!(report.failures.is_empty());
        assert_unique_labels(forest.trees());
        assert_concept_prefixes(forest.trees());
        assert_eq!(leaf_count(forest.trees()), leaves);
        assert!(forest.is_healthy(), "{}", forest.health_check());

        let graph = ConceptGraph::new(forest.root(), GraphConfig::default()).unwrap();
        assert_eq!(graph.arena().len(), forest.root().node_count());
        let graph_leaves = graph
            .arena()
            .iter()
            .filter(|(idx, n)| *idx != 0 && n.children().is_empty())
            .count();
        assert_eq!(graph_leaves, leaves);
    }

    #[test]
    fn test_randomized_concept_named_after_remaining_tree() {
        let paths: Vec<String> = (0..9).map(|i| format!("t{i}.leaf")).collect();
        let mut forest = PathForest::build(&paths).unwrap();
        let mut vectors = std::collections::HashMap::new();
        for i in 0..8 {
            vectors.insert(format!("t{i}"), vec![1.0, 0.0, 0.0, 0.0]);
        }
        vectors.insert("t8".to_string(), vec![0.0, 1.0, 0.0, 0.0]);
        let embedder = FixedEmbedder { vectors, dimension: 4 };
        let oracle = SameNameOracle("t8");

        let config = MergeConfig::new(MergeStrategy::RandomizedThreshold).with_seed(5);
        let report = ForestMerger::new(config, &embedder, &oracle)
            .merge(&mut forest)
            .unwrap();

        assert_eq!(report.merges, 1);
        assert_eq!(report.renamed, 1);
        let labels: Vec<&str> = forest.trees().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["t8", "t8_2"]);
        assert_concept_prefixes(forest.trees());
        assert_eq!(leaf_count(forest.trees()), 9);
    }

    #[test]
    fn test_absorb_failure_returns_members() {
        let (forest, embedder) = uniform_forest(2);
        let oracle = BrokenOracle;
        let merger = ForestMerger::new(MergeConfig::default(), &embedder, &oracle);
        let members = forest.trees().to_vec();
        let (back, err) = merger.absorb(members.clone()).unwrap_err();
        assert_eq!(back, members);
        assert!(matches!(err, Error::ConceptResolution { .. }));
    }
}
