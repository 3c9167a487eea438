//! Chunked parallel merge.
//!
//! Each round cuts the forest into contiguous chunks of
//! `max(2, ceil(size / workers))` trees. Every chunk, independently and on
//! its own worker, merges its single most similar pair; results are
//! concatenated in chunk order, so a round shrinks the forest by at most
//! one tree per chunk and the outcome does not depend on scheduling.

use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{disambiguate, extract, restore, tree_similarity, ForestMerger, MergeReport};
use crate::error::{Error, Result};
use crate::hierarchy::TreeNode;

/// Result of one chunk's turn.
struct ChunkOutcome {
    trees: Vec<TreeNode>,
    merged: bool,
    failure: Option<Error>,
}

impl ForestMerger<'_> {
    pub(super) fn merge_chunked(
        &self,
        trees: &mut Vec<TreeNode>,
        report: &mut MergeReport,
    ) -> Result<()> {
        let workers = self.config.workers;

        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("forest-merge-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        while trees.len() > report.target {
            let size = trees.len();
            let chunk = chunk_size(size, workers);
            let chunks = split_into_chunks(std::mem::take(trees), chunk);

            #[cfg(feature = "parallel")]
            let outcomes: Vec<ChunkOutcome> = pool.install(|| {
                chunks
                    .into_par_iter()
                    .map(|c| self.merge_chunk(c))
                    .collect()
            });

            #[cfg(not(feature = "parallel"))]
            let outcomes: Vec<ChunkOutcome> =
                chunks.into_iter().map(|c| self.merge_chunk(c)).collect();

            let mut fresh = Vec::new();
            for outcome in outcomes {
                trees.extend(outcome.trees);
                if outcome.merged {
                    fresh.push(trees.len() - 1);
                }
                if let Some(e) = outcome.failure {
                    report.failures.push(e);
                }
            }
            let merged = fresh.len();
            report.renamed += disambiguate(trees, &fresh);
            report.rounds += 1;
            report.merges += merged;
            debug!(
                round = report.rounds,
                size,
                chunk,
                merged,
                remaining = trees.len(),
                "chunk merge round"
            );

            if merged == 0 {
                warn!(size, "no chunk merged this round, stopping");
                break;
            }
        }
        Ok(())
    }

    /// Merge the most similar pair of one chunk. The concept is appended
    /// after the chunk's untouched members.
    fn merge_chunk(&self, mut chunk: Vec<TreeNode>) -> ChunkOutcome {
        let Some((i, j)) = best_pair(&chunk) else {
            return ChunkOutcome {
                trees: chunk,
                merged: false,
                failure: None,
            };
        };

        let picks = [i, j];
        let members = extract(&mut chunk, &picks);
        match self.absorb(members) {
            Ok(concept) => {
                chunk.push(concept);
                ChunkOutcome {
                    trees: chunk,
                    merged: true,
                    failure: None,
                }
            }
            Err((members, e)) => {
                warn!(error = %e, "could not name chunk pair, leaving it unmerged");
                restore(&mut chunk, &picks, members);
                ChunkOutcome {
                    trees: chunk,
                    merged: false,
                    failure: Some(e),
                }
            }
        }
    }
}

/// `max(2, ceil(size / workers))`.
pub(crate) fn chunk_size(size: usize, workers: usize) -> usize {
    size.div_ceil(workers.max(1)).max(2)
}

fn split_into_chunks(trees: Vec<TreeNode>, chunk: usize) -> Vec<Vec<TreeNode>> {
    let mut chunks = Vec::with_capacity(trees.len().div_ceil(chunk));
    let mut current = Vec::with_capacity(chunk);
    for tree in trees {
        current.push(tree);
        if current.len() == chunk {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(chunk)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Indices `(i, j)`, `i < j`, of the most similar pair; the first pair wins
/// ties. `None` for fewer than two trees.
fn best_pair(trees: &[TreeNode]) -> Option<(usize, usize)> {
    let mut best = None;
    let mut best_score = f64::NEG_INFINITY;
    for i in 0..trees.len() {
        for j in (i + 1)..trees.len() {
            let score = tree_similarity(&trees[i], &trees[j]);
            if score > best_score {
                best_score = score;
                best = Some((i, j));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::super::test_support::*;
    use super::*;
    use crate::config::MergeConfig;
    use crate::hierarchy::PathForest;
    use crate::merge::MergeStrategy;

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(16, 8), 2);
        assert_eq!(chunk_size(17, 8), 3);
        assert_eq!(chunk_size(5, 8), 2);
        assert_eq!(chunk_size(100, 8), 13);
        assert_eq!(chunk_size(3, 1), 3);
    }

    #[test]
    fn test_split_keeps_order() {
        let (forest, _) = uniform_forest(5);
        let chunks = split_into_chunks(forest.trees().to_vec(), 2);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(chunks[2][0].label, "t4");
    }

    #[test]
    fn test_best_pair() {
        let mk = |label: &str, v: Vec<f32>| TreeNode::new(label, label).with_embedding(v);
        let trees = vec![
            mk("a", vec![1.0, 0.0]),
            mk("b", vec![0.0, 1.0]),
            mk("c", vec![0.1, 1.0]),
        ];
        assert_eq!(best_pair(&trees), Some((1, 2)));
        assert_eq!(best_pair(&trees[..1]), None);
    }

    #[test]
    fn test_sixteen_trees_reach_four() {
        let (mut forest, embedder) = orthogonal_forest(16);
        let oracle = CountingOracle::default();
        let report = ForestMerger::new(MergeConfig::default(), &embedder, &oracle)
            .merge(&mut forest)
            .unwrap();

        assert_eq!(report.strategy, MergeStrategy::ChunkedParallel);
        assert_eq!(report.target, 4);
        assert!(forest.len() <= 4);
        assert!(report.reached_target());
        assert_eq!(report.merges, 12);
        assert!(report.failures.is_empty());

        // All 16 original trees survive somewhere below the concepts.
        assert_eq!(forest.node_count(), 16 * 2 + report.merges);
        assert_concept_prefixes(forest.trees());
        let leaf_paths: Vec<&str> = forest
            .root()
            .iter()
            .filter(|n| n.label == "leaf")
            .map(|n| n.path.as_str())
            .collect();
        assert_eq!(leaf_paths.len(), 16);
        assert!(leaf_paths.iter().all(|p| p.starts_with('C')));
    }

    #[test]
    fn test_merges_most_similar_pair_in_chunk() {
        // One chunk (workers = 1): b and c are near-identical.
        let paths = ["a", "b", "c", "d", "e"];
        let mut forest = PathForest::build(&paths).unwrap();
        let vectors: HashMap<String, Vec<f32>> = [
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![0.0, 1.0, 0.0]),
            ("c", vec![0.0, 1.0, 0.05]),
            ("d", vec![0.0, 0.0, 1.0]),
            ("e", vec![-1.0, 0.0, 0.0]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let embedder = FixedEmbedder {
            vectors,
            dimension: 3,
        };
        let oracle = CountingOracle::default();
        let config = MergeConfig::default().with_workers(1);
        let report = ForestMerger::new(config, &embedder, &oracle)
            .merge(&mut forest)
            .unwrap();

        assert_eq!(report.rounds, 2);
        let first = forest.root().iter().find(|n| n.label == "C0").unwrap();
        let members: Vec<&str> = first.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(members, vec!["b", "c"]);
        // C0 was itself absorbed into C1 in the second round.
        assert_eq!(first.children[0].path, "C1.C0.b");
    }

    #[test]
    fn test_naming_failure_leaves_forest_unmerged() {
        let (mut forest, embedder) = uniform_forest(9);
        let before = forest.clone();
        let oracle = BrokenOracle;
        let report = ForestMerger::new(MergeConfig::default(), &embedder, &oracle)
            .merge(&mut forest)
            .unwrap();

        assert_eq!(report.merges, 0);
        assert_eq!(report.rounds, 1);
        assert!(!report.failures.is_empty());
        let labels: Vec<&str> = forest.trees().iter().map(|t| t.label.as_str()).collect();
        let expected: Vec<&str> = before.trees().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, expected);
    }

    #[test]
    fn test_result_is_deterministic() {
        let run = || {
            let (mut forest, embedder) = orthogonal_forest(20);
            let oracle = CountingOracle::default();
            ForestMerger::new(MergeConfig::default().with_workers(4), &embedder, &oracle)
                .merge(&mut forest)
                .unwrap();
            forest
        };
        // Oracle numbering follows completion order, so compare member sets.
        let shape = |f: &PathForest| -> Vec<Vec<String>> {
            f.trees()
                .iter()
                .map(|t| {
                    let mut leaves: Vec<String> = t
                        .iter()
                        .filter(|n| !n.synthetic && n.label != "leaf")
                        .map(|n| n.label.clone())
                        .collect();
                    leaves.sort();
                    leaves
                })
                .collect()
        };
        assert_eq!(shape(&run()), shape(&run()));
    }
}
