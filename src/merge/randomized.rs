//! Randomized threshold merge.
//!
//! Each round picks a reference tree uniformly at random and ranks the
//! others by similarity to it, most similar first. Walking that ranking it
//! keeps a running product `cumulative *= 0.5 + similarity / 2` and takes
//! trees while `cumulative >= threshold`, stopping at the first one that
//! would drop below. A round that selects the reference plus at least one
//! other tree merges them; otherwise it counts as a failure. The merge ends
//! at the target size or after `max_consecutive_failures` failed rounds in
//! a row, so the target is not guaranteed.

use rand::prelude::*;
use tracing::{debug, info, warn};

use super::{disambiguate, extract, restore, tree_similarity, ForestMerger, MergeReport};
use crate::hierarchy::TreeNode;

impl ForestMerger<'_> {
    pub(super) fn merge_randomized(&self, trees: &mut Vec<TreeNode>, report: &mut MergeReport) {
        let threshold = self.config.similarity_threshold;
        let max_failures = self.config.max_consecutive_failures;

        let mut rng: Box<dyn RngCore> = match self.config.seed {
            Some(s) => Box::new(StdRng::seed_from_u64(s)),
            None => Box::new(rand::rng()),
        };

        let mut failures = 0;
        while trees.len() > report.target && failures < max_failures {
            report.rounds += 1;
            let reference = rng.random_range(0..trees.len());
            let picks = select_group(trees, reference, threshold);

            if picks.len() < 2 {
                failures += 1;
                debug!(
                    round = report.rounds,
                    reference = %trees[reference].label,
                    failures,
                    "no tree close enough to the reference"
                );
                continue;
            }

            let members = extract(trees, &picks);
            match self.absorb(members) {
                Ok(concept) => {
                    trees.push(concept);
                    let last = trees.len() - 1;
                    report.renamed += disambiguate(trees, &[last]);
                    let concept = &trees[last];
                    debug!(
                        round = report.rounds,
                        concept = %concept.label,
                        members = concept.children.len(),
                        "merged group"
                    );
                    report.merges += 1;
                    failures = 0;
                }
                Err((members, e)) => {
                    warn!(error = %e, "could not name group, leaving it unmerged");
                    restore(trees, &picks, members);
                    report.failures.push(e);
                    failures += 1;
                }
            }
        }

        report.consecutive_failures = failures;
        if failures >= max_failures {
            info!(
                failures,
                size = trees.len(),
                target = report.target,
                "consecutive failure limit reached, stopping"
            );
        }
    }
}

/// Indices of the reference followed by the trees it absorbs, in ranking
/// order.
fn select_group(trees: &[TreeNode], reference: usize, threshold: f64) -> Vec<usize> {
    let anchor = &trees[reference];
    let mut ranked: Vec<(usize, f64)> = trees
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != reference)
        .map(|(i, t)| (i, tree_similarity(anchor, t)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut picks = vec![reference];
    let mut cumulative = 1.0;
    for (i, score) in ranked {
        cumulative *= 0.5 + score / 2.0;
        if cumulative >= threshold {
            picks.push(i);
        } else {
            break;
        }
    }
    picks
}
