//! Merge by externally assigned groups.
//!
//! The schema source is asked once for a group label per top-level tree
//! name. Every group with more than one member becomes one concept, named
//! by the oracle like any other merge. Trees the source does not place, or
//! places in a singleton group, stay where they are.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{disambiguate, ForestMerger, MergeReport};
use crate::hierarchy::TreeNode;

impl ForestMerger<'_> {
    pub(super) fn merge_grouped(&self, trees: &mut Vec<TreeNode>, report: &mut MergeReport) {
        let Some(schema) = self.schema else {
            return;
        };
        report.rounds = 1;

        let names: Vec<String> = trees.iter().map(|t| t.label.clone()).collect();
        let rows = match schema.merge_labels(&names) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "grouping query failed, forest left unmerged");
                report.failures.push(e);
                return;
            }
        };

        let groups = assign_groups(&names, rows.iter().map(|r| (r.label.as_str(), r.name.as_str())));
        debug!(rows = rows.len(), groups = groups.len(), "grouping answer");

        let mut slots: Vec<Option<TreeNode>> = std::mem::take(trees).into_iter().map(Some).collect();
        let mut concepts = Vec::new();
        for (label, members) in groups {
            if members.len() < 2 {
                continue;
            }
            let group: Vec<TreeNode> = members.iter().filter_map(|&i| slots[i].take()).collect();
            match self.absorb(group) {
                Ok(concept) => {
                    debug!(group = label, concept = %concept.label, "merged group");
                    concepts.push(concept);
                    report.merges += 1;
                }
                Err((group, e)) => {
                    warn!(group = label, error = %e, "could not name group, leaving it unmerged");
                    for (&i, tree) in members.iter().zip(group) {
                        slots[i] = Some(tree);
                    }
                    report.failures.push(e);
                }
            }
        }

        trees.extend(slots.into_iter().flatten());
        let fresh: Vec<usize> = (trees.len()..trees.len() + concepts.len()).collect();
        trees.extend(concepts);
        report.renamed += disambiguate(trees, &fresh);
    }
}

/// Group label → member indices, in first-seen label order. Each tree joins
/// at most one group (its first row wins); unknown names are ignored.
fn assign_groups<'r>(
    names: &[String],
    rows: impl Iterator<Item = (&'r str, &'r str)>,
) -> Vec<(&'r str, Vec<usize>)> {
    let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        by_name.entry(name.as_str()).or_default().push(i);
    }

    let mut placed = vec![false; names.len()];
    let mut order: HashMap<&'r str, usize> = HashMap::new();
    let mut groups: Vec<(&'r str, Vec<usize>)> = Vec::new();
    for (label, name) in rows {
        let Some(indices) = by_name.get(name) else {
            continue;
        };
        for &i in indices {
            if placed[i] {
                continue;
            }
            placed[i] = true;
            let slot = *order.entry(label).or_insert_with(|| {
                groups.push((label, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(i);
        }
    }
    groups
}
