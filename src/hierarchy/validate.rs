//! Tree validation and health checking utilities.
//!
//! Detects the issues that make a forest misleading to explore:
//! - Empty labels (usually a `..` in a column name from the database)
//! - Duplicate labels among siblings
//! - Paths that no longer match the ancestor chain
//! - Orphaned nodes and cycles in index-linked trees
//!
//! # Example
//!
//! ```rust
//! use concept_forest::hierarchy::{HealthCheck, PathForest};
//!
//! let forest = PathForest::build(&["a.b", "a..c"]).unwrap();
//! let report = forest.health_check();
//! assert!(report.is_healthy());
//! assert!(!report.validation.is_clean());
//! ```

use std::collections::HashSet;
use std::fmt;

use super::forest::PathForest;
use super::node::TreeNode;

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Suspicious input that still yields a usable forest.
    Warning,
    /// Broken lineage or linkage.
    Error,
    /// Structure that is not a tree at all.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

/// One finding.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Path or id of the node concerned.
    pub node: Option<String>,
    /// Extra detail (expected path, parent label, ...).
    pub context: Option<String>,
}

impl ValidationIssue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            node: None,
            context: None,
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        match (&self.node, &self.context) {
            (Some(node), Some(ctx)) => write!(f, " at {node:?} ({ctx})"),
            (Some(node), None) => write!(f, " at {node:?}"),
            (None, Some(ctx)) => write!(f, " ({ctx})"),
            (None, None) => Ok(()),
        }
    }
}

/// Findings of one check.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// No error or critical finding; warnings are tolerated.
    pub fn is_healthy(&self) -> bool {
        self.issues.iter().all(|i| i.severity < Severity::Error)
    }

    /// No finding at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of findings at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "no issues");
        }
        writeln!(
            f,
            "{} critical, {} errors, {} warnings",
            self.count(Severity::Critical),
            self.count(Severity::Error),
            self.count(Severity::Warning)
        )?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

/// Shape statistics plus validation findings.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub validation: ValidationReport,
    /// Nodes below the virtual root.
    pub node_count: usize,
    pub leaf_count: usize,
    /// Synthetic concept nodes.
    pub concept_count: usize,
    /// Deepest level below the virtual root.
    pub max_depth: usize,
    /// Mean child count of internal nodes, root included.
    pub avg_branching_factor: f64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.validation.is_healthy()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} nodes ({} leaves, {} concepts), depth {}, branching {:.2}",
            self.node_count,
            self.leaf_count,
            self.concept_count,
            self.max_depth,
            self.avg_branching_factor
        )?;
        write!(f, "{}", self.validation)
    }
}

/// Something whose structure can be checked.
pub trait HealthCheck {
    /// Structural statistics plus every issue found.
    fn health_check(&self) -> HealthReport;

    /// No issue at error level or above.
    fn is_healthy(&self) -> bool {
        self.health_check().is_healthy()
    }
}

impl HealthCheck for PathForest {
    fn health_check(&self) -> HealthReport {
        validate_forest(self.root())
    }
}

/// Check a forest given by its virtual root.
///
/// Rules, for every node below the root:
/// - an empty label is a warning;
/// - two siblings with the same label are an error;
/// - `path` must equal the parent's path plus `.label` (just `label` for
///   top-level trees), otherwise lineage can no longer be read from paths.
pub fn validate_forest(root: &TreeNode) -> HealthReport {
    let mut validation = ValidationReport::new();
    let mut node_count = 0;
    let mut leaf_count = 0;
    let mut concept_count = 0;
    let mut internal = 0;
    let mut edges = 0;
    let mut max_depth = 0;

    let mut stack: Vec<(&TreeNode, usize)> = vec![(root, 0)];
    while let Some((node, depth)) = stack.pop() {
        max_depth = max_depth.max(depth);
        if depth > 0 {
            node_count += 1;
            if node.is_leaf() {
                leaf_count += 1;
            }
            if node.synthetic {
                concept_count += 1;
            }
            if node.label.is_empty() {
                validation.add(
                    ValidationIssue::new(Severity::Warning, "empty label")
                        .with_node(node.path.clone())
                        .with_context("likely malformed input path"),
                );
            }
        }
        if !node.is_leaf() {
            internal += 1;
            edges += node.children.len();
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for child in &node.children {
            if !seen.insert(child.label.as_str()) {
                validation.add(
                    ValidationIssue::new(Severity::Error, "duplicate sibling label")
                        .with_node(child.path.clone())
                        .with_context(format!("parent {:?}", node.label)),
                );
            }
            let expected = if depth == 0 {
                child.label.clone()
            } else {
                format!("{}.{}", node.path, child.label)
            };
            if child.path != expected {
                validation.add(
                    ValidationIssue::new(Severity::Error, "path does not match ancestor chain")
                        .with_node(child.path.clone())
                        .with_context(format!("expected {expected:?}")),
                );
            }
            stack.push((child, depth + 1));
        }
    }

    let avg_branching_factor = if internal == 0 {
        0.0
    } else {
        edges as f64 / internal as f64
    };

    HealthReport {
        validation,
        node_count,
        leaf_count,
        concept_count,
        max_depth,
        avg_branching_factor,
    }
}

/// Check index-linked nodes (`parents[i]`, `children[i]`) for tree shape.
///
/// Exactly one node, the root, has no parent. Every other node must be
/// reachable from it, listed by the parent it names, and no walk may
/// revisit a node on its own path.
pub fn validate_links(parents: &[Option<usize>], children: &[Vec<usize>]) -> ValidationReport {
    let mut report = ValidationReport::new();
    let n = parents.len();

    let roots: Vec<usize> = (0..n).filter(|&i| parents[i].is_none()).collect();
    match roots.len() {
        0 if n > 0 => report.add(ValidationIssue::new(Severity::Critical, "no root, every node has a parent")),
        0 | 1 => {}
        k => report.add(
            ValidationIssue::new(Severity::Warning, format!("{k} parentless nodes"))
                .with_context(format!("{:?}", &roots[..k.min(5)])),
        ),
    }

    let mut reached = vec![false; n];
    let mut stack = roots.clone();
    while let Some(i) = stack.pop() {
        if i >= n || std::mem::replace(&mut reached[i], true) {
            continue;
        }
        stack.extend(children.get(i).into_iter().flatten().copied());
    }
    let unreached: Vec<usize> = (0..n).filter(|&i| !reached[i]).collect();
    if !unreached.is_empty() {
        report.add(
            ValidationIssue::new(Severity::Error, format!("{} nodes unreachable from the root", unreached.len()))
                .with_context(format!("{:?}", &unreached[..unreached.len().min(5)])),
        );
    }

    for (child, parent) in parents.iter().enumerate() {
        let Some(parent) = *parent else { continue };
        let listed = children.get(parent).is_some_and(|c| c.contains(&child));
        if !listed {
            report.add(
                ValidationIssue::new(Severity::Error, "parent does not list its child")
                    .with_node(child.to_string())
                    .with_context(format!("parent {parent}")),
            );
        }
    }

    if has_cycle(&roots, children) {
        report.add(ValidationIssue::new(Severity::Critical, "cycle in child links"));
    }
    report
}

/// Iterative three-color DFS from every root.
fn has_cycle(roots: &[usize], children: &[Vec<usize>]) -> bool {
    let mut done: HashSet<usize> = HashSet::new();
    let mut on_path: HashSet<usize> = HashSet::new();
    for &root in roots {
        if done.contains(&root) {
            continue;
        }
        // (node, next child position)
        let mut stack = vec![(root, 0usize)];
        on_path.insert(root);
        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            let kids = children.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&child) = kids.get(*next) {
                *next += 1;
                if on_path.contains(&child) {
                    return true;
                }
                if !done.contains(&child) {
                    on_path.insert(child);
                    stack.push((child, 0));
                }
            } else {
                on_path.remove(&node);
                done.insert(node);
                stack.pop();
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_warnings_keep_report_healthy() {
        let mut report = ValidationReport::new();
        report.add(ValidationIssue::new(Severity::Warning, "empty label"));
        assert!(report.is_healthy());
        assert!(!report.is_clean());

        report.add(
            ValidationIssue::new(Severity::Error, "path does not match ancestor chain")
                .with_node("X.a")
                .with_context("expected \"a\""),
        );
        assert!(!report.is_healthy());
        let text = report.to_string();
        assert!(text.contains("1 errors, 1 warnings"));
        assert!(text.contains("at \"X.a\""));
    }

    #[test]
    fn test_built_forest_is_clean() {
        let forest = PathForest::build(&["a.b", "a.c", "d.e.f"]).unwrap();
        let report = forest.health_check();
        assert!(report.validation.is_clean(), "{}", report);
        assert_eq!(report.node_count, 6);
        assert_eq!(report.leaf_count, 3);
        assert_eq!(report.max_depth, 3);
    }

    #[test]
    fn test_empty_label_is_warning() {
        let forest = PathForest::build(&["a..b"]).unwrap();
        let report = forest.health_check();
        assert!(report.is_healthy());
        assert_eq!(report.validation.count(Severity::Warning), 1);
    }

    #[test]
    fn test_duplicate_siblings_and_bad_paths() {
        let mut root = TreeNode::new("", "root");
        let mut a = TreeNode::new("a", "a");
        a.children.push(TreeNode::new("a.b", "b"));
        a.children.push(TreeNode::new("elsewhere.b", "b"));
        root.children.push(a);

        let report = validate_forest(&root);
        assert!(!report.is_healthy());
        assert!(report.validation.issues.iter().any(|i| i.message.contains("duplicate")));
        assert!(report.validation.issues.iter().any(|i| i.message.contains("ancestor chain")));
    }

    #[test]
    fn test_prefixed_concept_lineage_is_consistent() {
        let mut forest = PathForest::build(&["a.b", "c"]).unwrap();
        let members = std::mem::take(forest.trees_mut());
        let mut concept = TreeNode::concept("X", None);
        for mut m in members {
            m.prefix_paths("X");
            concept.children.push(m);
        }
        forest.trees_mut().push(concept);

        let report = forest.health_check();
        assert!(report.validation.is_clean(), "{}", report);
        assert_eq!(report.concept_count, 1);
    }

    #[test]
    fn test_links_of_a_tree() {
        let parents = [None, Some(0), Some(0), Some(1)];
        let children = [vec![1, 2], vec![3], vec![], vec![]];
        assert!(validate_links(&parents, &children).is_clean());
    }

    #[test]
    fn test_links_detached_loop() {
        // 1 and 2 claim each other; the root never reaches them.
        let parents = [None, Some(2), Some(1)];
        let children = [vec![], vec![2], vec![1]];
        let report = validate_links(&parents, &children);
        assert!(!report.is_healthy());
        assert!(report.issues.iter().any(|i| i.message.contains("unreachable")));
    }

    #[test]
    fn test_links_cycle_below_root() {
        let parents = [None, Some(0), Some(1)];
        let children = [vec![1], vec![2], vec![1]];
        let report = validate_links(&parents, &children);
        assert_eq!(report.count(Severity::Critical), 1);
    }

    #[test]
    fn test_links_unlisted_child() {
        let parents = [None, Some(0), Some(0)];
        let children = [vec![1], vec![], vec![]];
        let report = validate_links(&parents, &children);
        assert!(report.issues.iter().any(|i| i.message.contains("does not list")));
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-d]{1,2}", 1..5).prop_map(|segments| segments.join("."))
    }

    proptest! {
        #[test]
        fn built_forests_are_healthy(paths in proptest::collection::vec(path_strategy(), 1..40)) {
            let forest = PathForest::build(&paths).unwrap();
            let report = forest.health_check();
            prop_assert!(report.validation.is_clean(), "{}", report);
        }

        #[test]
        fn shape_is_independent_of_input_order(
            paths in proptest::collection::vec(path_strategy(), 1..40),
            seed in any::<u64>(),
        ) {
            use rand::seq::SliceRandom;
            use rand::SeedableRng;

            let mut shuffled = paths.clone();
            shuffled.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));

            let a = PathForest::build(&paths).unwrap();
            let b = PathForest::build(&shuffled).unwrap();
            prop_assert!(a.structurally_eq(&b));
        }
    }
}
