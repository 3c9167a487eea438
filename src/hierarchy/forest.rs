//! Trie construction from dotted paths.

use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::node::TreeNode;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};

/// Label of the virtual root when none is given.
pub const DEFAULT_ROOT_LABEL: &str = "root";

/// A forest of path tries hanging off one virtual root.
///
/// The root's direct children are the top-level trees. The root itself has
/// an empty path; every other node's path is the dotted prefix of the input
/// it was created from.
#[derive(Debug, Clone, PartialEq)]
pub struct PathForest {
    root: TreeNode,
}

impl Default for PathForest {
    fn default() -> Self {
        Self::new()
    }
}

impl PathForest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self {
            root: TreeNode::new("", DEFAULT_ROOT_LABEL),
        }
    }

    /// Build a forest from dotted paths.
    ///
    /// Paths are split on `.`; each segment walks to or creates a child with
    /// that label. Empty segments (`a..b`) become nodes with an empty label.
    /// An empty path string cannot be split and fails with
    /// [`Error::MalformedPath`] before anything is inserted.
    ///
    /// Children keep first-seen order, so the same input always yields the
    /// same tree; inputs that differ only in order yield trees equal under
    /// [`TreeNode::structurally_eq`].
    pub fn build<S: AsRef<str> + Sync>(paths: &[S]) -> Result<Self> {
        for path in paths {
            check_path(path.as_ref())?;
        }

        let mut forest = Self::new();

        #[cfg(feature = "parallel")]
        {
            let groups = group_by_first_segment(paths);
            forest.root.children = groups
                .into_par_iter()
                .map(|group| {
                    let mut holder = TreeNode::new("", "");
                    for path in group {
                        insert_path(&mut holder, path);
                    }
                    holder.children
                })
                .flatten()
                .collect();
        }

        #[cfg(not(feature = "parallel"))]
        for path in paths {
            insert_path(&mut forest.root, path.as_ref());
        }

        info!(
            paths = paths.len(),
            top_level = forest.len(),
            nodes = forest.node_count(),
            "built path forest"
        );
        Ok(forest)
    }

    /// Set the virtual root's label.
    pub fn with_root_label(mut self, label: impl Into<String>) -> Self {
        self.root.label = label.into();
        self
    }

    /// Insert one more path.
    pub fn insert(&mut self, path: &str) -> Result<()> {
        check_path(path)?;
        insert_path(&mut self.root, path);
        Ok(())
    }

    /// The virtual root.
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Consume the forest, returning its root.
    pub fn into_root(self) -> TreeNode {
        self.root
    }

    /// Top-level trees.
    pub fn trees(&self) -> &[TreeNode] {
        &self.root.children
    }

    /// Mutable top-level trees.
    pub fn trees_mut(&mut self) -> &mut Vec<TreeNode> {
        &mut self.root.children
    }

    /// Number of top-level trees.
    pub fn len(&self) -> usize {
        self.root.children.len()
    }

    /// Check if the forest has no trees.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Number of nodes below the virtual root.
    pub fn node_count(&self) -> usize {
        self.root.node_count() - 1
    }

    /// Look up a node by its dotted path.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        self.root.descend(path.split('.'))
    }

    /// Assign an embedding of its label to every node that has none,
    /// in preorder. Returns how many nodes were embedded.
    pub fn embed_all(&mut self, provider: &dyn EmbeddingProvider) -> Result<usize> {
        let mut embedded = 0;
        let mut stack: Vec<&mut TreeNode> = self.root.children.iter_mut().rev().collect();
        while let Some(node) = stack.pop() {
            if node.embedding.is_none() {
                node.embedding = Some(provider.embed(&node.label)?);
                embedded += 1;
            }
            stack.extend(node.children.iter_mut().rev());
        }
        debug!(embedded, "assigned node embeddings");
        Ok(embedded)
    }

    /// Label-keyed shape equality of the two forests.
    pub fn structurally_eq(&self, other: &PathForest) -> bool {
        self.root.structurally_eq(&other.root)
    }
}

impl From<TreeNode> for PathForest {
    fn from(root: TreeNode) -> Self {
        Self { root }
    }
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::MalformedPath {
            path: path.to_string(),
            reason: "path is empty",
        });
    }
    Ok(())
}

/// Walk or create one node per segment below `root`.
fn insert_path(root: &mut TreeNode, path: &str) {
    let mut node = root;
    let mut end = 0;
    for (i, segment) in path.split('.').enumerate() {
        if i > 0 {
            end += 1;
        }
        end += segment.len();
        let pos = match node.children.iter().position(|c| c.label == segment) {
            Some(pos) => pos,
            None => {
                if segment.is_empty() {
                    debug!(path, "empty path segment");
                }
                node.children.push(TreeNode::new(&path[..end], segment));
                node.children.len() - 1
            }
        };
        node = &mut node.children[pos];
    }
}

/// Paths grouped by first segment, groups in first-seen order.
#[cfg(feature = "parallel")]
fn group_by_first_segment<S: AsRef<str>>(paths: &[S]) -> Vec<Vec<&str>> {
    use std::collections::HashMap;

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&str>> = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let head = path.split('.').next().unwrap_or(path);
        let slot = *index.entry(head).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(path);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::DictionaryEmbedder;

    #[test]
    fn test_build_shape() {
        let forest = PathForest::build(&["a.b", "a.c", "a.b.d"]).unwrap();
        assert_eq!(forest.len(), 1);
        let a = &forest.trees()[0];
        assert_eq!(a.label, "a");
        let labels: Vec<&str> = a.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "c"]);
        let b = a.child("b").unwrap();
        assert_eq!(b.children.len(), 1);
        assert_eq!(b.children[0].label, "d");
        assert!(a.child("c").unwrap().is_leaf());
    }

    #[test]
    fn test_paths_are_prefixes() {
        let forest = PathForest::build(&["x.y.z"]).unwrap();
        assert_eq!(forest.find("x").unwrap().path, "x");
        assert_eq!(forest.find("x.y").unwrap().path, "x.y");
        assert_eq!(forest.find("x.y.z").unwrap().path, "x.y.z");
        assert!(forest.find("x.q").is_none());
    }

    #[test]
    fn test_repeated_build_identical() {
        let paths = ["s1.temp", "s1.hum", "s2.temp", "s1.temp.max"];
        let a = PathForest::build(&paths).unwrap();
        let b = PathForest::build(&paths).unwrap();
        assert_eq!(a, b);
        assert!(a.structurally_eq(&b));
    }

    #[test]
    fn test_input_order_does_not_change_shape() {
        let a = PathForest::build(&["a.b", "a.c", "a.b.d"]).unwrap();
        let b = PathForest::build(&["a.b.d", "a.c", "a.b"]).unwrap();
        assert!(a.structurally_eq(&b));
    }

    #[test]
    fn test_top_level_order_is_first_seen() {
        let forest = PathForest::build(&["q.1", "p.1", "q.2", "r"]).unwrap();
        let labels: Vec<&str> = forest.trees().iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["q", "p", "r"]);
    }

    #[test]
    fn test_empty_segments_are_kept() {
        let forest = PathForest::build(&["a..b"]).unwrap();
        let a = &forest.trees()[0];
        assert_eq!(a.children[0].label, "");
        assert_eq!(a.children[0].path, "a.");
        assert_eq!(a.children[0].children[0].path, "a..b");
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = PathForest::build(&["a.b", ""]).unwrap_err();
        assert!(matches!(err, Error::MalformedPath { .. }));

        let mut forest = PathForest::new();
        assert!(forest.insert("").is_err());
        assert!(forest.is_empty());
    }

    #[test]
    fn test_insert_extends_existing() {
        let mut forest = PathForest::build(&["a.b"]).unwrap();
        forest.insert("a.c").unwrap();
        assert_eq!(forest.node_count(), 3);
    }

    #[test]
    fn test_embed_all_skips_assigned() {
        let mut forest = PathForest::build(&["a.b", "c"]).unwrap();
        forest.trees_mut()[1].embedding = Some(vec![0.0; 4]);
        let provider = DictionaryEmbedder::random_only(&EmbeddingConfig::default().with_dimension(4)).unwrap();
        assert_eq!(forest.embed_all(&provider).unwrap(), 2);
        assert!(forest.root().embedding.is_none());
        assert_eq!(forest.trees()[1].embedding.as_deref(), Some(&[0.0f32; 4][..]));
    }
}
