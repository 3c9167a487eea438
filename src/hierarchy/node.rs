//! Path-derived tree node.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A node of a tree built from dotted paths.
///
/// Nodes built from input carry the dotted prefix they were created from in
/// `path`. Synthetic concept nodes created by merging start with
/// `path == label`. Whenever a node is absorbed under a concept, its path and
/// the paths of all its descendants gain a `concept.` prefix, so a node's
/// path is always its ancestor labels (below the forest root) joined by `.`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Dot-joined ancestor chain.
    pub path: String,
    /// Display name (path segment or concept name).
    pub label: String,
    /// Owned children, in insertion order.
    #[serde(default)]
    pub children: Vec<TreeNode>,
    /// Label embedding, if assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Created by a merge rather than by path insertion.
    #[serde(default)]
    pub synthetic: bool,
}

/// One row of a flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineRow {
    /// Preorder position.
    pub id: usize,
    /// Preorder position of the parent (`None` for the root).
    pub parent: Option<usize>,
    /// Node label.
    pub name: String,
}

/// A tree flattened into parent-linked rows, as static tree renderers
/// consume it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Rows in preorder; the root is row 0.
    pub rows: Vec<OutlineRow>,
    /// Number of levels (a lone root has depth 1).
    pub depth: usize,
}

impl TreeNode {
    /// Create a node from a path prefix and its last segment.
    pub fn new(path: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            children: Vec::new(),
            embedding: None,
            synthetic: false,
        }
    }

    /// Create an empty synthetic concept node.
    pub fn concept(label: impl Into<String>, embedding: Option<Vec<f32>>) -> Self {
        let label = label.into();
        Self {
            path: label.clone(),
            label,
            children: Vec::new(),
            embedding,
            synthetic: true,
        }
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Check if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Direct child with the given label.
    pub fn child(&self, label: &str) -> Option<&TreeNode> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Mutable direct child with the given label.
    pub fn child_mut(&mut self, label: &str) -> Option<&mut TreeNode> {
        self.children.iter_mut().find(|c| c.label == label)
    }

    /// Follow a chain of labels down from this node.
    pub fn descend<'a, I>(&self, labels: I) -> Option<&TreeNode>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut node = self;
        for label in labels {
            node = node.child(label)?;
        }
        Some(node)
    }

    /// Preorder iterator over this node and its descendants.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Longest root-to-leaf edge count.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        max
    }

    /// Prefix the path of this node and every descendant with `prefix.`.
    pub fn prefix_paths(&mut self, prefix: &str) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            node.path = format!("{prefix}.{}", node.path);
            stack.extend(node.children.iter_mut());
        }
    }

    /// Rename a top-level tree. Every path that starts with the old label
    /// gets the new one in its place.
    pub fn relabel(&mut self, label: &str) {
        let old = std::mem::replace(&mut self.label, label.to_string());
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(rest) = node.path.strip_prefix(old.as_str()) {
                if rest.is_empty() || rest.starts_with('.') {
                    let renamed = format!("{label}{rest}");
                    node.path = renamed;
                }
            }
            stack.extend(node.children.iter_mut());
        }
    }

    /// Label-keyed shape equality: same labels at the same positions,
    /// regardless of child order. Paths and embeddings are ignored.
    pub fn structurally_eq(&self, other: &TreeNode) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if a.label != b.label || a.children.len() != b.children.len() {
                return false;
            }
            let mut left: Vec<&TreeNode> = a.children.iter().collect();
            let mut right: Vec<&TreeNode> = b.children.iter().collect();
            left.sort_by(|x, y| x.label.cmp(&y.label).then(x.node_count().cmp(&y.node_count())));
            right.sort_by(|x, y| x.label.cmp(&y.label).then(x.node_count().cmp(&y.node_count())));
            stack.extend(left.into_iter().zip(right));
        }
        true
    }

    /// Flatten into preorder rows.
    pub fn outline(&self) -> Outline {
        let mut rows = Vec::new();
        let mut depth = 0;
        let mut stack = vec![(self, None, 1usize)];
        while let Some((node, parent, level)) = stack.pop() {
            let id = rows.len();
            rows.push(OutlineRow {
                id,
                parent,
                name: node.label.clone(),
            });
            depth = depth.max(level);
            stack.extend(node.children.iter().rev().map(|c| (c, Some(id), level + 1)));
        }
        Outline { rows, depth }
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self, 0usize)];
        while let Some((node, indent)) = stack.pop() {
            let marker = if node.synthetic { "*" } else { "" };
            writeln!(f, "{:indent$}{}{marker}", "", node.label, indent = indent * 2)?;
            stack.extend(node.children.iter().rev().map(|c| (c, indent + 1)));
        }
        Ok(())
    }
}

/// Preorder iterator over a subtree.
#[derive(Debug)]
pub struct Iter<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeNode {
        let mut a = TreeNode::new("a", "a");
        let mut b = TreeNode::new("a.b", "b");
        b.children.push(TreeNode::new("a.b.d", "d"));
        a.children.push(b);
        a.children.push(TreeNode::new("a.c", "c"));
        a
    }

    #[test]
    fn test_preorder_iteration() {
        let t = sample();
        let labels: Vec<&str> = t.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn test_height_and_node_count() {
        let t = sample();
        assert_eq!(t.node_count(), 4);
        assert_eq!(t.height(), 2);
        assert_eq!(TreeNode::new("x", "x").height(), 0);
    }

    #[test]
    fn test_prefix_paths_reaches_every_descendant() {
        let mut t = sample();
        t.prefix_paths("Concept");
        assert!(t.iter().all(|n| n.path.starts_with("Concept.")));
        assert_eq!(t.descend(["b", "d"]).unwrap().path, "Concept.a.b.d");
    }

    #[test]
    fn test_relabel_rewrites_leading_segment_only() {
        let mut t = TreeNode::concept("ab", None);
        let mut a = TreeNode::new("ab.a", "a");
        a.children.push(TreeNode::new("ab.a.ab", "ab"));
        t.children.push(a);

        t.relabel("ab_2");
        assert_eq!(t.label, "ab_2");
        assert_eq!(t.path, "ab_2");
        assert_eq!(t.children[0].path, "ab_2.a");
        assert_eq!(t.children[0].children[0].path, "ab_2.a.ab");
        assert_eq!(t.children[0].children[0].label, "ab");
    }

    #[test]
    fn test_structural_equality_ignores_child_order() {
        let a = sample();
        let mut b = sample();
        b.children.reverse();
        assert!(a.structurally_eq(&b));

        b.children[0].label = "z".into();
        assert!(!a.structurally_eq(&b));
    }

    #[test]
    fn test_outline_rows() {
        let outline = sample().outline();
        assert_eq!(outline.depth, 3);
        assert_eq!(outline.rows.len(), 4);
        assert_eq!(outline.rows[0].parent, None);
        let d = outline.rows.iter().find(|r| r.name == "d").unwrap();
        let b = outline.rows.iter().find(|r| r.name == "b").unwrap();
        assert_eq!(d.parent, Some(b.id));
    }

    #[test]
    fn test_concept_node() {
        let c = TreeNode::concept("Ocean", None);
        assert!(c.synthetic);
        assert_eq!(c.path, "Ocean");
        assert!(c.is_leaf());
    }

    #[test]
    fn test_display_marks_concepts() {
        let mut c = TreeNode::concept("Ocean", None);
        c.children.push(TreeNode::new("Ocean.sea", "sea"));
        let s = c.to_string();
        assert!(s.starts_with("Ocean*\n"));
        assert!(s.contains("  sea\n"));
    }
}
