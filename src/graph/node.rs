//! UI-facing graph nodes and their arena.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::hierarchy::TreeNode;

/// One node of the interactive graph.
///
/// `raw_id` and `depth` describe the node as it sat in the forest before
/// merging (`root.a.b`, depth 2). Nodes below synthetic concepts also carry
/// `merged_root`, the dotted chain of enclosing concept labels, outermost
/// first. The id and depth shown to callers are derived from both:
///
/// ```text
/// raw_id        rootId.a.b
/// merged_root   C2.C1
/// effective id  rootId.C2.C1.a.b   (depth 2 + 2 = 4)
/// ```
///
/// A concept node itself has `raw_id = root.<label>` and the chain of the
/// concepts above it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestNode {
    pub(crate) raw_id: String,
    pub(crate) name: String,
    pub(crate) depth: usize,
    pub(crate) merged_root: Option<String>,
    pub(crate) synthetic: bool,
    pub(crate) parent: Option<usize>,
    pub(crate) children: BTreeMap<String, usize>,
    pub(crate) embedding: Option<Vec<f32>>,
    pub(crate) expanded: bool,
    pub(crate) shown: bool,
}

impl ForestNode {
    fn new(raw_id: String, name: String, depth: usize, parent: Option<usize>) -> Self {
        Self {
            raw_id,
            name,
            depth,
            merged_root: None,
            synthetic: false,
            parent,
            children: BTreeMap::new(),
            embedding: None,
            expanded: false,
            shown: false,
        }
    }

    /// Pre-merge id.
    pub fn raw_id(&self) -> &str {
        &self.raw_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pre-merge depth.
    pub fn raw_depth(&self) -> usize {
        self.depth
    }

    /// Enclosing concept chain, outermost first.
    pub fn merged_root(&self) -> Option<&str> {
        self.merged_root.as_deref()
    }

    /// Whether this node is a merge concept.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Currently part of the rendered graph.
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Children currently shown.
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Embedding, once fetched.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Child arena indices keyed by child name.
    pub fn children(&self) -> &BTreeMap<String, usize> {
        &self.children
    }

    /// Parent arena index.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Id seen by callers.
    pub fn effective_id(&self, root_id: &str) -> String {
        match &self.merged_root {
            None => self.raw_id.clone(),
            Some(chain) => {
                let rest = self.raw_id.strip_prefix(root_id).unwrap_or(&self.raw_id);
                format!("{root_id}.{chain}{rest}")
            }
        }
    }

    /// Depth seen by callers.
    pub fn effective_depth(&self) -> usize {
        self.depth + self.merged_root.as_deref().map_or(0, |c| c.split('.').count())
    }

    /// Key under which the node's vector is stored: the raw id without the
    /// root segment, i.e. the original column prefix (or concept name).
    pub fn embedding_key(&self, root_id: &str) -> String {
        self.raw_id
            .strip_prefix(root_id)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&self.raw_id)
            .to_string()
    }
}

/// Flat storage of every graph node. Index 0 is the root.
#[derive(Debug, Clone)]
pub struct NodeArena {
    nodes: Vec<ForestNode>,
    index: HashMap<String, usize>,
    root_id: String,
}

/// Where a node sits in raw (pre-merge) terms while converting.
struct RawContext {
    parent_id: String,
    parent_depth: usize,
    chain: Option<String>,
}

impl NodeArena {
    /// Convert a forest root (possibly merged) into an arena.
    ///
    /// Sibling names must be unique; a repeated name keeps its first
    /// occurrence and the rest is dropped with a warning.
    pub fn from_tree(root: &TreeNode, root_id: &str, root_name: &str) -> Self {
        let mut arena = Self {
            nodes: vec![ForestNode::new(root_id.to_string(), root_name.to_string(), 0, None)],
            index: HashMap::new(),
            root_id: root_id.to_string(),
        };
        arena.index.insert(root_id.to_string(), 0);

        let mut stack: Vec<(&TreeNode, usize, RawContext)> = root
            .children
            .iter()
            .rev()
            .map(|c| (c, 0, arena.root_context()))
            .collect();

        while let Some((tree, parent, ctx)) = stack.pop() {
            let (raw_id, depth, child_ctx) = if tree.synthetic {
                let chain = match &ctx.chain {
                    Some(c) => format!("{c}.{}", tree.label),
                    None => tree.label.clone(),
                };
                (
                    format!("{root_id}.{}", tree.label),
                    1,
                    RawContext {
                        parent_id: root_id.to_string(),
                        parent_depth: 0,
                        chain: Some(chain),
                    },
                )
            } else {
                let raw_id = format!("{}.{}", ctx.parent_id, tree.label);
                let depth = ctx.parent_depth + 1;
                (
                    raw_id.clone(),
                    depth,
                    RawContext {
                        parent_id: raw_id,
                        parent_depth: depth,
                        chain: ctx.chain.clone(),
                    },
                )
            };

            if arena.nodes[parent].children.contains_key(&tree.label) {
                warn!(name = %tree.label, parent = %arena.nodes[parent].name, "duplicate sibling name dropped");
                continue;
            }

            let mut node = ForestNode::new(raw_id, tree.label.clone(), depth, Some(parent));
            node.merged_root = ctx.chain;
            node.synthetic = tree.synthetic;
            let id = node.effective_id(root_id);
            if arena.index.contains_key(&id) {
                warn!(id = %id, "duplicate node id dropped");
                continue;
            }

            let idx = arena.nodes.len();
            arena.nodes.push(node);
            arena.index.insert(id, idx);
            arena.nodes[parent].children.insert(tree.label.clone(), idx);

            for child in tree.children.iter().rev() {
                stack.push((
                    child,
                    idx,
                    RawContext {
                        parent_id: child_ctx.parent_id.clone(),
                        parent_depth: child_ctx.parent_depth,
                        chain: child_ctx.chain.clone(),
                    },
                ));
            }
        }
        arena
    }

    fn root_context(&self) -> RawContext {
        RawContext {
            parent_id: self.root_id.clone(),
            parent_depth: 0,
            chain: None,
        }
    }

    /// Root id.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Index of an effective id.
    pub fn lookup(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Node at an index.
    pub fn get(&self, idx: usize) -> Option<&ForestNode> {
        self.nodes.get(idx)
    }

    pub(crate) fn node(&self, idx: usize) -> &ForestNode {
        &self.nodes[idx]
    }

    pub(crate) fn node_mut(&mut self, idx: usize) -> &mut ForestNode {
        &mut self.nodes[idx]
    }

    /// Effective id of the node at `idx`.
    pub fn id_of(&self, idx: usize) -> String {
        self.nodes[idx].effective_id(&self.root_id)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true: the root always exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ForestNode)> {
        self.nodes.iter().enumerate()
    }

    /// Shown nodes in preorder, children by name.
    pub fn shown_preorder(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.shown {
                continue;
            }
            out.push(idx);
            stack.extend(node.children.values().rev().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::PathForest;

    fn merged_tree() -> TreeNode {
        // root -> { C2* -> { C1* -> { a -> b }, c }, d }
        let forest = PathForest::build(&["a.b", "c", "d"]).unwrap();
        let mut root = forest.into_root();
        let d = root.children.pop().unwrap();
        let c = root.children.pop().unwrap();
        let a = root.children.pop().unwrap();
        let mut c1 = TreeNode::concept("C1", None);
        c1.children.push(a);
        let mut c2 = TreeNode::concept("C2", None);
        c2.children.push(c1);
        c2.children.push(c);
        root.children.push(c2);
        root.children.push(d);
        root
    }

    #[test]
    fn test_plain_ids() {
        let forest = PathForest::build(&["a.b", "a.c"]).unwrap();
        let arena = NodeArena::from_tree(forest.root(), "rootId", "Data");
        assert_eq!(arena.len(), 4);
        let b = arena.lookup("rootId.a.b").unwrap();
        assert_eq!(arena.node(b).raw_depth(), 2);
        assert_eq!(arena.node(b).effective_depth(), 2);
        assert_eq!(arena.node(b).embedding_key("rootId"), "a.b");
        assert_eq!(arena.node(0).name(), "Data");
    }

    #[test]
    fn test_derived_ids_below_concepts() {
        let arena = NodeArena::from_tree(&merged_tree(), "rootId", "Data");

        let c2 = arena.lookup("rootId.C2").unwrap();
        assert!(arena.node(c2).is_synthetic());
        assert_eq!(arena.node(c2).effective_depth(), 1);

        let c1 = arena.lookup("rootId.C2.C1").unwrap();
        assert_eq!(arena.node(c1).raw_id(), "rootId.C1");
        assert_eq!(arena.node(c1).merged_root(), Some("C2"));
        assert_eq!(arena.node(c1).effective_depth(), 2);
        assert_eq!(arena.node(c1).embedding_key("rootId"), "C1");

        let b = arena.lookup("rootId.C2.C1.a.b").unwrap();
        let node = arena.node(b);
        assert_eq!(node.raw_id(), "rootId.a.b");
        assert_eq!(node.merged_root(), Some("C2.C1"));
        assert_eq!(node.raw_depth(), 2);
        assert_eq!(node.effective_depth(), 4);
        assert_eq!(node.embedding_key("rootId"), "a.b");

        let c = arena.lookup("rootId.C2.c").unwrap();
        assert_eq!(arena.node(c).effective_depth(), 2);
        assert!(arena.lookup("rootId.d").is_some());
    }

    #[test]
    fn test_parent_links_match_children() {
        let arena = NodeArena::from_tree(&merged_tree(), "rootId", "Data");
        for (idx, node) in arena.iter() {
            for &child in node.children().values() {
                assert_eq!(arena.node(child).parent(), Some(idx));
            }
        }
    }

    #[test]
    fn test_duplicate_siblings_dropped() {
        let mut root = TreeNode::new("", "root");
        root.children.push(TreeNode::new("a", "a"));
        root.children.push(TreeNode::new("a", "a"));
        let arena = NodeArena::from_tree(&root, "rootId", "Data");
        assert_eq!(arena.len(), 2);
    }
}
