//! Export of the visible graph as a `petgraph` graph.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use super::delta::NodeData;
use super::state::ConceptGraph;

/// Edge kind in an exported graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEdge {
    /// Parent → child.
    Tree,
    /// Labeled cross-subtree link, directed `from → to`.
    Relation(String),
}

impl ConceptGraph {
    /// Currently visible nodes with their tree edges and active relation
    /// links. Node weights are the same records deltas carry.
    pub fn export_visible(&self) -> DiGraph<NodeData, GraphEdge> {
        let order = self.arena().shown_preorder();
        let mut graph = DiGraph::with_capacity(order.len(), order.len());
        let mut by_arena: HashMap<usize, NodeIndex> = HashMap::with_capacity(order.len());
        let mut by_id: HashMap<String, NodeIndex> = HashMap::with_capacity(order.len());

        for &idx in &order {
            let data = self.node_data(idx);
            let id = data.id.clone();
            let node = graph.add_node(data);
            by_arena.insert(idx, node);
            by_id.insert(id, node);
        }

        for &idx in &order {
            let parent = self.arena().get(idx).and_then(|n| n.parent());
            if let (Some(p), Some(&child)) = (parent, by_arena.get(&idx)) {
                if let Some(&parent) = by_arena.get(&p) {
                    graph.add_edge(parent, child, GraphEdge::Tree);
                }
            }
        }

        for link in self.links() {
            if let (Some(&a), Some(&b)) = (by_id.get(&link.from), by_id.get(&link.to)) {
                graph.add_edge(a, b, GraphEdge::Relation(link.relation.clone()));
            }
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GraphConfig;
    use crate::graph::ConceptGraph;
    use crate::hierarchy::PathForest;

    use super::GraphEdge;

    #[test]
    fn test_export_matches_visible_state() {
        let forest = PathForest::build(&["a.x", "a.y", "b"]).unwrap();
        let mut g = ConceptGraph::new(forest.root(), GraphConfig::default()).unwrap();
        g.snapshot();
        g.on_node_click("rootId.a").unwrap();

        let exported = g.export_visible();
        assert_eq!(exported.node_count(), 5);
        assert_eq!(exported.edge_count(), 4);
        assert!(exported.edge_weights().all(|e| *e == GraphEdge::Tree));
        assert!(!petgraph::algo::is_cyclic_directed(&exported));

        let root = exported.node_indices().find(|&i| exported[i].id == "rootId").unwrap();
        assert_eq!(exported.neighbors(root).count(), 2);
    }
}
