//! Serializable payloads handed to the rendering layer.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A node as the renderer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    /// Effective id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Effective depth (root is 0).
    pub depth: usize,
}

/// Parent → child tree edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Parent id.
    pub from: String,
    /// Child id.
    pub to: String,
}

/// Labeled cross-subtree relation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Smaller of the two node ids.
    pub from: String,
    /// Larger of the two node ids.
    pub to: String,
    /// Relation phrase.
    pub relation: String,
}

/// Id-only reference used in removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Effective id.
    pub id: String,
}

/// Things to add to the rendered graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Additions {
    /// Newly shown nodes.
    pub nodes: Vec<NodeData>,
    /// Edges from the expanded node to each new node.
    pub edges: Vec<Edge>,
    /// Links that just became the best labeled link of their bucket.
    pub links: Vec<Link>,
}

/// Things to take out of the rendered graph. Removing a node also removes
/// every edge touching it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removals {
    /// Nodes no longer shown.
    pub nodes: Vec<NodeRef>,
    /// Links whose endpoints are hidden or that lost their bucket.
    pub links: Vec<Link>,
}

/// Incremental change produced by one interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// What appeared.
    pub add: Additions,
    /// What disappeared.
    pub remove: Removals,
}

impl Delta {
    /// Nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.add.nodes.is_empty()
            && self.add.edges.is_empty()
            && self.add.links.is_empty()
            && self.remove.nodes.is_empty()
            && self.remove.links.is_empty()
    }

    /// JSON form, as sent to a browser-side renderer.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Full visible graph, produced once when a graph is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Shown nodes in preorder, root first.
    pub nodes: Vec<NodeData>,
    /// Tree edges between shown nodes.
    pub edges: Vec<Edge>,
    /// Active relation links.
    pub links: Vec<Link>,
}

impl Snapshot {
    /// JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_json_shape() {
        let delta = Delta {
            add: Additions {
                nodes: vec![NodeData {
                    id: "rootId.a".into(),
                    name: "a".into(),
                    depth: 1,
                }],
                edges: vec![Edge {
                    from: "rootId".into(),
                    to: "rootId.a".into(),
                }],
                links: Vec::new(),
            },
            remove: Removals::default(),
        };
        let value: serde_json::Value = serde_json::from_str(&delta.to_json().unwrap()).unwrap();
        assert_eq!(value["add"]["nodes"][0]["id"], "rootId.a");
        assert_eq!(value["add"]["edges"][0]["from"], "rootId");
        assert!(value["remove"]["nodes"].as_array().unwrap().is_empty());
        assert!(!delta.is_empty());
        assert!(Delta::default().is_empty());
    }
}
