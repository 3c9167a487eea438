//! Interactive concept graph.
//!
//! A forest, merged or not, is loaded into a flat [`NodeArena`] and driven
//! by [`ConceptGraph`]: clicks expand or collapse nodes and each interaction
//! yields a [`Delta`] for the renderer to apply. Cross-subtree relation
//! links are found incrementally by a [`RelationAnalyzer`].
//!
//! ```
//! use concept_forest::config::GraphConfig;
//! use concept_forest::graph::ConceptGraph;
//! use concept_forest::hierarchy::PathForest;
//!
//! let forest = PathForest::build(&["plant.pump.speed", "plant.pump.temp", "site"]).unwrap();
//! let mut graph = ConceptGraph::new(forest.root(), GraphConfig::default()).unwrap();
//!
//! let snapshot = graph.snapshot();
//! assert_eq!(snapshot.nodes.len(), 3);
//!
//! let delta = graph.on_node_click("rootId.plant").unwrap();
//! assert_eq!(delta.add.nodes[0].id, "rootId.plant.pump");
//! ```

mod delta;
mod export;
mod node;
mod relation;
mod state;

pub use delta::{Additions, Delta, Edge, Link, NodeData, NodeRef, Removals, Snapshot};
pub use export::GraphEdge;
pub use node::{ForestNode, NodeArena};
pub use relation::{pair_key, subtree_id, Analysis, Candidate, PairKey, Relation, RelationAnalyzer};
pub use state::ConceptGraph;
