//! Expand/collapse state machine over a [`NodeArena`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::delta::{Additions, Delta, Edge, Link, NodeData, NodeRef, Removals, Snapshot};
use super::node::{ForestNode, NodeArena};
use super::relation::{pair_key, Candidate, PairKey, RelationAnalyzer};
use crate::config::{GraphConfig, RelationConfig};
use crate::embedding::NodeEmbeddings;
use crate::error::{Error, Result};
use crate::hierarchy::{
    validate_links, HealthCheck, HealthReport, Severity, TreeNode, ValidationIssue,
};
use crate::oracle::ConceptOracle;

/// Interactive view of a (possibly merged) forest.
///
/// Nodes move between three states: hidden, shown and collapsed, shown and
/// expanded. A node becomes shown only when its parent is expanded and is
/// hidden again only when an ancestor collapses, so a shown node always has
/// a shown parent. A fresh graph shows just the root, collapsed;
/// [`snapshot`](Self::snapshot) opens it one level.
///
/// When relation inference is on (config flag plus both collaborators), each
/// expansion compares the newly shown nodes against everything visible and
/// the delta carries the links that appeared or disappeared.
pub struct ConceptGraph {
    config: GraphConfig,
    arena: NodeArena,
    relations: RelationAnalyzer,
    embeddings: Option<Arc<dyn NodeEmbeddings>>,
    oracle: Option<Arc<dyn ConceptOracle>>,
    active_links: BTreeMap<PairKey, Link>,
}

impl std::fmt::Debug for ConceptGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptGraph")
            .field("config", &self.config)
            .field("nodes", &self.arena.len())
            .field("links", &self.active_links.len())
            .field("relations_enabled", &self.relations_enabled())
            .finish()
    }
}

impl ConceptGraph {
    /// Build the graph from a forest root.
    pub fn new(root: &TreeNode, config: GraphConfig) -> Result<Self> {
        config.validate()?;
        let mut arena = NodeArena::from_tree(root, &config.root_id, &config.root_name);
        arena.node_mut(0).shown = true;
        debug!(nodes = arena.len(), root = %config.root_id, "graph created");
        Ok(Self {
            config,
            arena,
            relations: RelationAnalyzer::default(),
            embeddings: None,
            oracle: None,
            active_links: BTreeMap::new(),
        })
    }

    /// Replace the relation settings. Clears nothing already scored.
    pub fn with_relation_config(mut self, config: RelationConfig) -> Result<Self> {
        config.validate()?;
        self.relations = RelationAnalyzer::new(config);
        Ok(self)
    }

    /// Attach the embedding store and naming oracle used for relations.
    pub fn with_collaborators(
        mut self,
        embeddings: Arc<dyn NodeEmbeddings>,
        oracle: Arc<dyn ConceptOracle>,
    ) -> Self {
        self.embeddings = Some(embeddings);
        self.oracle = Some(oracle);
        self
    }

    /// Whether interactions infer relation links.
    pub fn relations_enabled(&self) -> bool {
        self.config.relations && self.embeddings.is_some() && self.oracle.is_some()
    }

    /// Settings in use.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Every node, shown or not.
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Scored pairs and cached labels.
    pub fn relation_analyzer(&self) -> &RelationAnalyzer {
        &self.relations
    }

    /// Node by effective id.
    pub fn node(&self, id: &str) -> Option<&ForestNode> {
        self.arena.lookup(id).and_then(|i| self.arena.get(i))
    }

    /// Links currently shown, sorted by pair key.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.active_links.values()
    }

    /// Effective ids of all shown nodes.
    pub fn visible_ids(&self) -> HashSet<String> {
        self.arena
            .shown_preorder()
            .into_iter()
            .map(|i| self.arena.id_of(i))
            .collect()
    }

    /// Open the root (if still collapsed) and return the whole visible graph.
    pub fn snapshot(&mut self) -> Snapshot {
        if !self.arena.node(0).expanded {
            self.show_children(0);
        }
        self.analyze_relations();

        let order = self.arena.shown_preorder();
        let nodes = order.iter().map(|&i| self.node_data(i)).collect();
        let edges = order
            .iter()
            .filter_map(|&i| self.arena.node(i).parent.map(|p| self.edge(p, i)))
            .collect();
        let snapshot = Snapshot {
            nodes,
            edges,
            links: self.active_links.values().cloned().collect(),
        };
        info!(
            nodes = snapshot.nodes.len(),
            links = snapshot.links.len(),
            "graph snapshot"
        );
        snapshot
    }

    /// Compare every visible node not compared yet and return the current
    /// links. Known pairs and labels are reused, so repeated calls on an
    /// unchanged view never reach the oracle again.
    pub fn analyze_relations(&mut self) -> Vec<Link> {
        if !self.relations_enabled() {
            return Vec::new();
        }
        let shown = self.arena.shown_preorder();
        self.fetch_embeddings(&shown);
        for &idx in &shown {
            if self.arena.node(idx).expanded {
                self.observe_children(idx);
            }
        }
        self.refresh_links();
        self.active_links.values().cloned().collect()
    }

    /// Toggle a node: collapse it if expanded, expand it otherwise.
    pub fn on_node_click(&mut self, id: &str) -> Result<Delta> {
        let start = Instant::now();
        let idx = self.resolve(id)?;
        let expanding = !self.arena.node(idx).expanded;
        let delta = if expanding {
            self.expand_at(idx)?
        } else {
            self.collapse_at(idx)?
        };
        info!(
            node = id,
            action = if expanding { "expand" } else { "collapse" },
            added = delta.add.nodes.len(),
            removed = delta.remove.nodes.len(),
            links_added = delta.add.links.len(),
            links_removed = delta.remove.links.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "node click"
        );
        Ok(delta)
    }

    /// Show the direct children of a shown, collapsed node.
    ///
    /// Expanding an already expanded node changes nothing.
    pub fn expand(&mut self, id: &str) -> Result<Delta> {
        let idx = self.resolve(id)?;
        self.expand_at(idx)
    }

    /// Hide every shown descendant of an expanded node.
    ///
    /// Collapsing a collapsed node changes nothing.
    pub fn collapse(&mut self, id: &str) -> Result<Delta> {
        let idx = self.resolve(id)?;
        self.collapse_at(idx)
    }

    fn resolve(&self, id: &str) -> Result<usize> {
        self.arena
            .lookup(id)
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    fn expand_at(&mut self, idx: usize) -> Result<Delta> {
        let node = self.arena.node(idx);
        if !node.shown {
            return Err(Error::NodeHidden(self.arena.id_of(idx)));
        }
        if node.expanded {
            return Ok(Delta::default());
        }

        let children = self.show_children(idx);
        let mut add = Additions {
            nodes: children.iter().map(|&c| self.node_data(c)).collect(),
            edges: children.iter().map(|&c| self.edge(idx, c)).collect(),
            links: Vec::new(),
        };
        let mut remove = Removals::default();

        if self.relations_enabled() {
            self.fetch_embeddings(&children);
            self.observe_children(idx);
            let (added, removed) = self.refresh_links();
            add.links = added;
            remove.links = removed;
        }
        Ok(Delta { add, remove })
    }

    fn collapse_at(&mut self, idx: usize) -> Result<Delta> {
        let node = self.arena.node(idx);
        if !node.shown {
            return Err(Error::NodeHidden(self.arena.id_of(idx)));
        }
        if !node.expanded {
            return Ok(Delta::default());
        }

        let mut removed = Vec::new();
        let mut stack: Vec<usize> = node.children.values().rev().copied().collect();
        while let Some(i) = stack.pop() {
            if !self.arena.node(i).shown {
                continue;
            }
            removed.push(NodeRef {
                id: self.arena.id_of(i),
            });
            let n = self.arena.node_mut(i);
            n.shown = false;
            n.expanded = false;
            stack.extend(n.children.values().rev().copied());
        }
        self.arena.node_mut(idx).expanded = false;

        let mut delta = Delta {
            add: Additions::default(),
            remove: Removals {
                nodes: removed,
                links: Vec::new(),
            },
        };
        if self.relations_enabled() {
            let (added, gone) = self.refresh_links();
            delta.add.links = added;
            delta.remove.links = gone;
        }
        Ok(delta)
    }

    /// Mark the children of `idx` shown and `idx` expanded. Returns the
    /// children in name order.
    fn show_children(&mut self, idx: usize) -> Vec<usize> {
        let children: Vec<usize> = self.arena.node(idx).children.values().copied().collect();
        for &c in &children {
            self.arena.node_mut(c).shown = true;
        }
        self.arena.node_mut(idx).expanded = true;
        children
    }

    /// Load embeddings for nodes that lack one. The store is asked twice at
    /// most; if it keeps failing the nodes stay without vectors and simply
    /// take no part in relation scoring.
    fn fetch_embeddings(&mut self, nodes: &[usize]) {
        let Some(store) = self.embeddings.clone() else {
            return;
        };
        let root_id = self.arena.root_id().to_string();
        let wanted: Vec<(usize, String)> = nodes
            .iter()
            .filter(|&&i| i != 0 && self.arena.node(i).embedding.is_none())
            .map(|&i| (i, self.arena.node(i).embedding_key(&root_id)))
            .collect();
        if wanted.is_empty() {
            return;
        }

        let keys: Vec<String> = wanted.iter().map(|(_, k)| k.clone()).collect();
        let fetched = store.fetch(&keys).or_else(|e| {
            debug!(error = %e, keys = keys.len(), "embedding fetch failed, retrying");
            store.fetch(&keys)
        });
        let vectors = match fetched {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, keys = keys.len(), "embedding fetch failed, continuing without relations for these nodes");
                return;
            }
        };

        let mut missing = 0;
        for (i, key) in wanted {
            match vectors.get(&key) {
                Some(v) => self.arena.node_mut(i).embedding = Some(v.clone()),
                None => missing += 1,
            }
        }
        debug!(requested = keys.len(), missing, "embeddings fetched");
    }

    /// Score the children of `parent` against every visible node, unless
    /// `parent` is already too deep.
    fn observe_children(&self, parent: usize) -> usize {
        let depth = self.arena.node(parent).effective_depth();
        if !self.relations.within_depth(depth) {
            debug!(depth, "relation depth bound reached");
            return 0;
        }

        let shown: Vec<(String, &[f32])> = self
            .arena
            .shown_preorder()
            .into_iter()
            .filter(|&i| i != 0)
            .filter_map(|i| {
                self.arena
                    .node(i)
                    .embedding()
                    .map(|e| (self.arena.id_of(i), e))
            })
            .collect();
        let children: HashSet<String> = self
            .arena
            .node(parent)
            .children
            .values()
            .map(|&c| self.arena.id_of(c))
            .collect();

        let visible: Vec<Candidate<'_>> = shown
            .iter()
            .map(|(id, e)| Candidate { id, embedding: e })
            .collect();
        let fresh: Vec<Candidate<'_>> = visible
            .iter()
            .filter(|c| children.contains(c.id))
            .copied()
            .collect();
        self.relations.observe(&fresh, &visible)
    }

    /// Recompute the best labeled link per bucket over the visible set and
    /// return `(appeared, disappeared)` relative to the previous links.
    fn refresh_links(&mut self) -> (Vec<Link>, Vec<Link>) {
        let Some(oracle) = self.oracle.clone() else {
            return (Vec::new(), Vec::new());
        };
        let visible = self.visible_ids();
        let analysis = self.relations.analyze(&visible, oracle.as_ref());

        let next: BTreeMap<PairKey, Link> = analysis
            .relations
            .into_iter()
            .filter_map(|r| {
                let relation = r.label?;
                Some((
                    pair_key(&r.from, &r.to),
                    Link {
                        from: r.from,
                        to: r.to,
                        relation,
                    },
                ))
            })
            .collect();

        let appeared = next
            .iter()
            .filter(|(k, _)| !self.active_links.contains_key(*k))
            .map(|(_, l)| l.clone())
            .collect();
        let disappeared = self
            .active_links
            .iter()
            .filter(|(k, _)| !next.contains_key(*k))
            .map(|(_, l)| l.clone())
            .collect();
        self.active_links = next;
        (appeared, disappeared)
    }

    pub(crate) fn node_data(&self, idx: usize) -> NodeData {
        let node = self.arena.node(idx);
        NodeData {
            id: self.arena.id_of(idx),
            name: node.name.clone(),
            depth: node.effective_depth(),
        }
    }

    fn edge(&self, from: usize, to: usize) -> Edge {
        Edge {
            from: self.arena.id_of(from),
            to: self.arena.id_of(to),
        }
    }
}

impl HealthCheck for ConceptGraph {
    /// Arena linkage plus the shown-parent rule.
    fn health_check(&self) -> HealthReport {
        let mut parents = Vec::with_capacity(self.arena.len());
        let mut children = Vec::with_capacity(self.arena.len());
        let mut leaf_count = 0;
        let mut concept_count = 0;
        let mut internal = 0;
        let mut edges = 0;
        let mut max_depth = 0;

        for (idx, node) in self.arena.iter() {
            let kids: Vec<usize> = node.children.values().copied().collect();
            if kids.is_empty() {
                leaf_count += usize::from(idx != 0);
            } else {
                internal += 1;
                edges += kids.len();
            }
            if node.synthetic {
                concept_count += 1;
            }
            max_depth = max_depth.max(node.effective_depth());
            parents.push(node.parent);
            children.push(kids);
        }

        let mut validation = validate_links(&parents, &children);
        for (idx, node) in self.arena.iter() {
            let Some(p) = node.parent else { continue };
            if node.shown && !self.arena.node(p).shown {
                validation.add(
                    ValidationIssue::new(Severity::Error, "shown node under a hidden parent")
                        .with_node(self.arena.id_of(idx)),
                );
            }
        }

        HealthReport {
            validation,
            node_count: self.arena.len() - 1,
            leaf_count,
            concept_count,
            max_depth,
            avg_branching_factor: if internal == 0 {
                0.0
            } else {
                edges as f64 / internal as f64
            },
        }
    }
}
