//! End-to-end exploration: paths → forest → merge → interactive graph.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::ExplorerConfig;
use crate::embedding::{
    DictionaryEmbedder, EmbeddingProvider, EmbeddingTable, NodeEmbeddings, ProviderEmbeddings,
};
use crate::error::{Error, Result};
use crate::graph::{ConceptGraph, Snapshot};
use crate::hierarchy::PathForest;
use crate::merge::{ForestMerger, MergeReport};
use crate::oracle::ConceptOracle;
use crate::schema::SchemaSource;

/// Result of [`Explorer::open_schema`].
#[derive(Debug)]
pub struct Exploration {
    /// Merge outcome, if merging is configured.
    pub merge: Option<MergeReport>,
    /// Interactive graph, opened one level.
    pub graph: ConceptGraph,
    /// The opening view.
    pub snapshot: Snapshot,
}

/// Wires the collaborators to the forest, merge and graph stages.
///
/// Without an explicit [`NodeEmbeddings`] store, graph nodes are embedded
/// by the same provider that embeds merge concepts (last path segment).
pub struct Explorer {
    config: ExplorerConfig,
    provider: Arc<dyn EmbeddingProvider>,
    oracle: Arc<dyn ConceptOracle>,
    embeddings: Option<Arc<dyn NodeEmbeddings>>,
    schema: Option<Arc<dyn SchemaSource>>,
}

impl Explorer {
    /// Create an explorer. Fails on invalid configuration.
    pub fn new(
        config: ExplorerConfig,
        provider: Arc<dyn EmbeddingProvider>,
        oracle: Arc<dyn ConceptOracle>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            oracle,
            embeddings: None,
            schema: None,
        })
    }

    /// Create an explorer whose provider is a [`DictionaryEmbedder`] over
    /// `table`, set up from `config.embedding` (fallback dimension and seed).
    pub fn from_table(
        config: ExplorerConfig,
        table: Arc<EmbeddingTable>,
        oracle: Arc<dyn ConceptOracle>,
    ) -> Result<Self> {
        config.validate()?;
        let provider = DictionaryEmbedder::new(table, &config.embedding)?;
        Self::new(config, Arc::new(provider), oracle)
    }

    /// Use a dedicated store for graph node embeddings.
    pub fn with_node_embeddings(mut self, embeddings: Arc<dyn NodeEmbeddings>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Attach the schema source used by [`open_schema`](Self::open_schema)
    /// and the grouped merge.
    pub fn with_schema(mut self, schema: Arc<dyn SchemaSource>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Provider embedding merge concepts and, by default, graph nodes.
    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Build the path forest.
    pub fn build_forest<S: AsRef<str> + Sync>(&self, paths: &[S]) -> Result<PathForest> {
        let start = Instant::now();
        let forest = PathForest::build(paths)?;
        info!(
            paths = paths.len(),
            trees = forest.len(),
            nodes = forest.node_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "forest built"
        );
        Ok(forest)
    }

    /// Merge the forest with the configured strategy; `None` when merging
    /// is not configured.
    pub fn merge_forest(&self, forest: &mut PathForest) -> Result<Option<MergeReport>> {
        let Some(config) = self.config.merge.clone() else {
            return Ok(None);
        };
        let start = Instant::now();
        let mut merger = ForestMerger::new(config, self.provider.as_ref(), self.oracle.as_ref());
        if let Some(schema) = &self.schema {
            merger = merger.with_schema(schema.as_ref());
        }
        let report = merger.merge(forest)?;
        if !report.skipped && !report.reached_target() {
            warn!(
                size = report.final_size,
                target = report.target,
                "merge stopped above target size"
            );
        }
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "merge stage done");
        Ok(Some(report))
    }

    /// Load a forest into an interactive graph and take its opening view.
    pub fn open_graph(&self, forest: &PathForest) -> Result<(ConceptGraph, Snapshot)> {
        let embeddings: Arc<dyn NodeEmbeddings> = match &self.embeddings {
            Some(e) => e.clone(),
            None => Arc::new(ProviderEmbeddings::new(self.provider.clone())),
        };
        let mut graph = ConceptGraph::new(forest.root(), self.config.graph.clone())?
            .with_relation_config(self.config.relation.clone())?
            .with_collaborators(embeddings, self.oracle.clone());
        let snapshot = graph.snapshot();
        Ok((graph, snapshot))
    }

    /// List the schema, then build, merge and open.
    pub fn open_schema(&self) -> Result<Exploration> {
        let schema = self.schema.as_ref().ok_or(Error::InvalidParameter {
            name: "schema",
            message: "no schema source attached",
        })?;
        let paths = schema.list_column_paths()?;
        if paths.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut forest = self.build_forest(&paths)?;
        let merge = self.merge_forest(&mut forest)?;
        let (graph, snapshot) = self.open_graph(&forest)?;
        Ok(Exploration {
            merge,
            graph,
            snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingConfig, MergeConfig};
    use crate::embedding::DictionaryEmbedder;
    use crate::merge::MergeStrategy;
    use crate::oracle::ConcatOracle;
    use crate::schema::StaticSchema;

    fn explorer(config: ExplorerConfig) -> Explorer {
        let provider = DictionaryEmbedder::random_only(&EmbeddingConfig::default()).unwrap();
        Explorer::new(config, Arc::new(provider), Arc::new(ConcatOracle::new())).unwrap()
    }

    #[test]
    fn test_open_without_merge() {
        let ex = explorer(ExplorerConfig::default());
        let mut forest = ex.build_forest(&["a.b", "c.d"]).unwrap();
        assert!(ex.merge_forest(&mut forest).unwrap().is_none());
        let (_, snapshot) = ex.open_graph(&forest).unwrap();
        assert_eq!(snapshot.nodes.len(), 3);
    }

    #[test]
    fn test_from_table_follows_embedding_config() {
        let config = ExplorerConfig::from_json(r#"{ "embedding": { "dimension": 7, "seed": 9 } }"#).unwrap();
        let table = Arc::new(EmbeddingTable::new(0));
        let ex = Explorer::from_table(config.clone(), table, Arc::new(ConcatOracle::new())).unwrap();
        assert_eq!(ex.provider().dimension(), 7);

        let reference = DictionaryEmbedder::random_only(&config.embedding).unwrap();
        assert_eq!(ex.provider().embed("flow").unwrap(), reference.embed("flow").unwrap());

        let bad = ExplorerConfig::default().with_embedding(EmbeddingConfig::default().with_dimension(0));
        let table = Arc::new(EmbeddingTable::new(0));
        assert!(Explorer::from_table(bad, table, Arc::new(ConcatOracle::new())).is_err());
    }

    #[test]
    fn test_open_schema_requires_source() {
        let ex = explorer(ExplorerConfig::default());
        assert!(matches!(ex.open_schema(), Err(Error::InvalidParameter { name: "schema", .. })));

        let ex = explorer(ExplorerConfig::default()).with_schema(Arc::new(StaticSchema::default()));
        assert!(matches!(ex.open_schema(), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_open_schema_grouped() {
        let schema = StaticSchema::new(["p1.x", "p2.x", "p3.x", "m1.y", "m2.y"])
            .with_group("pumps", "p1")
            .with_group("pumps", "p2")
            .with_group("pumps", "p3")
            .with_group("motors", "m1")
            .with_group("motors", "m2");
        let config = ExplorerConfig::default().with_merge(MergeConfig::new(MergeStrategy::Grouped));
        let ex = explorer(config).with_schema(Arc::new(schema));

        let mut run = ex.open_schema().unwrap();
        let report = run.merge.unwrap();
        assert_eq!(report.merges, 2);
        assert_eq!(run.snapshot.nodes.len(), 3);

        let concept = run.snapshot.nodes[1].id.clone();
        let delta = run.graph.on_node_click(&concept).unwrap();
        assert!(delta.add.nodes.len() >= 2);
        assert!(delta.add.nodes.iter().all(|n| n.depth == 2));
    }
}
