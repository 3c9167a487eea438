//! Configuration for every stage of the pipeline.
//!
//! All structs follow the same shape: `Default` carries the values the
//! system was tuned with, `with_*` setters adjust one knob, and `validate`
//! rejects values the algorithms cannot run with. Everything is `serde`
//! (de)serializable so callers can keep it in a JSON file.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::merge::MergeStrategy;

/// Embedding provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimension produced by the fallback generator.
    pub dimension: usize,
    /// Seed of the fallback generator.
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: 50,
            seed: 42,
        }
    }
}

impl EmbeddingConfig {
    /// Set the vector dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the fallback seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidParameter {
                name: "dimension",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Forest merge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Which reduction algorithm to run.
    pub strategy: MergeStrategy,
    /// Forests with fewer top-level trees are left alone.
    pub min_forest_size: usize,
    /// Worker count of the chunked strategy.
    pub workers: usize,
    /// Running-product cut-off of the randomized strategy.
    pub similarity_threshold: f64,
    /// Consecutive fruitless rounds before the randomized strategy gives up.
    pub max_consecutive_failures: usize,
    /// Seed for reference selection; `None` draws from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::ChunkedParallel,
            min_forest_size: 5,
            workers: 8,
            similarity_threshold: 0.7,
            max_consecutive_failures: 5,
            seed: None,
        }
    }
}

impl MergeConfig {
    /// Create a configuration for the given strategy.
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Set the strategy.
    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the minimum forest size.
    pub fn with_min_forest_size(mut self, size: usize) -> Self {
        self.min_forest_size = size;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the randomized-merge threshold.
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the failure budget of the randomized strategy.
    pub fn with_max_consecutive_failures(mut self, n: usize) -> Self {
        self.max_consecutive_failures = n;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidParameter {
                name: "workers",
                message: "must be at least 1",
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidParameter {
                name: "similarity_threshold",
                message: "must lie in [0, 1]",
            });
        }
        if self.max_consecutive_failures == 0 {
            return Err(Error::InvalidParameter {
                name: "max_consecutive_failures",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Relation inference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// A bucket's best pair is labeled only when its score exceeds this.
    pub threshold: f64,
    /// Expanding nodes at this depth or deeper adds no comparisons.
    pub max_depth: usize,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            max_depth: 3,
        }
    }
}

impl RelationConfig {
    /// Set the labeling threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the comparison depth bound.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidParameter {
                name: "threshold",
                message: "must lie in [-1, 1]",
            });
        }
        Ok(())
    }
}

/// Interactive graph settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Id of the virtual root; every node id starts with it.
    pub root_id: String,
    /// Display name of the virtual root.
    pub root_name: String,
    /// Whether expand/collapse infer relation links.
    pub relations: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            root_id: "rootId".to_string(),
            root_name: "Data Assets".to_string(),
            relations: false,
        }
    }
}

impl GraphConfig {
    /// Set the root display name.
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Enable or disable relation inference.
    pub fn with_relations(mut self, enabled: bool) -> Self {
        self.relations = enabled;
        self
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.root_id.is_empty() || self.root_id.contains('.') {
            return Err(Error::InvalidParameter {
                name: "root_id",
                message: "must be non-empty and contain no '.'",
            });
        }
        Ok(())
    }
}

/// Settings of the whole explore pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Merge settings; `None` skips merging.
    pub merge: Option<MergeConfig>,
    /// Relation settings.
    pub relation: RelationConfig,
    /// Graph settings.
    pub graph: GraphConfig,
}

impl ExplorerConfig {
    /// Create the default configuration (no merge, no relations).
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Enable merging with the given settings.
    pub fn with_merge(mut self, merge: MergeConfig) -> Self {
        self.merge = Some(merge);
        self
    }

    /// Enable or disable relation inference.
    pub fn with_relations(mut self, enabled: bool) -> Self {
        self.graph.relations = enabled;
        self
    }

    /// Replace the relation settings.
    pub fn with_relation(mut self, relation: RelationConfig) -> Self {
        self.relation = relation;
        self
    }

    /// Replace the embedding settings.
    pub fn with_embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.embedding = embedding;
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        if let Some(merge) = &self.merge {
            merge.validate()?;
        }
        self.relation.validate()?;
        self.graph.validate()
    }
}
