//! # concept-forest
//!
//! Turns flat dotted column paths into an explorable concept graph.
//!
//! ```text
//! paths ──► PathForest ──► ForestMerger (optional) ──► ConceptGraph
//!  a.b.c     trie of        similar top-level trees     expand/collapse
//!  a.d       named nodes    grouped under named         deltas + relation
//!  e.f                      concepts                    links
//! ```
//!
//! Embedding vectors come from an [`EmbeddingProvider`](embedding::EmbeddingProvider)
//! (dictionary lookup with deterministic fallbacks); concept and relation
//! names come from a [`ConceptOracle`](oracle::ConceptOracle), typically a
//! prompted text-generation backend. Both are plain traits so the core runs
//! offline in tests and demos.
//!
//! **Default build** enables the `parallel` feature (rayon) for forest
//! construction, chunked merging and relation reduction. Without it every
//! stage runs sequentially with identical results.

pub mod config;
pub mod embedding;
/// Error types used across `concept-forest`.
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod merge;
pub mod oracle;
pub mod pipeline;
pub mod schema;

pub use config::{EmbeddingConfig, ExplorerConfig, GraphConfig, MergeConfig, RelationConfig};
pub use embedding::{cosine_similarity, DictionaryEmbedder, EmbeddingProvider, EmbeddingTable, NodeEmbeddings};
pub use error::{Error, Result};
pub use graph::{ConceptGraph, Delta, Snapshot};
pub use hierarchy::{HealthCheck, PathForest, TreeNode};
pub use merge::{ForestMerger, MergeReport, MergeStrategy};
pub use oracle::{ConcatOracle, ConceptOracle, PromptOracle};
pub use pipeline::{Exploration, Explorer};
pub use schema::{SchemaSource, StaticSchema};
