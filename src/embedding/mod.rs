//! Label embeddings and similarity.
//!
//! Every comparison in the crate reduces to cosine similarity between two
//! fixed-length vectors. Vectors come from one of two places:
//!
//! - an [`EmbeddingProvider`] that turns a label into a vector (dictionary
//!   lookup, sub-token mean, seeded random fallback), used when building and
//!   merging forests;
//! - a [`NodeEmbeddings`] store that returns precomputed vectors for many
//!   path keys at once, used by the interactive graph.
//!
//! The dictionary is an [`EmbeddingTable`] loaded once and shared behind an
//! `Arc`; nothing mutates it after load.

mod provider;
mod similarity;
mod table;

pub use provider::{
    fallback_vector, sub_tokens, DictionaryEmbedder, EmbeddingProvider, NodeEmbeddings,
    ProviderEmbeddings, Resolution,
};
pub use similarity::{cosine_similarity, similarity};
pub use table::EmbeddingTable;
