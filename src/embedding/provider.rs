//! Label embedding with dictionary lookup, sub-token composition and a
//! seeded random fallback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::table::EmbeddingTable;
use crate::config::EmbeddingConfig;
use crate::error::Result;

/// Maps a short label to a fixed-dimension vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one label.
    fn embed(&self, label: &str) -> Result<Vec<f32>>;

    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn embed(&self, label: &str) -> Result<Vec<f32>> {
        (**self).embed(label)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

/// Which resolution step produced an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Exact dictionary hit.
    Exact,
    /// Mean of this many sub-token vectors.
    Composed(usize),
    /// Seeded random draw.
    Random,
}

/// Dictionary-backed provider.
///
/// Resolution order:
/// 1. exact lookup of the label;
/// 2. when [`sub_tokens`] yields more than one piece, the mean of the
///    vectors of those pieces, skipping pieces with no entry;
/// 3. a random vector, each component `rng.random::<f64>() * 2.0 - 1.0`
///    from a [`ChaCha8Rng`] seeded with `seed_from_u64(seed)`.
///
/// The generator is shared by all fallback calls of one provider, so the
/// n-th fallback of a run is reproducible for a given seed and dimension.
#[derive(Debug)]
pub struct DictionaryEmbedder {
    table: Arc<EmbeddingTable>,
    dimension: usize,
    rng: Mutex<ChaCha8Rng>,
}

impl DictionaryEmbedder {
    /// Create a provider over a shared table.
    ///
    /// The table's own dimension wins over `config.dimension` when the table
    /// has entries.
    pub fn new(table: Arc<EmbeddingTable>, config: &EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        let dimension = if table.is_empty() || table.dimension() == 0 {
            config.dimension
        } else {
            table.dimension()
        };
        info!(
            entries = table.len(),
            dimension,
            seed = config.seed,
            "embedding provider ready"
        );
        Ok(Self {
            table,
            dimension,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed)),
        })
    }

    /// Provider with an empty dictionary; every label takes the random path.
    pub fn random_only(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(Arc::new(EmbeddingTable::new(config.dimension)), config)
    }

    /// Embed a label and report which step resolved it.
    pub fn embed_with_resolution(&self, label: &str) -> (Vec<f32>, Resolution) {
        if let Some(v) = self.table.get(label) {
            return (v.to_vec(), Resolution::Exact);
        }

        let tokens = sub_tokens(label);
        if tokens.len() > 1 {
            if let Some((mean, found)) = self.compose(&tokens) {
                return (mean, Resolution::Composed(found));
            }
        }

        debug!(label, "no dictionary entry, drawing fallback vector");
        (self.random_vector(), Resolution::Random)
    }

    fn compose(&self, tokens: &[&str]) -> Option<(Vec<f32>, usize)> {
        let mut sum = vec![0.0f64; self.dimension];
        let mut found = 0usize;
        for token in tokens {
            if let Some(v) = self.table.get(token) {
                for (acc, &x) in sum.iter_mut().zip(v) {
                    *acc += x as f64;
                }
                found += 1;
            }
        }
        if found == 0 {
            return None;
        }
        let mean = sum.into_iter().map(|s| (s / found as f64) as f32).collect();
        Some((mean, found))
    }

    fn random_vector(&self) -> Vec<f32> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        fallback_vector(&mut *rng, self.dimension)
    }
}

impl EmbeddingProvider for DictionaryEmbedder {
    fn embed(&self, label: &str) -> Result<Vec<f32>> {
        Ok(self.embed_with_resolution(label).0)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Draw one fallback vector: `dimension` values uniform in `[-1, 1)`.
pub fn fallback_vector<R: Rng>(rng: &mut R, dimension: usize) -> Vec<f32> {
    (0..dimension)
        .map(|_| (rng.random::<f64>() * 2.0 - 1.0) as f32)
        .collect()
}

/// Split a label on runs of `-`, `_` and whitespace.
///
/// A leading separator leaves an empty first piece and trailing separators
/// leave nothing, so `-a` gives `["", "a"]` (two pieces, composed from `a`)
/// while `a-` gives `["a"]` (one piece, no composition). A label made only
/// of separators gives no pieces.
pub fn sub_tokens(label: &str) -> Vec<&str> {
    let mut pieces = label.split(is_separator);
    let mut tokens: Vec<&str> = pieces.next().into_iter().collect();
    tokens.extend(pieces.filter(|t| !t.is_empty()));
    if tokens.len() == 1 && tokens[0].is_empty() {
        tokens.clear();
    }
    tokens
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '_' || c.is_whitespace()
}

/// Batch lookup of node embeddings by path key (`a.b.c`).
///
/// This is the shape of a vector-database query: ask for many keys, get
/// back whichever ones are stored. Missing keys are simply absent.
pub trait NodeEmbeddings: Send + Sync {
    /// Fetch vectors for `keys`.
    fn fetch(&self, keys: &[String]) -> Result<HashMap<String, Vec<f32>>>;
}

impl NodeEmbeddings for HashMap<String, Vec<f32>> {
    fn fetch(&self, keys: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }
}

impl<E: NodeEmbeddings + ?Sized> NodeEmbeddings for Arc<E> {
    fn fetch(&self, keys: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        (**self).fetch(keys)
    }
}

/// Serves node embeddings from an [`EmbeddingProvider`] by embedding the
/// last segment of each key.
#[derive(Debug, Clone)]
pub struct ProviderEmbeddings<P> {
    provider: P,
}

impl<P: EmbeddingProvider> ProviderEmbeddings<P> {
    /// Wrap a provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: EmbeddingProvider> NodeEmbeddings for ProviderEmbeddings<P> {
    fn fetch(&self, keys: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        keys.iter()
            .map(|key| {
                let label = key.rsplit('.').next().unwrap_or(key);
                self.provider.embed(label).map(|v| (key.clone(), v))
            })
            .collect()
    }
}
