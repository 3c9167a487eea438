//! Word-vector dictionary.
//!
//! Loaded once, then shared read-only behind an `Arc`. The text format is
//! one entry per line, `word v1 v2 ... vD`, separated by single spaces
//! (the GloVe release format).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// Label → vector lookup table with a fixed dimension.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTable {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl EmbeddingTable {
    /// Create an empty table for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    /// Parse a table from a reader. Blank lines are skipped; the dimension is
    /// taken from the first entry and every later entry must match it.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut table = Self::new(0);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let mut tokens = line.split_whitespace();
            let Some(word) = tokens.next() else {
                continue;
            };
            let vector = tokens
                .map(|t| t.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| Error::EmbeddingTable {
                    line: line_no,
                    message: e.to_string(),
                })?;
            if vector.is_empty() {
                return Err(Error::EmbeddingTable {
                    line: line_no,
                    message: format!("entry {word:?} has no components"),
                });
            }
            if table.dimension == 0 {
                table.dimension = vector.len();
            } else if vector.len() != table.dimension {
                return Err(Error::EmbeddingTable {
                    line: line_no,
                    message: format!(
                        "entry {word:?} has {} components, expected {}",
                        vector.len(),
                        table.dimension
                    ),
                });
            }
            table.vectors.insert(word.to_string(), vector);
        }
        Ok(table)
    }

    /// Load a table from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let table = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!(
            path = %path.display(),
            entries = table.len(),
            dimension = table.dimension,
            "loaded embedding table"
        );
        Ok(table)
    }

    /// Add an entry. Only meaningful while the table is still being assembled.
    pub fn insert(&mut self, label: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if self.dimension == 0 {
            self.dimension = vector.len();
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                found: vector.len(),
            });
        }
        self.vectors.insert(label.into(), vector);
        Ok(())
    }

    /// Look up a label.
    pub fn get(&self, label: &str) -> Option<&[f32]> {
        self.vectors.get(label).map(Vec::as_slice)
    }

    /// Vector dimension (0 for an empty table without a declared dimension).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
