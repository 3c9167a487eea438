use thiserror::Error;

/// Result alias for `concept_forest`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by forest construction, merging, relation analysis and
/// graph interaction.
#[derive(Error, Debug)]
pub enum Error {
    /// A schema path could not be split into segments.
    #[error("malformed path {path:?}: {reason}")]
    MalformedPath {
        /// The offending input.
        path: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// Two vectors of different length were compared.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// A vector was missing or empty.
    #[error("embedding vector is empty or absent")]
    EmptyVector,

    /// The concept oracle could not produce a usable answer after retrying.
    #[error("could not resolve {subject} after {attempts} attempts: {reason}")]
    ConceptResolution {
        /// What was being named (labels or a label pair).
        subject: String,
        /// Number of oracle invocations made.
        attempts: usize,
        /// Last failure.
        reason: String,
    },

    /// No node carries the given id.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node exists but is not currently shown.
    #[error("node is hidden: {0}")]
    NodeHidden(String),

    /// Oracle response lacked a `{...}` delimited answer.
    #[error("empty or malformed oracle response: {response:?}")]
    EmptyOrMalformedResponse {
        /// Raw response text.
        response: String,
    },

    /// Transport-level failure of the text-generation backend.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Failure reported by the schema source.
    #[error("schema source error: {0}")]
    Schema(String),

    /// A row of the embedding dictionary could not be parsed.
    #[error("embedding table line {line}: {message}")]
    EmbeddingTable {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// The merge worker pool could not be started.
    #[error("worker pool error: {0}")]
    ThreadPool(String),

    /// Configuration could not be decoded.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Reading an embedding table or schema failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error indicates a caller or input bug rather than a
    /// collaborator failure. Structural errors are never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::MalformedPath { .. }
                | Error::NodeNotFound(_)
                | Error::NodeHidden(_)
                | Error::DimensionMismatch { .. }
                | Error::EmptyVector
                | Error::InvalidParameter { .. }
        )
    }
}
