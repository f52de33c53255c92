//! Error types for gnn4co-nn.

use thiserror::Error;

/// gnn4co-nn error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error (shape errors, device exhaustion, safetensors IO).
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Malformed graph data.
    #[error("graph error: {0}")]
    Graph(#[from] gnn4co_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Problem type string not among the supported problems.
    #[error("unrecognized problem type: {0:?} (expected max_cut, vertex_cover or max_clique)")]
    UnknownProblemType(String),

    /// Model type string not among the supported architectures.
    #[error("unrecognized model type: {0:?}")]
    UnknownModelType(String),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Training error.
    #[error("training error: {0}")]
    Training(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
