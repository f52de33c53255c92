use thiserror::Error;

/// Errors raised while building or loading graph data.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// An edge endpoint does not name a node of the graph.
    #[error("edge {edge} references node {node}, but the graph has {num_nodes} nodes")]
    EdgeOutOfRange {
        edge: usize,
        node: usize,
        num_nodes: usize,
    },
    /// A per-edge or per-node vector has the wrong length.
    #[error("{what} has length {got}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// Invalid argument to a dataset or loader constructor.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for gnn4co-core.
pub type Result<T> = std::result::Result<T, Error>;
