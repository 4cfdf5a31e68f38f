use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// An edge referencing a missing node. Must never occur under
    /// correct transactional deletes; observing it means the named file
    /// needs a forced re-scan.
    #[error("Dangling reference in {file}: {detail}")]
    DanglingReference { file: String, detail: String },

    #[error("Graph I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
