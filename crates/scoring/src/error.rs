use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoringError>;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Embedding collaborator failed: {0}")]
    Embedding(String),

    #[error("Embedding dimensions disagree: {0} vs {1}")]
    DimensionMismatch(usize, usize),
}
