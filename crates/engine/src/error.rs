use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parser(#[from] advisor_parser::ParserError),

    #[error(transparent)]
    Ingest(#[from] advisor_ingest::IngestError),

    #[error(transparent)]
    Graph(#[from] advisor_graph::GraphError),

    #[error(transparent)]
    Ledger(#[from] advisor_ledger::LedgerError),

    #[error(transparent)]
    Scoring(#[from] advisor_scoring::ScoringError),

    #[error("Inference collaborator failed: {0}")]
    Inference(String),
}
