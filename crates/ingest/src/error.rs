use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parser(#[from] advisor_parser::ParserError),

    #[error(transparent)]
    Graph(#[from] advisor_graph::GraphError),

    #[error("Graph writer is no longer running")]
    WriterUnavailable,
}
