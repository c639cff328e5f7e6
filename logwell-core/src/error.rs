use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid labels: {0}")]
    Labels(#[from] logwell_model::LabelError),

    #[error("{0}")]
    Selector(#[from] logwell_model::SelectorError),

    #[error("invalid time range: {0}")]
    TimeRange(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("ingest buffer full")]
    BufferFull,

    #[error("corrupt chunk: {0}")]
    Corrupt(String),

    #[error("shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
