use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Input file not found: {path}")]
    InputMissing { path: String },

    #[error("{source_name} is missing required columns: {}", columns.join(", "))]
    MissingColumns { source_name: String, columns: Vec<String> },

    #[error("Invalid value for '{field}' on line {line}: '{value}'")]
    InvalidValue { field: String, value: String, line: u64 },

    #[error("Join target '{dimension}' is empty")]
    EmptyJoinTarget { dimension: String },

    #[error("Join target '{dimension}' is malformed: duplicate key {key}")]
    MalformedJoinTarget { dimension: String, key: String },

    #[error("Unmatched key in {relation}: {key}")]
    UnmatchedKey { relation: String, key: String },

    #[error("Sink unavailable at '{url}': {reason}")]
    SinkUnavailable { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EtlResult<T> = Result<T, EtlError>;
