use thiserror::Error;

pub type Result<T> = std::result::Result<T, QcError>;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid coordinate format: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Frame shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Station columns differ: {0}")]
    StationMismatch(String),

    #[error("Time index mismatch: {0}")]
    IndexMismatch(String),

    #[error("Station {0} not found")]
    StationNotFound(String),

    #[error("Timestamp {0} not found in index")]
    TimestampNotFound(chrono::NaiveDateTime),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
