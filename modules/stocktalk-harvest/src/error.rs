use std::path::PathBuf;

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid harvest config: {0}")]
    InvalidConfig(String),
}

/// Anything that goes wrong reading or writing batch and dataset files.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Refusing to overwrite existing file {0}")]
    AlreadyExists(PathBuf),

    #[error("Unexpected layout in {path}: {reason}")]
    Schema { path: PathBuf, reason: String },
}
