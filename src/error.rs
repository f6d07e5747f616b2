//! Error types for collector.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The data file is malformed. A corrupt file cannot be partially
    /// trusted, so callers treat this as fatal.
    #[error("corrupt data file: {0}")]
    Decode(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker pool is stopped")]
    PoolStopped,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
