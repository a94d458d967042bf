//! Error type shared by the sort pipeline and the clustering engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, sorting or clustering p-value triplets.
#[derive(Debug, Error)]
pub enum PvError {
    /// Underlying file system or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup outside the known identifier range.
    #[error("{message} (value: {value})")]
    OutOfRange {
        /// The offending value
        value: u64,
        /// What was being looked up
        message: String,
    },

    /// The sorted edge stream handed to a clustering run does not exist.
    #[error("edge stream {path:?} could not be opened: {source}")]
    MissingEdgeStream {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Snapshot or config (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl PvError {
    pub fn out_of_range(value: impl Into<u64>, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PvError>;
