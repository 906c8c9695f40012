use thiserror::Error;

use crate::assign::Assignment;

/// Errors surfaced by key hashing, bucket assignment and experiment dispatch.
///
/// Assignment is pure, so none of these are retried and no fallback bucket is
/// ever chosen; the caller decides what experience to show instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("no callback for {assignment}")]
    MissingCallback { assignment: Assignment },

    #[error("hash function returned {value} for key {key:?}; values must be non-negative")]
    HashFunction { key: String, value: i64 },

    #[error("identity unavailable: {message}")]
    Identity { message: String },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
