//! Error kinds raised by the public API, ported from the source's narrower
//! set of failure modes rather than the teacher's sprawling general-purpose enum.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AgiosError>;

#[derive(Debug, Error)]
pub enum AgiosError {
    #[error("failed to allocate internal structures: {0}")]
    AllocFailure(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("unknown scheduling policy: {0}")]
    UnknownPolicy(String),

    #[error("request not found: file={file_id} offset={offset} length={length}")]
    NotFound {
        file_id: String,
        offset: u64,
        length: u64,
    },

    #[error("migration between indexes failed: {0}")]
    MigrationFailure(String),
}
