//! Error types for tuplestore
//!
//! Provides a unified error type for all operations.
//!
//! Errors split into two groups:
//! - **Recoverable**: the operation is rejected, the store stays usable
//!   (`RecordTooLarge`, `EmptyRecord`, `ReadOnly`, `MixedAccess`, `Config`)
//! - **Fatal**: the session must be abandoned (corruption, I/O, codec failures);
//!   the engine answers every later call with `Poisoned`

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure to turn on-disk bytes back into a block
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("corrupt block: {0}")]
    Corrupt(String),
}

/// Unified error type for tuplestore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Open Errors
    // -------------------------------------------------------------------------
    #[error("cannot open file '{}': {}", .path.display(), .source)]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("record of {size} bytes exceeds the maximum of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    #[error("empty records cannot be stored")]
    EmptyRecord,

    // -------------------------------------------------------------------------
    // Block Errors
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("store is opened read-only")]
    ReadOnly,

    #[error("mixed read/write access on one engine: {0}")]
    MixedAccess(String),

    #[error("engine unusable after an earlier failure: {0}")]
    Poisoned(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the error invalidates the whole session.
    ///
    /// Corruption, I/O and codec failures are fatal; rejected inserts and
    /// usage mistakes leave the store usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StoreError::RecordTooLarge { .. }
                | StoreError::EmptyRecord
                | StoreError::ReadOnly
                | StoreError::MixedAccess(_)
                | StoreError::Config(_)
        )
    }

    /// Whether the error reports on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::Decode(DecodeError::Corrupt(_)))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
