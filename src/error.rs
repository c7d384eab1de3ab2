//! Error types for cmdkit.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for entry store and service operations.
#[derive(Error, Debug)]
pub enum KitError {
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Entry already exists: {0}")]
    EntryExists(String),

    #[error("{0}")]
    Validation(String),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Clipboard operation failed")]
    ClipboardFailed,

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Shared view state is poisoned")]
    StatePoisoned,

    #[error("No async runtime available for background filtering")]
    NoRuntime,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, KitError>;
