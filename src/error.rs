//! Error kinds for the configuration manager.
//!
//! # Design Decisions
//! - Explicit calls (`init`, `load_config`, `get_config`, `update_config`)
//!   return these errors directly
//! - Watch-triggered reloads never return them; they surface through the
//!   `error` hook and the previous configuration is kept

use std::path::PathBuf;

use thiserror::Error;

use crate::options::FileFormat;

/// Errors that can occur while loading, copying or persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration has been loaded yet.
    #[error("configuration not initialized")]
    NotInitialized,

    /// The resolved configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file could not be parsed or did not fit the target type.
    #[error("failed to parse configuration file {}: {source}", path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    /// A value was not compatible with the one it was compared against.
    #[error("configuration type mismatch, changes blocked")]
    TypeMismatch,

    /// Directory creation, file write or file read failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value could not be serialized into the file format.
    #[error("failed to encode configuration as {format}: {message}")]
    Encode { format: FileFormat, message: String },

    /// Generic deep copy or structural comparison failed to serialize.
    #[error("failed to copy configuration snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The file watch backend reported an error.
    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    /// An environment binding was rejected.
    #[error("invalid environment binding: {0}")]
    InvalidBinding(String),

    /// `init` was called while a watch subscription is already running.
    #[error("configuration watcher already running")]
    AlreadyRunning,
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
