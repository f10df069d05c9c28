//! Error types for clipio core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A setting holds a value the protocol cannot work with.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read config file {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },
}
