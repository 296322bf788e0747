//! Error handling module for vidsqueeze

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::errors::CompressionError;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Environment override could not be applied
    #[error("Invalid value for {var}: {reason}")]
    Env { var: String, reason: String },

    /// A setting is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main error type for vidsqueeze operations
#[derive(Error, Debug)]
pub enum VidSqueezeError {
    /// Compression request failed
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server stopped with an error
    #[error("Server error: {0}")]
    Server(String),

    /// Logging could not be initialized
    #[error("{0}")]
    Logging(String),
}

/// Result type alias for vidsqueeze operations
pub type VidSqueezeResult<T> = std::result::Result<T, VidSqueezeError>;
