//! Error types for landmesh

use thiserror::Error;

/// Main error type for landmesh operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported mesher type: {0}")]
    UnsupportedMesherType(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for landmesh operations
pub type Result<T> = std::result::Result<T, Error>;
