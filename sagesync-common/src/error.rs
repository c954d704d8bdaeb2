//! Common error types for SageSync

use thiserror::Error;

/// Common result type for SageSync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the SageSync services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input record or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A SAGE property value could not be converted to its target field type
    #[error("Coercion error: {0}")]
    Coercion(String),

    /// A tile expected to exist on a sample is missing
    #[error("Tile integrity error: {0}")]
    TileIntegrity(String),

    /// Entity serialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
