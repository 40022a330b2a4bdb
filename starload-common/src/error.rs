//! Common error types for starload

use thiserror::Error;

/// Common result type for starload operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by the warehouse, connection and configuration layers
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

    /// No connection registered under the requested id
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// No credentials resolvable for the requested id
    #[error("Unknown credentials: {0}")]
    UnknownCredentials(String),

    /// Invalid input such as a malformed identifier
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
