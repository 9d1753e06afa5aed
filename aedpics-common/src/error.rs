//! Common error types for AEDpics

use thiserror::Error;

/// Common result type for AEDpics operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the registry crates
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

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write rejected because of a conflicting row
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Encryption or decryption of a protected field failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the underlying database error is a UNIQUE/PRIMARY KEY violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
