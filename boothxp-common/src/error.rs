//! Common error types for Booth XP

use thiserror::Error;
use uuid::Uuid;

/// Common result type for Booth XP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the reward engine and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// No reward record exists for the given user
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    /// User store write failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Presence, booth or event bus lookup failed
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error came from writing to or reading from the user store
    pub fn is_persistence(&self) -> bool {
        match self {
            Error::Persistence(_) => true,
            #[cfg(feature = "sqlx")]
            Error::Database(_) => true,
            _ => false,
        }
    }
}
