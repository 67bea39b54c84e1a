//! Error types for inventory and report building.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the reporting pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Driver-level failure (connection, protocol, query)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Config file could not be read or parsed
    #[error("invalid config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection URL missing or malformed
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    /// Elevated credentials are incomplete
    #[error("invalid superuser credentials: {0}")]
    Credentials(String),

    /// A status resolver failed outside of its own isolation boundary
    #[error("resolver failed: {0}")]
    Resolver(String),
}

/// Result type for roster operations.
pub type RosterResult<T> = Result<T, RosterError>;
