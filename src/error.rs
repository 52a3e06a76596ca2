//! Error handling for the fleet administration core

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation / precondition error (fails before any device is touched)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (duplicate)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network error (transport-level failure reaching a device)
    #[error("Network error: {0}")]
    Network(String),

    /// Protocol error (device answered with a non-zero application code)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Login failure against a device
    #[error("login failed: {0}")]
    Login(String),

    /// SSH session error
    #[error("SSH error: {0}")]
    Ssh(String),

    /// Transfer integrity error (size mismatch after a file transfer)
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Registry store write failure; in-memory state is still valid
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ssh2::Error> for Error {
    fn from(e: ssh2::Error) -> Self {
        Error::Ssh(e.to_string())
    }
}
