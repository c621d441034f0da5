//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
///
/// Every failure a session can observe maps onto one of these variants.
/// Only [`Error::Connection`] is fatal to an established session.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote service cannot be reached or the connection dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Login returned false
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A local precondition failed before any remote call was issued
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote service rejected or failed the call
    #[error("Remote error: {0}")]
    Remote(String),

    /// The transaction log could not write an event
    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a remote error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Whether the error ends an authenticated session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// The bare message, without the category prefix
    ///
    /// Used as the `detail` of an `Error` event so the user sees what the
    /// remote service (or the local check) actually said.
    pub fn detail(&self) -> String {
        match self {
            Self::Connection(msg)
            | Self::Auth(msg)
            | Self::Validation(msg)
            | Self::Remote(msg)
            | Self::Logging(msg)
            | Self::Config(msg)
            | Self::Other(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
