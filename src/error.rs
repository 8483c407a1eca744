//! Error types for wirecall
//!
//! Provides a unified error type for all operations, and the mapping from
//! errors to the status byte carried in reply frames.

use thiserror::Error;

use crate::protocol::StatusCode;

/// Result type alias using WireError
pub type Result<T> = std::result::Result<T, WireError>;

/// Unified error type for wirecall operations
#[derive(Debug, Error)]
pub enum WireError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No more data in payload stream")]
    EndOfStream,

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("No service registered for request uri '{0}'")]
    InvalidRequestUri(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Server is overloaded, request rejected")]
    Overloaded,

    /// Error reply received from the remote side
    #[error("Remote error ({status:?}): {message}")]
    Remote { status: StatusCode, message: String },

    // -------------------------------------------------------------------------
    // Application Errors
    // -------------------------------------------------------------------------
    /// Raised by a service handler; travels back to the caller as ServerError
    #[error("Server error: {0}")]
    Server(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Addressing / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Component is shut down")]
    Shutdown,
}

impl WireError {
    /// Shorthand for an application error raised by a handler
    pub fn server(message: impl Into<String>) -> Self {
        WireError::Server(message.into())
    }

    /// Status byte used when this error is reported to a peer
    pub fn status_code(&self) -> StatusCode {
        match self {
            WireError::InvalidMessageFormat(_) => StatusCode::InvalidMessageFormat,
            WireError::InvalidRequestUri(_) => StatusCode::InvalidRequestUri,
            WireError::AccessDenied(_) => StatusCode::AccessDenied,
            WireError::Overloaded => StatusCode::ServerBusy,
            WireError::Server(_) | WireError::Serialization(_) => StatusCode::ServerError,
            WireError::Remote { status, .. } => *status,
            _ => StatusCode::InternalError,
        }
    }

    /// Whether the connection that produced this error must be closed
    ///
    /// Application errors and access denials are answered with a normal
    /// reply, the connection stays in sync and can be reused.
    pub fn is_fatal_to_connection(&self) -> bool {
        match self {
            WireError::Server(_) | WireError::AccessDenied(_) | WireError::Serialization(_) => {
                false
            }
            WireError::Remote { status, .. } => status.closes_connection(),
            _ => true,
        }
    }

    /// Convert a remote status into an error, `None` for Success
    pub fn from_status(status: StatusCode, message: Option<&str>) -> Option<Self> {
        if status == StatusCode::Success {
            return None;
        }
        Some(WireError::Remote {
            status,
            message: message.unwrap_or("no error message").to_string(),
        })
    }

    /// True when the remote side rejected the request because it was overloaded
    pub fn is_overloaded(&self) -> bool {
        matches!(
            self,
            WireError::Overloaded
                | WireError::Remote {
                    status: StatusCode::ServerBusy,
                    ..
                }
        )
    }
}

// Formatters only encode to and decode from in-memory buffers, so even
// bincode's I/O errors mean a malformed payload
impl From<bincode::Error> for WireError {
    fn from(err: bincode::Error) -> Self {
        WireError::Serialization(err.to_string())
    }
}
