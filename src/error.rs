//! Error types for the agent stream client.

use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// Transport and configuration failures.
///
/// Protocol-level failures reported by the backend while the connection is
/// healthy are not errors here; they arrive as `StreamEvent::Error` values.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The backend answered with a non-success status before streaming.
    #[error("{status} {reason} - {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    /// The backend answered with success but no body to stream from.
    #[error("{status} response carried no event stream body")]
    EmptyBody { status: u16 },

    /// The request could not be sent or the response headers never arrived.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The byte stream broke after streaming had started.
    #[error("stream read failed: {0}")]
    Stream(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn stream<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ClientError::Stream(Box::new(err))
    }

    /// HTTP status code, when the failure was decided by the response status.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } | ClientError::EmptyBody { status } => {
                Some(*status)
            }
            _ => None,
        }
    }
}
