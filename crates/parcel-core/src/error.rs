//! Error types for the parcel tracker
//!
//! The first three variants form the taxonomy every shipment source reports:
//! [`Error::Authentication`], [`Error::Request`] and [`Error::Unexpected`].
//! The remaining variants cover configuration and storage.

use thiserror::Error;

/// Result type alias for parcel tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the parcel tracker
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials were rejected by the provider (HTTP 401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The provider answered with an error status or an empty envelope,
    /// or the request timed out
    #[error("{}", format_request(.status, .message))]
    Request {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error message (includes the response body when there was one)
        message: String,
    },

    /// Anything not anticipated: malformed JSON, connection reset, ...
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config store errors
    #[error("Config store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_request(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(status) => format!("Request failed ({}): {}", status, message),
        None => format!("Request failed: {}", message),
    }
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a request error for a response with the given status
    pub fn request(status: u16, msg: impl Into<String>) -> Self {
        Self::Request {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Create a request error that has no HTTP status (timeouts)
    pub fn request_without_status(msg: impl Into<String>) -> Self {
        Self::Request {
            status: None,
            message: msg.into(),
        }
    }

    /// Create an unexpected error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a config store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// True for [`Error::Authentication`]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// True for [`Error::Request`]
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request { .. })
    }

    /// HTTP status carried by a request error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_display_includes_status() {
        let err = Error::request(500, "boom");
        assert_eq!(err.to_string(), "Request failed (500): boom");
        assert_eq!(err.status(), Some(500));

        let err = Error::request_without_status("timed out");
        assert_eq!(err.to_string(), "Request failed: timed out");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Error::auth("nope").is_auth());
        assert!(!Error::auth("nope").is_request());
        assert!(Error::request(404, "missing").is_request());
        assert!(!Error::unexpected("reset").is_request());
    }
}
