//! Error types for the accounting API client.
//!
//! # Design
//! Three failure families reach callers and each is its own variant set:
//! transport (`Network`, `HttpStatus`), decode (`Decode`) and remote
//! (`Remote`). A remote error is a well-formed envelope whose `error` element
//! is non-empty; its `Display` is exactly the service's message. None of them
//! are retried by the client.

use thiserror::Error;

/// Errors returned by `Api` operations and the envelope codec.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body is not a valid envelope.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The envelope decoded but carries an error from the service.
    ///
    /// `code` and `field` are diagnostics the service sends with failed
    /// writes; they are absent for list calls.
    #[error("{message}")]
    Remote {
        message: String,
        code: Option<String>,
        field: Option<String>,
    },

    /// The request envelope could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ApiError {
    pub(crate) fn remote(message: impl Into<String>) -> Self {
        ApiError::Remote {
            message: message.into(),
            code: None,
            field: None,
        }
    }

    /// True for network failures and non-success HTTP statuses.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::HttpStatus { .. })
    }

    /// The service's own message, if this is a remote error.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            ApiError::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Errors raised while loading `AuthConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
}
