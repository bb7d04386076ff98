//! Error types for the classification client.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a caller of the client can observe, and `OAuthError`, which narrows down
//! why a token could not be obtained. It implements `From<Error>` for
//! `tonic::Status` so errors raised inside tower services (the credential
//! hook) travel through the transport and can be recovered on the other side.
//!
//! ## Error Cases
//! - `Credential`: Bad constructor arguments (e.g. an empty client id).
//! - `InvalidHost` / `InvalidConfig`: Rejected channel or client settings.
//! - `OAuth`: The token endpoint rejected the request or was unreachable.
//! - `Classification`: The service reported a global error mid-stream. Always
//!   fatal to that stream.
//! - `Output`: A per-item error surfaced on request by the output helpers.
//! - `Transform`: A user-supplied transform failed. Always fatal to the
//!   batcher that ran it.
//! - `ChannelError` / `BatcherShutdown`: Internal task plumbing failures.
//! - `Transport` / `Rpc`: Errors reported by `tonic`.

use std::error::Error as StdError;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Boxed error returned by user-supplied transforms.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Unified error type for the classification client.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Credentials were rejected before any request was made.
    #[error("Credential error: {reason}")]
    Credential { reason: String },

    /// The host to connect to was empty or unparsable.
    #[error("Invalid host: {reason}")]
    InvalidHost { reason: String },

    /// A client or batcher option is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The OAuth token endpoint failed.
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// Global error reported by the classification service.
    #[error("{message}")]
    Classification {
        code: i32,
        message: String,
        details: String,
    },

    /// A single output carried an error.
    #[error("Classification output {correlation_id} failed: {message}{}", details_suffix(.details))]
    Output {
        correlation_id: String,
        code: i32,
        message: String,
        details: String,
    },

    /// A transform function failed on an input item.
    #[error("Transform failed: {0}")]
    Transform(#[source] BoxError),

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The batcher was shut down or has already failed.
    #[error("Batcher has been shut down")]
    BatcherShutdown,

    /// Failure establishing the transport.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A call ended with a non-OK gRPC status.
    #[error("RPC failed: {0}")]
    Rpc(#[from] Status),
}

/// Why an OAuth token request failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// The endpoint answered with a non-2xx status.
    #[error("OAuth request failed with status {status}{}", description_suffix(.description))]
    Status {
        status: u16,
        description: Option<String>,
    },

    /// The endpoint could not be reached or timed out.
    #[error("Failed to connect to OAuth server: {0}")]
    Network(String),

    /// A 2xx response was missing or had malformed fields.
    #[error("Invalid OAuth response format: {0}")]
    MalformedResponse(String),
}

fn description_suffix(description: &Option<String>) -> String {
    match description {
        Some(desc) if !desc.is_empty() => format!(": {desc}"),
        _ => String::new(),
    }
}

fn details_suffix(details: &str) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!(" ({details})")
    }
}

impl Error {
    /// Wraps any transform failure.
    pub fn transform<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transform(err.into())
    }

    /// Returns `true` if this is a global classification error.
    pub const fn is_classification(&self) -> bool {
        matches!(self, Self::Classification { .. })
    }

    /// Recovers a client error carried as the source of a `tonic::Status`.
    ///
    /// Errors raised by the credential hook are boxed by the transport and
    /// arrive here as `Status::unknown` with the original error as source.
    pub fn oauth_from_status(status: &Status) -> Option<OAuthError> {
        let mut source = StdError::source(status);
        while let Some(err) = source {
            if let Some(Self::OAuth(oauth)) = err.downcast_ref::<Self>() {
                return Some(oauth.clone());
            }
            if let Some(oauth) = err.downcast_ref::<OAuthError>() {
                return Some(oauth.clone());
            }
            source = err.source();
        }
        None
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Credential { reason } => Status::unauthenticated(reason),
            Error::OAuth(e) => Status::from_error(Box::new(Error::OAuth(e))),
            Error::InvalidHost { reason } | Error::InvalidConfig { reason } => {
                Status::invalid_argument(reason)
            }
            Error::Rpc(status) => status,
            other => Status::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_status_message_includes_description() {
        let err = OAuthError::Status {
            status: 401,
            description: Some("Unauthorized".to_string()),
        };
        assert_eq!(err.to_string(), "OAuth request failed with status 401: Unauthorized");

        let bare = OAuthError::Status {
            status: 500,
            description: None,
        };
        assert_eq!(bare.to_string(), "OAuth request failed with status 500");
    }

    #[test]
    fn classification_error_displays_message_only() {
        let err = Error::Classification {
            code: 4,
            message: "bad affiliate".to_string(),
            details: "affiliate not enabled".to_string(),
        };
        assert_eq!(err.to_string(), "bad affiliate");
        assert!(err.is_classification());
    }

    #[test]
    fn output_error_includes_details_when_present() {
        let err = Error::Output {
            correlation_id: "test-789".to_string(),
            code: 2,
            message: "Model failed".to_string(),
            details: "GPU memory exhausted".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("test-789"));
        assert!(text.contains("Model failed"));
        assert!(text.contains("GPU memory exhausted"));
    }

    #[test]
    fn oauth_error_survives_status_round_trip() {
        let status: Status = Error::OAuth(OAuthError::Network("refused".to_string())).into();
        assert_eq!(
            Error::oauth_from_status(&status),
            Some(OAuthError::Network("refused".to_string()))
        );
    }

    #[test]
    fn plain_status_carries_no_oauth_error() {
        let status = Status::unavailable("connection reset");
        assert_eq!(Error::oauth_from_status(&status), None);
    }
}
