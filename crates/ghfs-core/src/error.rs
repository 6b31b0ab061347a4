//! Error types for namespace resolution and the remote transport.
//!
//! [`RemoteError`] is whatever the remote collaborator reports. The resolver
//! translates exactly one of its variants, [`RemoteError::NotFound`], into
//! [`FsError::NotFound`]; every other remote failure travels through
//! unchanged inside [`FsError::Transport`].

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures reported by a remote collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote entity does not exist (HTTP 404 or a GraphQL `NOT_FOUND`).
    #[error("remote resource not found")]
    NotFound,

    /// Credentials were rejected.
    #[error("remote rejected credentials")]
    Unauthorized,

    /// The API rate limit is exhausted.
    #[error("rate limit exceeded (resets at {reset:?})")]
    RateLimited {
        /// When the limit resets, if the server said so.
        reset: Option<DateTime<Utc>>,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Server-provided message, if any.
        message: String,
    },

    /// Connection, TLS or timeout failure below HTTP.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not valid JSON for the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response decoded but did not have the shape the backend expects.
    #[error("malformed remote payload: {0}")]
    Malformed(String),

    /// The GraphQL endpoint returned errors.
    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// Blob content is binary and the backend only serves text.
    #[error("binary content is not available through this backend")]
    BinaryContent,

    /// No usable credentials could be found.
    #[error("authentication unavailable: {0}")]
    Auth(String),
}

/// Result type for remote collaborator calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures of a namespace operation.
#[derive(Debug, Error)]
pub enum FsError {
    /// No entity exists at this path.
    #[error("no such entry: {path}")]
    NotFound {
        /// Path of the missing child.
        path: String,
    },

    /// A container operation was attempted on a leaf node.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// Path of the leaf node.
        path: String,
    },

    /// `read` was attempted on a directory-kind node.
    #[error("is a directory: {path}")]
    IsADirectory {
        /// Path of the directory node.
        path: String,
    },

    /// `read` was attempted on a leaf that has no readable content.
    #[error("not a regular file: {path}")]
    NotAFile {
        /// Path of the leaf node.
        path: String,
    },

    /// The remote content kind is one this filesystem does not model
    /// (for example a submodule reference).
    #[error("unrepresentable remote entry: {path}")]
    Unrepresentable {
        /// Path of the entry.
        path: String,
    },

    /// Any other remote failure, passed through untouched.
    #[error(transparent)]
    Transport(#[from] RemoteError),
}

impl FsError {
    /// Converts a remote failure observed while resolving `path`.
    ///
    /// Only "not found" is translated; everything else stays opaque.
    pub fn from_remote(error: RemoteError, path: impl Into<String>) -> Self {
        match error {
            RemoteError::NotFound => FsError::NotFound { path: path.into() },
            other => FsError::Transport(other),
        }
    }

    /// Returns true if this error denotes a missing entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

/// Result type for namespace operations.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_translated() {
        let e = FsError::from_remote(RemoteError::NotFound, "alice/ghost");
        assert!(e.is_not_found());
        assert!(e.to_string().contains("alice/ghost"));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let e = FsError::from_remote(RemoteError::Unauthorized, "alice");
        assert!(matches!(e, FsError::Transport(RemoteError::Unauthorized)));

        let e = FsError::from_remote(
            RemoteError::Http {
                status: 502,
                message: "bad gateway".to_string(),
            },
            "alice",
        );
        assert!(matches!(e, FsError::Transport(RemoteError::Http { status: 502, .. })));
    }

    #[test]
    fn test_transport_display_is_transparent() {
        let e = FsError::from(RemoteError::Malformed("missing field".to_string()));
        assert_eq!(e.to_string(), "malformed remote payload: missing field");
    }

    #[test]
    fn test_graphql_errors_joined() {
        let e = RemoteError::GraphQl(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(e.to_string(), "GraphQL errors: first; second");
    }
}
