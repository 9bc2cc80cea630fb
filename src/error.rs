//! Error types for Cloud Foundry and Vault operations.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the CF client, the token manager and the secrets walker.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected credentials or an expired/revoked refresh token. Not locally
    /// recoverable; the caller must restart the session.
    #[error("authentication failed ({status}): {body}")]
    Authentication {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Non-success HTTP status on a resource operation.
    #[error("resource request failed ({status}): {body}")]
    Resource {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Name-to-guid resolution found nothing. Distinct from an empty but
    /// valid result set.
    #[error("no {collection} named {name:?}")]
    NotFound {
        collection: &'static str,
        name: String,
    },

    /// The continuation loop failed to terminate within the configured bound.
    #[error("pagination of {endpoint} exceeded {max_pages} pages")]
    Pagination { endpoint: String, max_pages: usize },

    /// Listing an invalid or leaf-typed secret path where a directory was
    /// expected. Distinct from a directory that has no children.
    #[error("secret path {path:?}: {reason}")]
    SecretPath { path: String, reason: String },

    /// A service binding is missing fields required for the AppRole handshake.
    #[error("service credentials missing {0}")]
    Credentials(&'static str),

    /// Settings file could not be located or parsed.
    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 payload")]
    Decode(#[from] base64::DecodeError),
}

impl Error {
    /// True for failures that end the session rather than the single call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Authentication { .. } | Error::Credentials(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            collection: "org",
            name: "dev".to_string(),
        };
        assert_eq!(err.to_string(), "no org named \"dev\"");
    }

    #[test]
    fn test_authentication_is_fatal() {
        let err = Error::Authentication {
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "bad credentials".to_string(),
        };
        assert!(err.is_fatal());

        let err = Error::Pagination {
            endpoint: "/v2/apps".to_string(),
            max_pages: 10,
        };
        assert!(!err.is_fatal());
    }
}
