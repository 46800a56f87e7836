//! Error types for passport-spa
//!
//! This module defines every failure the client can report, using
//! `thiserror` for the taxonomy and `anyhow` for propagation.
//!
//! Callers that need to branch on a specific failure recover the variant
//! with [`anyhow::Error::downcast_ref`]:
//!
//! ```
//! use passport_spa::error::PassportError;
//!
//! let err: anyhow::Error = PassportError::InvalidState.into();
//! assert!(matches!(
//!     err.downcast_ref::<PassportError>(),
//!     Some(PassportError::InvalidState)
//! ));
//! ```

use thiserror::Error;

/// Main error type for passport-spa operations
///
/// Variants up to [`PassportError::ScopeMismatch`] make up the
/// authorization taxonomy; the remaining ones cover configuration and the
/// platform capabilities the session depends on.
#[derive(Error, Debug)]
pub enum PassportError {
    /// The correlation entry for a `state` is missing or was already consumed
    #[error("Invalid state: no code verifier stored for this state")]
    InvalidState,

    /// A bearer token could not be decoded
    #[error("Token could not be decoded: {0}")]
    MalformedToken(String),

    /// The token endpoint answered without an access token
    #[error("Invalid token response: no access token")]
    InvalidTokenResponse,

    /// HTTP-level failure, carrying the server's error code and description
    #[error("Transport error ({error}): {description}")]
    Transport {
        /// OAuth error code, `request_error` when the server sent none
        error: String,
        /// Human readable description
        description: String,
    },

    /// The silent transport exceeded its time budget
    #[error("Authorization timed out after {0} seconds")]
    Timeout(u64),

    /// The callback was invoked without any query parameters to parse
    #[error("No query response parameters found")]
    NoQueryParameters,

    /// The exchanged token's scope disagrees with the requested scope
    #[error("Authorized scope '{requested}' does not match the received token's scope '{granted}'")]
    ScopeMismatch {
        /// Scope stored with the correlation entry
        requested: String,
        /// Scope carried by the token, as a space-joined string
        granted: String,
    },

    /// A required parameter is missing from the authorization response
    #[error("Missing authorization response parameter: {0}")]
    MissingParameter(&'static str),

    /// The authorization server answered with an error instead of a code
    #[error("Authorization denied ({error}): {description}")]
    AuthorizationDenied {
        /// OAuth error code, e.g. `login_required`
        error: String,
        /// Optional description sent by the server
        description: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Correlation store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Background frame errors (attach or detach failures)
    #[error("Frame error: {0}")]
    Frame(String),

    /// The page cannot navigate to a URL
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for passport-spa operations
///
/// Uses `anyhow::Error` so that context can be attached on the way up;
/// the [`PassportError`] variant stays reachable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the [`PassportError`] carried by `err`, if any.
pub fn kind(err: &anyhow::Error) -> Option<&PassportError> {
    err.downcast_ref::<PassportError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let error = PassportError::InvalidState;
        assert_eq!(
            error.to_string(),
            "Invalid state: no code verifier stored for this state"
        );
    }

    #[test]
    fn test_transport_error_display() {
        let error = PassportError::Transport {
            error: "invalid_grant".to_string(),
            description: "code expired".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transport error (invalid_grant): code expired"
        );
    }

    #[test]
    fn test_timeout_display() {
        let error = PassportError::Timeout(20);
        assert_eq!(error.to_string(), "Authorization timed out after 20 seconds");
    }

    #[test]
    fn test_scope_mismatch_display() {
        let error = PassportError::ScopeMismatch {
            requested: "read".to_string(),
            granted: "*".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("'read'"));
        assert!(s.contains("'*'"));
    }

    #[test]
    fn test_no_query_parameters_display() {
        let error = PassportError::NoQueryParameters;
        assert_eq!(error.to_string(), "No query response parameters found");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: PassportError = json_error.into();
        assert!(matches!(error, PassportError::Serialization(_)));
    }

    #[test]
    fn test_kind_recovers_variant_through_anyhow() {
        let err: anyhow::Error = PassportError::NoQueryParameters.into();
        assert!(matches!(kind(&err), Some(PassportError::NoQueryParameters)));

        let other = anyhow::anyhow!("plain");
        assert!(kind(&other).is_none());
    }

    #[test]
    fn test_navigation_display() {
        let error = PassportError::Navigation("unsupported scheme 'file'".to_string());
        assert_eq!(
            error.to_string(),
            "Navigation error: unsupported scheme 'file'"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PassportError>();
    }
}
