//! Authentication errors.

use shipcast_core::RelayError;
use shipcast_core::errors::AUTH_FAILED_REASON;
use thiserror::Error;

/// Why a token was not accepted.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Signature, structure, or claim validation failed.
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// The token is well-formed but past its `exp`.
    #[error("token expired")]
    Expired,

    /// The token carries an empty subject.
    #[error("token has no subject")]
    MissingSubject,

    /// A token was supplied but no verifier is configured.
    #[error("token verification is not configured")]
    NotConfigured,

    /// No token was supplied and anonymous access is disabled.
    #[error("authentication required")]
    TokenRequired,
}

impl From<AuthError> for RelayError {
    fn from(_: AuthError) -> Self {
        // Clients always see the same reason; details stay in the logs.
        RelayError::Auth {
            message: AUTH_FAILED_REASON.into(),
        }
    }
}
