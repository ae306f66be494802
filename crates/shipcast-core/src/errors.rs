//! Error taxonomy for the relay.
//!
//! Every failure a client can observe maps onto one of four classes, each
//! carried on the wire as a numeric `code` inside an `error` message:
//!
//! | variant    | code | connection |
//! |------------|------|------------|
//! | `Auth`     | 401  | closed with policy violation |
//! | `Protocol` | 400  | kept open |
//! | `NotFound` | 404  | kept open |
//! | `Internal` | 500  | kept open |

use thiserror::Error;

/// Bad request: malformed frame, unknown kind, or missing field.
pub const PROTOCOL_ERROR: u16 = 400;
/// Invalid or expired token.
pub const AUTH_ERROR: u16 = 401;
/// Referenced shipment does not exist.
pub const NOT_FOUND: u16 = 404;
/// Unexpected failure while handling a request.
pub const INTERNAL_ERROR: u16 = 500;

/// Fixed reason sent to clients whose token fails verification.
pub const AUTH_FAILED_REASON: &str = "Authentication failed: invalid or expired token";

/// Error type surfaced by relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Token verification failed.
    #[error("{message}")]
    Auth {
        /// Description of the failure.
        message: String,
    },

    /// Inbound frame could not be understood.
    #[error("{message}")]
    Protocol {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested resource does not exist.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// Unexpected failure (store access, bookkeeping, serialization).
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl RelayError {
    /// Build a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Build a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Build an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Numeric wire code for this variant.
    pub fn code(&self) -> u16 {
        match self {
            Self::Auth { .. } => AUTH_ERROR,
            Self::Protocol { .. } => PROTOCOL_ERROR,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Whether the connection must be closed after reporting this error.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(format!("serialization failed: {e}"))
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
