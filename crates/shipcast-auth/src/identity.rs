//! Verified identities and the verifier seam.

use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

/// Who is on the other end of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name, when the token carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role label, when the token carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    /// Identity with only a user id.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
            role: None,
        }
    }
}

/// Turns an opaque bearer token into an [`Identity`].
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`, returning the identity it asserts.
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}
