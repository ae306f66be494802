//! Admission control for new connections.

use std::sync::Arc;

use shipcast_auth::{AuthError, Identity, TokenVerifier};
use shipcast_core::RelayError;
use tracing::{debug, warn};

/// Decides whether a connection attempt is admitted.
///
/// | token    | verifier | result |
/// |----------|----------|--------|
/// | none     | any      | anonymous if allowed, else 401 |
/// | supplied | none     | 401 |
/// | supplied | some     | identity, or 401 on failure |
#[derive(Clone)]
pub struct AuthGate {
    verifier: Option<Arc<dyn TokenVerifier>>,
    allow_anonymous: bool,
}

impl AuthGate {
    /// Gate with an optional verifier.
    pub fn new(verifier: Option<Arc<dyn TokenVerifier>>, allow_anonymous: bool) -> Self {
        Self {
            verifier,
            allow_anonymous,
        }
    }

    /// Gate that admits everyone without a token and nobody with one.
    pub fn anonymous_only() -> Self {
        Self::new(None, true)
    }

    /// Admit or refuse. `Ok(None)` is an anonymous admission.
    ///
    /// Empty tokens count as absent.
    pub fn admit(&self, token: Option<&str>) -> Result<Option<Identity>, RelayError> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            None if self.allow_anonymous => {
                debug!("admitting anonymous connection");
                Ok(None)
            }
            None => Err(refuse(AuthError::TokenRequired)),
            Some(token) => {
                let Some(verifier) = &self.verifier else {
                    return Err(refuse(AuthError::NotConfigured));
                };
                match verifier.verify(token) {
                    Ok(identity) => {
                        debug!(user_id = %identity.user_id, "token accepted");
                        Ok(Some(identity))
                    }
                    Err(e) => Err(refuse(e)),
                }
            }
        }
    }
}

fn refuse(err: AuthError) -> RelayError {
    warn!(reason = %err, "connection refused");
    err.into()
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("has_verifier", &self.verifier.is_some())
            .field("allow_anonymous", &self.allow_anonymous)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shipcast_core::errors::AUTH_FAILED_REASON;

    struct StaticVerifier;

    impl TokenVerifier for StaticVerifier {
        fn verify(&self, token: &str) -> Result<Identity, AuthError> {
            if token == "good" {
                Ok(Identity {
                    user_id: "u-1".into(),
                    name: Some("Ana".into()),
                    role: Some("buyer".into()),
                })
            } else {
                Err(AuthError::Expired)
            }
        }
    }

    fn gate(allow_anonymous: bool) -> AuthGate {
        AuthGate::new(Some(Arc::new(StaticVerifier)), allow_anonymous)
    }

    #[test]
    fn no_token_admits_anonymously() {
        assert_matches!(gate(true).admit(None), Ok(None));
        assert_matches!(gate(true).admit(Some("")), Ok(None));
    }

    #[test]
    fn valid_token_yields_identity() {
        let identity = gate(true).admit(Some("good")).unwrap().unwrap();
        assert_eq!(identity.user_id, "u-1");
        assert_eq!(identity.role.as_deref(), Some("buyer"));
    }

    #[test]
    fn invalid_token_is_refused_with_fixed_reason() {
        let err = gate(true).admit(Some("bad")).unwrap_err();
        assert_eq!(err.code(), 401);
        assert!(err.closes_connection());
        assert_eq!(err.to_string(), AUTH_FAILED_REASON);
    }

    #[test]
    fn token_without_verifier_is_refused() {
        let err = AuthGate::anonymous_only().admit(Some("anything")).unwrap_err();
        assert_matches!(err, RelayError::Auth { .. });
    }

    #[test]
    fn anonymous_can_be_disabled() {
        assert_matches!(gate(false).admit(None), Err(RelayError::Auth { .. }));
        assert!(gate(false).admit(Some("good")).is_ok());
    }
}
