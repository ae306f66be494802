//! HS256 JWT verification.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AuthError;
use crate::identity::{Identity, TokenVerifier};

/// Claims carried by relay access tokens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Verifies tokens signed with a shared secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Verifier for `secret`, optionally requiring a specific `iss`.
    pub fn new(secret: &[u8], issuer: Option<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss.as_str()]);
        }
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            validation,
            issuer,
        }
    }

    /// Sign a token for `identity` that expires after `ttl`.
    pub fn issue(&self, identity: &Identity, ttl: Duration) -> Result<String, AuthError> {
        let claims = Claims {
            sub: identity.user_id.clone(),
            name: identity.name.clone(),
            role: identity.role.clone(),
            iss: self.issuer.clone(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e),
            }
        })?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(Identity {
            user_id: claims.sub,
            name: claims.name,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &[u8] = b"test-secret-with-enough-entropy";

    fn dispatcher() -> Identity {
        Identity {
            user_id: "user-7".into(),
            name: Some("Dana".into()),
            role: Some("dispatcher".into()),
        }
    }

    #[test]
    fn valid_token_yields_identity() {
        let verifier = JwtVerifier::new(SECRET, None);
        let token = verifier.issue(&dispatcher(), Duration::minutes(5)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), dispatcher());
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = JwtVerifier::new(SECRET, None);
        let token = verifier.issue(&dispatcher(), Duration::hours(-2)).unwrap();
        assert_matches!(verifier.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let signer = JwtVerifier::new(b"another-secret", None);
        let verifier = JwtVerifier::new(SECRET, None);
        let token = signer.issue(&dispatcher(), Duration::minutes(5)).unwrap();
        assert_matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        let verifier = JwtVerifier::new(SECRET, None);
        assert_matches!(verifier.verify("not.a.jwt"), Err(AuthError::InvalidToken(_)));
    }

    #[test]
    fn issuer_is_enforced_when_configured() {
        let strict = JwtVerifier::new(SECRET, Some("fulfillment".into()));
        let other = JwtVerifier::new(SECRET, Some("someone-else".into()));
        let token = other.issue(&dispatcher(), Duration::minutes(5)).unwrap();
        assert!(strict.verify(&token).is_err());

        let good = strict.issue(&dispatcher(), Duration::minutes(5)).unwrap();
        assert!(strict.verify(&good).is_ok());
    }

    #[test]
    fn empty_subject_is_rejected() {
        let verifier = JwtVerifier::new(SECRET, None);
        let token = verifier
            .issue(&Identity::user(" "), Duration::minutes(5))
            .unwrap();
        assert_matches!(verifier.verify(&token), Err(AuthError::MissingSubject));
    }

    #[test]
    fn debug_does_not_leak_keys() {
        let verifier = JwtVerifier::new(SECRET, None);
        let rendered = format!("{verifier:?}");
        assert!(!rendered.contains("test-secret"));
    }
}
