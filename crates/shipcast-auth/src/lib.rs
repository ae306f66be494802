//! # shipcast-auth
//!
//! Token verification for tracking connections. [`TokenVerifier`] is the
//! seam; [`JwtVerifier`] checks HS256 tokens against a shared secret.

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod jwt;

pub use errors::AuthError;
pub use identity::{Identity, TokenVerifier};
pub use jwt::{Claims, JwtVerifier};
