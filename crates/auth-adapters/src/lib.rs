//! auth-adapters
//!
//! Session verification backends. Each turns a bearer credential into the
//! `AuthContext` the services run under; issuing credentials happens elsewhere.

#[cfg(feature = "auth-jwt")]
pub mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::{Claims, JwtVerifier};
