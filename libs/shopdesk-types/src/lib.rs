//! Shared session, claims and wire types for Shopdesk API clients.
//!
//! This crate provides:
//! - The credential pair and session record (`CredentialPair`, `Session`)
//! - Identity claims and roles (`IdentityClaims`, `Role`)
//! - Auth endpoint payloads (refresh exchange, login, OTP)
//! - Lenient parsing of API error bodies
//! - Unverified JWT claim peeking for display and routing

mod auth;
mod claims;
mod credentials;
mod errors;

pub use auth::{
    AuthResponse, LoginRequest, OtpRequest, OtpVerifyRequest, RefreshRequest, RefreshResponse,
    UserProfile,
};
pub use claims::{IdentityClaims, Role, peek_claims};
pub use credentials::{CredentialPair, Session};
pub use errors::{ApiErrorBody, ClaimsError};
