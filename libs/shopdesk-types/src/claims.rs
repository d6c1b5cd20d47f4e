use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::ClaimsError;

/// Console role carried in identity claims.
///
/// Unknown roles are preserved verbatim in `Other` so that a newer backend
/// never breaks route checks on an older client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Staff,
    Customer,
    Owner,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Customer => "customer",
            Self::Owner => "owner",
            Self::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "staff" => Self::Staff,
            "customer" => Self::Customer,
            "owner" => Self::Owner,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity and role metadata for the signed-in user.
///
/// Created on login or OTP verification and read on every route check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    /// Role used for route authorization
    pub role: Role,

    /// Name shown in the console header
    pub display_name: String,

    /// Backend user ID, when the backend exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Email address, when the backend exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Subset of access-token claims the console cares about.
#[derive(Debug, Deserialize)]
struct AccessTokenPayload {
    sub: Option<String>,
    role: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    name: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    email: Option<String>,
}

/// Reads identity claims from an access token WITHOUT verifying it.
///
/// The backend is the only party that can verify its tokens; the client only
/// needs the payload for display and route decisions. Never use the result to
/// make a security decision on the server side.
pub fn peek_claims(token: &str) -> Result<IdentityClaims, ClaimsError> {
    if token.split('.').count() != 3 {
        return Err(ClaimsError::InvalidFormat(
            "expected three dot-separated segments".into(),
        ));
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<AccessTokenPayload>(
        token,
        &DecodingKey::from_secret(b"ignored"),
        &validation,
    )?;
    let payload = token_data.claims;

    let role = payload
        .role
        .or_else(|| payload.roles.into_iter().next())
        .map(Role::from)
        .ok_or_else(|| ClaimsError::MissingClaim("role".into()))?;

    let display_name = payload
        .display_name
        .or(payload.name)
        .or_else(|| payload.email.clone())
        .or_else(|| payload.sub.clone())
        .unwrap_or_default();

    Ok(IdentityClaims {
        role,
        display_name,
        user_id: payload.sub,
        email: payload.email,
    })
}
