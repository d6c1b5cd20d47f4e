use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ClaimsError, CredentialPair, IdentityClaims, Role, Session, peek_claims};

/// Body of the refresh exchange.
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Successful refresh exchange response.
///
/// `refresh` is only present when the backend rotates the refresh credential.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(alias = "access_token")]
    pub access: String,

    #[serde(default, alias = "refresh_token")]
    pub refresh: Option<String>,
}

/// Username/password login.
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl fmt::Debug for LoginRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Asks the backend to send a one-time code to a phone number.
#[derive(Debug, Serialize)]
pub struct OtpRequest<'a> {
    pub phone: &'a str,
}

/// Exchanges a one-time code for a session.
#[derive(Debug, Serialize)]
pub struct OtpVerifyRequest<'a> {
    pub phone: &'a str,
    pub code: &'a str,
}

/// User block returned alongside credentials by login and OTP verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<String>,

    pub role: Role,

    #[serde(default, alias = "name")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
}

/// Response of login and OTP verification.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "access_token")]
    pub access: String,

    #[serde(alias = "refresh_token")]
    pub refresh: String,

    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl AuthResponse {
    /// Builds the session to store. Claims come from the `user` block when
    /// the backend sends one, otherwise from the access token payload.
    pub fn into_session(self) -> Result<Session, ClaimsError> {
        let claims = match self.user {
            Some(user) => IdentityClaims {
                role: user.role,
                display_name: user
                    .display_name
                    .or_else(|| user.email.clone())
                    .unwrap_or_default(),
                user_id: user.id,
                email: user.email,
            },
            None => peek_claims(&self.access)?,
        };

        Ok(Session::new(
            CredentialPair::new(self.access, self.refresh),
            Some(claims),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn test_refresh_response_without_rotation() {
        let parsed: RefreshResponse = serde_json::from_value(json!({ "access": "A2" })).unwrap();

        assert_eq!(parsed.access, "A2");
        assert!(parsed.refresh.is_none());
    }

    #[test]
    fn test_refresh_response_snake_case_aliases() {
        let parsed: RefreshResponse = serde_json::from_value(json!({
            "access_token": "A2",
            "refresh_token": "R2"
        }))
        .unwrap();

        assert_eq!(parsed.access, "A2");
        assert_eq!(parsed.refresh.as_deref(), Some("R2"));
    }

    #[test]
    fn test_refresh_request_shape() {
        let body = serde_json::to_value(RefreshRequest { refresh: "R1" }).unwrap();
        assert_eq!(body, json!({ "refresh": "R1" }));
    }

    #[test]
    fn test_login_request_debug_redacts_password() {
        let request = LoginRequest {
            username: "ada",
            password: "hunter2",
        };

        assert!(!format!("{:?}", request).contains("hunter2"));
    }

    #[test]
    fn test_auth_response_with_user_block() {
        let response: AuthResponse = serde_json::from_value(json!({
            "access": "opaque-access",
            "refresh": "opaque-refresh",
            "user": { "id": "9", "role": "staff", "displayName": "Sam" }
        }))
        .unwrap();

        let session = response.into_session().unwrap();
        let claims = session.claims.unwrap();

        assert_eq!(session.credentials.access.expose_secret(), "opaque-access");
        assert_eq!(session.credentials.refresh.expose_secret(), "opaque-refresh");
        assert_eq!(claims.role, Role::Staff);
        assert_eq!(claims.display_name, "Sam");
        assert_eq!(claims.user_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_auth_response_opaque_token_without_user_fails() {
        let response: AuthResponse = serde_json::from_value(json!({
            "access": "opaque-access",
            "refresh": "opaque-refresh"
        }))
        .unwrap();

        assert!(response.into_session().is_err());
    }
}
