use secrecy::{ExposeSecret, SecretString};

use crate::IdentityClaims;

/// Access + refresh credentials for one authenticated session.
///
/// Both halves are held as `SecretString`; `Debug` output is redacted and the
/// raw values are only reachable through `expose_secret()`.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    /// Short-lived bearer credential sent with every request.
    pub access: SecretString,

    /// Longer-lived credential used only to mint a new access credential.
    pub refresh: SecretString,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: SecretString::from(access.into()),
            refresh: SecretString::from(refresh.into()),
        }
    }

    /// Returns true if the pair carries a non-empty refresh credential.
    pub fn has_refresh(&self) -> bool {
        !self.refresh.expose_secret().is_empty()
    }

    /// Returns true if `access` is the current access credential.
    pub fn is_access(&self, access: &SecretString) -> bool {
        self.access.expose_secret() == access.expose_secret()
    }

    /// Replaces the access credential and, when the server rotated it, the
    /// refresh credential. A missing or empty rotation keeps the stored one.
    pub fn rotate(&self, access: String, refresh: Option<String>) -> Self {
        let refresh = match refresh {
            Some(rotated) if !rotated.is_empty() => SecretString::from(rotated),
            _ => self.refresh.clone(),
        };

        Self {
            access: SecretString::from(access),
            refresh,
        }
    }
}

/// Everything a credential store persists for one login.
///
/// Credentials and claims live in one value so that replacing or clearing a
/// session is a single assignment.
#[derive(Debug, Clone)]
pub struct Session {
    pub credentials: CredentialPair,
    pub claims: Option<IdentityClaims>,
}

impl Session {
    pub fn new(credentials: CredentialPair, claims: Option<IdentityClaims>) -> Self {
        Self {
            credentials,
            claims,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let pair = CredentialPair::new("access-secret", "refresh-secret");
        let debug = format!("{:?}", pair);

        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
    }

    #[test]
    fn test_rotate_keeps_refresh_when_absent() {
        let pair = CredentialPair::new("A1", "R1");

        let rotated = pair.rotate("A2".to_string(), None);
        assert_eq!(rotated.access.expose_secret(), "A2");
        assert_eq!(rotated.refresh.expose_secret(), "R1");

        let rotated = pair.rotate("A2".to_string(), Some(String::new()));
        assert_eq!(rotated.refresh.expose_secret(), "R1");
    }

    #[test]
    fn test_rotate_stores_rotated_refresh() {
        let pair = CredentialPair::new("A1", "R1");

        let rotated = pair.rotate("A2".to_string(), Some("R2".to_string()));
        assert_eq!(rotated.access.expose_secret(), "A2");
        assert_eq!(rotated.refresh.expose_secret(), "R2");
    }

    #[test]
    fn test_has_refresh() {
        assert!(CredentialPair::new("A1", "R1").has_refresh());
        assert!(!CredentialPair::new("A1", "").has_refresh());
    }

    #[test]
    fn test_is_access() {
        let pair = CredentialPair::new("A1", "R1");
        assert!(pair.is_access(&SecretString::from("A1".to_string())));
        assert!(!pair.is_access(&SecretString::from("A2".to_string())));
    }
}
