//! Credential stores: where the session lives between requests and restarts.
//!
//! A store is pure state. It never talks to the network and never retries.

use std::cell::Cell;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shopdesk_types::{CredentialPair, IdentityClaims, Session};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("Failed to access credential file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize session")]
    Serialize(#[from] serde_json::Error),
}

/// Holder of the current session (credential pair + identity claims).
///
/// Implementors provide `session()` and `update()`; `update()` must apply the
/// transition under a single write lock so readers never observe claims
/// without credentials or a half-written pair.
pub trait CredentialStore: Send + Sync {
    /// Snapshot of the current session.
    fn session(&self) -> Option<Session>;

    /// Atomically replace the session with `apply(current)`.
    fn update(
        &self,
        apply: &dyn Fn(Option<&Session>) -> Option<Session>,
    ) -> Result<(), CredentialStoreError>;

    fn get(&self) -> Option<CredentialPair> {
        self.session().map(|s| s.credentials)
    }

    fn claims(&self) -> Option<IdentityClaims> {
        self.session().and_then(|s| s.claims)
    }

    /// Replace the credential pair, keeping any existing claims. An empty
    /// store stays empty; sessions start with [`CredentialStore::begin`].
    fn set(&self, pair: CredentialPair) -> Result<(), CredentialStoreError> {
        self.update(&|current| current.map(|s| Session::new(pair.clone(), s.claims.clone())))
    }

    /// Replace the credential pair only while the stored access credential is
    /// still `expected`. Returns whether the swap happened.
    fn replace_if_access(
        &self,
        expected: &SecretString,
        pair: CredentialPair,
    ) -> Result<bool, CredentialStoreError> {
        let swapped = Cell::new(false);
        self.update(&|current| match current {
            Some(s) if s.credentials.is_access(expected) => {
                swapped.set(true);
                Some(Session::new(pair.clone(), s.claims.clone()))
            }
            other => other.cloned(),
        })?;
        Ok(swapped.get())
    }

    /// Clear the session only while it is still the one carrying `expected`
    /// (`None`: only while the store is empty). Returns whether the store now
    /// holds no session because of that match.
    fn clear_if_access(
        &self,
        expected: Option<&SecretString>,
    ) -> Result<bool, CredentialStoreError> {
        let cleared = Cell::new(false);
        self.update(&|current| match (current, expected) {
            (Some(s), Some(expected)) if s.credentials.is_access(expected) => {
                cleared.set(true);
                None
            }
            (None, None) => {
                cleared.set(true);
                None
            }
            (other, _) => other.cloned(),
        })?;
        Ok(cleared.get())
    }

    /// Replace the claims. Ignored when no credentials are stored, since
    /// claims never exist without credentials.
    fn set_claims(&self, claims: IdentityClaims) -> Result<(), CredentialStoreError> {
        self.update(&|current| {
            current.map(|s| Session::new(s.credentials.clone(), Some(claims.clone())))
        })
    }

    /// Store a brand new session (login, OTP verification).
    fn begin(&self, session: Session) -> Result<(), CredentialStoreError> {
        self.update(&|_| Some(session.clone()))
    }

    /// Remove credentials and claims together.
    fn clear(&self) -> Result<(), CredentialStoreError> {
        self.update(&|_| None)
    }
}

/// In-memory store; the session ends with the process.
#[derive(Default)]
pub struct MemoryCredentialStore {
    current: RwLock<Option<Session>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn session(&self) -> Option<Session> {
        self.current.read().clone()
    }

    fn update(
        &self,
        apply: &dyn Fn(Option<&Session>) -> Option<Session>,
    ) -> Result<(), CredentialStoreError> {
        let mut current = self.current.write();
        *current = apply(current.as_ref());
        Ok(())
    }
}

/// On-disk layout of a persisted session.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    access: String,
    refresh: String,
    #[serde(default)]
    claims: Option<IdentityClaims>,
}

impl From<&Session> for StoredSession {
    fn from(session: &Session) -> Self {
        Self {
            access: session.credentials.access.expose_secret().to_string(),
            refresh: session.credentials.refresh.expose_secret().to_string(),
            claims: session.claims.clone(),
        }
    }
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        Session::new(
            CredentialPair::new(stored.access, stored.refresh),
            stored.claims,
        )
    }
}

/// Store that survives restarts by writing the session to a JSON file.
///
/// Reads are served from memory. Writes go to a temp file that is renamed
/// over the real one, so the file always holds a whole session or nothing.
/// The in-memory snapshot always reflects the latest write; a failed write
/// is reported to the caller but not rolled back.
pub struct FileCredentialStore {
    path: PathBuf,
    current: RwLock<Option<Session>>,
}

impl FileCredentialStore {
    /// Open the store, loading a previously saved session if there is one.
    /// A missing or unreadable file starts logged out.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = Self::load(&path);

        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Option<Session> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read credential file");
                return None;
            }
        };

        match serde_json::from_slice::<StoredSession>(&raw) {
            Ok(stored) => {
                debug!(path = %path.display(), "Loaded persisted session");
                Some(stored.into())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt credential file");
                None
            }
        }
    }

    fn persist(&self, session: Option<&Session>) -> Result<(), CredentialStoreError> {
        let io_err = |source| CredentialStoreError::Io {
            path: self.path.clone(),
            source,
        };

        let Some(session) = session else {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != IoErrorKind::NotFound => Err(io_err(e)),
                _ => Ok(()),
            };
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(&StoredSession::from(session))?;
        let tmp = self.path.with_extension("tmp");

        std::fs::write(&tmp, json).map_err(io_err)?;
        restrict_permissions(&tmp).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn session(&self) -> Option<Session> {
        self.current.read().clone()
    }

    fn update(
        &self,
        apply: &dyn Fn(Option<&Session>) -> Option<Session>,
    ) -> Result<(), CredentialStoreError> {
        let mut current = self.current.write();
        *current = apply(current.as_ref());
        self.persist(current.as_ref())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
