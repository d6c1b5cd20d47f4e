//! Session-facing read side: route guard, route table and navigation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shopdesk_types::{IdentityClaims, Role};
use tokio::sync::watch;
use tracing::info;

use crate::credentials::CredentialStore;

/// Where the application is sent when the session ends.
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str);
}

/// Navigator for headless use: records nothing, logs the redirect.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, route: &str) {
        info!(route, "Session ended, redirecting to entry route");
    }
}

/// Current application location, observable by the UI layer.
pub struct Location {
    tx: watch::Sender<String>,
}

impl Location {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { tx }
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn navigate(&self, route: impl Into<String>) {
        self.tx.send_replace(route.into());
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Navigator for Location {
    fn redirect(&self, route: &str) {
        // Skip no-op navigations so subscribers only wake on real changes.
        self.tx.send_if_modified(|current| {
            if current == route {
                false
            } else {
                *current = route.to_string();
                true
            }
        });
    }
}

const ANY_PATH: &str = "*";

/// Static role-to-route map supplied by page configuration.
///
/// Each role lists path prefixes it may visit. `"*"` allows everything.
/// Public prefixes (the login page, password reset) are open to anyone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTable {
    #[serde(default)]
    public: Vec<String>,
    #[serde(default)]
    roles: HashMap<Role, Vec<String>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(mut self, prefix: impl Into<String>) -> Self {
        self.public.push(prefix.into());
        self
    }

    pub fn allow(mut self, role: Role, prefix: impl Into<String>) -> Self {
        self.roles.entry(role).or_default().push(prefix.into());
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|prefix| path_matches(prefix, path))
    }

    pub fn role_allows(&self, role: &Role, path: &str) -> bool {
        self.roles
            .get(role)
            .is_some_and(|prefixes| prefixes.iter().any(|prefix| path_matches(prefix, path)))
    }
}

/// Segment-aware prefix match: `/orders` matches `/orders` and
/// `/orders/7` but not `/orders-archive`.
fn path_matches(prefix: &str, path: &str) -> bool {
    if prefix == ANY_PATH {
        return true;
    }

    match path.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Route-level authorization check over the credential store.
///
/// Only reads the store; the snapshot may change between two calls.
#[derive(Clone)]
pub struct SessionGuard {
    store: Arc<dyn CredentialStore>,
    routes: Arc<RouteTable>,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn CredentialStore>, routes: Arc<RouteTable>) -> Self {
        Self { store, routes }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn claims(&self) -> Option<IdentityClaims> {
        self.store.claims()
    }

    pub fn role_allows(&self, role: &Role, path: &str) -> bool {
        self.routes.role_allows(role, path)
    }

    /// Whether the current session may navigate to `path`.
    pub fn can_visit(&self, path: &str) -> bool {
        if self.routes.is_public(path) {
            return true;
        }

        // One snapshot so credentials and claims come from the same session.
        match self.store.session() {
            Some(session) => session
                .claims
                .is_some_and(|claims| self.routes.role_allows(&claims.role, path)),
            None => false,
        }
    }
}
