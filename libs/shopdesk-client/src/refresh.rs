//! Single-flight credential refresh.
//!
//! The coordinator turns any number of concurrent auth failures into exactly
//! one refresh exchange. The first trigger while idle starts a cycle; every
//! trigger (the first one included) waits on a oneshot receiver, and the cycle
//! resolves all of them with the same outcome, in arrival order.
//!
//! The exchange runs on its own task, so a caller that gives up (its future is
//! dropped) cannot leave the coordinator stuck in the refreshing state.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use shopdesk_types::{CredentialPair, IdentityClaims, RefreshRequest, RefreshResponse, Session};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, CredentialStoreError};
use crate::request::ApiRequest;
use crate::session::Navigator;
use crate::transport::{Transport, TransportError};

/// Result of a refresh cycle, delivered to every waiter.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The access credential to replay with.
    Refreshed(SecretString),
    /// The session is gone; it was torn down before this was delivered.
    Expired,
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }
}

/// Why a refresh exchange failed. Only logged; callers see `Expired`.
#[derive(Debug, Error)]
enum RefreshFailure {
    #[error("no refresh credential stored")]
    MissingRefreshCredential,

    #[error("refresh exchange failed: {0}")]
    Transport(#[from] TransportError),

    #[error("refresh exchange rejected with status {0}")]
    Rejected(StatusCode),

    #[error("refresh response was malformed: {0}")]
    Malformed(String),
}

enum Phase {
    Idle,
    Refreshing {
        cycle: u64,
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

struct CoordinatorState {
    phase: Phase,
    cycles: u64,
    /// Access credential of the session most recently torn down. Late auth
    /// failures carrying it resolve as expired without another teardown.
    torn_down: Option<SecretString>,
}

struct Inner {
    state: Mutex<CoordinatorState>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    refresh_path: String,
    login_route: String,
}

/// Owns the refresh state and every write to the credential store.
///
/// Constructed once per client and cloned cheaply; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CoordinatorState {
                    phase: Phase::Idle,
                    cycles: 0,
                    torn_down: None,
                }),
                transport,
                store,
                navigator,
                refresh_path: config.refresh_path.clone(),
                login_route: config.login_route.clone(),
            }),
        }
    }

    /// True while a refresh exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Refreshing { .. })
    }

    /// Number of refresh cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.inner.state.lock().cycles
    }

    /// Report an auth failure and wait for a usable access credential.
    ///
    /// `sent_with` is the access credential the failed request carried. If
    /// the store already holds a different one, an earlier cycle replaced it
    /// and that credential is returned without a new exchange.
    pub async fn refresh(&self, sent_with: Option<&SecretString>) -> RefreshOutcome {
        let receiver = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let (tx, rx) = oneshot::channel();

            if let Phase::Refreshing { cycle, waiters } = &mut state.phase {
                waiters.push(tx);
                debug!(cycle = *cycle, waiters = waiters.len(), "Queued behind refresh");
            } else {
                if let Some(settled) = self.inner.settled(state, sent_with) {
                    return settled;
                }

                state.cycles += 1;
                let cycle = state.cycles;
                state.phase = Phase::Refreshing {
                    cycle,
                    waiters: vec![tx],
                };

                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.run_cycle(cycle).await });
            }

            rx
        };

        // A dropped sender means the cycle task died; the session state is
        // unknown, so treat it like a failed refresh.
        receiver.await.unwrap_or(RefreshOutcome::Expired)
    }

    /// Store a freshly authenticated session.
    pub fn begin_session(&self, session: Session) -> Result<(), CredentialStoreError> {
        self.inner.state.lock().torn_down = None;
        self.inner.store.begin(session)
    }

    /// Replace the identity claims of the current session.
    pub fn update_claims(&self, claims: IdentityClaims) -> Result<(), CredentialStoreError> {
        self.inner.store.set_claims(claims)
    }

    /// Clear the session and send the user to the login route.
    pub fn end_session(&self) {
        if let Some(previous) = self.inner.store.get() {
            self.inner.state.lock().torn_down = Some(previous.access);
        }

        if let Err(e) = self.inner.store.clear() {
            error!(error = %e, "Failed to clear persisted credentials");
        }
        self.inner.navigator.redirect(&self.inner.login_route);
    }
}

impl Inner {
    /// Resolve a trigger without a new cycle when the store already answers it.
    fn settled(
        &self,
        state: &CoordinatorState,
        sent_with: Option<&SecretString>,
    ) -> Option<RefreshOutcome> {
        match (self.store.get(), sent_with) {
            (Some(current), Some(sent)) if !current.is_access(sent) => {
                debug!("Access credential already replaced, reusing it");
                Some(RefreshOutcome::Refreshed(current.access))
            }
            (Some(current), None) => Some(RefreshOutcome::Refreshed(current.access)),
            (None, Some(sent))
                if state
                    .torn_down
                    .as_ref()
                    .is_some_and(|gone| gone.expose_secret() == sent.expose_secret()) =>
            {
                debug!("Session already torn down for this credential");
                Some(RefreshOutcome::Expired)
            }
            _ => None,
        }
    }

    async fn run_cycle(&self, cycle: u64) {
        info!(cycle, "Refreshing access credential");

        let started = self.store.get();
        let started_access = started.as_ref().map(|pair| pair.access.clone());

        let (outcome, ended) = match self.exchange(started).await {
            Ok(pair) => (self.commit(cycle, started_access.as_ref(), pair), false),
            Err(reason) => {
                warn!(cycle, reason = %reason, "Credential refresh failed, ending session");
                self.end(cycle, started_access.as_ref())
            }
        };

        let waiters = {
            let mut state = self.state.lock();
            if ended && started_access.is_some() {
                state.torn_down = started_access;
            }
            match mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Refreshing { waiters, .. } => waiters,
                Phase::Idle => Vec::new(),
            }
        };

        if ended {
            self.navigator.redirect(&self.login_route);
        }

        info!(
            cycle,
            waiters = waiters.len(),
            refreshed = outcome.is_refreshed(),
            "Refresh cycle finished"
        );

        for waiter in waiters {
            // The waiter may have given up; nothing to deliver then.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Store the refreshed pair unless the session changed while the
    /// exchange was in flight. A session ended or replaced meanwhile wins.
    fn commit(
        &self,
        cycle: u64,
        started_access: Option<&SecretString>,
        pair: CredentialPair,
    ) -> RefreshOutcome {
        let Some(started_access) = started_access else {
            return self.current_outcome();
        };

        let access = pair.access.clone();
        match self.store.replace_if_access(started_access, pair) {
            Ok(true) => RefreshOutcome::Refreshed(access),
            Ok(false) => {
                info!(cycle, "Session changed during refresh, discarding result");
                self.current_outcome()
            }
            Err(e) => {
                // The in-memory snapshot is already updated.
                error!(cycle, error = %e, "Failed to persist refreshed credentials");
                self.current_outcome()
            }
        }
    }

    /// Clear the session the failed cycle started from. The flag is true
    /// when this cycle is the one that ended it.
    fn end(&self, cycle: u64, started_access: Option<&SecretString>) -> (RefreshOutcome, bool) {
        match self.store.clear_if_access(started_access) {
            Ok(true) => (RefreshOutcome::Expired, true),
            Ok(false) => {
                info!(cycle, "Session changed during refresh, leaving it in place");
                (self.current_outcome(), false)
            }
            Err(e) => {
                error!(cycle, error = %e, "Failed to clear persisted credentials");
                let outcome = self.current_outcome();
                let ended = !outcome.is_refreshed();
                (outcome, ended)
            }
        }
    }

    fn current_outcome(&self) -> RefreshOutcome {
        match self.store.get() {
            Some(current) => RefreshOutcome::Refreshed(current.access),
            None => RefreshOutcome::Expired,
        }
    }

    async fn exchange(
        &self,
        started: Option<CredentialPair>,
    ) -> Result<CredentialPair, RefreshFailure> {
        let current = started
            .filter(CredentialPair::has_refresh)
            .ok_or(RefreshFailure::MissingRefreshCredential)?;

        let body = RefreshRequest {
            refresh: current.refresh.expose_secret(),
        };
        let request = ApiRequest::post(self.refresh_path.as_str())
            .json(&body)
            .map_err(|e| RefreshFailure::Malformed(e.to_string()))?;

        let response = self.transport.send(&request).await?;

        if !response.status().is_success() {
            return Err(RefreshFailure::Rejected(response.status()));
        }

        let refreshed: RefreshResponse = response
            .json()
            .map_err(|e| RefreshFailure::Malformed(e.to_string()))?;

        if refreshed.access.is_empty() {
            return Err(RefreshFailure::Malformed("empty access credential".into()));
        }
        if HeaderValue::from_str(&format!("Bearer {}", refreshed.access)).is_err() {
            return Err(RefreshFailure::Malformed(
                "access credential is not a valid header value".into(),
            ));
        }

        Ok(current.rotate(refreshed.access, refreshed.refresh))
    }
}
