//! Shopdesk API client facade.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shopdesk_types::{
    AuthResponse, ClaimsError, IdentityClaims, LoginRequest, OtpRequest, OtpVerifyRequest,
};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::error::{ClientError, ClientResult};
use crate::refresh::RefreshCoordinator;
use crate::request::{ApiRequest, RequestPipeline};
use crate::response::{Classified, ResponsePipeline, classify};
use crate::session::{Navigator, RouteTable, SessionGuard};
use crate::transport::{ApiResponse, ReqwestTransport, Transport};

/// Authenticated client for one API origin.
///
/// Every call goes through the request pipeline (bearer attached) and the
/// response pipeline (401 → single-flight refresh → one replay). The admin
/// console and the owner portal each construct their own client; they share
/// nothing.
#[derive(Clone)]
pub struct ShopdeskClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    requests: RequestPipeline,
    responses: ResponsePipeline,
}

impl ShopdeskClient {
    /// Create a client from explicit parts.
    ///
    /// # Arguments
    /// * `config` - API origin, endpoint paths and login route
    /// * `transport` - Executes requests
    /// * `store` - Holds the session
    /// * `navigator` - Receives the login route when the session ends
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            &config,
            Arc::clone(&transport),
            Arc::clone(&store),
            navigator,
        );

        Self {
            requests: RequestPipeline::new(Arc::clone(&store)),
            responses: ResponsePipeline::new(Arc::clone(&transport), coordinator.clone()),
            config: Arc::new(config),
            transport,
            store,
            coordinator,
        }
    }

    /// Create a client talking HTTP to `config.base_url`.
    ///
    /// The session is persisted to `config.credential_file` when set and kept
    /// in memory otherwise.
    pub fn from_config(config: ClientConfig, navigator: Arc<dyn Navigator>) -> ClientResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);

        let store: Arc<dyn CredentialStore> = match &config.credential_file {
            Some(path) => Arc::new(FileCredentialStore::open(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };

        Ok(Self::new(config, transport, store, navigator))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Claims of the current session, if logged in.
    pub fn claims(&self) -> Option<IdentityClaims> {
        self.store.claims()
    }

    /// Route guard over this client's session.
    pub fn guard(&self, routes: Arc<RouteTable>) -> SessionGuard {
        SessionGuard::new(Arc::clone(&self.store), routes)
    }

    /// Send an authenticated request.
    ///
    /// # Returns
    /// The 2xx response, or the classified failure. `AuthExpired` means the
    /// session has already been torn down.
    pub async fn execute(&self, mut request: ApiRequest) -> ClientResult<ApiResponse> {
        let sent_with = self.requests.authorize(&mut request);
        let result = self.transport.send(&request).await;
        self.responses.handle(request, sent_with, result).await
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    /// Send `body` as JSON and decode the JSON response.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, path).json(body)?;
        self.execute(request).await?.json()
    }

    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.execute(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Log in with username and password and store the new session.
    ///
    /// # Returns
    /// The identity claims of the new session.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<IdentityClaims> {
        let request = ApiRequest::post(self.config.login_path.as_str())
            .json(&LoginRequest { username, password })?;

        let claims = self.authenticate(request).await?;
        info!(role = %claims.role, "Logged in");
        Ok(claims)
    }

    /// Ask the backend to text a one-time code to `phone`.
    pub async fn request_otp(&self, phone: &str) -> ClientResult<()> {
        let request =
            ApiRequest::post(self.config.otp_request_path.as_str()).json(&OtpRequest { phone })?;

        let response = self.transport.send(&request).await?;
        match classify(response) {
            Classified::Success(_) => Ok(()),
            Classified::AuthFailure => Err(ClientError::InvalidCredentials),
            Classified::Failure(e) => Err(e),
        }
    }

    /// Exchange a one-time code for a session.
    pub async fn verify_otp(&self, phone: &str, code: &str) -> ClientResult<IdentityClaims> {
        let request = ApiRequest::post(self.config.otp_verify_path.as_str())
            .json(&OtpVerifyRequest { phone, code })?;

        let claims = self.authenticate(request).await?;
        info!(role = %claims.role, "Logged in with one-time code");
        Ok(claims)
    }

    /// End the session. The backend is told on a best-effort basis; the local
    /// session is cleared and the login route shown regardless.
    pub async fn logout(&self) {
        if self.store.get().is_some() {
            let mut request = ApiRequest::post(self.config.logout_path.as_str());
            self.requests.authorize(&mut request);

            match self.transport.send(&request).await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = response.status().as_u16(), "Logout call rejected");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Logout call failed"),
            }
        }

        self.coordinator.end_session();
        info!("Logged out");
    }

    /// Send a login-style request (no bearer, no refresh) and begin the
    /// session it returns.
    async fn authenticate(&self, request: ApiRequest) -> ClientResult<IdentityClaims> {
        let response = self.transport.send(&request).await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST
        ) {
            return Err(ClientError::InvalidCredentials);
        }

        let response = match classify(response) {
            Classified::Success(response) => response,
            Classified::AuthFailure => return Err(ClientError::InvalidCredentials),
            Classified::Failure(e) => return Err(e),
        };

        let session = response.json::<AuthResponse>()?.into_session()?;
        let claims = session
            .claims
            .clone()
            .ok_or_else(|| ClaimsError::MissingClaim("role".into()))?;

        self.coordinator.begin_session(session)?;
        Ok(claims)
    }
}
