//! Response classification and the replay-once path for auth failures.

use std::sync::Arc;

use reqwest::StatusCode;
use secrecy::SecretString;
use shopdesk_types::ApiErrorBody;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::request::ApiRequest;
use crate::transport::{ApiResponse, Transport, TransportError};

/// How a received response is treated.
#[derive(Debug)]
pub enum Classified {
    Success(ApiResponse),
    /// 401: the access credential was rejected.
    AuthFailure,
    Failure(ClientError),
}

/// Map a response to success, auth failure or a typed error.
pub fn classify(response: ApiResponse) -> Classified {
    let status = response.status();

    if status.is_success() {
        return Classified::Success(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Classified::AuthFailure;
    }

    let body = ApiErrorBody::from_bytes(response.body());
    let fallback = status.canonical_reason().unwrap_or("Request failed");

    let error = match status {
        StatusCode::FORBIDDEN => ClientError::Forbidden {
            message: body.message_or(fallback),
        },
        StatusCode::NOT_FOUND => ClientError::NotFound {
            message: body.message_or(fallback),
        },
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited {
            message: body.message_or(fallback),
        },
        s if s.is_client_error() && body.has_field_errors() => ClientError::Validation {
            status: s,
            message: body.message_or(fallback),
            fields: body.errors,
        },
        s if s.is_server_error() => ClientError::Server {
            status: s,
            message: body.message_or(fallback),
        },
        s => ClientError::Http {
            status: s,
            message: body.message_or(fallback),
        },
    };

    Classified::Failure(error)
}

/// Turns raw transport results into caller-facing results.
///
/// A 401 on a first attempt waits for the refresh coordinator and replays the
/// request exactly once with the credential it hands back. Nothing else is
/// retried and nothing else touches the credential store.
#[derive(Clone)]
pub struct ResponsePipeline {
    transport: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
}

impl ResponsePipeline {
    pub fn new(transport: Arc<dyn Transport>, coordinator: RefreshCoordinator) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    /// Handle the outcome of sending `request`, which carried `sent_with`.
    pub async fn handle(
        &self,
        request: ApiRequest,
        sent_with: Option<SecretString>,
        result: Result<ApiResponse, TransportError>,
    ) -> ClientResult<ApiResponse> {
        match classify(result?) {
            Classified::Success(response) => Ok(response),
            Classified::Failure(error) => Err(error),
            Classified::AuthFailure if request.is_retry() => {
                warn!(
                    request_id = %request.id(),
                    path = request.path(),
                    "Replayed request rejected again"
                );
                Err(ClientError::AuthExpired)
            }
            Classified::AuthFailure => self.replay(request, sent_with).await,
        }
    }

    async fn replay(
        &self,
        request: ApiRequest,
        sent_with: Option<SecretString>,
    ) -> ClientResult<ApiResponse> {
        let access = match self.coordinator.refresh(sent_with.as_ref()).await {
            RefreshOutcome::Refreshed(access) => access,
            RefreshOutcome::Expired => return Err(ClientError::AuthExpired),
        };

        let mut retry = request.into_retry();
        if !retry.set_bearer(&access) {
            return Err(ClientError::AuthExpired);
        }

        debug!(request_id = %retry.id(), path = retry.path(), "Replaying request");

        match classify(self.transport.send(&retry).await?) {
            Classified::Success(response) => Ok(response),
            Classified::Failure(error) => Err(error),
            Classified::AuthFailure => {
                warn!(
                    request_id = %retry.id(),
                    path = retry.path(),
                    "Replayed request rejected again"
                );
                Err(ClientError::AuthExpired)
            }
        }
    }
}
