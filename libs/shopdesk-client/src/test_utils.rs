//! Test doubles: a scripted in-memory API and a recording navigator.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::request::ApiRequest;
use crate::session::Navigator;
use crate::transport::{ApiResponse, Transport, TransportError};

/// What the mock refresh endpoint answers.
#[derive(Clone)]
pub enum RefreshReply {
    Issue {
        access: String,
        refresh: Option<String>,
    },
    Status(StatusCode),
    Body(Value),
    NetworkError,
}

impl RefreshReply {
    pub fn issue(access: &str, refresh: Option<&str>) -> Self {
        Self::Issue {
            access: access.to_string(),
            refresh: refresh.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub retry: bool,
    pub body: Option<Value>,
}

/// In-memory API implementing `Transport`.
///
/// Authenticated paths answer 200 only for the currently valid access
/// credential and 401 otherwise. A handful of fixed paths return canned
/// errors. Every call is recorded.
pub struct MockApi {
    paths: ClientConfig,
    valid_access: Mutex<String>,
    refresh_reply: Mutex<RefreshReply>,
    refresh_delay: Mutex<Duration>,
    auth_reply: Mutex<(StatusCode, Value)>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockApi {
    pub fn new(valid_access: &str) -> Self {
        Self {
            paths: ClientConfig::new("http://api.test".parse().unwrap()),
            valid_access: Mutex::new(valid_access.to_string()),
            refresh_reply: Mutex::new(RefreshReply::Status(StatusCode::UNAUTHORIZED)),
            refresh_delay: Mutex::new(Duration::ZERO),
            auth_reply: Mutex::new((
                StatusCode::OK,
                json!({
                    "access": valid_access,
                    "refresh": "R1",
                    "user": { "id": "1", "role": "admin", "displayName": "Ada" }
                }),
            )),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_valid_access(&self, access: &str) {
        *self.valid_access.lock().unwrap() = access.to_string();
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Reply used by the login and OTP verification endpoints.
    pub fn set_auth_reply(&self, status: StatusCode, body: Value) {
        *self.auth_reply.lock().unwrap() = (status, body);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls_to(&self.paths.refresh_path).len()
    }

    pub fn last_refresh_body(&self) -> Option<Value> {
        self.calls_to(&self.paths.refresh_path)
            .pop()
            .and_then(|c| c.body)
    }

    fn reply(status: StatusCode, body: Value) -> ApiResponse {
        let body = if body.is_null() {
            Vec::new()
        } else {
            serde_json::to_vec(&body).unwrap()
        };
        ApiResponse::new(status, HeaderMap::new(), body)
    }

    fn refresh(&self) -> Result<ApiResponse, TransportError> {
        let reply = self.refresh_reply.lock().unwrap().clone();
        match reply {
            RefreshReply::Issue { access, refresh } => {
                self.set_valid_access(&access);
                let mut body = json!({ "access": access });
                if let Some(refresh) = refresh {
                    body["refresh"] = json!(refresh);
                }
                Ok(Self::reply(StatusCode::OK, body))
            }
            RefreshReply::Status(status) => {
                Ok(Self::reply(status, json!({ "message": "Invalid refresh token" })))
            }
            RefreshReply::Body(body) => Ok(Self::reply(StatusCode::OK, body)),
            RefreshReply::NetworkError => Err(TransportError::Other("connection reset".into())),
        }
    }
}

#[async_trait]
impl Transport for MockApi {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method().clone(),
            path: request.path().to_string(),
            bearer: request.bearer().map(str::to_string),
            retry: request.is_retry(),
            body: request.body().cloned(),
        });

        let path = request.path();

        if path == self.paths.refresh_path {
            let delay = *self.refresh_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            return self.refresh();
        }

        if path == self.paths.login_path || path == self.paths.otp_verify_path {
            let (status, body) = self.auth_reply.lock().unwrap().clone();
            return Ok(Self::reply(status, body));
        }

        if path == self.paths.otp_request_path || path == self.paths.logout_path {
            return Ok(Self::reply(StatusCode::NO_CONTENT, Value::Null));
        }

        let response = match path {
            "/api/always-401" => Self::reply(StatusCode::UNAUTHORIZED, Value::Null),
            "/api/boom" => Self::reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Internal error" }),
            ),
            "/api/missing" => Self::reply(StatusCode::NOT_FOUND, Value::Null),
            "/api/forbidden" => {
                Self::reply(StatusCode::FORBIDDEN, json!({ "message": "Staff only" }))
            }
            "/api/throttled" => Self::reply(
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "message": "Too many requests. Please try again later." }),
            ),
            "/api/invalid" => Self::reply(
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "code": "INVALID_INPUT",
                    "message": "Product is invalid",
                    "errors": { "price": ["must be positive"] }
                }),
            ),
            "/api/offline" => return Err(TransportError::Other("connection refused".into())),
            _ => {
                let valid = self.valid_access.lock().unwrap().clone();
                if request.bearer() == Some(valid.as_str()) {
                    Self::reply(
                        StatusCode::OK,
                        json!({ "path": path, "bearer": valid, "body": request.body() }),
                    )
                } else {
                    Self::reply(StatusCode::UNAUTHORIZED, json!({ "message": "Token expired" }))
                }
            }
        };

        Ok(response)
    }
}

/// Navigator that remembers every redirect.
#[derive(Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> usize {
        self.routes.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<String> {
        self.routes.lock().unwrap().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}
