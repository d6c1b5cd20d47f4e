//! Outbound request description and the credential-attaching pipeline.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::credentials::CredentialStore;
use crate::error::{ClientError, ClientResult};

/// A transport-independent description of one API call.
///
/// The description is kept after dispatch so the call can be replayed with a
/// new credential. Replays keep the request ID.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    id: Uuid,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a JSON body. The payload is opaque to the client.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ClientResult<Self> {
        let value = serde_json::to_value(body).map_err(ClientError::Encode)?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// True for the single replay issued after a credential refresh.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// Bearer credential currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer)
    }

    /// Overwrites the Authorization header. A credential that is not a valid
    /// header value is skipped rather than failing the request, and the
    /// request then goes out with no Authorization header at all.
    pub(crate) fn set_bearer(&mut self, token: &SecretString) -> bool {
        match HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
                true
            }
            Err(_) => {
                warn!(request_id = %self.id, "Access credential is not a valid header value");
                self.headers.remove(AUTHORIZATION);
                false
            }
        }
    }

    pub(crate) fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// Extract the credential from an `Authorization: Bearer` header value.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").filter(|token| !token.is_empty())
}

/// Decorates outbound requests with the current access credential.
///
/// Never blocks and never fails a request.
#[derive(Clone)]
pub struct RequestPipeline {
    store: Arc<dyn CredentialStore>,
}

impl RequestPipeline {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Attaches `Authorization: Bearer <access>`, overwriting any value the
    /// caller set. Without a stored credential the request goes out as-is.
    ///
    /// Returns the credential that was attached, so a later auth failure can
    /// be matched against the credential the request actually carried.
    pub fn authorize(&self, request: &mut ApiRequest) -> Option<SecretString> {
        let credentials = self.store.get()?;

        if request.set_bearer(&credentials.access) {
            Some(credentials.access)
        } else {
            None
        }
    }
}
