//! HTTP transport behind the client.
//!
//! All reqwest clients used by Shopdesk are built through `build_http_client()`
//! so connect and request timeouts are always set. A timed-out refresh
//! exchange is a failed refresh, so the request timeout also bounds how long
//! queued callers wait.

use std::borrow::Cow;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::request::ApiRequest;

/// Correlates a request with its replay in backend logs.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// A request that produced no HTTP response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP transport error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Http(e)
        }
    }
}

/// A fully received HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserialize the body. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        let body: &[u8] = if self.body.is_empty() {
            b"null"
        } else {
            &self.body
        };
        serde_json::from_slice(body).map_err(ClientError::Decode)
    }
}

/// Executes one request description. Implementations perform no retries and
/// never look at credentials; both are the pipelines' job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Build an HTTP client with the configured timeouts.
pub fn build_http_client(config: &ClientConfig) -> Result<Client, TransportError> {
    Ok(Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()?)
}

/// `reqwest`-backed transport resolving request paths against the API origin.
#[derive(Clone)]
pub struct ReqwestTransport {
    base_url: Url,
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            base_url: config.base_url.clone(),
            client: build_http_client(config)?,
        })
    }

    pub fn with_client(base_url: Url, client: Client) -> Self {
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.base_url.join(request.path())?;

        let mut builder = self
            .client
            .request(request.method().clone(), url)
            .headers(request.headers().clone())
            .header(REQUEST_ID_HEADER, request.id().to_string());

        if !request.query_pairs().is_empty() {
            builder = builder.query(request.query_pairs());
        }

        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(
            request_id = %request.id(),
            method = %request.method(),
            path = request.path(),
            status = status.as_u16(),
            retry = request.is_retry(),
            "API call completed"
        );

        Ok(ApiResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_with_timeouts() {
        let config = ClientConfig::new("http://localhost:8080".parse().unwrap());
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_response_json() {
        let response = ApiResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            br#"{"items":[1,2]}"#.to_vec(),
        );

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["items"][1], 2);
    }

    #[test]
    fn test_response_json_empty_body() {
        let response = ApiResponse::new(StatusCode::NO_CONTENT, HeaderMap::new(), Vec::new());

        let value: Option<serde_json::Value> = response.json().unwrap();
        assert!(value.is_none());
        assert_eq!(response.text(), "");
    }

    #[test]
    fn test_response_json_mismatch() {
        let response = ApiResponse::new(StatusCode::OK, HeaderMap::new(), b"[]".to_vec());

        let result: ClientResult<std::collections::HashMap<String, u32>> = response.json();
        assert!(matches!(result, Err(ClientError::Decode(_))));
    }
}
