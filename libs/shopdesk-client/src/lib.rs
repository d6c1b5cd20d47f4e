//! Authenticated HTTP client for the Shopdesk admin console and owner portal.
//!
//! # Features
//!
//! - Bearer credential attached to every outbound call
//! - Single-flight credential refresh: any number of concurrent 401s cause one
//!   refresh exchange, and every affected request is replayed once
//! - Deterministic teardown (store cleared, login route shown) when the
//!   exchange fails
//! - Memory and file-backed credential stores
//! - Role-based route guard
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shopdesk_client::{ClientConfig, LogNavigator, ShopdeskClient};
//!
//! let config = ClientConfig::from_env()?;
//! let client = ShopdeskClient::from_config(config, Arc::new(LogNavigator))?;
//!
//! client.login("ada", "correct horse").await?;
//! let orders: serde_json::Value = client.get_json("/api/orders").await?;
//! ```

mod client;
mod config;
mod credentials;
mod error;
mod refresh;
mod request;
mod response;
mod session;
mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::ShopdeskClient;
pub use config::{
    ADMIN_ENV, ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, EnvKeys, OWNER_ENV,
};
pub use credentials::{
    CredentialStore, CredentialStoreError, FileCredentialStore, MemoryCredentialStore,
};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use request::{ApiRequest, RequestPipeline, extract_bearer};
pub use response::{Classified, ResponsePipeline, classify};
pub use session::{Location, LogNavigator, Navigator, RouteTable, SessionGuard};
pub use transport::{
    ApiResponse, REQUEST_ID_HEADER, ReqwestTransport, Transport, TransportError,
    build_http_client,
};

pub use shopdesk_types::{CredentialPair, IdentityClaims, Role, Session};
