use std::path::PathBuf;
use std::time::Duration;

use env_helpers::{get_env_default, get_env_opt};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (total request/response time). A refresh exchange
/// that exceeds it is treated as a failed refresh.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable names read by [`ClientConfig::from_env_keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvKeys {
    /// Required
    pub api_url: &'static str,
    pub refresh_path: &'static str,
    pub login_path: &'static str,
    pub logout_path: &'static str,
    pub otp_request_path: &'static str,
    pub otp_verify_path: &'static str,
    pub login_route: &'static str,
    pub connect_timeout_secs: &'static str,
    pub request_timeout_secs: &'static str,
    pub credential_file: &'static str,
}

macro_rules! env_keys {
    ($prefix:literal) => {
        EnvKeys {
            api_url: concat!($prefix, "_API_URL"),
            refresh_path: concat!($prefix, "_REFRESH_PATH"),
            login_path: concat!($prefix, "_LOGIN_PATH"),
            logout_path: concat!($prefix, "_LOGOUT_PATH"),
            otp_request_path: concat!($prefix, "_OTP_REQUEST_PATH"),
            otp_verify_path: concat!($prefix, "_OTP_VERIFY_PATH"),
            login_route: concat!($prefix, "_LOGIN_ROUTE"),
            connect_timeout_secs: concat!($prefix, "_CONNECT_TIMEOUT_SECS"),
            request_timeout_secs: concat!($prefix, "_REQUEST_TIMEOUT_SECS"),
            credential_file: concat!($prefix, "_CREDENTIAL_FILE"),
        }
    };
}

/// Admin console client (`SHOPDESK_*`).
pub const ADMIN_ENV: EnvKeys = env_keys!("SHOPDESK");

/// Owner portal client (`SHOPDESK_OWNER_*`).
pub const OWNER_ENV: EnvKeys = env_keys!("SHOPDESK_OWNER");

/// Configuration for one API client.
///
/// The admin console and the owner portal each build their own config (and
/// therefore their own client, credential store and refresh coordinator).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API origin. Only scheme, host and port are used: request paths are
    /// absolute and replace any path on this URL.
    pub base_url: Url,
    /// Refresh exchange endpoint
    pub refresh_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub otp_request_path: String,
    pub otp_verify_path: String,
    /// Public entry route the user is sent to when the session ends
    pub login_route: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Where the session is persisted; in-memory only when unset
    pub credential_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            refresh_path: "/api/auth/refresh".to_string(),
            login_path: "/api/auth/login".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            otp_request_path: "/api/auth/otp/request".to_string(),
            otp_verify_path: "/api/auth/otp/verify".to_string(),
            login_route: "/login".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            credential_file: None,
        }
    }

    /// Reads the admin console configuration (`SHOPDESK_*`).
    pub fn from_env() -> ClientResult<Self> {
        Self::from_env_keys(&ADMIN_ENV)
    }

    /// Reads `keys.api_url` (required) and the optional overrides named by
    /// the other keys. An API URL carrying a path is rejected.
    pub fn from_env_keys(keys: &EnvKeys) -> ClientResult<Self> {
        let api_url = get_env_opt(keys.api_url)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::Config(format!("{} is not set", keys.api_url)))?;
        let base_url: Url = api_url
            .parse()
            .map_err(|e| ClientError::Config(format!("{} is invalid: {e}", keys.api_url)))?;
        if base_url.path() != "/" {
            return Err(ClientError::Config(format!(
                "{} must be an origin without a path, got `{}`",
                keys.api_url,
                base_url.path()
            )));
        }

        let defaults = Self::new(base_url);

        let refresh_path: String = get_env_default(keys.refresh_path, defaults.refresh_path);
        let login_path: String = get_env_default(keys.login_path, defaults.login_path);
        let logout_path: String = get_env_default(keys.logout_path, defaults.logout_path);
        let otp_request_path: String =
            get_env_default(keys.otp_request_path, defaults.otp_request_path);
        let otp_verify_path: String =
            get_env_default(keys.otp_verify_path, defaults.otp_verify_path);
        let login_route: String = get_env_default(keys.login_route, defaults.login_route);
        let connect_timeout_secs: u64 = get_env_default(
            keys.connect_timeout_secs,
            DEFAULT_CONNECT_TIMEOUT.as_secs(),
        );
        let request_timeout_secs: u64 = get_env_default(
            keys.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        );
        let credential_file: Option<PathBuf> = get_env_opt(keys.credential_file)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            base_url: defaults.base_url,
            refresh_path,
            login_path,
            logout_path,
            otp_request_path,
            otp_verify_path,
            login_route,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            credential_file,
        })
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_credential_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_file = Some(path.into());
        self
    }
}
