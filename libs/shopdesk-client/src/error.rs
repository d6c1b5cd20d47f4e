use std::collections::BTreeMap;
use std::fmt;

use reqwest::StatusCode;
use shopdesk_types::ClaimsError;
use thiserror::Error;

use crate::credentials::CredentialStoreError;
use crate::transport::TransportError;

/// Errors surfaced to callers of the client.
///
/// `AuthExpired` is only returned after the session has been torn down; an
/// auth failure that a refresh recovered never reaches the caller.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response was received
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// Credentials expired and could not be refreshed
    #[error("Session expired")]
    AuthExpired,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// 4xx carrying per-field validation messages
    #[error("Validation failed: {message}")]
    Validation {
        status: StatusCode,
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Too many requests: {message}")]
    RateLimited { message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    /// Any other non-2xx status
    #[error("Request failed ({status}): {message}")]
    Http { status: StatusCode, message: String },

    /// Login or OTP verification was rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid identity claims: {0}")]
    Claims(#[from] ClaimsError),

    #[error("Credential store error: {0}")]
    Store(#[from] CredentialStoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::AuthExpired => ErrorKind::AuthExpired,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::Server,
            Self::Http { .. } => ErrorKind::Http,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::Decode(_) | Self::Claims(_) => ErrorKind::Decode,
            Self::Encode(_) | Self::Store(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthExpired => Some(StatusCode::UNAUTHORIZED),
            Self::Forbidden { .. } => Some(StatusCode::FORBIDDEN),
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::Validation { status, .. }
            | Self::Server { status, .. }
            | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Coarse error classification for presentation layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    AuthExpired,
    Forbidden,
    Validation,
    NotFound,
    RateLimited,
    Server,
    Http,
    InvalidCredentials,
    Decode,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::AuthExpired => "AUTH_EXPIRED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Http => "HTTP_ERROR",
            ErrorKind::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorKind::Decode => "DECODE_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
