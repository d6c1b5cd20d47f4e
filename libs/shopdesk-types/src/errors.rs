use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Non-JSON error bodies are kept as text, capped at this many bytes.
const TEXT_BODY_CAP: usize = 1024;

/// Error body returned by the API on non-2xx responses.
///
/// Parsed leniently: every field is optional and a body that is not JSON is
/// kept as the message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code (e.g. "INVALID_INPUT")
    #[serde(default)]
    pub code: Option<String>,

    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,

    /// Per-field validation messages
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ApiErrorBody {
    pub fn from_bytes(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::default();
        }

        if let Ok(parsed) = serde_json::from_slice::<Self>(body) {
            return parsed;
        }

        let text = String::from_utf8_lossy(&body[..body.len().min(TEXT_BODY_CAP)])
            .trim()
            .to_string();

        Self {
            message: (!text.is_empty()).then_some(text),
            ..Default::default()
        }
    }

    pub fn has_field_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The message, or `fallback` when the body carried none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Errors reading identity claims out of an access token.
#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    #[error("JWT library error: {0}")]
    Library(#[from] jsonwebtoken::errors::Error),
}
