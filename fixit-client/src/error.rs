//! Client error types

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Session expired")]
    SessionExpired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email not verified")]
    EmailNotVerified,

    #[error("Request rejected with status {status}")]
    Validation { status: u16, body: Value },

    #[error("Server error (status {status})")]
    Server { status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] fixit_session_core::Error),
}

impl ClientError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: Value) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            s if s.is_server_error() => ClientError::Server { status: s.as_u16() },
            s => ClientError::Validation {
                status: s.as_u16(),
                body,
            },
        }
    }

    /// Whether the session is gone and the user has to sign in again
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthorized | ClientError::SessionExpired | ClientError::InvalidCredentials
        )
    }

    /// Text to show the user
    ///
    /// Transport and server failures get a generic message; validation
    /// failures are surfaced verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Transport(e) => {
                tracing::debug!(error = %e, "Transport failure");
                "Unable to reach the FixIt server. Please try again.".to_string()
            }
            ClientError::Unauthorized => "You need to sign in to continue.".to_string(),
            ClientError::SessionExpired => {
                "Your session has expired. Please log in again to continue.".to_string()
            }
            ClientError::InvalidCredentials => "Invalid email or password.".to_string(),
            ClientError::EmailNotVerified => {
                "Please verify your email before logging in.".to_string()
            }
            ClientError::Validation { body, .. } => validation_message(body),
            ClientError::Server { status } => {
                tracing::error!(status, "Server error");
                "Something went wrong on the server. Please try again later.".to_string()
            }
            ClientError::InvalidResponse(msg) => {
                tracing::error!("Invalid response: {}", msg);
                "The server sent an unexpected response.".to_string()
            }
            ClientError::InvalidUrl(msg) => format!("Invalid URL: {}", msg),
            ClientError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                "Unable to encode the request.".to_string()
            }
            ClientError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "Unable to access local session storage.".to_string()
            }
        }
    }
}

/// Render a validation body the way the backend phrased it
fn validation_message(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            for key in ["detail", "error", "message"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return s.clone();
                }
            }
            map.iter()
                .map(|(field, errors)| match errors {
                    Value::Array(items) => {
                        let parts: Vec<String> = items.iter().map(value_text).collect();
                        format!("{}: {}", field, parts.join(" "))
                    }
                    other => format!("{}: {}", field, value_text(other)),
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Value::Null => "The request was rejected.".to_string(),
        other => other.to_string(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
