use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid request path: {0}")]
    InvalidPath(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Not authorized (HTTP {status})")]
    Unauthorized { status: u16, body: Value },

    #[error("Request rejected (HTTP {status}): {errors}")]
    Validation { status: u16, errors: Value },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. }
            | ApiError::Validation { status, .. }
            | ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Structured field errors from a rejected mutation, if any.
    pub fn field_errors(&self) -> Option<&Value> {
        match self {
            ApiError::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Short human-readable message suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { errors, .. } => first_message(errors)
                .unwrap_or_else(|| "The request was rejected".to_string()),
            ApiError::Transport(_) => "Network error, please retry".to_string(),
            ApiError::Unauthorized { body, .. } => body
                .get("detail")
                .and_then(first_message)
                .unwrap_or_else(|| "Your session has expired, please sign in".to_string()),
            other => other.to_string(),
        }
    }
}

/// DRF-style bodies: `{"detail": "..."}`, `{"field": ["msg"]}` or `["msg"]`.
fn first_message(errors: &Value) -> Option<String> {
    match errors {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_message),
        Value::Object(map) => {
            if let Some(detail) = map.get("detail").and_then(first_message) {
                return Some(detail);
            }
            map.iter().find_map(|(field, value)| {
                first_message(value).map(|msg| {
                    if field == "non_field_errors" {
                        msg
                    } else {
                        format!("{}: {}", field, msg)
                    }
                })
            })
        }
        _ => None,
    }
}
