use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    /// Persistent storage unavailable or a write failed. Never retried.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Offline, not queueable, nothing cached.
    #[error("No network connection and no offline data available")]
    Offline,

    /// The mutation was accepted into the sync queue but the caller supplied
    /// no optimistic value to hand back.
    #[error("Request queued for sync as '{item_id}'")]
    PendingSync { item_id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type OfflineResult<T> = Result<T, OfflineError>;

impl OfflineError {
    /// Network-class failures: the request may succeed on a later attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OfflineError::Network(_) | OfflineError::Timeout(_) | OfflineError::Http { .. }
        )
    }

    pub fn is_store_error(&self) -> bool {
        matches!(self, OfflineError::Store(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OfflineError::PendingSync { .. })
    }
}

impl From<rusqlite::Error> for OfflineError {
    fn from(err: rusqlite::Error) -> Self {
        OfflineError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for OfflineError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            OfflineError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            OfflineError::Network(err.to_string())
        }
    }
}

/// Extract a human readable message from an API error body.
///
/// The backend reports failures as `{"detail": "..."}`; validation errors carry
/// a list of objects with a `msg` field instead. Anything else is returned as is.
pub fn api_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    match parsed.as_ref().and_then(|v| v.get("detail")) {
        Some(serde_json::Value::String(detail)) => detail.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; "),
        _ if body.trim().is_empty() => "Unknown error".to_string(),
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = OfflineError::Store("disk full".to_string());
        assert_eq!(err.to_string(), "Store error: disk full");

        let err = OfflineError::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = OfflineError::Http {
            status: 404,
            message: "Checklist not found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: Checklist not found");

        let err = OfflineError::Offline;
        assert_eq!(
            err.to_string(),
            "No network connection and no offline data available"
        );

        let err = OfflineError::PendingSync {
            item_id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Request queued for sync as 'abc'");
    }

    #[test]
    fn test_classification() {
        assert!(OfflineError::Network("x".into()).is_recoverable());
        assert!(OfflineError::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(OfflineError::Http {
            status: 500,
            message: String::new()
        }
        .is_recoverable());
        assert!(!OfflineError::Store("x".into()).is_recoverable());
        assert!(!OfflineError::Offline.is_recoverable());

        assert!(OfflineError::Store("x".into()).is_store_error());
        assert!(OfflineError::PendingSync {
            item_id: "1".into()
        }
        .is_pending());
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"detail": "Not enough permissions"}"#),
            "Not enough permissions"
        );
        assert_eq!(
            api_error_message(
                r#"{"detail": [{"msg": "field required"}, {"msg": "value is not a valid integer"}]}"#
            ),
            "field required; value is not a valid integer"
        );
        assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(api_error_message(""), "Unknown error");
    }

    #[test]
    fn test_sqlite_error_is_store_error() {
        let err: OfflineError = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_store_error());
    }
}
