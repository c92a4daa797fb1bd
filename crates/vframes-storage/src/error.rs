//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    Config(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage request timed out: {0}")]
    Timeout(String),

    #[error("Storage request throttled ({code}): {message}")]
    Throttled { code: String, message: String },

    #[error("Storage transport failure: {0}")]
    Transport(String),

    #[error("Storage service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service codes returned for a missing object.
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NotFound"];

/// Service codes that signal the provider is overloaded or briefly unavailable.
const THROTTLE_CODES: &[&str] = &[
    "SlowDown",
    "RequestTimeout",
    "ServiceUnavailable",
    "InternalError",
];

impl StorageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Map a service error code to its storage error kind.
    pub fn from_service_code(code: Option<&str>, message: Option<&str>, key: &str) -> Self {
        let code = code.unwrap_or("Unknown");
        let message = message.unwrap_or_default().to_string();

        if NOT_FOUND_CODES.contains(&code) {
            Self::not_found(key)
        } else if code.starts_with("Throttl") || THROTTLE_CODES.contains(&code) {
            Self::Throttled {
                code: code.to_string(),
                message,
            }
        } else {
            Self::Service {
                code: code.to_string(),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_codes() {
        for code in ["NoSuchKey", "NotFound"] {
            let err = StorageError::from_service_code(Some(code), None, "entrada/a.mp4");
            assert!(matches!(err, StorageError::NotFound(ref k) if k == "entrada/a.mp4"));
        }
    }

    #[test]
    fn test_throttle_codes() {
        for code in [
            "SlowDown",
            "Throttling",
            "ThrottlingException",
            "RequestTimeout",
            "ServiceUnavailable",
            "InternalError",
        ] {
            let err = StorageError::from_service_code(Some(code), Some("busy"), "k");
            assert!(matches!(err, StorageError::Throttled { .. }), "{code}");
        }
    }

    #[test]
    fn test_other_codes_are_service_errors() {
        let err = StorageError::from_service_code(Some("AccessDenied"), Some("denied"), "k");
        match err {
            StorageError::Service { code, message } => {
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "denied");
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = StorageError::from_service_code(None, None, "k");
        assert!(matches!(err, StorageError::Service { ref code, .. } if code == "Unknown"));
    }
}
