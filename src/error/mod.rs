//! Error types for Beacon.

use thiserror::Error;

/// Primary error type for all Beacon operations.
#[derive(Error, Debug)]
pub enum BeaconError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BeaconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_not_found_display_includes_identity() {
        let err = BeaconError::UserNotFound("alice".to_string());
        let msg = err.to_string();
        assert!(msg.contains("alice"), "expected identity in message: {msg}");
    }

    #[test]
    fn serde_errors_convert_via_from() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BeaconError::from(parse_error);
        assert!(matches!(err, BeaconError::Serialization(_)));
    }
}
