// MIT License - Copyright (c) 2026 Peter Wright
// Error types

/// All errors that can occur inside the bridge library.
///
/// Most of these never escape the component that produced them: the cloud
/// session and the MQTT publisher log them and hand sentinel values to the
/// reconciler instead.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response shape: {details}")]
    InvalidResponse { details: String },

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Crypto error: {reason}")]
    Crypto { reason: String },

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl BridgeError {
    /// Whether this error is a transport-level fault worth retrying on the
    /// next tick (timeouts, refused connections, DNS).
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            BridgeError::Mqtt(_) | BridgeError::Io(_) => true,
            BridgeError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let server_err = BridgeError::Status { status: 503, url: "u".into() };
        let auth_err = BridgeError::Status { status: 401, url: "u".into() };
        assert!(server_err.is_transient());
        assert!(!auth_err.is_transient());
        assert!(!BridgeError::NotAuthenticated.is_transient());
    }
}
