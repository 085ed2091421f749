//! Bridge status reporting.

use serde::{Deserialize, Serialize};
use zenoh::Session;

use crate::error::Result;
use crate::serialization::{Format, encode};

/// Bridge status information, published at `<prefix>/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Bridge name (e.g., "fieldbus").
    pub bridge: String,
    /// Bridge version.
    pub version: String,
    /// Current status ("running", "offline", "error").
    pub status: String,
    /// Additional metadata (device, attribute count, ...).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    fn with_state(bridge: impl Into<String>, version: impl Into<String>, status: &str) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: status.to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Status in "running" state.
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_state(bridge, version, "running")
    }

    /// Status in "offline" state.
    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_state(bridge, version, "offline")
    }

    /// Status in "error" state, carrying the error message.
    pub fn error(
        bridge: impl Into<String>,
        version: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::with_state(bridge, version, "error")
            .with_metadata(serde_json::json!({ "error": error.into() }))
    }

    /// Replace the metadata.
    ///
    /// Object metadata is merged into an existing object so that an error
    /// message survives additional fields.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        match (&mut self.metadata, metadata) {
            (serde_json::Value::Object(existing), serde_json::Value::Object(extra)) => {
                existing.extend(extra);
            }
            (slot, metadata) => *slot = metadata,
        }
        self
    }

    /// Publish this status on `key`.
    pub async fn publish(&self, session: &Session, key: &str, format: Format) -> Result<()> {
        let payload = encode(self, format)?;
        session.put(key, payload).await?;
        tracing::debug!(key = %key, status = %self.status, "Published bridge status");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_running() {
        let status = BridgeStatus::running("fieldbus", "0.1.0");
        assert_eq!(status.bridge, "fieldbus");
        assert_eq!(status.status, "running");
    }

    #[test]
    fn test_error_keeps_message_with_metadata() {
        let status = BridgeStatus::error("fieldbus", "0.1.0", "duplicate attribute 'temp'")
            .with_metadata(serde_json::json!({ "attributes": 3 }));

        assert_eq!(status.status, "error");
        assert_eq!(status.metadata["error"], "duplicate attribute 'temp'");
        assert_eq!(status.metadata["attributes"], 3);
    }

    #[test]
    fn test_status_serialization() {
        let status = BridgeStatus::running("fieldbus", "1.0.0")
            .with_metadata(serde_json::json!({ "device": "drive01" }));

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"bridge\":\"fieldbus\""));
        assert!(json.contains("\"status\":\"running\""));
        assert!(json.contains("\"device\":\"drive01\""));
    }
}
