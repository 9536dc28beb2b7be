//! Protocol message types.
//!
//! This module defines:
//! - Exporter → bus: `SubscribeRequest` (one per context group)
//! - Admin REST API request and response bodies
//!
//! Messages are serialized as JSON.

use serde::{Deserialize, Serialize};
use signalk_core::ExportRule;

/// Subscription request message.
///
/// # Example
/// ```json
/// {
///   "context": "vessels.self",
///   "subscribe": [{"path": "navigation*", "period": 1000}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub context: String,
    pub subscribe: Vec<Subscription>,
}

/// A single subscription specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
}

impl Subscription {
    pub fn new(path: impl Into<String>, period: u64) -> Self {
        Self {
            path: path.into(),
            period: Some(period),
        }
    }
}

// ============================================================================
// Admin REST API
// ============================================================================

/// Response for `GET /api/rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesResponse {
    pub success: bool,
    pub rules: Vec<ExportRule>,
    pub active_subscriptions: usize,
    pub mqtt_connected: bool,
}

/// Body of `POST /api/rules`.
///
/// `rules` stays untyped so a non-array payload can be reported as a
/// configuration error instead of a generic decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRulesRequest {
    #[serde(default)]
    pub rules: serde_json::Value,
}

/// Response for `GET /api/mqtt-status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttStatusResponse {
    pub success: bool,
    pub connected: bool,
    pub broker: String,
    pub client_id: String,
}

/// Generic success/failure body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Topic used by a test publish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            topic: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            topic: None,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// Payload published by the manual connection test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestMessage {
    pub test: bool,
    pub timestamp: String,
    pub message: String,
}

impl TestMessage {
    pub fn new() -> Self {
        Self {
            test: true,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            message: "Test message from SignalK MQTT Export Manager".to_string(),
        }
    }
}

impl Default for TestMessage {
    fn default() -> Self {
        Self::new()
    }
}
