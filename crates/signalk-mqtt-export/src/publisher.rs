//! Topic and payload derivation, and the hand-off to the transport.
//!
//! # Topics
//!
//! | Prefix | Template              | Context        | Path                          | Topic                                   |
//! |--------|-----------------------|----------------|-------------------------------|-----------------------------------------|
//! | `boat` | -                     | `vessels.self` | `navigation.speedOverGround`  | `boat/vessels/self/navigation/speedOverGround` |
//! | -      | `ais/{context}/{path}`| `vessels.urn:mrn:imo:mmsi:1` | `navigation.position` | `ais/vessels/urn:mrn:imo:mmsi:1/navigation/position` |
//!
//! Dots in the context, path and template are mapped to `/`; the prefix is
//! used as is.

use std::sync::Arc;

use signalk_core::{value_text, Delta, ExportRule, PayloadFormat};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{MqttTransport, OutboundMessage};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const PATH_PLACEHOLDER: &str = "{path}";

/// Payload characters shown in publish logs.
const LOG_PAYLOAD_CHARS: usize = 100;

/// Derive the topic for a value.
///
/// Each placeholder is substituted once, at its first occurrence.
pub fn build_topic(prefix: &str, rule: &ExportRule, context: &str, path: &str) -> String {
    let body = match rule.topic_template.as_deref().filter(|t| !t.is_empty()) {
        Some(template) => template
            .replacen(CONTEXT_PLACEHOLDER, context, 1)
            .replacen(PATH_PLACEHOLDER, path, 1),
        None => format!("{context}/{path}"),
    };
    let body = body.replace('.', "/");

    if prefix.is_empty() {
        body
    } else {
        format!("{prefix}/{body}")
    }
}

/// Derive the payload for a value.
pub fn build_payload(
    rule: &ExportRule,
    value: &serde_json::Value,
    delta: &Delta,
) -> Result<String, serde_json::Error> {
    match rule.payload_format {
        PayloadFormat::ValueOnly => Ok(value_text(value)),
        PayloadFormat::Full => serde_json::to_string(delta),
    }
}

/// What happened to a publish attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Handed to the transport.
    Published { topic: String },
    /// Transport not connected; dropped silently.
    Skipped,
    /// Payload or transport failure; already logged.
    Failed(String),
}

/// Publishes matched values through a transport.
pub struct Publisher {
    transport: Arc<dyn MqttTransport>,
    topic_prefix: String,
}

impl Publisher {
    pub fn new(transport: Arc<dyn MqttTransport>, topic_prefix: impl Into<String>) -> Self {
        Self {
            transport,
            topic_prefix: topic_prefix.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn transport(&self) -> &Arc<dyn MqttTransport> {
        &self.transport
    }

    /// Publish one value under a rule. Never fails the caller.
    pub fn publish(
        &self,
        rule: &ExportRule,
        context: &str,
        path: &str,
        value: &serde_json::Value,
        delta: &Delta,
    ) -> PublishOutcome {
        if !self.transport.is_connected() {
            return PublishOutcome::Skipped;
        }

        let topic = build_topic(&self.topic_prefix, rule, context, path);
        let payload = match build_payload(rule, value, delta) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Error publishing to MQTT: {}", e);
                return PublishOutcome::Failed(e.to_string());
            }
        };
        let preview = log_preview(&payload);

        let message = OutboundMessage {
            topic: topic.clone(),
            payload,
            qos: rule.qos,
            retain: rule.retain,
        };

        match self.transport.publish(message) {
            Ok(()) => {
                debug!("Published to MQTT: {} = {}", topic, preview);
                PublishOutcome::Published { topic }
            }
            Err(TransportError::NotConnected) => PublishOutcome::Skipped,
            Err(e) => {
                warn!("MQTT publish error: {}", e);
                PublishOutcome::Failed(e.to_string())
            }
        }
    }
}

fn log_preview(payload: &str) -> String {
    let mut chars = payload.chars();
    let head: String = chars.by_ref().take(LOG_PAYLOAD_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
