//! Error types for the exporter.
//!
//! Only configuration errors ever reach the caller of a mutating
//! operation. Transport and subscription errors are reported (logged,
//! counted in status) and processing continues.

use signalk_core::{ConfigError, RuleError};
use thiserror::Error;

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors raised by the MQTT transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Invalid broker URL '{0}'")]
    InvalidBrokerUrl(String),

    #[error("Failed to connect to MQTT broker: {0}")]
    Connect(String),

    #[error("MQTT publish failed: {0}")]
    Publish(String),

    #[error("MQTT not connected")]
    NotConnected,
}

/// Errors reported by the upstream subscription manager.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriptionError {
    #[error("Subscription for context '{0}' has no paths")]
    EmptyRequest(String),

    #[error("Delta bus closed")]
    BusClosed,

    #[error("Subscription error: {0}")]
    Upstream(String),
}

/// Top-level exporter error.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] RuleError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("Storage error: {0}")]
    Storage(#[from] ConfigError),
}
