//! # signalk-mqtt-export
//!
//! Rule-driven export of SignalK deltas to an MQTT broker.
//!
//! An [`ExportEngine`] subscribes to a [`DeltaBus`] according to its
//! export rules, picks the first matching rule for every value it is
//! handed, suppresses unchanged values where asked and publishes the rest
//! through an [`MqttTransport`].
//!
//! Enable features based on target platform:
//! - `tokio-runtime` (default) - rumqttc transport for Linux/desktop

pub mod bus;
pub mod engine;
pub mod error;
pub mod matcher;
#[cfg(feature = "tokio-runtime")]
pub mod mqtt;
pub mod planner;
pub mod publisher;
pub mod store;
pub mod tracker;
pub mod transport;

pub use bus::{DeltaBus, DeltaHandler, ErrorHandler, LocalDeltaBus, SubscriptionHandle};
pub use engine::{EngineState, EngineStatus, ExportCounters, ExportEngine};
pub use error::{ExportError, Result, SubscriptionError, TransportError};
pub use matcher::find_matching_rule;
#[cfg(feature = "tokio-runtime")]
pub use mqtt::{MqttClient, RumqttcConnector};
pub use planner::{plan_subscriptions, ContextGroup, SubscriptionPlan};
pub use publisher::{build_payload, build_topic, PublishOutcome, Publisher};
pub use store::RuleStore;
pub use tracker::ChangeTracker;
pub use transport::{MqttConnectOptions, MqttConnector, MqttTransport, OutboundMessage};

pub use signalk_core::{Delta, ExportConfig, ExportRule};
