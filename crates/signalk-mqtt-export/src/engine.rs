//! The export engine.
//!
//! Ties the pieces together:
//!
//! ```text
//! bus delta ──► RuleMatcher ──► ChangeTracker ──► Publisher ──► MQTT
//!                   ▲
//! rule change ──► RuleStore ──► SubscriptionPlanner ──► bus subscriptions
//! ```
//!
//! All mutable state sits behind one mutex. Delta handling, rule updates
//! and stop all take it, so a delta is never matched against a half
//! replaced rule list and nothing is published once `stop` returns.
//!
//! Bus handlers capture the plan generation they were created for; a
//! delivery from a subscription that has since been replaced is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use signalk_core::{parse_rules, Delta, ExportConfig, ExportRule};
use signalk_protocol::TestMessage;
use tracing::{debug, error, info, warn};

use crate::bus::{DeltaBus, DeltaHandler, ErrorHandler, SubscriptionHandle};
use crate::error::{Result, SubscriptionError, TransportError};
use crate::matcher::find_matching_rule;
use crate::planner::plan_subscriptions;
use crate::publisher::{PublishOutcome, Publisher};
use crate::store::RuleStore;
use crate::tracker::ChangeTracker;
use crate::transport::{MqttConnectOptions, MqttConnector, OutboundMessage};

/// Topic suffix used by [`ExportEngine::test_publish`].
const TEST_TOPIC_SUFFIX: &str = "signalk-mqtt-export-test";

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

/// Publish counters since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCounters {
    pub published: u64,
    /// Suppressed by `sendOnChange`.
    pub unchanged: u64,
    /// Dropped because the transport was not connected.
    pub skipped: u64,
    pub failed: u64,
}

/// Snapshot of the engine for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: EngineState,
    pub mqtt_connected: bool,
    pub active_subscriptions: usize,
    pub enabled_rules: usize,
    pub broker: String,
    pub client_id: String,
    pub counters: ExportCounters,
}

struct EngineInner {
    state: EngineState,
    config: ExportConfig,
    rules: RuleStore,
    tracker: ChangeTracker,
    publisher: Option<Publisher>,
    subscriptions: Vec<SubscriptionHandle>,
    /// Bumped whenever subscriptions are torn down.
    generation: u64,
    counters: ExportCounters,
}

impl EngineInner {
    fn is_connected(&self) -> bool {
        self.publisher.as_ref().is_some_and(Publisher::is_connected)
    }

    /// Match, de-duplicate and publish every value of a delta.
    fn handle_delta(&mut self, delta: &Delta, rules: &[ExportRule]) {
        let Some(publisher) = self.publisher.as_ref() else {
            return;
        };
        if !publisher.is_connected() {
            return;
        }

        let context = delta.context_or_self();
        for update in &delta.updates {
            let source = update.source_label();

            for value in &update.values {
                let Some(rule) =
                    find_matching_rule(rules, value, delta.context.as_deref(), source)
                else {
                    continue;
                };

                if !self.tracker.should_publish(
                    context,
                    &value.path,
                    &value.value,
                    rule.send_on_change,
                ) {
                    self.counters.unchanged += 1;
                    continue;
                }

                match publisher.publish(rule, context, &value.path, &value.value, delta) {
                    PublishOutcome::Published { .. } => self.counters.published += 1,
                    PublishOutcome::Skipped => self.counters.skipped += 1,
                    PublishOutcome::Failed(_) => self.counters.failed += 1,
                }
            }
        }
    }
}

fn lock(shared: &Mutex<EngineInner>) -> MutexGuard<'_, EngineInner> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes SignalK deltas to MQTT according to the export rules.
pub struct ExportEngine {
    bus: Arc<dyn DeltaBus>,
    connector: Arc<dyn MqttConnector>,
    shared: Arc<Mutex<EngineInner>>,
}

impl ExportEngine {
    /// Create a stopped engine.
    ///
    /// `bus.subscribe` must not deliver deltas before it returns.
    pub fn new(bus: Arc<dyn DeltaBus>, connector: Arc<dyn MqttConnector>) -> Self {
        let config = ExportConfig::default();
        let rules = RuleStore::new(config.export_rules.clone());
        Self {
            bus,
            connector,
            shared: Arc::new(Mutex::new(EngineInner {
                state: EngineState::Stopped,
                config,
                rules,
                tracker: ChangeTracker::new(),
                publisher: None,
                subscriptions: Vec::new(),
                generation: 0,
                counters: ExportCounters::default(),
            })),
        }
    }

    /// Start exporting with the given options.
    ///
    /// The broker connection comes up in the background; failing to even
    /// create it is logged and the engine runs without publishing.
    /// Starting a running engine restarts it.
    pub fn start(&self, config: ExportConfig) {
        info!("Starting MQTT export manager");
        let mut inner = lock(&self.shared);
        if inner.state != EngineState::Stopped {
            self.shutdown(&mut inner);
        }

        inner.rules.replace_all(config.export_rules.clone());
        inner.config = config;

        if !inner.config.enabled {
            info!("MQTT export disabled");
            return;
        }

        inner.state = EngineState::Starting;

        let options = MqttConnectOptions::from_config(&inner.config);
        match self.connector.connect(&options) {
            Ok(transport) => {
                let prefix = inner.config.topic_prefix.clone();
                inner.publisher = Some(Publisher::new(transport, prefix));
                info!("Connecting to MQTT broker: {}", options.broker_url);
            }
            Err(e) => error!("Failed to initialize MQTT client: {}", e),
        }

        self.rebuild_subscriptions(&mut inner);
        inner.state = EngineState::Running;
        info!("MQTT export manager started");
    }

    /// Stop exporting. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut inner = lock(&self.shared);
        if inner.state == EngineState::Stopped && inner.publisher.is_none() {
            return;
        }
        info!("Stopping MQTT export manager");
        self.shutdown(&mut inner);
        info!("MQTT export manager stopped");
    }

    fn shutdown(&self, inner: &mut EngineInner) {
        if let Some(publisher) = inner.publisher.take() {
            publisher.transport().disconnect();
        }
        release_subscriptions(inner);
        inner.tracker.reset();
        inner.state = EngineState::Stopped;
    }

    /// Replace the rule list.
    ///
    /// A running engine re-plans its subscriptions and forgets every
    /// change-tracking slot. Publishes already handed to the transport are
    /// not affected.
    pub fn update_rules(&self, rules: Vec<ExportRule>) {
        let mut inner = lock(&self.shared);
        inner.rules.replace_all(rules.clone());
        inner.config.export_rules = rules;

        if inner.state == EngineState::Running {
            self.rebuild_subscriptions(&mut inner);
        } else {
            inner.tracker.reset();
        }
    }

    /// Parse and install a rule list received over the admin API.
    ///
    /// A malformed list leaves the current rules in place.
    pub fn update_rules_json(&self, rules: &serde_json::Value) -> Result<()> {
        let rules = parse_rules(rules)?;
        self.update_rules(rules);
        Ok(())
    }

    fn rebuild_subscriptions(&self, inner: &mut EngineInner) {
        release_subscriptions(inner);
        inner.tracker.reset();

        let plan = plan_subscriptions(&inner.rules.all());
        for group in plan.groups() {
            info!(
                "Creating subscription for context {} with {} paths",
                group.context,
                group.rules.len()
            );

            let on_delta = self.delta_handler(inner.generation, group.rules.clone());
            let on_error = subscription_error_handler(group.context.clone());
            match self.bus.subscribe(group.request.clone(), on_error, on_delta) {
                Ok(handle) => inner.subscriptions.push(handle),
                Err(e) => warn!("Subscription error for {}: {}", group.context, e),
            }
        }

        info!(
            "Active subscriptions: {} contexts, {} total rules",
            inner.subscriptions.len(),
            plan.rule_count()
        );
    }

    fn delta_handler(&self, generation: u64, rules: Arc<Vec<ExportRule>>) -> DeltaHandler {
        let shared: Weak<Mutex<EngineInner>> = Arc::downgrade(&self.shared);
        Arc::new(move |delta: &Delta| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut inner = lock(&shared);
            if inner.state == EngineState::Running && inner.generation == generation {
                inner.handle_delta(delta, &rules);
            }
        })
    }

    /// Publish a test message to `<prefix or "test">/signalk-mqtt-export-test`.
    ///
    /// Returns the topic used.
    pub fn test_publish(&self) -> Result<String> {
        let inner = lock(&self.shared);
        let publisher = inner
            .publisher
            .as_ref()
            .filter(|p| p.is_connected())
            .ok_or(TransportError::NotConnected)?;

        let prefix = match inner.config.topic_prefix.as_str() {
            "" => "test",
            prefix => prefix,
        };
        let topic = format!("{prefix}/{TEST_TOPIC_SUFFIX}");
        let payload = serde_json::to_string(&TestMessage::new())
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        publisher.transport().publish(OutboundMessage {
            topic: topic.clone(),
            payload,
            qos: 0,
            retain: false,
        })?;
        debug!("Published MQTT test message to {}", topic);
        Ok(topic)
    }

    pub fn state(&self) -> EngineState {
        lock(&self.shared).state
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).is_connected()
    }

    /// Current rules, including disabled ones.
    pub fn rules(&self) -> Arc<Vec<ExportRule>> {
        lock(&self.shared).rules.all()
    }

    /// Current options, with the live rule list.
    pub fn config(&self) -> ExportConfig {
        lock(&self.shared).config.clone()
    }

    pub fn status(&self) -> EngineStatus {
        let inner = lock(&self.shared);
        EngineStatus {
            state: inner.state,
            mqtt_connected: inner.is_connected(),
            active_subscriptions: inner.subscriptions.len(),
            enabled_rules: inner.rules.enabled_rules().len(),
            broker: inner.config.mqtt_broker.clone(),
            client_id: inner.config.mqtt_client_id.clone(),
            counters: inner.counters,
        }
    }

    /// Number of change-tracking slots in use.
    pub fn tracked_values(&self) -> usize {
        lock(&self.shared).tracker.len()
    }
}

impl Drop for ExportEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn release_subscriptions(inner: &mut EngineInner) {
    for handle in inner.subscriptions.drain(..) {
        debug!("Unsubscribing context {}", handle.context());
        handle.unsubscribe();
    }
    inner.generation += 1;
}

fn subscription_error_handler(context: String) -> ErrorHandler {
    Arc::new(move |e: &SubscriptionError| {
        warn!("Subscription error for {}: {}", context, e);
    })
}
