//! Export rules.
//!
//! An export rule selects deltas from the SignalK bus and describes how the
//! matching values are published to MQTT. Rules are plain data; matching
//! and publishing live in `signalk-mqtt-export`.
//!
//! Rules use the JSON shape the Admin UI edits:
//!
//! ```json
//! {
//!   "id": "ais-vessels",
//!   "name": "AIS Vessels",
//!   "context": "vessels.urn:*",
//!   "path": "*",
//!   "source": "",
//!   "excludeMMSI": "368396230",
//!   "enabled": true,
//!   "period": 1000,
//!   "qos": 0,
//!   "retain": false,
//!   "payloadFormat": "full",
//!   "sendOnChange": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SELF_CONTEXT;
use crate::path::path_matches;

/// Subscription period used when a rule does not set one.
pub const DEFAULT_PERIOD_MS: u64 = 1000;

/// How a published payload is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadFormat {
    /// The whole originating delta, including source and timestamp.
    #[default]
    Full,
    /// Only the value of the matched path.
    ValueOnly,
}

/// A single export rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRule {
    /// Opaque identifier.
    #[serde(default)]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Context selector (e.g. "vessels.self", "vessels.*").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Path selector: "*", "prefix*" or an exact path.
    pub path: String,

    /// Only export updates from this source label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Comma separated MMSI fragments; contexts containing any are skipped.
    #[serde(rename = "excludeMMSI", default, skip_serializing_if = "Option::is_none")]
    pub exclude_mmsi: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    /// Subscription period hint in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,

    #[serde(default)]
    pub qos: u8,

    #[serde(default)]
    pub retain: bool,

    #[serde(default)]
    pub payload_format: PayloadFormat,

    /// Topic with `{context}` and `{path}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_template: Option<String>,

    /// Suppress publishing when the value did not change.
    #[serde(default)]
    pub send_on_change: bool,
}

impl ExportRule {
    /// Create an enabled rule with default delivery settings.
    pub fn new(context: &str, path: &str) -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            context: Some(context.to_string()),
            path: path.to_string(),
            source: None,
            exclude_mmsi: None,
            enabled: true,
            period: Some(DEFAULT_PERIOD_MS),
            qos: 0,
            retain: false,
            payload_format: PayloadFormat::Full,
            topic_template: None,
            send_on_change: false,
        }
    }

    /// The rule context, falling back to `vessels.self`.
    pub fn context_or_self(&self) -> &str {
        match self.context.as_deref() {
            Some(context) if !context.is_empty() => context,
            _ => SELF_CONTEXT,
        }
    }

    /// Subscription period, treating 0 as unset.
    pub fn effective_period(&self) -> u64 {
        match self.period {
            Some(period) if period > 0 => period,
            _ => DEFAULT_PERIOD_MS,
        }
    }

    /// The source filter, if the rule has a non-blank one.
    pub fn source_filter(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Excluded MMSI fragments, trimmed.
    ///
    /// Empty fragments are kept: they are substrings of every context.
    pub fn excluded_mmsis(&self) -> Vec<&str> {
        match self.exclude_mmsi.as_deref() {
            Some(list) if !list.trim().is_empty() => list.split(',').map(str::trim).collect(),
            _ => Vec::new(),
        }
    }

    /// Check the rule path against an update path.
    pub fn matches_path(&self, path: &str) -> bool {
        path_matches(&self.path, path)
    }

    /// Builder-style helpers, mostly for tests and defaults.
    pub fn with_id(mut self, id: &str, name: &str) -> Self {
        self.id = id.to_string();
        self.name = name.to_string();
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn with_exclude_mmsi(mut self, mmsi: &str) -> Self {
        self.exclude_mmsi = Some(mmsi.to_string());
        self
    }

    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.payload_format = format;
        self
    }

    pub fn with_topic_template(mut self, template: &str) -> Self {
        self.topic_template = Some(template.to_string());
        self
    }

    pub fn with_send_on_change(mut self, send_on_change: bool) -> Self {
        self.send_on_change = send_on_change;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Errors raised while reading a rule list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("Rules must be an array")]
    NotAnArray,

    #[error("Invalid rule at index {index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("Invalid QoS {qos} for rule at index {index} (expected 0, 1 or 2)")]
    InvalidQos { index: usize, qos: u8 },
}

/// Parse a rule list received from a client or read from storage.
///
/// The whole list is rejected if any entry is malformed.
pub fn parse_rules(value: &serde_json::Value) -> Result<Vec<ExportRule>, RuleError> {
    let entries = value.as_array().ok_or(RuleError::NotAnArray)?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let rule: ExportRule =
                serde_json::from_value(entry.clone()).map_err(|e| RuleError::InvalidRule {
                    index,
                    reason: e.to_string(),
                })?;
            validate_rule(index, &rule)?;
            Ok(rule)
        })
        .collect()
}

fn validate_rule(index: usize, rule: &ExportRule) -> Result<(), RuleError> {
    if rule.path.is_empty() {
        return Err(RuleError::InvalidRule {
            index,
            reason: "path must not be empty".to_string(),
        });
    }
    if rule.qos > 2 {
        return Err(RuleError::InvalidQos {
            index,
            qos: rule.qos,
        });
    }
    Ok(())
}

/// Own-vessel MMSI excluded by the default AIS rules.
const DEFAULT_OWN_MMSI: &str = "368396230";

/// Rules installed when no configuration exists.
pub fn default_export_rules() -> Vec<ExportRule> {
    let self_rule = |id: &str, name: &str| {
        ExportRule::new(SELF_CONTEXT, "*")
            .with_id(id, name)
            .with_send_on_change(true)
    };

    vec![
        self_rule("all-navigation", "All Navigation Data").with_source(""),
        self_rule("derived-data", "Derived Data").with_source("derived-data"),
        self_rule("pypilot", "PyPilot Data").with_source("pypilot"),
        self_rule("anchoralarm", "Anchor Alarm").with_source("anchoralarm"),
        ExportRule::new("vessels.*", "*")
            .with_id("all-vessels", "All Vessels (AIS)")
            .with_source("")
            .with_exclude_mmsi(DEFAULT_OWN_MMSI)
            .with_send_on_change(true),
        ExportRule::new("vessels.urn:*", "*")
            .with_id("ais-vessels", "AIS Vessels")
            .with_source("")
            .with_exclude_mmsi(DEFAULT_OWN_MMSI)
            .with_send_on_change(true),
    ]
}
