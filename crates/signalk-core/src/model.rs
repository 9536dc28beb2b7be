//! SignalK data model types.
//!
//! These types represent the SignalK structures the exporter consumes:
//! - Delta messages carrying path/value updates for one context
//! - Source tracking so rules can filter on the originating device

use serde::{Deserialize, Serialize};

/// Context assumed when a delta or rule does not name one.
pub const SELF_CONTEXT: &str = "vessels.self";

/// A SignalK delta message containing one or more updates.
///
/// Deltas are the primary mechanism for transmitting changes in SignalK.
/// They contain a context (which vessel/object) and a list of updates.
///
/// Fields not modelled here are kept in `extra` so a delta serializes back
/// to what was received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// The context path (e.g., "vessels.urn:mrn:imo:mmsi:368396230")
    /// If None, defaults to "vessels.self"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// The list of updates in this delta
    #[serde(default)]
    pub updates: Vec<Update>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Delta {
    /// The delta context, falling back to `vessels.self`.
    pub fn context_or_self(&self) -> &str {
        self.context.as_deref().unwrap_or(SELF_CONTEXT)
    }
}

/// A single update within a delta, containing values from one source at one timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Reference to source in /sources (e.g., "nmea0183.GP")
    #[serde(rename = "$source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,

    /// Embedded source object (alternative to $source)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// ISO 8601 timestamp (UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// The path-value pairs in this update
    #[serde(default)]
    pub values: Vec<PathValue>,

    /// Metadata updates (separate from values)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Vec<PathMeta>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Update {
    /// Label of the source that produced this update.
    ///
    /// `$source` wins over the embedded source object.
    pub fn source_label(&self) -> Option<&str> {
        self.source_ref
            .as_deref()
            .or_else(|| self.source.as_ref().map(|s| s.label.as_str()))
    }
}

/// A single path-value pair within an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    /// The SignalK path (e.g., "navigation.speedOverGround")
    pub path: String,

    /// The value at this path
    pub value: serde_json::Value,
}

/// Metadata for a path, carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMeta {
    pub path: String,
    pub value: serde_json::Value,
}

/// Source information describing where data originated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Label identifying the source bus (e.g., "N2K-1", "serial-COM1")
    pub label: String,

    /// Type of source (e.g., "NMEA0183", "NMEA2000", "signalk")
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// NMEA 2000 source address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    /// NMEA 2000 device CAN name
    #[serde(rename = "canName", skip_serializing_if = "Option::is_none")]
    pub can_name: Option<String>,

    /// NMEA 2000 PGN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgn: Option<u32>,

    /// NMEA 0183 sentence type (e.g., "RMC", "GGA")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,

    /// NMEA 0183 talker ID (e.g., "GP", "II")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talker: Option<String>,

    /// AIS message type (1-27)
    #[serde(rename = "aisType", skip_serializing_if = "Option::is_none")]
    pub ais_type: Option<u8>,

    /// Anything else the provider attached (e.g. N2K `instance`).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Render a value the way it is compared and published.
///
/// Strings are emitted raw, everything else as compact JSON. Whole-number
/// floats print without a fraction (`2.0` becomes `2`), so a value reads
/// the same whether a provider produced it as an integer or a float.
pub fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => integral_floats_as_integers(other).to_string(),
    }
}

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn integral_floats_as_integers(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(integral_floats_as_integers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), integral_floats_as_integers(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
