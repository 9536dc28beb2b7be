//! # signalk-core
//!
//! Core SignalK types for the MQTT export manager.
//!
//! This crate provides:
//! - Data model types (Delta, Update, PathValue, Source)
//! - Path selectors used by export rules
//! - Export rule definitions, parsing and the default rule set
//! - Plugin configuration and its storage contract
//!
//! This crate is intentionally runtime-agnostic and contains no async code.

pub mod config;
pub mod model;
pub mod path;
pub mod rules;

pub use config::{
    load_export_config, save_export_config, ConfigError, ConfigStorage, ExportConfig,
    FileConfigStorage, MemoryConfigStorage, PLUGIN_ID,
};
pub use model::*;
pub use path::PathSelector;
pub use rules::{default_export_rules, parse_rules, ExportRule, PayloadFormat, RuleError};
