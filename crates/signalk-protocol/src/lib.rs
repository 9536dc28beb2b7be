//! # signalk-protocol
//!
//! Message types exchanged by the MQTT export manager.
//!
//! This crate defines the upstream subscription request format and the
//! JSON bodies of the admin REST API.

pub mod messages;

pub use messages::*;
