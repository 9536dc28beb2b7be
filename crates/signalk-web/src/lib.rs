//! # signalk-web
//!
//! Admin REST API for the SignalK MQTT export manager.
//!
//! ## Architecture
//!
//! Everything is mounted under `/plugins/signalk-mqtt-export`:
//!
//! - `/api/rules` - read and replace the export rules
//! - `/api/mqtt-status` - broker connection state
//! - `/api/test-mqtt` - publish a test message
//! - anything else - static files from the `public/` directory, if any
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signalk_web::{create_router, AdminState};
//!
//! let state = AdminState::new(engine, storage);
//! let app = create_router(state, Some("public".into()));
//!
//! let listener = TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod routes;

// Re-exports
pub use routes::{create_router, BASE_PATH};

use std::sync::Arc;

use signalk_core::ConfigStorage;
use signalk_mqtt_export::ExportEngine;
use tokio::sync::Mutex;

/// Shared state for all route handlers.
pub struct AdminState {
    pub engine: Arc<ExportEngine>,
    /// Where rule changes are persisted.
    pub storage: Arc<dyn ConfigStorage>,
    /// Held across save and apply so disk and engine see rule updates
    /// in the same order.
    pub rules_update: Mutex<()>,
}

impl AdminState {
    pub fn new(engine: Arc<ExportEngine>, storage: Arc<dyn ConfigStorage>) -> AppState {
        Arc::new(Self {
            engine,
            storage,
            rules_update: Mutex::new(()),
        })
    }
}

/// Type alias for shared state in Axum handlers.
pub type AppState = Arc<AdminState>;
