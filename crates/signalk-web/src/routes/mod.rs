//! HTTP route handlers for the export manager's admin API.

pub mod mqtt;
pub mod rules;

use std::path::PathBuf;

use axum::Router;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::AppState;

/// Mount point of the admin API.
pub const BASE_PATH: &str = "/plugins/signalk-mqtt-export";

/// Create the admin router.
///
/// Routes are organized as:
/// - `/plugins/signalk-mqtt-export/api/` - rules and MQTT endpoints
/// - `/plugins/signalk-mqtt-export/` - static files from `public_dir`
pub fn create_router(state: AppState, public_dir: Option<PathBuf>) -> Router {
    let mut plugin = Router::new()
        .nest("/api", rules::routes().merge(mqtt::routes()))
        .with_state(state);

    if let Some(dir) = public_dir.filter(|dir| dir.is_dir()) {
        debug!("Serving static files from {}", dir.display());
        plugin = plugin.fallback_service(ServeDir::new(dir));
    }

    Router::new().nest(BASE_PATH, plugin)
}
