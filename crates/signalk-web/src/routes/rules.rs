//! Export rule routes.
//!
//! # Endpoints
//!
//! ### `GET /api/rules`
//! Current rules plus a short status.
//!
//! **Response:**
//! ```json
//! {
//!   "success": true,
//!   "rules": [ { "id": "all-navigation", "path": "*", ... } ],
//!   "activeSubscriptions": 3,
//!   "mqttConnected": true
//! }
//! ```
//!
//! ### `POST /api/rules`
//! Replace the rule list. The new list is persisted first; the running
//! exporter only picks it up once the save succeeded. Concurrent updates
//! are applied one at a time.
//!
//! **Request:**
//! ```json
//! { "rules": [ { "path": "navigation*", "enabled": true } ] }
//! ```
//!
//! **Response:** `{"success": true, "message": "Export rules updated and saved"}`,
//! `400` for a malformed list, `500` when the options cannot be saved.

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use signalk_core::{parse_rules, save_export_config};
use signalk_protocol::{ApiResponse, RulesResponse, UpdateRulesRequest};
use tracing::{error, info};

use crate::AppState;

/// Create rule routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/rules", get(get_rules).post(update_rules))
}

/// GET /api/rules
async fn get_rules(State(state): State<AppState>) -> Json<RulesResponse> {
    let status = state.engine.status();
    Json(RulesResponse {
        success: true,
        rules: state.engine.rules().to_vec(),
        active_subscriptions: status.active_subscriptions,
        mqtt_connected: status.mqtt_connected,
    })
}

/// POST /api/rules
async fn update_rules(
    State(state): State<AppState>,
    Json(request): Json<UpdateRulesRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let rules = match parse_rules(&request.rules) {
        Ok(rules) => rules,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())));
        }
    };

    let _update = state.rules_update.lock().await;
    let mut config = state.engine.config();
    config.export_rules = rules.clone();

    let storage = state.storage.clone();
    let saved = tokio::task::spawn_blocking(move || save_export_config(storage.as_ref(), &config))
        .await
        .map_err(|e| e.to_string())
        .and_then(|result| result.map_err(|e| e.to_string()));
    if let Err(e) = saved {
        error!("Failed to save export rules: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("Failed to save configuration")),
        );
    }

    info!("Export rules updated: {} rules", rules.len());
    state.engine.update_rules(rules);

    (
        StatusCode::OK,
        Json(ApiResponse::ok("Export rules updated and saved")),
    )
}
