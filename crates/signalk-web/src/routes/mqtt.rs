//! MQTT connection routes.
//!
//! ### `GET /api/mqtt-status`
//! ```json
//! { "success": true, "connected": true, "broker": "mqtt://localhost:1883", "clientId": "signalk-mqtt-export" }
//! ```
//!
//! ### `POST /api/test-mqtt`
//! Publishes a test message to `<prefix or "test">/signalk-mqtt-export-test`.
//! Answers `503` while the broker is not connected.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use signalk_mqtt_export::{ExportError, TransportError};
use signalk_protocol::{ApiResponse, MqttStatusResponse};
use tracing::warn;

use crate::AppState;

/// Create MQTT routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mqtt-status", get(get_status))
        .route("/test-mqtt", post(test_publish))
}

/// GET /api/mqtt-status
async fn get_status(State(state): State<AppState>) -> Json<MqttStatusResponse> {
    let status = state.engine.status();
    Json(MqttStatusResponse {
        success: true,
        connected: status.mqtt_connected,
        broker: status.broker,
        client_id: status.client_id,
    })
}

/// POST /api/test-mqtt
async fn test_publish(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse>) {
    match state.engine.test_publish() {
        Ok(topic) => (
            StatusCode::OK,
            Json(ApiResponse::ok("Test message published").with_topic(topic)),
        ),
        Err(ExportError::Transport(TransportError::NotConnected)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("MQTT not connected")),
        ),
        Err(e) => {
            warn!("MQTT test publish failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}
