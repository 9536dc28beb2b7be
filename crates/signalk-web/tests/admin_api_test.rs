//! Tests for the admin REST API.
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`;
//! the engine runs against an in-process bus and a recording transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use signalk_core::{
    load_export_config, ConfigError, ConfigStorage, ExportConfig, MemoryConfigStorage,
};
use signalk_mqtt_export::{
    ExportEngine, LocalDeltaBus, MqttConnectOptions, MqttConnector, MqttTransport,
    OutboundMessage, TransportError,
};
use signalk_web::{create_router, AdminState};

#[derive(Default)]
struct RecordingTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MqttTransport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

struct RecordingConnector(Arc<RecordingTransport>);

impl MqttConnector for RecordingConnector {
    fn connect(
        &self,
        _options: &MqttConnectOptions,
    ) -> Result<Arc<dyn MqttTransport>, TransportError> {
        Ok(self.0.clone())
    }
}

/// Storage whose writes always fail.
struct ReadOnlyStorage;

impl ConfigStorage for ReadOnlyStorage {
    fn load_plugin_config(&self, plugin_id: &str) -> Result<Value, ConfigError> {
        Err(ConfigError::NotFound(plugin_id.to_string()))
    }

    fn save_plugin_config(&self, _plugin_id: &str, _config: &Value) -> Result<(), ConfigError> {
        Err(ConfigError::WriteError("read-only".to_string()))
    }
}

/// Storage that holds the first save open until a second save lands, or
/// until a short timeout when saves are serialized.
#[derive(Default)]
struct GatedStorage {
    inner: MemoryConfigStorage,
    saves: Mutex<usize>,
    second_save: Condvar,
}

impl ConfigStorage for GatedStorage {
    fn load_plugin_config(&self, plugin_id: &str) -> Result<Value, ConfigError> {
        self.inner.load_plugin_config(plugin_id)
    }

    fn save_plugin_config(&self, plugin_id: &str, config: &Value) -> Result<(), ConfigError> {
        self.inner.save_plugin_config(plugin_id, config)?;

        let mut saves = self.saves.lock().unwrap();
        *saves += 1;
        if *saves == 1 {
            let _ = self
                .second_save
                .wait_timeout_while(saves, Duration::from_millis(200), |n| *n < 2)
                .unwrap();
        } else {
            self.second_save.notify_all();
        }
        Ok(())
    }
}

struct TestApp {
    router: Router,
    engine: Arc<ExportEngine>,
    transport: Arc<RecordingTransport>,
}

fn test_app(storage: Arc<dyn ConfigStorage>) -> TestApp {
    let bus = LocalDeltaBus::new("vessels.urn:mrn:signalk:uuid:test-vessel");
    let transport = Arc::new(RecordingTransport::default());
    let engine = Arc::new(ExportEngine::new(
        Arc::new(bus),
        Arc::new(RecordingConnector(transport.clone())),
    ));
    engine.start(ExportConfig {
        topic_prefix: "boat".to_string(),
        ..Default::default()
    });

    TestApp {
        router: create_router(AdminState::new(engine.clone(), storage), None),
        engine,
        transport,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_get_rules() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));

    let (status, body) = send(
        &app.router,
        "GET",
        "/plugins/signalk-mqtt-export/api/rules",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["rules"].as_array().unwrap().len(), 6);
    assert_eq!(body["rules"][0]["id"], "all-navigation");
    assert_eq!(body["rules"][4]["excludeMMSI"], "368396230");
    assert_eq!(body["activeSubscriptions"], 3);
    assert_eq!(body["mqttConnected"], false);
}

#[tokio::test]
async fn test_post_rules_saves_and_applies() {
    let storage = Arc::new(MemoryConfigStorage::new());
    let app = test_app(storage.clone());

    let (status, body) = send(
        &app.router,
        "POST",
        "/plugins/signalk-mqtt-export/api/rules",
        Some(json!({"rules": [
            {"id": "sog", "path": "navigation.speedOverGround", "enabled": true},
            {"id": "ais", "context": "vessels.*", "path": "*", "enabled": true}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Export rules updated and saved");

    assert_eq!(app.engine.rules().len(), 2);
    assert_eq!(app.engine.status().active_subscriptions, 2);

    let saved = load_export_config(storage.as_ref()).unwrap();
    assert_eq!(saved.export_rules.len(), 2);
    assert_eq!(saved.export_rules[0].id, "sog");
    assert_eq!(saved.topic_prefix, "boat");
}

#[tokio::test]
async fn test_post_rules_rejects_non_array() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));

    let (status, body) = send(
        &app.router,
        "POST",
        "/plugins/signalk-mqtt-export/api/rules",
        Some(json!({"rules": {"path": "*"}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Rules must be an array");
    assert_eq!(app.engine.rules().len(), 6);
}

#[tokio::test]
async fn test_post_rules_rejects_invalid_qos() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));

    let (status, body) = send(
        &app.router,
        "POST",
        "/plugins/signalk-mqtt-export/api/rules",
        Some(json!({"rules": [{"path": "*", "qos": 5}]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(app.engine.rules().len(), 6);
}

#[tokio::test]
async fn test_post_rules_save_failure_keeps_engine() {
    let app = test_app(Arc::new(ReadOnlyStorage));

    let (status, body) = send(
        &app.router,
        "POST",
        "/plugins/signalk-mqtt-export/api/rules",
        Some(json!({"rules": [{"path": "*", "enabled": true}]})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to save configuration");
    assert_eq!(app.engine.rules().len(), 6);
}

#[tokio::test]
async fn test_mqtt_status() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));
    app.transport.connected.store(true, Ordering::SeqCst);

    let (status, body) = send(
        &app.router,
        "GET",
        "/plugins/signalk-mqtt-export/api/mqtt-status",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "connected": true,
            "broker": "mqtt://localhost:1883",
            "clientId": "signalk-mqtt-export"
        })
    );
}

#[tokio::test]
async fn test_test_mqtt_when_disconnected() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));

    let (status, body) = send(
        &app.router,
        "POST",
        "/plugins/signalk-mqtt-export/api/test-mqtt",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"success": false, "error": "MQTT not connected"}));
    assert!(app.transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_test_mqtt_publishes() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));
    app.transport.connected.store(true, Ordering::SeqCst);

    let (status, body) = send(
        &app.router,
        "POST",
        "/plugins/signalk-mqtt-export/api/test-mqtt",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Test message published");
    assert_eq!(body["topic"], "boat/signalk-mqtt-export-test");

    let sent = app.transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "boat/signalk-mqtt-export-test");
}

#[tokio::test]
async fn test_static_files_are_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>MQTT Export</h1>").unwrap();

    let app = test_app(Arc::new(MemoryConfigStorage::new()));
    let router = create_router(
        AdminState::new(app.engine.clone(), Arc::new(MemoryConfigStorage::new())),
        Some(dir.path().to_path_buf()),
    );

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/plugins/signalk-mqtt-export/index.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<h1>MQTT Export</h1>");

    // API routes still win over the static fallback.
    let (status, _) = send(
        &router,
        "GET",
        "/plugins/signalk-mqtt-export/api/mqtt-status",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_without_public_dir() {
    let app = test_app(Arc::new(MemoryConfigStorage::new()));

    let (status, _) = send(&app.router, "GET", "/plugins/signalk-mqtt-export/index.html", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_rule_posts_leave_disk_and_engine_in_agreement() {
    let storage = Arc::new(GatedStorage::default());
    let app = test_app(storage.clone());

    let post = |id: &str| {
        send(
            &app.router,
            "POST",
            "/plugins/signalk-mqtt-export/api/rules",
            Some(json!({"rules": [{"id": id, "path": "*", "enabled": true}]})),
        )
    };
    let (first, second) = tokio::join!(post("first"), post("second"));
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);

    let saved = load_export_config(storage.as_ref()).unwrap();
    assert_eq!(saved.export_rules.len(), 1);
    assert_eq!(app.engine.rules()[0].id, saved.export_rules[0].id);
}
