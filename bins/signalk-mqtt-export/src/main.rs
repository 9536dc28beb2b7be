use signalk_core::{load_export_config, Delta, FileConfigStorage, PathValue, Update};
use signalk_mqtt_export::{ExportEngine, LocalDeltaBus, RumqttcConnector};
use signalk_web::{create_router, AdminState, BASE_PATH};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SELF_URN: &str = "vessels.urn:mrn:signalk:uuid:c0d79334-4e25-4245-8892-54e8ccc8021d";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,signalk_mqtt_export=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("SignalK MQTT export manager starting...");

    // Configuration
    let config_dir = config_dir();
    let http_addr: SocketAddr = std::env::var("SIGNALK_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3001".into())
        .parse()?;
    let self_urn = self_urn();
    let demo = std::env::var("SIGNALK_DEMO").map_or(true, |v| v != "false");

    let storage = Arc::new(FileConfigStorage::new(&config_dir));
    let config = load_export_config(storage.as_ref())?;
    tracing::info!(
        "Loaded configuration from {} ({} export rules)",
        config_dir.display(),
        config.export_rules.len()
    );

    // Exporter
    let bus = LocalDeltaBus::new(&self_urn);
    let engine = Arc::new(ExportEngine::new(
        Arc::new(bus.clone()),
        Arc::new(RumqttcConnector),
    ));
    engine.start(config);

    // Admin API
    let app = create_router(
        AdminState::new(engine.clone(), storage),
        Some(PathBuf::from("public")),
    )
    .layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    // Demo data generator
    let demo_bus = bus.clone();
    let demo_handle = tokio::spawn(async move {
        if demo {
            generate_demo_data(demo_bus).await;
        } else {
            std::future::pending::<()>().await;
        }
    });

    tracing::info!("SignalK MQTT export manager ready!");
    tracing::info!("   Admin API: http://{}{}/api/rules", http_addr, BASE_PATH);
    tracing::info!("   Self:      {}", self_urn);
    if demo {
        tracing::info!("   Demo feed: on (set SIGNALK_DEMO=false to disable)");
    }

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = demo_handle => {
            tracing::warn!("Demo data generator stopped");
        }
    }

    engine.stop();
    bus.close();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// `SIGNALK_CONFIG_DIR`, else `$HOME/.signalk`.
fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SIGNALK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".signalk"))
        .unwrap_or_else(|_| PathBuf::from(".signalk"))
}

/// `SIGNALK_SELF_URN` as a full context, e.g. "vessels.urn:mrn:...".
fn self_urn() -> String {
    match std::env::var("SIGNALK_SELF_URN") {
        Ok(urn) if urn.starts_with("vessels.") => urn,
        Ok(urn) => format!("vessels.{urn}"),
        Err(_) => DEFAULT_SELF_URN.to_string(),
    }
}

/// Generate demo data - simulated boat navigation
async fn generate_demo_data(bus: LocalDeltaBus) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
    let mut latitude = 52.0987654;
    let mut longitude = 4.9876545;
    let mut tick: f64 = 0.0;

    loop {
        interval.tick().await;

        // Move the boat
        latitude += 0.00001;
        longitude += 0.00002;
        tick += 1.0;

        // Vary speed (m/s) and course (radians) slightly
        let sog = 3.85 + (tick / 10.0).sin() * 0.5;
        let cog = 1.52 + (tick / 10.0).cos() * 0.1;

        let delta = Delta {
            context: Some("vessels.self".to_string()),
            updates: vec![Update {
                source_ref: Some("demo.generator".to_string()),
                source: None,
                timestamp: Some(
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ),
                values: vec![
                    PathValue {
                        path: "navigation.position".to_string(),
                        value: serde_json::json!({
                            "latitude": latitude,
                            "longitude": longitude
                        }),
                    },
                    PathValue {
                        path: "navigation.speedOverGround".to_string(),
                        value: serde_json::json!(sog),
                    },
                    PathValue {
                        path: "navigation.courseOverGroundTrue".to_string(),
                        value: serde_json::json!(cog),
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let deliveries = bus.publish(&delta);
        tracing::trace!("Demo delta delivered to {} subscriptions", deliveries);
    }
}
