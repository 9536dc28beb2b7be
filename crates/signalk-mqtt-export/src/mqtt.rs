//! rumqttc-backed transport (Linux).
//!
//! The client owns a background task that drives the rumqttc event loop,
//! keeps the connection flag current and retries after errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{parse_broker_url, MqttConnectOptions, MqttConnector, MqttTransport, OutboundMessage};

/// Capacity of the rumqttc request queue.
const REQUEST_CAPACITY: usize = 256;

/// How long a disconnecting event loop may take to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Map a numeric QoS level to rumqttc's enum.
fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// A broker connection backed by `rumqttc::AsyncClient`.
pub struct MqttClient {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttClient {
    /// Start connecting. Returns immediately; the connection comes up in
    /// the background. Must be called from within a tokio runtime.
    pub fn connect(options: &MqttConnectOptions) -> Result<Self, TransportError> {
        let address = parse_broker_url(&options.broker_url)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let mut mqtt_options = MqttOptions::new(&options.client_id, address.host, address.port);
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_clean_session(options.clean_session);
        if let Some((username, password)) = &options.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let handle = runtime.spawn(run_event_loop(
            event_loop,
            connected.clone(),
            options.broker_url.clone(),
            options.reconnect_period,
        ));

        Ok(Self {
            client,
            connected,
            event_loop: Mutex::new(Some(handle)),
        })
    }
}

impl MqttTransport for MqttClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.client
            .try_publish(
                message.topic,
                qos(message.qos),
                message.retain,
                message.payload.into_bytes(),
            )
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    /// Send DISCONNECT and let the event loop flush it.
    ///
    /// The loop is aborted right away when the broker is not connected, and
    /// after [`DISCONNECT_GRACE`] otherwise.
    fn disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        let handle = self
            .event_loop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };

        let queued = match self.client.try_disconnect() {
            Ok(()) => true,
            Err(e) => {
                debug!("MQTT disconnect request not sent: {}", e);
                false
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) if was_connected && queued => {
                runtime.spawn(finish_event_loop(handle));
            }
            _ => handle.abort(),
        }
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.event_loop.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

async fn finish_event_loop(handle: JoinHandle<()>) {
    let abort = handle.abort_handle();
    if tokio::time::timeout(DISCONNECT_GRACE, handle).await.is_err() {
        debug!("MQTT event loop did not finish after disconnect, aborting");
        abort.abort();
    }
}

/// Drive the rumqttc event loop until the client disconnects.
async fn run_event_loop(
    mut event_loop: EventLoop,
    connected: Arc<AtomicBool>,
    broker: String,
    reconnect_period: Duration,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::SeqCst);
                    info!("Connected to MQTT broker: {}", broker);
                } else {
                    warn!("MQTT broker {} refused connection: {:?}", broker, ack.code);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                info!("MQTT client disconnected");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                info!("MQTT client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    info!("MQTT client disconnected");
                }
                warn!("MQTT client error: {}", e);
                tokio::time::sleep(reconnect_period).await;
                info!("MQTT client reconnecting...");
            }
        }
    }
}

/// Connector producing [`MqttClient`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RumqttcConnector;

impl MqttConnector for RumqttcConnector {
    fn connect(
        &self,
        options: &MqttConnectOptions,
    ) -> Result<Arc<dyn MqttTransport>, TransportError> {
        Ok(Arc::new(MqttClient::connect(options)?))
    }
}
