//! MQTT transport abstraction.
//!
//! The engine only needs three things from a broker connection: the
//! current connection flag, a non-blocking publish and a way to tear the
//! connection down. Connection lifecycle (connect, reconnect, close) runs
//! on its own and is only observed for diagnostics.

use std::sync::Arc;
use std::time::Duration;

use signalk_core::ExportConfig;

use crate::error::TransportError;

/// Default MQTT port when the broker URL omits one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// A message ready to hand to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

/// A live (or reconnecting) broker connection.
pub trait MqttTransport: Send + Sync {
    /// Whether the broker connection is currently up.
    fn is_connected(&self) -> bool;

    /// Queue a message without waiting for delivery.
    fn publish(&self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Close the connection and stop reconnecting.
    fn disconnect(&self);
}

/// Creates transports. Must not block waiting for the broker.
pub trait MqttConnector: Send + Sync {
    fn connect(&self, options: &MqttConnectOptions)
        -> Result<Arc<dyn MqttTransport>, TransportError>;
}

/// Connection parameters derived from the plugin options.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConnectOptions {
    pub broker_url: String,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub reconnect_period: Duration,
    pub clean_session: bool,
}

impl MqttConnectOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            broker_url: config.mqtt_broker.clone(),
            client_id: config.mqtt_client_id.clone(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            keep_alive: Duration::from_secs(60),
            reconnect_period: Duration::from_secs(5),
            clean_session: true,
        }
    }
}

/// Host and port parsed from a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

/// Parse `mqtt://host[:port]` or `tcp://host[:port]`.
///
/// A bare `host[:port]` is accepted as well. TLS schemes are rejected.
pub fn parse_broker_url(url: &str) -> Result<BrokerAddress, TransportError> {
    let invalid = || TransportError::InvalidBrokerUrl(url.to_string());

    let rest = match url.split_once("://") {
        Some(("mqtt" | "tcp", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => url,
    };
    let authority = rest.split('/').next().unwrap_or_default();

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (authority, DEFAULT_MQTT_PORT),
    };
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(
            parse_broker_url("mqtt://localhost:1883").unwrap(),
            BrokerAddress {
                host: "localhost".to_string(),
                port: 1883
            }
        );
        assert_eq!(parse_broker_url("tcp://10.0.0.5").unwrap().port, 1883);
        assert_eq!(parse_broker_url("broker.local:1884").unwrap().port, 1884);
        assert_eq!(
            parse_broker_url("mqtt://broker.local:1883/").unwrap().host,
            "broker.local"
        );
    }

    #[test]
    fn test_parse_broker_url_rejects_invalid() {
        for url in ["", "mqtt://", "mqtts://broker:8883", "mqtt://broker:port", "ws://x"] {
            assert_eq!(
                parse_broker_url(url),
                Err(TransportError::InvalidBrokerUrl(url.to_string())),
                "{url}"
            );
        }
    }

    #[test]
    fn test_options_from_config() {
        let config = ExportConfig {
            mqtt_username: "skipper".to_string(),
            mqtt_password: "secret".to_string(),
            ..Default::default()
        };
        let options = MqttConnectOptions::from_config(&config);

        assert_eq!(options.broker_url, "mqtt://localhost:1883");
        assert_eq!(options.client_id, "signalk-mqtt-export");
        assert_eq!(
            options.credentials,
            Some(("skipper".to_string(), "secret".to_string()))
        );
        assert_eq!(options.keep_alive, Duration::from_secs(60));
        assert_eq!(options.reconnect_period, Duration::from_secs(5));
        assert!(options.clean_session);
    }
}
