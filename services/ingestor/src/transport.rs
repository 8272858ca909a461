//! Transport seam over the message bus
//!
//! The pipeline only needs one verb from the bus: subscribe. The
//! connection lifecycle (connect/reconnect/TLS) stays inside the MQTT
//! client's event loop, which the binary drives directly.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use tracing::info;

use crate::config::MqttConfig;

/// Errors issued by the transport seam.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("subscribe request failed: {0}")]
    Subscribe(String),
}

/// Subscription side of the message bus.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;
}

/// MQTT-backed transport. Subscriptions use QoS 1 so the broker
/// redelivers across short disconnects.
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// Build the MQTT client and its event loop from configuration.
    ///
    /// The event loop must be polled by the caller; `MqttTransport`
    /// only holds the request side. `request_capacity` bounds the
    /// client's request channel and must cover the largest subscribe
    /// burst issued while the event loop is not being polled (see
    /// [`request_capacity`]).
    pub fn connect(config: &MqttConfig, request_capacity: usize) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(config.client_id.clone(), &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_credentials(&config.username, &config.password);
        if config.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, request_capacity);
        info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            tls = config.tls,
            "MQTT client created"
        );

        (Self { client }, event_loop)
    }

    /// Request a clean disconnect from the broker.
    pub async fn disconnect(&self) {
        let _ = self.client.disconnect().await;
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }
}

/// Request-channel capacity for the configured subscription load.
///
/// Expansion subscribes every option leg of an index inside one
/// delivery-loop iteration, while the event loop is suspended and
/// cannot drain requests. The channel must therefore hold the full
/// worst-case burst: all legs of all indices plus the spot and
/// wildcard subscriptions, with a floor for small configurations.
pub fn request_capacity(indices: usize, strike_radius: u32) -> usize {
    let legs_per_index = (2 * strike_radius as usize + 1) * 2;
    (indices * (legs_per_index + 1) + 1).max(64)
}
