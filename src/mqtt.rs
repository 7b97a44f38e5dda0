//! MQTT publishing and connection supervision.
//!
//! The publisher only ever receives fully-formed payloads; token handling
//! stays in the auth module. Losing the broker connection is fatal to the
//! process, unlike every failure inside the token flow.

use crate::config::MqttConfig;
use crate::error::AppError;
use crate::graph::Presence;
use crate::homeassistant::{discovery_messages, Device, PRESENCE_TOPIC, VERSION_TOPIC};
use crate::updater::VersionInfo;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keep-alive interval for the broker connection.
const KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Bounded capacity of the client request channel.
const CHANNEL_CAPACITY: usize = 10;

/// MQTT publisher for presence, version, and discovery payloads.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Create the client and its event loop from configuration.
    ///
    /// The returned event loop must be driven (see [`drive`]) for any
    /// publish to actually reach the broker.
    pub fn connect(config: &MqttConfig) -> (Self, EventLoop) {
        let client_id = format!(
            "presence-bridge-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );

        let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
        options.set_credentials(config.username.as_str(), config.password.as_str());
        options.set_keep_alive(KEEP_ALIVE);

        let (client, event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        (Self { client }, event_loop)
    }

    /// Publish the current presence on the presence topic.
    pub async fn publish_presence(&self, presence: &Presence) -> Result<(), AppError> {
        let payload =
            serde_json::to_vec(presence).map_err(|e| AppError::Mqtt(e.to_string()))?;
        self.client
            .publish(PRESENCE_TOPIC, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| AppError::Mqtt(e.to_string()))
    }

    /// Publish the running and latest version on the version topic.
    pub async fn publish_version(&self, version: &VersionInfo) -> Result<(), AppError> {
        let payload =
            serde_json::to_vec(version).map_err(|e| AppError::Mqtt(e.to_string()))?;
        self.client
            .publish(VERSION_TOPIC, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| AppError::Mqtt(e.to_string()))
    }

    /// Publish the Home Assistant discovery configuration for all sensors.
    pub async fn publish_discovery(&self, device: &Device) -> Result<(), AppError> {
        for (topic, config) in discovery_messages(device) {
            let payload =
                serde_json::to_vec(&config).map_err(|e| AppError::Mqtt(e.to_string()))?;
            self.client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .await
                .map_err(|e| AppError::Mqtt(e.to_string()))?;
        }
        Ok(())
    }

    /// Gracefully disconnect from the broker.
    pub async fn disconnect(&self) {
        let _ = self.client.disconnect().await;
    }
}

/// Drive the MQTT event loop until the connection is lost.
///
/// Discovery is (re)published on every connection acknowledgement so sensors
/// reappear after a broker restart. Returns the fatal connection error.
pub async fn drive(
    mut event_loop: EventLoop,
    publisher: MqttPublisher,
    device: Device,
) -> AppError {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                republish_discovery(&publisher, &device);
            }
            Ok(event) => debug!(?event, "MQTT event"),
            Err(e) => return AppError::Mqtt(e.to_string()),
        }
    }
}

/// Hand the discovery publish off to its own task.
///
/// The driver is the sole consumer of the bounded request channel, so it must
/// never await a send into that channel itself: with the channel full that
/// send would wait on a `poll` that never runs again.
fn republish_discovery(publisher: &MqttPublisher, device: &Device) {
    let publisher = publisher.clone();
    let device = device.clone();
    tokio::spawn(async move {
        if let Err(e) = publisher.publish_discovery(&device).await {
            warn!("Failed to publish discovery after connect: {e}");
        }
    });
}
