//! Home Assistant MQTT discovery payloads.
//!
//! Builds the sensor configuration messages published on
//! `homeassistant/sensor/teams/<object>/config` so the hub auto-registers the
//! presence and update entities. Optional fields are omitted from the JSON
//! when unset.

use serde::Serialize;

/// State topic for presence payloads.
pub const PRESENCE_TOPIC: &str = "msteams/presence";
/// State topic for version payloads.
pub const VERSION_TOPIC: &str = "msteams/version";

/// Seconds without a state update after which entities become unavailable.
const EXPIRE_AFTER: u32 = 120;

/// Entity category, marking entities as configuration or diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// Device class hints for sensor entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Firmware,
}

/// The device all sensors are grouped under in the hub.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub manufacturer: String,
    pub model: String,
    pub name: String,
    pub sw_version: String,
    pub identifiers: String,
}

impl Device {
    pub fn new(version: &str) -> Self {
        Self {
            manufacturer: "Rindula".to_string(),
            model: "Rust".to_string(),
            name: "Teams Status".to_string(),
            sw_version: version.to_string(),
            identifiers: "Teams Status".to_string(),
        }
    }
}

/// One discoverable sensor configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SensorConfig {
    pub name: String,
    pub availability_mode: String,
    pub device: Device,
    pub unique_id: String,
    pub state_topic: String,
    pub value_template: String,
    pub expire_after: u32,
    pub icon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<DeviceClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_not_available: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
}

impl SensorConfig {
    fn presence_sensor(device: &Device, name: &str, unique_id: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            availability_mode: "all".to_string(),
            device: device.clone(),
            unique_id: unique_id.to_string(),
            state_topic: PRESENCE_TOPIC.to_string(),
            value_template: template.to_string(),
            expire_after: EXPIRE_AFTER,
            icon: "mdi:eye".to_string(),
            device_class: None,
            entity_category: None,
            payload_not_available: None,
            latest_version_topic: None,
            latest_version_template: None,
            release_url: None,
        }
    }
}

/// Discovery messages as `(topic, config)` pairs, ready to publish.
pub fn discovery_messages(device: &Device) -> Vec<(String, SensorConfig)> {
    let availability = SensorConfig::presence_sensor(
        device,
        "Teams Availability",
        "teams_presence_availability",
        "{{ value_json.availability }}",
    );

    let activity = SensorConfig::presence_sensor(
        device,
        "Teams Activity",
        "teams_presence_activity",
        "{{ value_json.activity }}",
    );

    let status = SensorConfig {
        payload_not_available: Some(String::new()),
        ..SensorConfig::presence_sensor(
            device,
            "Teams Status Message",
            "teams_presence_status",
            "{{ value_json.statusMessage.message.content }}",
        )
    };

    let update = SensorConfig {
        icon: "mdi:update".to_string(),
        state_topic: VERSION_TOPIC.to_string(),
        device_class: Some(DeviceClass::Firmware),
        entity_category: Some(EntityCategory::Diagnostic),
        latest_version_topic: Some(VERSION_TOPIC.to_string()),
        latest_version_template: Some("{{ value_json.latest.tag_name }}".to_string()),
        release_url: Some("{{ value_json.latest.url }}".to_string()),
        ..SensorConfig::presence_sensor(
            device,
            "Teams Status Update",
            "teams_presence_update",
            "{{ value_json.version }}",
        )
    };

    vec![
        (
            "homeassistant/sensor/teams/availability/config".to_string(),
            availability,
        ),
        (
            "homeassistant/sensor/teams/activity/config".to_string(),
            activity,
        ),
        ("homeassistant/sensor/teams/status/config".to_string(), status),
        ("homeassistant/sensor/teams/update/config".to_string(), update),
    ]
}
