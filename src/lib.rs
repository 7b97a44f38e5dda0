//! Bridges Microsoft Teams presence to MQTT.
//!
//! Polls the signed-in user's presence from Microsoft Graph, republishes it
//! over MQTT, and registers discoverable sensors with Home Assistant. Token
//! acquisition uses the OAuth2 device-code grant with durable refresh across
//! restarts.

#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod homeassistant;
pub mod mqtt;
pub mod updater;
