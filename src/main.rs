//! Presence Bridge
//!
//! Polls Microsoft Teams presence from the Graph API and republishes it over
//! MQTT with Home Assistant discovery.

#![deny(clippy::all)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use presence_bridge::auth::store::TOKEN_FILE;
use presence_bridge::auth::{OAuth2Client, TokenManager, TokenStore};
use presence_bridge::config::{self, Config};
use presence_bridge::graph::PresenceClient;
use presence_bridge::homeassistant::Device;
use presence_bridge::mqtt::{self, MqttPublisher};
use presence_bridge::updater::{UpdateChecker, VersionInfo};

/// How often presence is polled and republished.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often discovery configuration is republished.
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Give the operator a template to fill in on first run.
    match config::ensure_env_template() {
        Ok(true) => eprintln!("Created .env file in the working directory"),
        Ok(false) => {}
        Err(e) => eprintln!("Warning: {e}"),
    }

    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only log if it's not a "file not found" error
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting presence bridge v{}", version);

    let config = match Config::load() {
        Ok(c) => {
            info!("Configuration loaded successfully");
            c
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Configuration error: {}", e);
            eprintln!("\nPlease set the following environment variables (or fill in .env):");
            eprintln!("  CLIENT_ID=<azure-ad-application-id>");
            eprintln!("  AUTH_TENANT=<tenant-id>");
            eprintln!("  GRAPH_USER_SCOPES='user.read offline_access'");
            eprintln!("  MQTT_HOST=<broker-host> MQTT_USER=<user> MQTT_PASSWORD=<password>");
            std::process::exit(1);
        }
    };

    let oauth_client = OAuth2Client::new(&config)?;
    let token_manager = Arc::new(TokenManager::new(oauth_client, TokenStore::new(TOKEN_FILE)));
    let presence_client = PresenceClient::new()?;
    let latest_release = UpdateChecker::new()?.spawn(version.to_string());

    let device = Device::new(version);
    let (publisher, event_loop) = MqttPublisher::connect(&config.mqtt);

    // Connection supervision: losing the broker is fatal, unlike anything in
    // the token flow.
    {
        let publisher = publisher.clone();
        let device = device.clone();
        tokio::spawn(async move {
            let e = mqtt::drive(event_loop, publisher, device).await;
            error!("MQTT connection lost: {e}");
            std::process::exit(1);
        });
    }

    // Periodic discovery republish so the hub re-registers sensors it dropped.
    {
        let publisher = publisher.clone();
        let device = device.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DISCOVERY_INTERVAL);
            ticker.tick().await; // discovery was just published on connect
            loop {
                ticker.tick().await;
                if let Err(e) = publisher.publish_discovery(&device).await {
                    warn!("Failed to republish discovery: {e}");
                }
            }
        });
    }

    // Interrupt a pending device-code wait on Ctrl-C.
    let shutdown = token_manager.shutdown_token();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let credential = token_manager.get_token().await;
        let presence = presence_client.get_presence(&credential.access_token).await;
        debug!(?presence, "Publishing presence");

        if let Err(e) = publisher.publish_presence(&presence).await {
            warn!("Failed to publish presence: {e}");
        }

        let version_info = VersionInfo {
            version: version.to_string(),
            latest: latest_release.borrow().clone(),
        };
        if let Err(e) = publisher.publish_version(&version_info).await {
            warn!("Failed to publish version: {e}");
        }
    }

    publisher.disconnect().await;
    info!("Presence bridge stopped");
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
