//! Configuration loading and management.
//!
//! Loads configuration from environment variables (optionally via a `.env` file),
//! validated once at startup. The token flow never reads the environment itself.

use anyhow::{Context, Result};
use std::env;
use std::path::Path;

/// Environment file consulted at startup.
const ENV_FILE: &str = ".env";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub mqtt: MqttConfig,
}

/// OAuth2 device-code flow settings for the Microsoft identity platform.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub tenant: String,
    /// Space-separated Graph scopes, e.g. "user.read offline_access".
    pub scope: String,
}

/// MQTT broker settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the environment without validating completeness.
    fn from_env() -> Result<Self> {
        let port = match env::var("MQTT_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("MQTT_PORT is not a valid port number: {raw}"))?,
            Err(_) => 1883,
        };

        Ok(Config {
            oauth: OAuthConfig {
                client_id: env::var("CLIENT_ID").unwrap_or_default(),
                tenant: env::var("AUTH_TENANT").unwrap_or_default(),
                scope: env::var("GRAPH_USER_SCOPES").unwrap_or_default(),
            },
            mqtt: MqttConfig {
                host: env::var("MQTT_HOST").unwrap_or_default(),
                port,
                username: env::var("MQTT_USER").unwrap_or_default(),
                password: env::var("MQTT_PASSWORD").unwrap_or_default(),
            },
        })
    }

    /// Validate that required configuration is present.
    fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.oauth.client_id.is_empty() {
            missing.push("CLIENT_ID");
        }
        if self.oauth.tenant.is_empty() {
            missing.push("AUTH_TENANT");
        }
        if self.oauth.scope.is_empty() {
            missing.push("GRAPH_USER_SCOPES");
        }
        if self.mqtt.host.is_empty() {
            missing.push("MQTT_HOST");
        }
        if self.mqtt.username.is_empty() {
            missing.push("MQTT_USER");
        }
        if self.mqtt.password.is_empty() {
            missing.push("MQTT_PASSWORD");
        }

        if !missing.is_empty() {
            anyhow::bail!(
                "Missing required configuration: {}. Set these in the environment or in {}",
                missing.join(", "),
                ENV_FILE
            );
        }

        Ok(())
    }

    /// Authority base URL for the configured tenant.
    pub fn authority(&self) -> String {
        format!("https://login.microsoftonline.com/{}", self.oauth.tenant)
    }

    /// Render the configuration in `.env` syntax.
    fn render_env(&self) -> String {
        format!(
            "CLIENT_ID={}\n\
             AUTH_TENANT={}\n\
             GRAPH_USER_SCOPES='{}'\n\
             MQTT_HOST={}\n\
             MQTT_PORT={}\n\
             MQTT_USER={}\n\
             MQTT_PASSWORD={}\n",
            self.oauth.client_id,
            self.oauth.tenant,
            self.oauth.scope,
            self.mqtt.host,
            self.mqtt.port,
            self.mqtt.username,
            self.mqtt.password,
        )
    }
}

/// Blank template written when the environment is incomplete.
const ENV_TEMPLATE: &str = "CLIENT_ID=\n\
                            AUTH_TENANT=\n\
                            GRAPH_USER_SCOPES='user.read offline_access'\n\
                            MQTT_HOST=\n\
                            MQTT_PORT=1883\n\
                            MQTT_USER=\n\
                            MQTT_PASSWORD=\n";

/// Create a `.env` file when none exists.
///
/// When the environment already holds a complete configuration it is
/// snapshotted into the file so it persists across restarts; otherwise a
/// blank template is written for the operator to fill in.
///
/// Returns `true` when a fresh file was written.
pub fn ensure_env_template() -> Result<bool> {
    if Path::new(ENV_FILE).exists() {
        return Ok(false);
    }

    let contents = match Config::from_env() {
        Ok(config) if config.validate().is_ok() => config.render_env(),
        _ => ENV_TEMPLATE.to_string(),
    };
    std::fs::write(ENV_FILE, contents).context("Failed to create .env file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            oauth: OAuthConfig {
                client_id: "test-client".into(),
                tenant: "test-tenant".into(),
                scope: "user.read offline_access".into(),
            },
            mqtt: MqttConfig {
                host: "broker.local".into(),
                port: 1883,
                username: "bot".into(),
                password: "secret".into(),
            },
        }
    }

    #[test]
    fn test_authority() {
        let config = test_config();
        assert_eq!(
            config.authority(),
            "https://login.microsoftonline.com/test-tenant"
        );
    }

    #[test]
    fn test_validate_complete_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_missing_variables() {
        let mut config = test_config();
        config.oauth.client_id.clear();
        config.mqtt.password.clear();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("CLIENT_ID"));
        assert!(err.contains("MQTT_PASSWORD"));
        assert!(!err.contains("AUTH_TENANT"));
    }

    #[test]
    fn test_env_snapshot_preserves_current_configuration() {
        let rendered = test_config().render_env();
        assert!(rendered.contains("CLIENT_ID=test-client\n"));
        assert!(rendered.contains("AUTH_TENANT=test-tenant\n"));
        assert!(rendered.contains("GRAPH_USER_SCOPES='user.read offline_access'\n"));
        assert!(rendered.contains("MQTT_HOST=broker.local\n"));
        assert!(rendered.contains("MQTT_PORT=1883\n"));
        assert!(rendered.contains("MQTT_PASSWORD=secret\n"));
    }

    #[test]
    fn test_blank_template_covers_every_required_variable() {
        // An incomplete environment gets the fill-in template, which must
        // mention every variable validation would otherwise complain about.
        for name in [
            "CLIENT_ID",
            "AUTH_TENANT",
            "GRAPH_USER_SCOPES",
            "MQTT_HOST",
            "MQTT_USER",
            "MQTT_PASSWORD",
        ] {
            assert!(ENV_TEMPLATE.contains(name), "template missing {name}");
        }
    }
}
