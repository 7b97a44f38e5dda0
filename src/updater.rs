//! Release update checks against the GitHub API.
//!
//! The latest release is distributed through a watch channel and published as
//! part of the version payload, where the update entity picks it up.

use crate::error::ApiError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// GitHub API base for this project's releases.
const API_BASE: &str = "https://api.github.com/repos/Rindula/msteams-presence-bot-go";

/// How often to check for a new release.
const CHECK_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A published release, as returned by the GitHub releases API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    /// Deserialized from the GitHub `html_url` field, published as `url`
    /// to match the discovery release-url template.
    #[serde(rename(deserialize = "html_url", serialize = "url"))]
    pub url: String,
}

/// Version payload published on the version topic.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub latest: Release,
}

/// Periodic release checker.
pub struct UpdateChecker {
    http_client: reqwest::Client,
    api_base: String,
}

impl UpdateChecker {
    /// Create a new update checker.
    pub fn new() -> Result<Self> {
        // GitHub rejects requests without a User-Agent.
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("presence-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            api_base: API_BASE.to_string(),
        })
    }

    /// Override the API base URL. Used by tests to point at a mock server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Fetch the latest published release.
    pub async fn latest_release(&self) -> Result<Release, ApiError> {
        let url = format!("{}/releases/latest", self.api_base);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        if response.status().as_u16() != 200 {
            return Err(ApiError::RequestFailed(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::ParseFailed(e.to_string()))
    }

    /// Spawn the periodic check task.
    ///
    /// The receiver starts out holding the running version and is updated on
    /// every successful check. Failed checks are logged and retried on the
    /// next interval.
    pub fn spawn(self, current_version: String) -> watch::Receiver<Release> {
        let (tx, rx) = watch::channel(Release {
            tag_name: current_version.clone(),
            url: String::new(),
        });

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_INTERVAL);
            loop {
                ticker.tick().await;
                match self.latest_release().await {
                    Ok(release) => {
                        if release.tag_name != current_version {
                            info!(
                                "New version available: {} -> {} ({})",
                                current_version, release.tag_name, release.url
                            );
                        }
                        if tx.send(release).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Update check failed: {e}"),
                }
            }
        });

        rx
    }
}
