//! Microsoft Graph API client for fetching the user's presence.

use crate::error::ApiError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Base URL for Microsoft Graph API.
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Microsoft Graph presence client.
pub struct PresenceClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl PresenceClient {
    /// Create a new presence client.
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: GRAPH_BASE_URL.to_string(),
        })
    }

    /// Override the Graph base URL. Used by tests to point at a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the current user's presence.
    ///
    /// Never fails the process: an empty token, transport failure, or non-200
    /// response degrades to the "unknown" sentinel so the publisher keeps
    /// reporting something on every tick.
    pub async fn get_presence(&self, access_token: &str) -> Presence {
        if access_token.is_empty() {
            return Presence::unknown();
        }

        match self.fetch(access_token).await {
            Ok(presence) => presence,
            Err(e) => {
                warn!("Presence fetch failed: {e}");
                Presence::unknown()
            }
        }
    }

    async fn fetch(&self, access_token: &str) -> Result<Presence, ApiError> {
        let url = format!("{}/me/presence", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json()
                .await
                .map_err(|e| ApiError::ParseFailed(e.to_string())),
            401 => Err(ApiError::Unauthorized),
            429 => Err(ApiError::RateLimited),
            status => Err(ApiError::RequestFailed(format!("HTTP {}", status))),
        }
    }
}

/// Presence from the Graph `/me/presence` endpoint.
///
/// Field names follow the Graph wire shape so the published JSON matches the
/// value templates registered with Home Assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub availability: String,
    pub activity: String,
    pub status_message: Option<StatusMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    #[serde(rename = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Presence {
    /// Sentinel for "the bridge could not determine presence this cycle".
    pub fn unknown() -> Self {
        Self {
            availability: "unknown".to_string(),
            activity: "unknown".to_string(),
            status_message: None,
        }
    }
}
