//! OAuth2 client for the Microsoft identity platform device-code grant.
//!
//! Covers the three endpoints the bridge needs: device-code issuance,
//! device-code polling, and refresh-token exchange. All requests are
//! `application/x-www-form-urlencoded` POSTs returning JSON; only the HTTP
//! status code is semantically checked on responses.

use crate::config::Config;
use crate::error::AuthError;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// HTTP request timeout.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// RFC 8628 grant type for device-code polling.
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// OAuth2 client bound to one application registration and tenant.
pub struct OAuth2Client {
    client_id: String,
    scope: String,
    /// Authority base URL, e.g. `https://login.microsoftonline.com/<tenant>`.
    authority: String,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    /// Create a new OAuth2 client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: config.oauth.client_id.clone(),
            scope: config.oauth.scope.clone(),
            authority: config.authority(),
            http_client,
        })
    }

    /// Override the authority base URL. Used by tests to point at a mock server.
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    fn devicecode_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.authority)
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// A non-200 status means the refresh token was revoked or has expired;
    /// the caller must discard it and fall back to full authorization.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http_client
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!("Token refresh rejected: HTTP {} - {}", status, error_body);
            return Err(AuthError::RefreshRejected(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    /// Start a device-code authorization attempt.
    pub async fn start_device_authorization(
        &self,
    ) -> Result<DeviceAuthorizationSession, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(self.devicecode_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!("Device code request failed: HTTP {} - {}", status, error_body);
            return Err(AuthError::DeviceCodeRequestFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let payload: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(DeviceAuthorizationSession {
            device_code: payload.device_code,
            user_code: payload.user_code,
            verification_uri: payload.verification_uri,
            expires_at: Utc::now() + Duration::seconds(payload.expires_in as i64),
            interval_secs: payload.interval.max(1),
        })
    }

    /// Poll the token endpoint once for the outcome of a device-code session.
    pub async fn poll_device_code(
        &self,
        session: &DeviceAuthorizationSession,
    ) -> Result<DeviceCodePoll, AuthError> {
        if Utc::now() >= session.expires_at {
            return Ok(DeviceCodePoll::Expired);
        }

        let params = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
            ("device_code", session.device_code.as_str()),
        ];

        let response = self
            .http_client
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        // Anything but 200 means "not confirmed yet"; keep polling until the
        // session deadline ends the attempt.
        if !response.status().is_success() {
            return Ok(DeviceCodePoll::Pending);
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        Ok(DeviceCodePoll::Authorized(payload))
    }
}

/// Ephemeral state for one interactive device-code authorization attempt.
///
/// Never persisted; discarded after success, expiry, or error.
#[derive(Debug, Clone)]
pub struct DeviceAuthorizationSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_at: DateTime<Utc>,
    pub interval_secs: u64,
}

/// Outcome of a single device-code poll.
#[derive(Debug)]
pub enum DeviceCodePoll {
    /// The operator has not confirmed yet; poll again after the interval.
    Pending,
    /// The grant succeeded and tokens were issued.
    Authorized(TokenResponse),
    /// The session deadline passed without confirmation.
    Expired,
}

/// Token response from the Microsoft identity platform.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

/// Device authorization response from the devicecode endpoint.
#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MqttConfig, OAuthConfig};

    fn test_client(authority: &str) -> OAuth2Client {
        let config = Config {
            oauth: OAuthConfig {
                client_id: "client-1".into(),
                tenant: "tenant-1".into(),
                scope: "user.read offline_access".into(),
            },
            mqtt: MqttConfig {
                host: "broker".into(),
                port: 1883,
                username: "u".into(),
                password: "p".into(),
            },
        };
        OAuth2Client::new(&config).unwrap().with_authority(authority)
    }

    #[test]
    fn test_endpoints_follow_authority() {
        let client = test_client("https://example.test/tenant-1");
        assert_eq!(
            client.token_endpoint(),
            "https://example.test/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(
            client.devicecode_endpoint(),
            "https://example.test/tenant-1/oauth2/v2.0/devicecode"
        );
    }

    #[tokio::test]
    async fn test_poll_expired_session_short_circuits() {
        // No server involved: an expired session must not hit the network.
        let client = test_client("http://127.0.0.1:1");
        let session = DeviceAuthorizationSession {
            device_code: "dc".into(),
            user_code: "UC".into(),
            verification_uri: "https://microsoft.com/devicelogin".into(),
            expires_at: Utc::now() - Duration::seconds(1),
            interval_secs: 5,
        };

        let poll = client.poll_device_code(&session).await.unwrap();
        assert!(matches!(poll, DeviceCodePoll::Expired));
    }
}
