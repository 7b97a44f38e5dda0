use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use presence_bridge::auth::{Credential, OAuth2Client, TokenManager, TokenStore};
use presence_bridge::config::{Config, MqttConfig, OAuthConfig};

const TOKEN_PATH: &str = "/oauth2/v2.0/token";
const DEVICECODE_PATH: &str = "/oauth2/v2.0/devicecode";

fn test_config() -> Config {
    Config {
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
    }
}

fn manager(authority: &str, dir: &Path) -> TokenManager {
    let oauth = OAuth2Client::new(&test_config())
        .unwrap()
        .with_authority(authority);
    TokenManager::new(oauth, TokenStore::new(dir.join("token.data")))
}

fn seed(dir: &Path, credential: &Credential) {
    assert!(TokenStore::new(dir.join("token.data")).save(credential));
}

fn stored(dir: &Path) -> Credential {
    TokenStore::new(dir.join("token.data")).load().unwrap()
}

/// Mount a device-code issuance response with the given lifetime.
async fn mount_devicecode(server: &MockServer, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path(DEVICECODE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dc-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": expires_in,
            "interval": 1
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn valid_credential_is_returned_without_network_calls() {
    let server = MockServer::start().await;
    // Any request against either endpoint fails the test.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let credential = Credential {
        access_token: "still-good".into(),
        valid_until: Utc::now().timestamp() + 600,
        refresh_token: "unused".into(),
    };
    seed(dir.path(), &credential);

    let manager = manager(&server.uri(), dir.path());
    assert_eq!(manager.get_token().await, credential);
    // Repeat calls serve from memory, still without network traffic.
    assert_eq!(manager.get_token().await, credential);
    server.verify().await;
}

#[tokio::test]
async fn expired_credential_is_refreshed_exactly_once_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "rotated-refresh",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        &Credential {
            access_token: "stale-access".into(),
            valid_until: Utc::now().timestamp() - 10,
            refresh_token: "old-refresh".into(),
        },
    );

    let before = Utc::now().timestamp();
    let credential = manager(&server.uri(), dir.path()).get_token().await;
    let after = Utc::now().timestamp();

    assert_eq!(credential.access_token, "fresh-access");
    assert_eq!(credential.refresh_token, "rotated-refresh");
    assert!(credential.valid_until >= before + 3600);
    assert!(credential.valid_until <= after + 3600);

    // The new credential replaced the stale one on disk.
    assert_eq!(stored(dir.path()), credential);
    server.verify().await;
}

#[tokio::test]
async fn missing_rotated_refresh_token_keeps_the_prior_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        &Credential {
            access_token: "stale-access".into(),
            valid_until: 0,
            refresh_token: "old-refresh".into(),
        },
    );

    let credential = manager(&server.uri(), dir.path()).get_token().await;
    assert_eq!(credential.refresh_token, "old-refresh");
}

#[tokio::test]
async fn absurd_token_lifetime_saturates_instead_of_wrapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "rotated-refresh",
            "expires_in": u64::MAX
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        &Credential {
            access_token: "stale-access".into(),
            valid_until: 0,
            refresh_token: "old-refresh".into(),
        },
    );

    let credential = manager(&server.uri(), dir.path()).get_token().await;

    // A wrapped expiry would come out negative (instantly invalid).
    assert_eq!(credential.valid_until, i64::MAX);
    assert!(credential.is_valid());
}

#[tokio::test]
async fn corrupt_store_falls_back_to_device_authorization() {
    let server = MockServer::start().await;
    mount_devicecode(&server, 300).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=dc-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "first-access",
            "refresh_token": "first-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=first-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "minted-access",
            "refresh_token": "minted-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("token.data"), "garbage bytes, not base64").unwrap();

    let credential = tokio::time::timeout(
        Duration::from_secs(30),
        manager(&server.uri(), dir.path()).get_token(),
    )
    .await
    .expect("device flow must not hang");

    assert_eq!(credential.access_token, "minted-access");
    assert_eq!(credential.refresh_token, "minted-refresh");
    assert!(credential.is_valid());
    assert_eq!(stored(dir.path()), credential);
    server.verify().await;
}

#[tokio::test]
async fn rejected_refresh_token_enters_device_flow_instead_of_retrying() {
    let server = MockServer::start().await;
    // The dead refresh token is rejected exactly once, never retried.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=dead-refresh"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_devicecode(&server, 300).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("device_code=dc-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "first-access",
            "refresh_token": "granted-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=granted-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "minted-access",
            "refresh_token": "minted-refresh",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        &Credential {
            access_token: "stale-access".into(),
            valid_until: 0,
            refresh_token: "dead-refresh".into(),
        },
    );

    let credential = tokio::time::timeout(
        Duration::from_secs(30),
        manager(&server.uri(), dir.path()).get_token(),
    )
    .await
    .expect("device flow must not hang");

    assert_eq!(credential.access_token, "minted-access");
    server.verify().await;
}

#[tokio::test]
async fn unconfirmed_device_code_expires_and_yields_empty_credential() {
    let server = MockServer::start().await;
    mount_devicecode(&server, 2).await;
    // The operator never confirms: the token endpoint keeps answering 400.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();

    let credential = tokio::time::timeout(
        Duration::from_secs(30),
        manager(&server.uri(), dir.path()).get_token(),
    )
    .await
    .expect("expired device code must terminate the flow");

    assert_eq!(credential, Credential::default());
    assert!(!credential.is_valid());
}

#[tokio::test]
async fn transport_failure_during_refresh_degrades_to_empty_credential() {
    // Unroutable authority: the refresh exchange fails at the transport layer.
    let dir = TempDir::new().unwrap();
    seed(
        dir.path(),
        &Credential {
            access_token: "stale-access".into(),
            valid_until: 0,
            refresh_token: "some-refresh".into(),
        },
    );

    let credential = manager("http://127.0.0.1:1", dir.path()).get_token().await;
    assert_eq!(credential, Credential::default());

    // The stale credential stays on disk for the next cycle's retry.
    assert_eq!(stored(dir.path()).refresh_token, "some-refresh");
}

#[tokio::test]
async fn shutdown_cancels_a_pending_device_code_wait() {
    let server = MockServer::start().await;
    mount_devicecode(&server, 300).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let manager = manager(&server.uri(), dir.path());
    let shutdown = manager.shutdown_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
    });

    let credential = tokio::time::timeout(Duration::from_secs(10), manager.get_token())
        .await
        .expect("cancellation must end the wait");
    assert_eq!(credential, Credential::default());
}
