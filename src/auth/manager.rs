//! Token lifecycle management.
//!
//! The manager is the single owner of the in-memory credential. Given a request
//! for "a usable token" it performs whichever of load, validity check, refresh
//! exchange, or full device-code authorization are necessary, and returns either
//! a valid credential or an empty one the caller treats as "unknown presence".

use crate::auth::oauth::{DeviceCodePoll, OAuth2Client, TokenResponse};
use crate::auth::store::{Credential, TokenStore};
use crate::error::{AuthError, StorageError};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Device-code authorizations allowed per `get_token` call. A rejected refresh
/// after a fresh authorization means the registration is broken; retrying the
/// same flow in a loop would only spam the operator.
const MAX_REAUTH_ATTEMPTS: u32 = 1;

struct ManagerState {
    credential: Option<Credential>,
    /// The store is consulted once per process start; afterwards the
    /// in-memory credential is authoritative.
    loaded: bool,
}

/// Manages the credential lifecycle: load, validate, refresh, re-authorize.
pub struct TokenManager {
    oauth_client: OAuth2Client,
    store: TokenStore,
    /// One mutex guards the in-memory credential and the file together so two
    /// callers cannot both discover expiry and race duplicate refreshes (each
    /// refresh invalidates the sibling's refresh token server-side).
    state: Mutex<ManagerState>,
    shutdown: CancellationToken,
}

impl TokenManager {
    /// Create a new token manager.
    pub fn new(oauth_client: OAuth2Client, store: TokenStore) -> Self {
        Self {
            oauth_client,
            store,
            state: Mutex::new(ManagerState {
                credential: None,
                loaded: false,
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for interrupting a pending device-code wait on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Return a usable credential, or an empty one if none could be obtained
    /// this cycle.
    ///
    /// A still-valid credential is returned without any network call. An
    /// expired one is refreshed; a rejected refresh token falls back to the
    /// interactive device-code flow, which blocks this caller until the
    /// operator confirms or the device code expires. Transport failures
    /// degrade to an empty credential and are retried on the next tick.
    pub async fn get_token(&self) -> Credential {
        let mut state = self.state.lock().await;

        if !state.loaded {
            state.loaded = true;
            match self.store.load() {
                Ok(credential) => state.credential = Some(credential),
                Err(StorageError::NotFound) => {
                    info!("No persisted credential, authorization required");
                }
                Err(e) => {
                    warn!("Discarding persisted credential: {e}");
                }
            }
        }

        let mut reauth_attempts = 0;

        loop {
            let now = Utc::now().timestamp();
            let current = state.credential.clone().unwrap_or_default();

            if current.is_valid_at(now) {
                return current;
            }

            if !current.refresh_token.is_empty() {
                match self.oauth_client.refresh_token(&current.refresh_token).await {
                    Ok(response) => {
                        let credential = self.issue(response, &current.refresh_token, now);
                        state.credential = Some(credential.clone());
                        return credential;
                    }
                    Err(AuthError::RefreshRejected(status)) => {
                        warn!(
                            status,
                            "Refresh token rejected, falling back to device authorization"
                        );
                        state.credential = Some(Credential {
                            refresh_token: String::new(),
                            ..current
                        });
                        continue;
                    }
                    Err(e) => {
                        warn!("Token refresh failed: {e}");
                        return Credential::default();
                    }
                }
            }

            if reauth_attempts >= MAX_REAUTH_ATTEMPTS {
                warn!("Giving up on authorization for this cycle");
                return Credential::default();
            }
            reauth_attempts += 1;

            match self.authorize_device().await {
                Ok(refresh_token) => {
                    // Newly obtained refresh token; the next loop iteration
                    // mints an access token through the refresh path.
                    state.credential = Some(Credential {
                        refresh_token,
                        ..Credential::default()
                    });
                }
                Err(e) => {
                    warn!("Device authorization failed: {e}");
                    return Credential::default();
                }
            }
        }
    }

    /// Build and persist a credential from a successful token exchange.
    fn issue(&self, response: TokenResponse, prior_refresh: &str, now: i64) -> Credential {
        // Saturate so a nonsense server-supplied lifetime cannot wrap into an
        // instantly-expired (or never-expiring) credential.
        let lifetime = i64::try_from(response.expires_in).unwrap_or(i64::MAX);
        let credential = Credential {
            access_token: response.access_token,
            valid_until: now.saturating_add(lifetime),
            // The server may omit the rotated refresh token; keep the prior one.
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| prior_refresh.to_string()),
        };

        if !self.store.save(&credential) {
            error!("Failed to persist credential; it will not survive a restart");
        }

        info!("Access token issued, valid until {}", credential.valid_until);
        credential
    }

    /// Run one interactive device-code authorization to completion.
    ///
    /// Returns the refresh token issued once the operator confirms. The wait
    /// self-terminates at the session deadline and honors the shutdown token.
    async fn authorize_device(&self) -> Result<String, AuthError> {
        let session = self.oauth_client.start_device_authorization().await?;

        info!(
            "Operator action required: visit {} and enter the code {}",
            session.verification_uri, session.user_code
        );
        println!(
            "Please go to {} and enter the code {}",
            session.verification_uri, session.user_code
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(AuthError::Cancelled),
                _ = time::sleep(time::Duration::from_secs(session.interval_secs)) => {}
            }

            match self.oauth_client.poll_device_code(&session).await? {
                DeviceCodePoll::Authorized(response) => {
                    info!("Device authorization confirmed");
                    return response.refresh_token.ok_or_else(|| {
                        AuthError::InvalidResponse(
                            "Token response missing refresh_token".to_string(),
                        )
                    });
                }
                DeviceCodePoll::Pending => {
                    let remaining = (session.expires_at - Utc::now()).num_seconds();
                    info!("Waiting for operator confirmation ({remaining}s remaining)");
                }
                DeviceCodePoll::Expired => return Err(AuthError::DeviceCodeExpired),
            }
        }
    }
}
