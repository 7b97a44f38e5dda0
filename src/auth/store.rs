//! Durable persistence for the current credential triple.
//!
//! The store is a pure serialize/deserialize boundary invoked only by the
//! token manager: a single opaque file holding the base64-encoded JSON of the
//! credential. Missing or undecodable data is recoverable and signals full
//! re-authorization, never a crash.

use crate::error::StorageError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Default credential file, relative to the working directory.
pub const TOKEN_FILE: &str = "token.data";

/// The local record of an issued token: access token, expiry, refresh token.
///
/// Mutated only by whole replacement on each refresh cycle. A credential with
/// an empty access token is never considered valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Absolute Unix timestamp (seconds) after which the access token is stale.
    pub valid_until: i64,
    pub refresh_token: String,
}

impl Credential {
    /// Whether the access token is usable at the given Unix timestamp.
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && self.valid_until >= now
    }

    /// Whether the access token is usable right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp())
    }
}

/// File-backed credential store.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and decode the persisted credential.
    pub fn load(&self) -> Result<Credential, StorageError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound,
            _ => StorageError::Corrupt(e.to_string()),
        })?;

        let bytes = BASE64
            .decode(raw.trim())
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let credential: Credential =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        debug!(path = %self.path.display(), "Loaded persisted credential");
        Ok(credential)
    }

    /// Serialize and atomically write the credential, overwriting prior state.
    ///
    /// Returns `false` on any I/O or encode failure.
    pub fn save(&self, credential: &Credential) -> bool {
        match self.write_atomic(credential) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Persisted credential");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to persist credential: {e}");
                false
            }
        }
    }

    // Write to a sibling temp file, then rename over the target so a crash
    // mid-write cannot truncate the previous credential.
    fn write_atomic(&self, credential: &Credential) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(credential)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let encoded = BASE64.encode(bytes);

        let mut tmp: OsString = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
