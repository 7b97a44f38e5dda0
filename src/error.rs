//! Error types for the presence bridge.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authentication-related errors.
///
/// All variants are recoverable: they degrade to "no valid token this cycle"
/// and are retried on the next poll tick. Nothing here terminates the process.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Device code request failed: {0}")]
    DeviceCodeRequestFailed(String),

    #[error("Device code expired before the operator confirmed")]
    DeviceCodeExpired,

    #[error("Refresh token rejected: HTTP {0}")]
    RefreshRejected(u16),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid authorization server response: {0}")]
    InvalidResponse(String),

    #[error("Authorization cancelled")]
    Cancelled,
}

/// Credential persistence errors.
///
/// Both variants are recoverable and signal the token manager to fall back
/// to full re-authorization rather than crash.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No persisted credential found")]
    NotFound,

    #[error("Persisted credential unreadable: {0}")]
    Corrupt(String),
}

/// Graph API errors for the presence fetch.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Presence request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse API response: {0}")]
    ParseFailed(String),

    #[error("Unauthorized (401): Token may be expired")]
    Unauthorized,

    #[error("Rate limited (429): Too many requests")]
    RateLimited,
}
