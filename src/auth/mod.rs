//! Microsoft identity platform authentication.
//!
//! Provides the OAuth2 device-code and refresh-token grants, durable credential
//! persistence, and the token lifecycle manager that ties them together.

pub mod manager;
pub mod oauth;
pub mod store;

pub use manager::TokenManager;
pub use oauth::OAuth2Client;
pub use store::{Credential, TokenStore};
