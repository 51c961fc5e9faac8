//! Usage: OAuth2 token acquisition and caching for the UDS storage client.
//!
//! `oauth::AuthorizationFlow::get_token` returns a cached token when it is still valid,
//! refreshes an expired one, and otherwise runs the browser/loopback flow with an offline
//! paste-the-code fallback before exchanging and caching the result.

pub mod logging;
pub mod oauth;
pub mod settings;
mod shared;

pub use oauth::{AuthorizationFlow, OAuthConfig, Token};
pub use settings::AuthSettings;
pub use shared::error::{AuthError, AuthResult, ErrorCode};
pub use shared::security::mask_token;
