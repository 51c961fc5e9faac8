//! Usage: Parse the provider's client credential document (installed/web app JSON).

use crate::oauth::config::OAuthConfig;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CredentialFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    auth_uri: String,
    #[serde(default)]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

pub fn read_credentials(bytes: &[u8], scopes: &[String]) -> AuthResult<OAuthConfig> {
    let file: CredentialFile = serde_json::from_slice(bytes).map_err(|e| {
        AuthError::new(
            ErrorCode::Decode,
            format!("invalid credentials document: {e}"),
        )
        .with_source(e)
    })?;

    let section = file.installed.or(file.web).ok_or_else(|| {
        AuthError::new(
            ErrorCode::Decode,
            "credentials document has neither an `installed` nor a `web` client",
        )
    })?;

    if section.client_id.trim().is_empty() {
        return Err(AuthError::new(
            ErrorCode::Decode,
            "credentials document is missing client_id",
        ));
    }

    Ok(OAuthConfig {
        client_id: section.client_id.trim().to_string(),
        client_secret: section.client_secret.trim().to_string(),
        auth_url: section.auth_uri.trim().to_string(),
        token_url: section.token_uri.trim().to_string(),
        redirect_url: section
            .redirect_uris
            .first()
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        scopes: scopes.to_vec(),
    })
}

pub fn load_credentials(path: &Path, scopes: &[String]) -> AuthResult<OAuthConfig> {
    let bytes = std::fs::read(path)
        .map_err(|e| AuthError::io(format!("failed to read {}", path.display()), e))?;
    read_credentials(&bytes, scopes)
}
