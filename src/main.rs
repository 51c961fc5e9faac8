//! Usage: Quickstart binary: obtain (or refresh) a token and print a masked summary.
//!
//! `uds-auth [settings.toml]` (default `uds-auth.toml` in the working directory).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use uds_auth::oauth::{credentials, AuthorizationFlow, StdinCodeInput, SystemBrowser};
use uds_auth::{mask_token, settings, AuthResult, Token};

const DEFAULT_SETTINGS_FILE: &str = "uds-auth.toml";

#[tokio::main]
async fn main() -> ExitCode {
    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    match run(&settings_path).await {
        Ok(token) => {
            println!("token_type: {}", token.token_type);
            println!("access_token: {}", mask_token(&token.access_token));
            match token.expiry {
                Some(expiry) => println!("expiry: {}", expiry.to_rfc3339()),
                None => println!("expiry: none"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("uds-auth: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings_path: &Path) -> AuthResult<Token> {
    let base = settings_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let loaded = settings::read(settings_path)?;
    let settings = loaded.settings.resolve_paths(base);
    let _log_guard = uds_auth::logging::init(&settings.logging)?;
    if loaded.repaired {
        tracing::warn!(
            path = %settings_path.display(),
            "settings contained out-of-range values; using sanitized values"
        );
    }

    tracing::info!(
        credentials = %settings.credentials_path.display(),
        token = %settings.token_path.display(),
        "starting token acquisition"
    );

    let config = credentials::load_credentials(&settings.credentials_path, &settings.scopes)?;
    let flow = AuthorizationFlow::from_settings(
        &settings,
        Some(Arc::new(SystemBrowser::detect())),
        Arc::new(StdinCodeInput),
    )?;
    flow.get_token(&config, &settings.token_path).await
}
