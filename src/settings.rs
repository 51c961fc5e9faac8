//! Usage: Settings file schema (TOML) + read/sanitize helpers.

use crate::oauth::config::DRIVE_SCOPE;
use crate::oauth::flow::PersistPolicy;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CALLBACK_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_EXCHANGE_TIMEOUT_SECONDS: u64 = 30;
const MAX_CALLBACK_TIMEOUT_SECONDS: u64 = 60 * 60;
const MAX_EXCHANGE_TIMEOUT_SECONDS: u64 = 10 * 60;
const DEFAULT_CALLBACK_BIND_HOST: &str = "127.0.0.1";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub scopes: Vec<String>,
    pub callback_bind_host: String,
    // 0 = OS-assigned port.
    pub callback_port: u16,
    // 0 disables the deadline.
    pub callback_timeout_seconds: u64,
    pub exchange_timeout_seconds: u64,
    pub open_browser: bool,
    pub persist_policy: PersistPolicy,
    pub logging: LoggingSettings,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            scopes: vec![DRIVE_SCOPE.to_string()],
            callback_bind_host: DEFAULT_CALLBACK_BIND_HOST.to_string(),
            callback_port: 0,
            callback_timeout_seconds: DEFAULT_CALLBACK_TIMEOUT_SECONDS,
            exchange_timeout_seconds: DEFAULT_EXCHANGE_TIMEOUT_SECONDS,
            open_browser: true,
            persist_policy: PersistPolicy::Strict,
            logging: LoggingSettings::default(),
        }
    }
}

impl AuthSettings {
    pub fn callback_timeout(&self) -> Option<Duration> {
        (self.callback_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.callback_timeout_seconds))
    }

    pub fn exchange_timeout(&self) -> Option<Duration> {
        (self.exchange_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.exchange_timeout_seconds))
    }

    /// `None` for the default loopback host with an ephemeral port. A 127.0.0.1 address with a
    /// fixed port is still bound on both 127.0.0.1 and ::1 by the callback server.
    pub fn callback_bind_addr(&self) -> AuthResult<Option<SocketAddr>> {
        let host = self.callback_bind_host.trim();
        if host == DEFAULT_CALLBACK_BIND_HOST && self.callback_port == 0 {
            return Ok(None);
        }
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let ip: IpAddr = host.parse().map_err(|_| {
            AuthError::new(
                ErrorCode::Config,
                format!("callback_bind_host must be an IP address, got {host:?}"),
            )
        })?;
        Ok(Some(SocketAddr::new(ip, self.callback_port)))
    }

    /// Resolve relative paths against `base` (normally the settings file's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.credentials_path.is_relative() {
            self.credentials_path = base.join(&self.credentials_path);
        }
        if self.token_path.is_relative() {
            self.token_path = base.join(&self.token_path);
        }
        self
    }
}

fn sanitize(settings: &mut AuthSettings) -> bool {
    let mut repaired = false;

    if settings.callback_timeout_seconds > MAX_CALLBACK_TIMEOUT_SECONDS {
        settings.callback_timeout_seconds = MAX_CALLBACK_TIMEOUT_SECONDS;
        repaired = true;
    }
    if settings.exchange_timeout_seconds > MAX_EXCHANGE_TIMEOUT_SECONDS {
        settings.exchange_timeout_seconds = MAX_EXCHANGE_TIMEOUT_SECONDS;
        repaired = true;
    }

    let before = settings.scopes.len();
    settings.scopes.retain(|s| !s.trim().is_empty());
    if settings.scopes.len() != before {
        repaired = true;
    }
    if settings.scopes.is_empty() {
        settings.scopes = vec![DRIVE_SCOPE.to_string()];
        repaired = true;
    }

    if settings.callback_bind_host.trim().is_empty() {
        settings.callback_bind_host = DEFAULT_CALLBACK_BIND_HOST.to_string();
        repaired = true;
    }
    if settings.logging.level.trim().is_empty() {
        settings.logging.level = DEFAULT_LOG_LEVEL.to_string();
        repaired = true;
    }

    repaired
}

/// Settings as read from disk, plus whether out-of-range values had to be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSettings {
    pub settings: AuthSettings,
    pub repaired: bool,
}

/// Parse and sanitize. Nothing is logged here; callers report `repaired` once logging is up.
pub fn parse(content: &str) -> AuthResult<LoadedSettings> {
    let mut settings: AuthSettings = toml::from_str(content).map_err(|e| {
        AuthError::new(ErrorCode::Config, format!("invalid settings file: {e}")).with_source(e)
    })?;
    let repaired = sanitize(&mut settings);
    Ok(LoadedSettings { settings, repaired })
}

/// Read settings from `path`. A missing file yields defaults.
pub fn read(path: &Path) -> AuthResult<LoadedSettings> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse(&content),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LoadedSettings {
            settings: AuthSettings::default(),
            repaired: false,
        }),
        Err(err) => Err(AuthError::new(
            ErrorCode::Config,
            format!("failed to read settings {}: {err}", path.display()),
        )
        .with_source(err)),
    }
}
