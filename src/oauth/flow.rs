//! Usage: Token acquisition orchestration (cache, refresh, code acquisition, exchange, persist).

use crate::oauth::browser::BrowserStrategy;
use crate::oauth::code_source::{
    AcquiredCode, CodeInput, CodeSource, LoopbackCodeSource, OfflineCodeSource,
};
use crate::oauth::config::OAuthConfig;
use crate::oauth::token::Token;
use crate::oauth::token_exchange::{Exchanger, HttpExchanger};
use crate::oauth::token_store::{FsTokenStore, TokenStore};
use crate::settings::AuthSettings;
use crate::shared::blocking;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use crate::shared::security::mask_token;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to do when a token was obtained but could not be written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Fail the call so the on-disk cache stays authoritative.
    #[default]
    Strict,
    /// Log the failure and hand back the in-memory token.
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    NoToken,
    CachedValid,
    CachedExpired,
    AcquiringCode,
    Exchanging,
    Refreshing,
    Persisted,
    Failed,
}

fn enter(state: FlowState, path: &Path) {
    tracing::debug!(state = ?state, path = %path.display(), "oauth flow state");
}

pub struct AuthorizationFlow {
    store: Arc<dyn TokenStore>,
    exchanger: Arc<dyn Exchanger>,
    sources: Vec<Box<dyn CodeSource>>,
    persist_policy: PersistPolicy,
}

impl AuthorizationFlow {
    pub fn new(store: Arc<dyn TokenStore>, exchanger: Arc<dyn Exchanger>) -> Self {
        Self {
            store,
            exchanger,
            sources: Vec::new(),
            persist_policy: PersistPolicy::default(),
        }
    }

    /// Append a code source; sources are tried in the order they were added.
    pub fn with_source(mut self, source: impl CodeSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.persist_policy = policy;
        self
    }

    /// Standard wiring: file token store, HTTP exchanger, loopback source (when a browser is
    /// given and enabled) followed by the offline source.
    pub fn from_settings(
        settings: &AuthSettings,
        browser: Option<Arc<dyn BrowserStrategy>>,
        input: Arc<dyn CodeInput>,
    ) -> AuthResult<Self> {
        let exchanger = HttpExchanger::new(settings.exchange_timeout())?;
        let browser = browser.filter(|_| settings.open_browser);
        let loopback = LoopbackCodeSource::new(browser)
            .with_bind_addr(settings.callback_bind_addr()?)
            .with_timeout(settings.callback_timeout());

        Ok(Self::new(Arc::new(FsTokenStore), Arc::new(exchanger))
            .with_source(loopback)
            .with_source(OfflineCodeSource::new(input))
            .with_persist_policy(settings.persist_policy))
    }

    /// Return a usable token for `config`, using the cache at `store_path` when possible.
    pub async fn get_token(&self, config: &OAuthConfig, store_path: &Path) -> AuthResult<Token> {
        let result = self.run(config, store_path).await;
        if let Err(err) = &result {
            enter(FlowState::Failed, store_path);
            tracing::warn!(path = %store_path.display(), "oauth token acquisition failed: {}", err);
        }
        result
    }

    async fn run(&self, config: &OAuthConfig, store_path: &Path) -> AuthResult<Token> {
        let cached = match self.load(store_path).await {
            Ok(token) => Some(token),
            Err(err) if err.is_cache_miss() => {
                tracing::info!(path = %store_path.display(), "no usable cached token: {}", err);
                None
            }
            Err(err) => return Err(err),
        };

        let Some(cached) = cached else {
            enter(FlowState::NoToken, store_path);
            let acquired = self.acquire_code(config).await?;

            enter(FlowState::Exchanging, store_path);
            let token = self
                .exchanger
                .exchange_code(config, &acquired.code, &acquired.redirect_url)
                .await?;
            return self.persist(store_path, token).await;
        };

        if cached.is_valid() {
            enter(FlowState::CachedValid, store_path);
            return Ok(cached);
        }

        // A failed refresh is reported as-is; re-prompting the user here would hide it.
        enter(FlowState::CachedExpired, store_path);
        enter(FlowState::Refreshing, store_path);
        let refreshed = self.exchanger.refresh(config, &cached).await?;
        tracing::info!(
            access_token = %mask_token(&refreshed.access_token),
            expiry = ?refreshed.expiry,
            "oauth token refreshed"
        );
        self.persist(store_path, refreshed).await
    }

    /// Try each code source in order; the last failure is returned when all of them fail.
    pub async fn acquire_code(&self, config: &OAuthConfig) -> AuthResult<AcquiredCode> {
        let mut last_err =
            AuthError::new(ErrorCode::Config, "no authorization code source configured");
        for source in &self.sources {
            enter_acquiring(source.name());
            match source.acquire(config).await {
                Ok(acquired) => {
                    tracing::info!(source = source.name(), "authorization code acquired");
                    return Ok(acquired);
                }
                Err(err) => {
                    tracing::warn!(
                        source = source.name(),
                        "authorization code source failed: {}",
                        err
                    );
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn load(&self, path: &Path) -> AuthResult<Token> {
        let store = Arc::clone(&self.store);
        let path: PathBuf = path.to_path_buf();
        blocking::run("token_store_load", move || store.load(&path)).await
    }

    async fn persist(&self, path: &Path, token: Token) -> AuthResult<Token> {
        let store = Arc::clone(&self.store);
        let owned_path = path.to_path_buf();
        let to_save = token.clone();
        let saved =
            blocking::run("token_store_save", move || store.save(&owned_path, &to_save)).await;

        match (saved, self.persist_policy) {
            (Ok(()), _) => {
                enter(FlowState::Persisted, path);
                Ok(token)
            }
            (Err(err), PersistPolicy::BestEffort) => {
                tracing::warn!(
                    path = %path.display(),
                    "token obtained but not cached: {}",
                    err
                );
                Ok(token)
            }
            (Err(err), PersistPolicy::Strict) => Err(err),
        }
    }
}

fn enter_acquiring(source: &'static str) {
    tracing::debug!(state = ?FlowState::AcquiringCode, source, "oauth flow state");
}
