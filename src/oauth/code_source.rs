//! Usage: Authorization-code acquisition strategies (loopback browser redirect, offline paste).

use crate::oauth::browser::BrowserStrategy;
use crate::oauth::callback_server;
use crate::oauth::config::{OAuthConfig, OOB_REDIRECT_URL};
use crate::shared::blocking;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use rand::RngCore;
use std::future::Future;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A code plus the redirect URL it was issued for; the token endpoint checks they match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredCode {
    pub code: String,
    pub redirect_url: String,
}

pub type AcquireFuture<'a> = Pin<Box<dyn Future<Output = AuthResult<AcquiredCode>> + Send + 'a>>;

/// One way of obtaining an authorization code. The flow tries its sources in order.
pub trait CodeSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn acquire<'a>(&'a self, config: &'a OAuthConfig) -> AcquireFuture<'a>;
}

pub(crate) fn new_state() -> String {
    use rand::rngs::OsRng;
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Opens the consent page in a browser and captures the redirect on a loopback listener.
pub struct LoopbackCodeSource {
    browser: Option<Arc<dyn BrowserStrategy>>,
    bind_addr: Option<SocketAddr>,
    timeout: Option<Duration>,
}

impl LoopbackCodeSource {
    pub fn new(browser: Option<Arc<dyn BrowserStrategy>>) -> Self {
        Self {
            browser,
            bind_addr: None,
            timeout: None,
        }
    }

    pub fn with_bind_addr(mut self, bind_addr: Option<SocketAddr>) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CodeSource for LoopbackCodeSource {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn acquire<'a>(&'a self, config: &'a OAuthConfig) -> AcquireFuture<'a> {
        Box::pin(async move {
            let browser = self.browser.as_ref().ok_or_else(|| {
                AuthError::new(ErrorCode::Browser, "no browser strategy configured")
            })?;

            let listener = callback_server::listen(self.bind_addr).await?;
            let redirect_url = listener.redirect_url();
            let auth_url = config.authorize_url(&redirect_url, &new_state());
            let pending = listener.start();

            // Dropping `pending` on this error path stops the server.
            browser.open(&auth_url)?;
            tracing::info!(
                port = pending.port(),
                "waiting for the browser to deliver the authorization code"
            );

            let code = pending.wait(self.timeout).await?;
            Ok(AcquiredCode { code, redirect_url })
        })
    }
}

/// Source of a manually pasted authorization code.
pub trait CodeInput: Send + Sync {
    /// Show the consent URL to the user.
    fn prompt(&self, auth_url: &str) -> AuthResult<()>;

    /// Block until the user supplies a code.
    fn read_code(&self) -> AuthResult<String>;
}

/// Prints the prompt to stdout and reads the code from a line of stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinCodeInput;

impl CodeInput for StdinCodeInput {
    fn prompt(&self, auth_url: &str) -> AuthResult<()> {
        let mut out = std::io::stdout().lock();
        write!(
            out,
            "Go to the following link in your browser then type the authorization code: \n\
             {auth_url}\n\n>>"
        )
        .and_then(|_| out.flush())
        .map_err(|e| {
            AuthError::new(ErrorCode::UserInput, format!("failed to print prompt: {e}"))
                .with_source(e)
        })
    }

    fn read_code(&self) -> AuthResult<String> {
        read_code_line(&mut std::io::stdin().lock())
    }
}

pub(crate) fn read_code_line(reader: &mut impl BufRead) -> AuthResult<String> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| {
        AuthError::new(
            ErrorCode::UserInput,
            format!("failed to read authorization code: {e}"),
        )
        .with_source(e)
    })?;
    if read == 0 {
        return Err(AuthError::new(
            ErrorCode::UserInput,
            "no authorization code entered (end of input)",
        ));
    }
    line.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| AuthError::new(ErrorCode::UserInput, "empty authorization code"))
}

/// Out-of-band fallback: the provider shows the code and the user pastes it.
pub struct OfflineCodeSource {
    input: Arc<dyn CodeInput>,
}

impl OfflineCodeSource {
    pub fn new(input: Arc<dyn CodeInput>) -> Self {
        Self { input }
    }
}

impl CodeSource for OfflineCodeSource {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn acquire<'a>(&'a self, config: &'a OAuthConfig) -> AcquireFuture<'a> {
        Box::pin(async move {
            let auth_url = config.authorize_url(OOB_REDIRECT_URL, &new_state());
            let input = Arc::clone(&self.input);
            let code = blocking::run("offline_code_input", move || {
                input.prompt(&auth_url)?;
                input.read_code()
            })
            .await?;
            Ok(AcquiredCode {
                code,
                redirect_url: OOB_REDIRECT_URL.to_string(),
            })
        })
    }
}
