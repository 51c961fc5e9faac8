#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Json, Router};
use chrono::Utc;
use tokio::sync::oneshot;
use uds_auth::oauth::code_source::AcquireFuture;
use uds_auth::oauth::token_exchange::ExchangeFuture;
use uds_auth::oauth::{
    AcquiredCode, BrowserStrategy, CodeInput, CodeSource, Exchanger, OAuthConfig, Token,
};
use uds_auth::{AuthError, AuthResult, ErrorCode};

pub fn config() -> OAuthConfig {
    OAuthConfig {
        client_id: "client-1".to_string(),
        client_secret: "secret-2".to_string(),
        auth_url: "https://accounts.example.com/o/oauth2/auth".to_string(),
        token_url: "https://oauth2.example.com/token".to_string(),
        redirect_url: "localhost-3".to_string(),
        scopes: vec![uds_auth::oauth::DRIVE_SCOPE.to_string()],
    }
}

pub fn token_expiring_in(seconds: i64) -> Token {
    Token {
        access_token: "token1234".to_string(),
        token_type: "type123".to_string(),
        refresh_token: Some("refresh123".to_string()),
        expiry: Some(Utc::now() + chrono::Duration::seconds(seconds)),
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client")
}

type ExchangeFn = dyn Fn(&str, &str) -> AuthResult<Token> + Send + Sync;
type RefreshFn = dyn Fn(&Token) -> AuthResult<Token> + Send + Sync;

pub struct FakeExchanger {
    exchange: Box<ExchangeFn>,
    refresh: Box<RefreshFn>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub seen: Mutex<Vec<(String, String)>>,
}

impl FakeExchanger {
    pub fn new(
        exchange: impl Fn(&str, &str) -> AuthResult<Token> + Send + Sync + 'static,
        refresh: impl Fn(&Token) -> AuthResult<Token> + Send + Sync + 'static,
    ) -> Self {
        Self {
            exchange: Box::new(exchange),
            refresh: Box::new(refresh),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Issues `token` for any code; refreshing is an error.
    pub fn issuing(token: Token) -> Self {
        Self::new(
            move |_, _| Ok(token.clone()),
            |_| Err(AuthError::new(ErrorCode::Exchange, "refresh not expected")),
        )
    }

    pub fn exchange_count(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// (code, redirect_url) pairs passed to `exchange_code`.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Exchanger for FakeExchanger {
    fn exchange_code<'a>(
        &'a self,
        _config: &'a OAuthConfig,
        code: &'a str,
        redirect_url: &'a str,
    ) -> ExchangeFuture<'a> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .expect("seen lock")
            .push((code.to_string(), redirect_url.to_string()));
        let result = (self.exchange)(code, redirect_url);
        Box::pin(async move { result })
    }

    fn refresh<'a>(&'a self, _config: &'a OAuthConfig, token: &'a Token) -> ExchangeFuture<'a> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.refresh)(token);
        Box::pin(async move { result })
    }
}

pub struct FakeCodeSource {
    result: AuthResult<AcquiredCode>,
    calls: Arc<AtomicUsize>,
}

impl FakeCodeSource {
    pub fn returning(code: &str) -> (Self, Arc<AtomicUsize>) {
        Self::with_result(Ok(AcquiredCode {
            code: code.to_string(),
            redirect_url: "http://localhost:9/auth/callback/".to_string(),
        }))
    }

    pub fn failing(code: ErrorCode, message: &str) -> (Self, Arc<AtomicUsize>) {
        Self::with_result(Err(AuthError::new(code, message)))
    }

    fn with_result(result: AuthResult<AcquiredCode>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                result,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl CodeSource for FakeCodeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn acquire<'a>(&'a self, _config: &'a OAuthConfig) -> AcquireFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.result.clone();
        Box::pin(async move { result })
    }
}

/// Offline input that replays a fixed answer and records the prompts it was shown.
pub struct ScriptedInput {
    answer: AuthResult<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedInput {
    pub fn answering(code: &str) -> Self {
        Self {
            answer: Ok(code.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Err(AuthError::new(ErrorCode::UserInput, "error-1234")),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

impl CodeInput for ScriptedInput {
    fn prompt(&self, auth_url: &str) -> AuthResult<()> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(auth_url.to_string());
        Ok(())
    }

    fn read_code(&self) -> AuthResult<String> {
        self.answer.clone()
    }
}

pub struct FailingBrowser;

impl BrowserStrategy for FailingBrowser {
    fn open(&self, _url: &str) -> AuthResult<()> {
        Err(AuthError::new(ErrorCode::Browser, "failed to open browser: no display"))
    }
}

/// Plays the user at the consent page: follows `redirect_uri` from the authorize URL with
/// the configured query parameters appended after `state`.
pub struct RedirectingBrowser {
    params: Vec<(&'static str, String)>,
    pub opened: Mutex<Vec<String>>,
}

impl RedirectingBrowser {
    pub fn with_code(code: &str) -> Self {
        Self::with_params(vec![("code", code.to_string())])
    }

    /// The user declined; the provider redirects with `error=` and no code.
    pub fn denying(error: &str) -> Self {
        Self::with_params(vec![("error", error.to_string())])
    }

    fn with_params(params: Vec<(&'static str, String)>) -> Self {
        Self {
            params,
            opened: Mutex::new(Vec::new()),
        }
    }
}

impl BrowserStrategy for RedirectingBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        self.opened.lock().expect("opened lock").push(url.to_string());
        let parsed = url::Url::parse(url).expect("authorize url");
        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };
        let redirect = param("redirect_uri").replace("localhost", "127.0.0.1");
        let mut callback = url::Url::parse(&redirect).expect("redirect uri");
        {
            let mut query = callback.query_pairs_mut();
            query.append_pair("state", &param("state"));
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }

        tokio::spawn(async move {
            let _ = http_client().get(callback).send().await;
        });
        Ok(())
    }
}

/// Reports success but never reaches the callback, like a tab the user abandoned.
#[derive(Default)]
pub struct SilentBrowser {
    pub opened: Mutex<Vec<String>>,
}

impl BrowserStrategy for SilentBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        self.opened.lock().expect("opened lock").push(url.to_string());
        Ok(())
    }
}

#[derive(Clone)]
struct ProviderState {
    status: StatusCode,
    body: serde_json::Value,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn token_endpoint(
    State(state): State<ProviderState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.requests.lock().expect("requests lock").push(form);
    (state.status, Json(state.body.clone()))
}

/// Local stand-in for the provider's token endpoint.
pub struct MockProvider {
    pub token_url: String,
    requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
    _shutdown: oneshot::Sender<()>,
}

impl MockProvider {
    pub async fn spawn(status: StatusCode, body: serde_json::Value) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ProviderState {
            status,
            body,
            requests: Arc::clone(&requests),
        };
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind provider");
        let addr = listener.local_addr().expect("provider addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            token_url: format!("http://{addr}/token"),
            requests,
            _shutdown: shutdown_tx,
        }
    }

    pub fn requests(&self) -> Vec<HashMap<String, String>> {
        self.requests.lock().expect("requests lock").clone()
    }
}
