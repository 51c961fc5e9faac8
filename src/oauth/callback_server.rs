//! Usage: One-shot loopback HTTP listener that captures the authorization code from a redirect.

use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use crate::shared::single_shot::{single_shot, SingleShot};
use axum::extract::{RawQuery, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

pub const CALLBACK_PATH: &str = "/auth/callback/";

const FINISHED_HTML: &str = "\n<body>\nFinished\n</body>\n";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub struct CallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl CallbackListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_url(&self) -> String {
        loopback_redirect_url(self.port)
    }

    /// Start serving the callback path in background tasks.
    pub fn start(self) -> PendingCallback {
        let (delivery, receiver) = single_shot::<String>();
        let router = build_router(CallbackState { delivery });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = Vec::with_capacity(2);
        for listener in [self.listener_v4, self.listener_v6].into_iter().flatten() {
            tasks.push(spawn_server(listener, router.clone(), shutdown_rx.clone()));
        }

        tracing::debug!(port = self.port, listeners = tasks.len(), "oauth callback server started");
        PendingCallback {
            port: self.port,
            receiver,
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

pub fn loopback_redirect_url(port: u16) -> String {
    format!("http://localhost:{port}{CALLBACK_PATH}")
}

/// Bind the callback listener.
///
/// `None` or an IPv4 loopback address binds 127.0.0.1 and `::1` on the same port (OS-assigned
/// when the port is 0), since the `localhost` redirect may resolve to either. Any other address
/// is bound exactly as given.
pub async fn listen(bind_addr: Option<SocketAddr>) -> AuthResult<CallbackListener> {
    let bound = match bind_addr {
        None => bind_loopback(0).await,
        Some(addr) if addr.ip() == IpAddr::V4(Ipv4Addr::LOCALHOST) => {
            bind_loopback(addr.port()).await
        }
        Some(addr) => bind_exact(addr).await,
    };
    bound.map_err(|msg| {
        AuthError::new(ErrorCode::Bind, format!("oauth callback bind failed: {msg}"))
    })
}

fn bound_port(listener: &TcpListener) -> Result<u16, String> {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| format!("local_addr failed: {e}"))
}

async fn bind_exact(addr: SocketAddr) -> Result<CallbackListener, String> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("{addr} ({e})"))?;
    let port = bound_port(&listener)?;
    let (listener_v4, listener_v6) = match addr {
        SocketAddr::V4(_) => (Some(listener), None),
        SocketAddr::V6(_) => (None, Some(listener)),
    };
    Ok(CallbackListener {
        port,
        listener_v4,
        listener_v6,
    })
}

/// 127.0.0.1 decides the port and `::1` joins it when it can. A fixed port must be free on
/// 127.0.0.1; an ephemeral one may fall back to `::1` alone on hosts without IPv4 loopback.
async fn bind_loopback(port: u16) -> Result<CallbackListener, String> {
    let v4_error = match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
        Ok(listener) => {
            let port = bound_port(&listener)?;
            let listener_v6 = match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
                Ok(listener) => Some(listener),
                Err(err) => {
                    tracing::debug!(port, "oauth callback ::1 bind skipped: {}", err);
                    None
                }
            };
            return Ok(CallbackListener {
                port,
                listener_v4: Some(listener),
                listener_v6,
            });
        }
        Err(err) => format!("127.0.0.1:{port} ({err})"),
    };
    if port != 0 {
        return Err(v4_error);
    }

    let listener = TcpListener::bind((Ipv6Addr::LOCALHOST, 0))
        .await
        .map_err(|err| format!("{v4_error}; [::1]:0 ({err})"))?;
    Ok(CallbackListener {
        port: bound_port(&listener)?,
        listener_v4: None,
        listener_v6: Some(listener),
    })
}

#[derive(Clone)]
struct CallbackState {
    delivery: Arc<SingleShot<String>>,
}

fn build_router(state: CallbackState) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .route(CALLBACK_PATH.trim_end_matches('/'), get(handle_callback))
        .with_state(state)
}

async fn handle_callback(
    State(state): State<CallbackState>,
    RawQuery(query): RawQuery,
) -> Html<&'static str> {
    // The browser always gets the same page; success or failure is only reported to the waiter.
    if state.delivery.deliver(query.unwrap_or_default()) {
        tracing::debug!("oauth callback delivered");
    } else {
        tracing::debug!("oauth callback repeated; ignoring");
    }
    Html(FINISHED_HTML)
}

fn spawn_server(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let local_addr = listener.local_addr().ok();
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            // Dropping the sender also counts as a shutdown request.
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = serve.await {
            tracing::warn!(local_addr = ?local_addr, "oauth callback server closed: {}", err);
        }
    })
}

/// A running callback server waiting for its first request.
///
/// Dropping it without calling [`PendingCallback::wait`] stops the server.
#[derive(Debug)]
pub struct PendingCallback {
    port: u16,
    receiver: oneshot::Receiver<String>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl PendingCallback {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until the first callback request arrives (or `timeout` elapses), stop the server,
    /// and return the authorization code carried in its query string.
    pub async fn wait(self, timeout: Option<Duration>) -> AuthResult<String> {
        let PendingCallback {
            port,
            receiver,
            shutdown,
            tasks,
        } = self;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(received) => received,
                Err(_) => {
                    shutdown_server(port, shutdown, tasks).await;
                    return Err(AuthError::new(
                        ErrorCode::Timeout,
                        format!("oauth callback timed out after {limit:?}"),
                    ));
                }
            },
            None => receiver.await,
        };

        shutdown_server(port, shutdown, tasks).await;

        let raw_query = received.map_err(|_| {
            AuthError::new(
                ErrorCode::Io,
                "oauth callback server stopped before a request arrived",
            )
        })?;
        parse_callback_query(&raw_query)
    }
}

async fn shutdown_server(port: u16, shutdown: watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) {
    let _ = shutdown.send(true);
    for task in tasks {
        let abort = task.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(port, "oauth callback server shutdown: {}", err);
            }
            Err(_) => {
                tracing::warn!(port, "oauth callback server shutdown timed out; aborting");
                abort.abort();
            }
        }
    }
}

/// Extract `code` from a raw callback query string.
pub fn parse_callback_query(raw_query: &str) -> AuthResult<String> {
    let invalid = || {
        AuthError::new(
            ErrorCode::Protocol,
            format!("invalid callback params {raw_query}"),
        )
    };

    if !is_well_formed_query(raw_query) {
        return Err(invalid());
    }

    url::form_urlencoded::parse(raw_query.as_bytes())
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(invalid)
}

fn is_well_formed_query(raw_query: &str) -> bool {
    if raw_query.contains(';') {
        return false;
    }
    let bytes = raw_query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid_escape = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid_escape {
                return false;
            }
            i += 3;
            continue;
        }
        i += 1;
    }
    true
}
