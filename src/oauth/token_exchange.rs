//! Usage: OAuth token endpoint calls (authorization_code + refresh_token grants).

use crate::oauth::config::OAuthConfig;
use crate::oauth::token::Token;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use crate::shared::security::sanitize_body_snippet;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = AuthResult<Token>> + Send + 'a>>;

/// Trades an authorization code, or the refresh token inside an expired token, for a new token.
pub trait Exchanger: Send + Sync {
    fn exchange_code<'a>(
        &'a self,
        config: &'a OAuthConfig,
        code: &'a str,
        redirect_url: &'a str,
    ) -> ExchangeFuture<'a>;

    fn refresh<'a>(&'a self, config: &'a OAuthConfig, token: &'a Token) -> ExchangeFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct TokenExchangeRequest {
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct TokenRefreshRequest {
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub refresh_token: String,
}

/// Exchanger backed by the provider's token endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpExchanger {
    client: reqwest::Client,
}

impl HttpExchanger {
    /// `timeout` bounds each token endpoint call; `None` waits as long as the provider takes.
    pub fn new(timeout: Option<Duration>) -> AuthResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(format!(
            "uds-auth/{}",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            AuthError::new(
                ErrorCode::Config,
                format!("oauth http client init failed: {e}"),
            )
            .with_source(e)
        })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn non_empty_secret(secret: &str) -> Option<String> {
    let secret = secret.trim();
    (!secret.is_empty()).then(|| secret.to_string())
}

impl Exchanger for HttpExchanger {
    fn exchange_code<'a>(
        &'a self,
        config: &'a OAuthConfig,
        code: &'a str,
        redirect_url: &'a str,
    ) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let request = TokenExchangeRequest {
                token_uri: config.token_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: non_empty_secret(&config.client_secret),
                code: code.to_string(),
                redirect_uri: redirect_url.to_string(),
            };
            exchange_authorization_code(&self.client, &request).await
        })
    }

    fn refresh<'a>(&'a self, config: &'a OAuthConfig, token: &'a Token) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let refresh_token = token
                .refresh_token
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    AuthError::new(
                        ErrorCode::Exchange,
                        "token expired and refresh token is not set",
                    )
                })?;

            let request = TokenRefreshRequest {
                token_uri: config.token_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: non_empty_secret(&config.client_secret),
                refresh_token: refresh_token.to_string(),
            };
            let mut refreshed = refresh_access_token(&self.client, &request).await?;
            if refreshed.refresh_token.is_none() {
                refreshed.refresh_token = Some(refresh_token.to_string());
            }
            Ok(refreshed)
        })
    }
}

pub async fn exchange_authorization_code(
    client: &reqwest::Client,
    req: &TokenExchangeRequest,
) -> AuthResult<Token> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "authorization_code".to_string());
    form.insert("code", req.code.trim().to_string());
    if !req.redirect_uri.trim().is_empty() {
        form.insert("redirect_uri", req.redirect_uri.trim().to_string());
    }
    form.insert("client_id", req.client_id.trim().to_string());
    if let Some(secret) = req.client_secret.as_deref() {
        form.insert("client_secret", secret.to_string());
    }

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AuthError::new(
                ErrorCode::Exchange,
                format!("oauth token exchange request failed: {e}"),
            )
            .with_source(e)
        })?;

    parse_token_response(response).await
}

pub async fn refresh_access_token(
    client: &reqwest::Client,
    req: &TokenRefreshRequest,
) -> AuthResult<Token> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "refresh_token".to_string());
    form.insert("refresh_token", req.refresh_token.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());
    if let Some(secret) = req.client_secret.as_deref() {
        form.insert("client_secret", secret.to_string());
    }

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AuthError::new(
                ErrorCode::Exchange,
                format!("oauth refresh request failed: {e}"),
            )
            .with_source(e)
        })?;

    parse_token_response(response).await
}

async fn parse_token_response(response: reqwest::Response) -> AuthResult<Token> {
    let status = response.status();
    let is_form = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .is_some_and(|v| {
            v.starts_with("application/x-www-form-urlencoded") || v.starts_with("text/plain")
        });
    let body = response.text().await.map_err(|e| {
        AuthError::new(
            ErrorCode::Exchange,
            format!("oauth token response read failed: {e}"),
        )
        .with_source(e)
    })?;

    if !status.is_success() {
        return Err(provider_rejection(status.as_u16(), &body));
    }

    let value = if is_form {
        form_body_to_json(&body)
    } else {
        serde_json::from_str::<Value>(&body).map_err(|e| {
            AuthError::new(
                ErrorCode::Exchange,
                format!("oauth token response json invalid: {e}"),
            )
            .with_source(e)
        })?
    };

    token_from_response(&value, Utc::now())
}

fn form_body_to_json(body: &str) -> Value {
    let map: Map<String, Value> = url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    Value::Object(map)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub(crate) fn token_from_response(value: &Value, now: DateTime<Utc>) -> AuthResult<Token> {
    // Some providers answer 200 with an error document.
    if let Some(code) = string_field(value, "error") {
        if string_field(value, "access_token").is_none() {
            return Err(AuthError::new(
                ErrorCode::Exchange,
                format!("oauth token endpoint returned error={code}"),
            ));
        }
    }

    let access_token = string_field(value, "access_token").ok_or_else(|| {
        AuthError::new(
            ErrorCode::Exchange,
            "oauth token response missing access_token",
        )
    })?;

    let expires_in = value.get("expires_in").and_then(parse_i64_lossy);
    let expiry = expires_in
        .filter(|v| *v > 0)
        .and_then(ChronoDuration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime));

    Ok(Token {
        access_token,
        token_type: string_field(value, "token_type").unwrap_or_default(),
        refresh_token: string_field(value, "refresh_token"),
        expiry,
    })
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn provider_rejection(status: u16, body: &str) -> AuthError {
    let (error_code, error_message) = parse_oauth_error_details(body);
    let mut msg = format!("oauth token endpoint returned status={status}");
    if let Some(code) = error_code {
        msg.push_str(" code=");
        msg.push_str(code.as_str());
    }
    if let Some(detail) = error_message {
        msg.push_str(" message=");
        msg.push_str(detail.chars().take(240).collect::<String>().as_str());
    }
    msg.push_str(" body=");
    msg.push_str(sanitize_body_snippet(body).as_str());
    AuthError::new(ErrorCode::Exchange, msg)
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => form_body_to_json(body),
    };

    let mut code = string_field(&value, "error");
    let mut message = string_field(&value, "error_description");

    if let Some(err_obj) = value.get("error").and_then(Value::as_object) {
        if code.is_none() {
            code = err_obj
                .get("status")
                .or_else(|| err_obj.get("code"))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|v| !v.is_empty());
        }
        if message.is_none() {
            message = err_obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
    }

    (code, message)
}
