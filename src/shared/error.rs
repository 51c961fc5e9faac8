//! Usage: Unified error model for token acquisition (renders as `CODE: message`).

use std::fmt;
use std::sync::Arc;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Io,
    NotFound,
    Decode,
    Bind,
    Protocol,
    UserInput,
    Exchange,
    Browser,
    Timeout,
    Config,
    TaskJoin,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Io => "IO_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Decode => "DECODE_ERROR",
            ErrorCode::Bind => "BIND_ERROR",
            ErrorCode::Protocol => "PROTOCOL_ERROR",
            ErrorCode::UserInput => "USER_INPUT_ERROR",
            ErrorCode::Exchange => "EXCHANGE_ERROR",
            ErrorCode::Browser => "BROWSER_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Config => "CONFIG_ERROR",
            ErrorCode::TaskJoin => "TASK_JOIN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AuthError {
    code: ErrorCode,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// A missing or unreadable token record means "acquire a new one", not "give up".
    pub fn is_cache_miss(&self) -> bool {
        matches!(self.code, ErrorCode::NotFound | ErrorCode::Decode)
    }

    pub(crate) fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        let code = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorCode::NotFound
        } else {
            ErrorCode::Io
        };
        AuthError::new(code, format!("{context}: {err}")).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_code_and_message() {
        let err = AuthError::new(ErrorCode::Protocol, "invalid callback params ");
        assert_eq!(err.to_string(), "PROTOCOL_ERROR: invalid callback params ");
    }

    #[test]
    fn io_not_found_maps_to_cache_miss() {
        let err = AuthError::io(
            "failed to open token.json",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.is_cache_miss());

        let err = AuthError::io(
            "failed to open token.json",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.code(), ErrorCode::Io);
        assert!(!err.is_cache_miss());
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;
        let err = AuthError::new(ErrorCode::Io, "write failed")
            .with_source(std::io::Error::other("disk full"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
    }
}
