//! Usage: Run blocking work (stdin, file IO) on the tokio blocking pool with a stable label.

use crate::shared::error::{AuthError, AuthResult, ErrorCode};

pub async fn run<T>(
    label: &'static str,
    f: impl FnOnce() -> AuthResult<T> + Send + 'static,
) -> AuthResult<T>
where
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(join_err) => {
            // Panic payloads may hold a pasted code; only the label is reported.
            if join_err.is_panic() {
                tracing::error!(label, "blocking task panicked");
                return Err(AuthError::new(
                    ErrorCode::TaskJoin,
                    format!("{label}: task panicked"),
                ));
            }

            tracing::warn!(label, "blocking task cancelled");
            Err(AuthError::new(
                ErrorCode::TaskJoin,
                format!("{label}: task cancelled"),
            ))
        }
    }
}
