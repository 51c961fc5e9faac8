//! Usage: tracing subscriber setup (stderr + optional daily-rolling log file).

use crate::settings::LoggingSettings;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "uds-auth.log";

/// Install the global subscriber. Keep the returned guard alive for the life of the process,
/// otherwise buffered file output is lost. A second call leaves the first subscriber in place.
pub fn init(settings: &LoggingSettings) -> AuthResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.level.trim()))
        .map_err(|e| {
            AuthError::new(
                ErrorCode::Config,
                format!("invalid log filter {:?}: {e}", settings.level),
            )
        })?;

    let (file_layer, guard) = match settings.log_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                AuthError::new(
                    ErrorCode::Io,
                    format!("failed to create log dir {}: {e}", dir.display()),
                )
                .with_source(e)
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        return Ok(None);
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let settings = LoggingSettings::default();
        let _first = init(&settings).expect("first init");
        let second = init(&settings).expect("second init");
        assert!(second.is_none());
    }
}
