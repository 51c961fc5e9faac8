//! Usage: Open the consent page in the user's default browser.

use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use std::process::Command;

/// Launch a browser at `url`. Success only means the launcher started; there is no feedback
/// about what the user does next.
pub trait BrowserStrategy: Send + Sync {
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// Picks the platform opener from the OS name detected at runtime.
#[derive(Debug, Clone, Copy)]
pub struct SystemBrowser {
    os: &'static str,
}

impl SystemBrowser {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS,
        }
    }

    pub fn for_os(os: &'static str) -> Self {
        Self { os }
    }

    pub(crate) fn command(&self, url: &str) -> AuthResult<Command> {
        let cmd = match self.os {
            "windows" => {
                // `explorer <url>` may open File Explorer instead of the browser.
                let mut cmd = Command::new("rundll32.exe");
                cmd.arg("url.dll,FileProtocolHandler").arg(url);
                cmd
            }
            "macos" => {
                let mut cmd = Command::new("open");
                cmd.arg(url);
                cmd
            }
            "linux" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => {
                let mut cmd = Command::new("xdg-open");
                cmd.arg(url);
                cmd
            }
            other => {
                return Err(AuthError::new(
                    ErrorCode::Browser,
                    format!("browser open is unsupported on this platform ({other})"),
                ))
            }
        };
        Ok(cmd)
    }
}

impl Default for SystemBrowser {
    fn default() -> Self {
        Self::detect()
    }
}

impl BrowserStrategy for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        let mut cmd = self.command(url)?;
        cmd.spawn().map_err(|e| {
            AuthError::new(ErrorCode::Browser, format!("failed to open browser: {e}"))
                .with_source(e)
        })?;
        Ok(())
    }
}
