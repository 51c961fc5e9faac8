//! Usage: Token cache persistence (JSON file on disk, or an in-memory file map for tests).

use crate::oauth::token::Token;
use crate::shared::error::{AuthError, AuthResult, ErrorCode};
use crate::shared::mutex_ext::MutexExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Load/save a token record at a path on some file system.
///
/// `load` fails with `NOT_FOUND` when nothing is stored at `path` and `DECODE_ERROR` when the
/// stored bytes are not a token record; both mean "acquire a new token". `save` replaces
/// whatever is at `path` (last write wins) and does not create parent directories.
pub trait TokenStore: Send + Sync {
    fn load(&self, path: &Path) -> AuthResult<Token>;
    fn save(&self, path: &Path, token: &Token) -> AuthResult<()>;
}

fn decode_token(path: &Path, bytes: &[u8]) -> AuthResult<Token> {
    serde_json::from_slice::<Token>(bytes).map_err(|e| {
        AuthError::new(
            ErrorCode::Decode,
            format!("invalid token record {}: {e}", path.display()),
        )
        .with_source(e)
    })
}

fn encode_token(path: &Path, token: &Token) -> AuthResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec(token).map_err(|e| {
        AuthError::new(
            ErrorCode::Io,
            format!("failed to encode token record {}: {e}", path.display()),
        )
        .with_source(e)
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsTokenStore;

impl FsTokenStore {
    fn write_file_atomic(path: &Path, bytes: &[u8]) -> AuthResult<()> {
        let file_name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("token.json");
        let tmp_path = path.with_file_name(format!("{file_name}.uds-tmp"));

        write_owner_only(&tmp_path, bytes).map_err(|e| {
            AuthError::new(
                ErrorCode::Io,
                format!("failed to write temp file {}: {e}", tmp_path.display()),
            )
            .with_source(e)
        })?;

        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(AuthError::new(
                ErrorCode::Io,
                format!("failed to finalize token file {}: {e}", path.display()),
            )
            .with_source(e));
        }
        Ok(())
    }
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

impl TokenStore for FsTokenStore {
    fn load(&self, path: &Path) -> AuthResult<Token> {
        let bytes = std::fs::read(path)
            .map_err(|e| AuthError::io(format!("failed to read {}", path.display()), e))?;
        decode_token(path, &bytes)
    }

    fn save(&self, path: &Path, token: &Token) -> AuthResult<()> {
        tracing::info!(path = %path.display(), "saving token file");
        let bytes = encode_token(path, token)?;
        Self::write_file_atomic(path, &bytes)
    }
}

/// File map kept in memory. Directories are implicit, so saves never fail for a missing parent.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place raw bytes at `path`, e.g. to simulate a corrupted cache file.
    pub fn insert_raw(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock_or_recover()
            .insert(path.into(), bytes.into());
    }

    pub fn raw(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock_or_recover().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock_or_recover().contains_key(path)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, path: &Path) -> AuthResult<Token> {
        let bytes = self.raw(path).ok_or_else(|| {
            AuthError::new(
                ErrorCode::NotFound,
                format!("failed to read {}: no such file", path.display()),
            )
        })?;
        decode_token(path, &bytes)
    }

    fn save(&self, path: &Path, token: &Token) -> AuthResult<()> {
        let bytes = encode_token(path, token)?;
        self.insert_raw(path, bytes);
        Ok(())
    }
}
