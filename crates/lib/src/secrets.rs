//! API key storage.
//!
//! The key is kept apart from `config.json` in a `credentials` file next to it, base64-encoded
//! and (on Unix) readable by the owner only. `ANTHROPIC_API_KEY` takes precedence when set.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use tokio::sync::RwLock;

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_KEY_PREFIX: &str = "sk-ant-";
const CREDENTIALS_FILE: &str = "credentials";

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("writing credentials to {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Secure storage for the API key consumed by the transport.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get_api_key(&self) -> Option<String>;
    async fn set_api_key(&self, key: &str) -> Result<(), SecretsError>;
    async fn clear(&self) -> Result<(), SecretsError>;
}

/// Cheap format check: provider keys start with `sk-ant-`.
pub fn looks_like_api_key(key: &str) -> bool {
    let k = key.trim();
    !k.is_empty() && k.starts_with(API_KEY_PREFIX)
}

/// Non-empty, trimmed value of `ANTHROPIC_API_KEY`.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Key stored base64-encoded in a single file.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `credentials` file in the config directory.
    pub fn in_config_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> SecretsError {
        SecretsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get_api_key(&self) -> Option<String> {
        let encoded = tokio::fs::read_to_string(&self.path).await.ok()?;
        let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("credentials file {} is not valid: {}", self.path.display(), e);
                return None;
            }
        };
        String::from_utf8(bytes).ok().filter(|k| !k.trim().is_empty())
    }

    async fn set_api_key(&self, key: &str) -> Result<(), SecretsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(key.trim().as_bytes());
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|e| self.io_err(e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), SecretsError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// Gives `ANTHROPIC_API_KEY` precedence over the wrapped store.
pub struct EnvKeyStore<S> {
    inner: S,
}

impl<S: KeyStore> EnvKeyStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: KeyStore> KeyStore for EnvKeyStore<S> {
    async fn get_api_key(&self) -> Option<String> {
        match api_key_from_env() {
            Some(k) => Some(k),
            None => self.inner.get_api_key().await,
        }
    }

    async fn set_api_key(&self, key: &str) -> Result<(), SecretsError> {
        self.inner.set_api_key(key).await
    }

    async fn clear(&self) -> Result<(), SecretsError> {
        self.inner.clear().await
    }
}

/// In-process key store.
#[derive(Default)]
pub struct MemoryKeyStore {
    key: RwLock<Option<String>>,
}

impl MemoryKeyStore {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: RwLock::new(Some(key.into())),
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn get_api_key(&self) -> Option<String> {
        self.key.read().await.clone()
    }

    async fn set_api_key(&self, key: &str) -> Result<(), SecretsError> {
        *self.key.write().await = Some(key.trim().to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SecretsError> {
        *self.key.write().await = None;
        Ok(())
    }
}
