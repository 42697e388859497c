//! Durable storage for the OAuth credential.
//!
//! A missing token file is a valid "not authenticated" state, not an error.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use phonelink_core::{AuthError, CredentialRecord};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Token store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Token file exists but could not be read.
    #[error("failed to read token file {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Token file could not be written or removed.
    #[error("failed to write token file {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Token file content is not a valid credential record.
    #[error("token file {path} is malformed: {source}")]
    Malformed {
        /// File path.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Credential could not be encoded.
    #[error("failed to encode credential: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::storage(err.to_string())
    }
}

/// Persistence for a single credential record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads the stored credential, `None` when nothing is stored.
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError>;

    /// Replaces the stored credential.
    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Removes the stored credential. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// JSON file store, overwritten wholesale on every save.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write { path: self.path.clone(), source }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file present");
                return Ok(None);
            },
            Err(source) => return Err(StoreError::Read { path: self.path.clone(), source }),
        };

        let record = serde_json::from_slice(&content)
            .map_err(|source| StoreError::Malformed { path: self.path.clone(), source })?;

        Ok(Some(record))
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(record)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.write_error(e))?;
        }

        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, &content).await.map_err(|e| self.write_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&staging, permissions).await.map_err(|e| self.write_error(e))?;
        }

        tokio::fs::rename(&staging, &self.path).await.map_err(|e| self.write_error(e))?;

        debug!(path = %self.path.display(), expires_at = %record.expires_at, "credential saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.write_error(e)),
        }
    }
}

/// Process-local store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    record: RwLock<Option<CredentialRecord>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `record`.
    pub fn with_record(record: CredentialRecord) -> Self {
        Self { record: RwLock::new(Some(record)) }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.record.write().await = None;
        Ok(())
    }
}
