//! Persistence of session credentials between runs.
//!
//! The credentials are an opaque JSON value produced by
//! [`Session::credentials`](parley_core::Session::credentials) and handed back
//! to [`Connector::connect`](parley_core::Connector::connect) on the next start.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading or writing saved credentials.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Session file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Loads and saves session credentials.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Previously saved credentials, or `None` if nothing was saved.
    async fn load(&self) -> StoreResult<Option<Value>>;

    async fn save(&self, credentials: &Value) -> StoreResult<()>;
}

// =============================================================================
// JSON file
// =============================================================================

/// Keeps credentials in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn load(&self) -> StoreResult<Option<Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved session");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }

    async fn save(&self, credentials: &Value) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(credentials).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "Saved session");
        Ok(())
    }
}

// =============================================================================
// In memory
// =============================================================================

/// Keeps credentials in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `credentials`.
    pub fn with_saved(credentials: Value) -> Self {
        Self {
            saved: Mutex::new(Some(credentials)),
        }
    }

    pub fn saved(&self) -> Option<Value> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self) -> StoreResult<Option<Value>> {
        Ok(self.saved())
    }

    async fn save(&self, credentials: &Value) -> StoreResult<()> {
        *self.saved.lock() = Some(credentials.clone());
        Ok(())
    }
}
