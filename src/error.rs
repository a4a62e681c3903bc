//! Error taxonomy for the caching engine.
//!
//! "No cached entry" is not an error: lookups return `Option::None` and the
//! strategy engine decides what the caller sees.

use thiserror::Error;

use crate::lifecycle::WorkerState;

/// A network fetch that did not produce any HTTP response.
///
/// Always caught by the strategy engine, where it triggers the fallback path.
#[derive(Debug, Error)]
pub enum NetworkError {
  #[error("request to {url} failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("request to {url} failed: {reason}")]
  Unreachable { url: String, reason: String },
}

impl NetworkError {
  pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::Unreachable {
      url: url.into(),
      reason: reason.into(),
    }
  }
}

/// Failure of the durable store backing partitions and the pending queue.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("sqlite: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode stored value: {0}")]
  Encoding(#[from] serde_json::Error),

  #[error("failed to parse stored timestamp '{0}'")]
  Timestamp(String),

  #[error("storage lock poisoned")]
  LockPoisoned,

  #[error("failed to prepare database location {path}: {source}")]
  Location {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Install aborted; nothing from the manifest is considered cached.
#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to fetch required asset {url}: {source}")]
  AssetFetch {
    url: String,
    #[source]
    source: NetworkError,
  },

  #[error("required asset {url} answered with status {status}")]
  AssetStatus { url: String, status: u16 },

  #[error("failed to store static assets: {0}")]
  Storage(#[from] StorageError),
}

/// Activation refused or failed. Old partitions are left in place.
#[derive(Debug, Error)]
pub enum ActivateError {
  #[error("cannot activate a worker in state {0:?}")]
  InvalidState(WorkerState),

  #[error("failed to remove old partitions: {0}")]
  Storage(#[from] StorageError),
}

/// Background sync could not read the pending queue at all.
///
/// Per-item replay failures are logged and never surface here.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error("failed to read pending actions: {0}")]
  Storage(#[from] StorageError),
}
