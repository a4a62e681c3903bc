//! Install-time pre-caching and activate-time partition cleanup.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::cache::{PartitionStore, RequestKey};
use crate::config::WorkerSettings;
use crate::error::{InstallError, StorageError};
use crate::http::{Request, Response};
use crate::transport::Transport;

/// Where a worker instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  /// Installed and waiting to supersede the active instance
  Installed,
  Activating,
  Activated,
  /// Install failed; this instance never becomes active
  Redundant,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
  pub partition: String,
  pub cached: Vec<Url>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
  pub kept: Vec<String>,
  pub deleted: Vec<String>,
}

pub struct LifecycleManager {
  settings: Arc<WorkerSettings>,
  store: Arc<dyn PartitionStore>,
  transport: Arc<dyn Transport>,
}

impl LifecycleManager {
  pub fn new(
    settings: Arc<WorkerSettings>,
    store: Arc<dyn PartitionStore>,
    transport: Arc<dyn Transport>,
  ) -> Self {
    Self {
      settings,
      store,
      transport,
    }
  }

  /// Pre-cache the static manifest into the current static partition.
  ///
  /// All assets are fetched first; any failure or non-2xx answer aborts the
  /// install before anything is written. The batch is then stored in one
  /// transaction.
  pub async fn install(&self) -> Result<InstallReport, InstallError> {
    let assets = &self.settings.static_assets;
    let partition_name = &self.settings.names.static_name;
    info!(partition = %partition_name, assets = assets.len(), "caching static assets");

    let entries = try_join_all(assets.iter().map(|url| self.fetch_asset(url))).await?;

    let partition = self.store.open(partition_name)?;
    self.store.put_all(&partition, &entries)?;

    info!(partition = %partition.name(), "static assets cached");
    Ok(InstallReport {
      partition: partition_name.clone(),
      cached: assets.clone(),
    })
  }

  async fn fetch_asset(&self, url: &Url) -> Result<(RequestKey, Response), InstallError> {
    let request = Request::get(url.clone());

    let response = self
      .transport
      .fetch(&request)
      .await
      .map_err(|e| InstallError::AssetFetch {
        url: url.to_string(),
        source: e,
      })?;

    if !response.is_success() {
      return Err(InstallError::AssetStatus {
        url: url.to_string(),
        status: response.status,
      });
    }

    debug!(url = %url, "fetched static asset");
    Ok((RequestKey::get(url), response))
  }

  /// Delete every partition not named by the current version.
  pub fn activate(&self) -> Result<ActivateReport, StorageError> {
    let names = &self.settings.names;
    let mut report = ActivateReport::default();

    for name in self.store.list_partition_names()? {
      if names.is_current(&name) {
        report.kept.push(name);
        continue;
      }

      info!(partition = %name, "deleting old partition");
      self.store.delete_partition(&name)?;
      report.deleted.push(name);
    }

    Ok(report)
  }
}
