//! Worker dispatcher: the named hooks the hosting environment invokes.

use chrono::Utc;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::cache::{PartitionStore, Served, StrategyEngine};
use crate::classify::classify;
use crate::config::WorkerSettings;
use crate::error::{ActivateError, InstallError, StorageError, SyncError};
use crate::host::Host;
use crate::http::Request;
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleManager, WorkerState};
use crate::notify::{click_target, Notification};
use crate::sync::{drain, PendingQueue, SyncReport};
use crate::transport::Transport;

/// Result of intercepting a request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Not intercepted; the host sends the request to the network itself
  PassThrough,
  Respond(Served),
}

/// Messages accepted on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
}

#[derive(Clone)]
pub struct Worker {
  settings: Arc<WorkerSettings>,
  engine: StrategyEngine,
  lifecycle: Arc<LifecycleManager>,
  queue: Arc<dyn PendingQueue>,
  transport: Arc<dyn Transport>,
  host: Arc<dyn Host>,
  state: Arc<Mutex<WorkerState>>,
}

impl Worker {
  pub fn new(
    settings: Arc<WorkerSettings>,
    store: Arc<dyn PartitionStore>,
    queue: Arc<dyn PendingQueue>,
    transport: Arc<dyn Transport>,
    host: Arc<dyn Host>,
  ) -> Self {
    let engine = StrategyEngine::new(
      Arc::clone(&settings),
      Arc::clone(&store),
      Arc::clone(&transport),
    );
    let lifecycle = LifecycleManager::new(Arc::clone(&settings), store, Arc::clone(&transport));

    Self {
      settings,
      engine,
      lifecycle: Arc::new(lifecycle),
      queue,
      transport,
      host,
      state: Arc::new(Mutex::new(WorkerState::Parsed)),
    }
  }

  pub fn state(&self) -> WorkerState {
    match self.state.lock() {
      Ok(state) => *state,
      Err(poisoned) => *poisoned.into_inner(),
    }
  }

  fn set_state(&self, next: WorkerState) {
    let mut state = match self.state.lock() {
      Ok(state) => state,
      Err(poisoned) => poisoned.into_inner(),
    };
    let from = *state;
    debug!(from = ?from, to = ?next, "worker state");
    *state = next;
  }

  /// Pre-cache the static manifest, then ask to supersede the active
  /// instance immediately. A failed install leaves the worker redundant.
  pub async fn on_install(&self) -> Result<InstallReport, InstallError> {
    info!("installing");
    self.set_state(WorkerState::Installing);

    match self.lifecycle.install().await {
      Ok(report) => {
        self.set_state(WorkerState::Installed);
        self.host.skip_waiting();
        Ok(report)
      }
      Err(e) => {
        error!(error = %e, "install failed");
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  /// Drop partitions from previous versions, then claim open clients.
  ///
  /// Allowed from `Installed`, or from `Parsed` when activation runs without
  /// an install in the same process. Any other state leaves the partitions
  /// untouched.
  pub async fn on_activate(&self) -> Result<ActivateReport, ActivateError> {
    let from = {
      let mut state = match self.state.lock() {
        Ok(state) => state,
        Err(poisoned) => poisoned.into_inner(),
      };
      let from = *state;
      if !matches!(from, WorkerState::Parsed | WorkerState::Installed) {
        warn!(state = ?from, "refusing to activate");
        return Err(ActivateError::InvalidState(from));
      }
      debug!(from = ?from, to = ?WorkerState::Activating, "worker state");
      *state = WorkerState::Activating;
      from
    };
    info!("activating");

    match self.lifecycle.activate() {
      Ok(report) => {
        self.host.claim_clients();
        self.set_state(WorkerState::Activated);
        info!(kept = ?report.kept, deleted = ?report.deleted, "activated");
        Ok(report)
      }
      Err(e) => {
        error!(error = %e, "activation failed");
        self.set_state(from);
        Err(e.into())
      }
    }
  }

  /// Intercept a request. Non-GET requests pass through untouched, as does
  /// everything once the worker is redundant.
  pub async fn on_fetch(&self, request: &Request) -> FetchOutcome {
    if self.state() == WorkerState::Redundant {
      return FetchOutcome::PassThrough;
    }

    match classify(request, &self.settings.asset_origins) {
      None => FetchOutcome::PassThrough,
      Some(class) => {
        debug!(url = %request.url, class = %class, "intercepted");
        FetchOutcome::Respond(self.engine.handle(request, class).await)
      }
    }
  }

  /// Run a named sync task. Only the configured tag drains the queue.
  pub async fn on_sync(&self, tag: &str) -> Result<Option<SyncReport>, SyncError> {
    if tag != self.settings.sync_tag {
      debug!(tag, "ignoring unknown sync tag");
      return Ok(None);
    }

    let report = drain(self.queue.as_ref(), self.transport.as_ref()).await?;
    info!(
      replayed = report.replayed,
      failed = report.failed,
      discarded = report.discarded,
      "background sync finished"
    );
    Ok(Some(report))
  }

  /// Display a notification for an incoming push.
  pub fn on_push(&self, payload: Option<&str>) -> Notification {
    let notification = Notification::for_push(&self.settings.notification, payload, Utc::now());
    self.host.show_notification(&notification);
    notification
  }

  /// Close the clicked notification; `explore` opens the default view.
  pub fn on_notification_click(&self, action: Option<&str>) {
    self.host.close_notification();

    let Some(target) = click_target(&self.settings.notification, action) else {
      return;
    };

    match self.settings.origin.join(target) {
      Ok(url) => self.host.open_window(&url),
      Err(e) => warn!(view = target, error = %e, "invalid default view"),
    }
  }

  /// Handle a control-channel message. Unknown messages are ignored.
  pub fn on_message(&self, message: &str) -> Option<ControlMessage> {
    let parsed = match serde_json::from_str::<ControlMessage>(message) {
      Ok(parsed) => parsed,
      Err(e) => {
        debug!(error = %e, "ignoring control message");
        return None;
      }
    };

    match parsed {
      ControlMessage::SkipWaiting => self.host.skip_waiting(),
    }
    Some(parsed)
  }

  /// Queue a write for replay at the next background sync.
  pub fn defer(&self, request: &Request) -> Result<i64, StorageError> {
    let id = self.queue.append(request)?;
    info!(id, method = %request.method, url = %request.url, "deferred action");
    Ok(id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{RequestKey, ServedFrom, SqlitePartitions};
  use crate::db::Database;
  use crate::http::Response;
  use crate::sync::SqliteQueue;
  use crate::testing::{get, html_get, settings, HostEvent, RecordingHost, ScriptedTransport};
  use reqwest::Method;
  use url::Url;

  struct Fixture {
    worker: Worker,
    store: Arc<SqlitePartitions>,
    queue: Arc<SqliteQueue>,
    host: Arc<RecordingHost>,
  }

  fn fixture(transport: ScriptedTransport) -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(SqlitePartitions::new(db.connection()));
    let queue = Arc::new(SqliteQueue::new(db.connection()));
    let host = Arc::new(RecordingHost::default());

    let worker = Worker::new(
      settings(),
      store.clone(),
      queue.clone(),
      Arc::new(transport),
      host.clone(),
    );

    Fixture {
      worker,
      store,
      queue,
      host,
    }
  }

  fn manifest_transport() -> ScriptedTransport {
    settings()
      .static_assets
      .iter()
      .fold(ScriptedTransport::new(), |t, url| {
        t.respond(url.as_str(), Response::new(200, url.path().to_string()))
      })
  }

  #[tokio::test]
  async fn test_install_then_activate() {
    let f = fixture(manifest_transport());
    f.store.open("static-v0").unwrap();
    assert_eq!(f.worker.state(), WorkerState::Parsed);

    f.worker.on_install().await.unwrap();
    assert_eq!(f.worker.state(), WorkerState::Installed);
    assert_eq!(f.host.events(), vec![HostEvent::SkipWaiting]);

    let report = f.worker.on_activate().await.unwrap();
    assert_eq!(report.deleted, vec!["static-v0"]);
    assert_eq!(f.worker.state(), WorkerState::Activated);
    assert_eq!(
      f.host.events(),
      vec![HostEvent::SkipWaiting, HostEvent::ClaimClients]
    );
  }

  #[tokio::test]
  async fn test_failed_install_is_reported_and_redundant() {
    let f = fixture(ScriptedTransport::new());

    assert!(f.worker.on_install().await.is_err());
    assert_eq!(f.worker.state(), WorkerState::Redundant);
    assert!(f.host.events().is_empty());
  }

  #[tokio::test]
  async fn test_failed_install_cannot_activate() {
    let f = fixture(ScriptedTransport::new());
    f.store.open("static-v0").unwrap();
    f.store.open("dynamic-v0").unwrap();

    assert!(f.worker.on_install().await.is_err());
    let err = f.worker.on_activate().await.unwrap_err();

    assert!(matches!(err, ActivateError::InvalidState(WorkerState::Redundant)));
    assert_eq!(f.worker.state(), WorkerState::Redundant);
    assert_eq!(
      f.store.list_partition_names().unwrap(),
      vec!["static-v0", "dynamic-v0"]
    );
    assert!(f.host.events().is_empty());
  }

  #[tokio::test]
  async fn test_activate_is_not_repeated() {
    let f = fixture(ScriptedTransport::new());

    f.worker.on_activate().await.unwrap();
    assert!(matches!(
      f.worker.on_activate().await,
      Err(ActivateError::InvalidState(WorkerState::Activated))
    ));
    assert_eq!(f.host.events(), vec![HostEvent::ClaimClients]);
  }

  #[tokio::test]
  async fn test_redundant_worker_passes_everything_through() {
    let f = fixture(ScriptedTransport::new());
    assert!(f.worker.on_install().await.is_err());

    let outcome = f.worker.on_fetch(&get("http://localhost/static/css/app.css")).await;
    assert!(matches!(outcome, FetchOutcome::PassThrough));
  }

  #[tokio::test]
  async fn test_non_get_passes_through_without_writes() {
    let f = fixture(
      ScriptedTransport::new().respond("http://localhost/api/sales", Response::new(200, "ok")),
    );

    for method in [Method::POST, Method::PUT, Method::DELETE] {
      let request = Request::new(method, Url::parse("http://localhost/api/sales").unwrap());
      assert!(matches!(f.worker.on_fetch(&request).await, FetchOutcome::PassThrough));
    }

    assert!(f.store.list_partition_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_fetch_routes_by_class() {
    let f = fixture(
      ScriptedTransport::new().respond("http://localhost/customers", Response::new(200, "page")),
    );

    let FetchOutcome::Respond(served) = f.worker.on_fetch(&html_get("http://localhost/customers")).await
    else {
      panic!("expected a response");
    };
    assert_eq!(served.source, ServedFrom::Network);

    let handle = f.store.open("dynamic-v1").unwrap();
    let key = RequestKey::get(&Url::parse("http://localhost/customers").unwrap());
    assert!(f.store.get(&handle, &key).unwrap().is_some());

    let FetchOutcome::Respond(served) = f.worker.on_fetch(&get("http://localhost/api/x")).await
    else {
      panic!("expected a response");
    };
    assert_eq!(served.response, Response::offline_api());
  }

  #[tokio::test]
  async fn test_sync_drains_only_for_configured_tag() {
    let f = fixture(
      ScriptedTransport::new().respond("http://localhost/api/sales", Response::new(201, "")),
    );
    let request = Request::new(Method::POST, Url::parse("http://localhost/api/sales").unwrap())
      .with_body("{}");
    f.worker.defer(&request).unwrap();

    assert_eq!(f.worker.on_sync("periodic-refresh").await.unwrap(), None);
    assert_eq!(f.queue.list().unwrap().len(), 1);

    let report = f.worker.on_sync("background-sync").await.unwrap().unwrap();
    assert_eq!(report.replayed, 1);
    assert!(f.queue.list().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_push_and_click() {
    let f = fixture(ScriptedTransport::new());

    let notification = f.worker.on_push(Some("Service appointment confirmed"));
    f.worker.on_notification_click(Some("close"));
    f.worker.on_notification_click(Some("explore"));

    assert_eq!(
      f.host.events(),
      vec![
        HostEvent::ShowNotification(notification),
        HostEvent::CloseNotification,
        HostEvent::CloseNotification,
        HostEvent::OpenWindow("http://localhost/".to_string()),
      ]
    );
  }

  #[tokio::test]
  async fn test_skip_waiting_message() {
    let f = fixture(ScriptedTransport::new());

    assert_eq!(
      f.worker.on_message(r#"{"type":"SKIP_WAITING"}"#),
      Some(ControlMessage::SkipWaiting)
    );
    assert_eq!(f.worker.on_message(r#"{"type":"REFRESH"}"#), None);
    assert_eq!(f.worker.on_message("not json"), None);
    assert_eq!(f.host.events(), vec![HostEvent::SkipWaiting]);
  }
}
