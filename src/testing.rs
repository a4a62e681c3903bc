//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::{CachedResponse, PartitionHandle, PartitionStore, RequestKey, SqlitePartitions};
use crate::config::{Config, WorkerSettings};
use crate::db::Database;
use crate::error::{NetworkError, StorageError};
use crate::host::Host;
use crate::http::{Request, Response};
use crate::notify::Notification;
use crate::transport::Transport;

/// Settings for an app at http://localhost with "static-v1"/"dynamic-v1".
pub fn settings() -> Arc<WorkerSettings> {
  let mut config = Config::default();
  config.origin = "http://localhost".to_string();
  config.cache.prefix = String::new();
  config.cache.version = "1".to_string();
  config.static_assets = vec![
    "/".to_string(),
    "/offline.html".to_string(),
    "/static/css/app.css".to_string(),
    "https://unpkg.com/htmx.org@1.9.0".to_string(),
  ];
  Arc::new(config.settings().unwrap())
}

pub fn memory_store() -> Arc<SqlitePartitions> {
  let db = Database::open_in_memory().unwrap();
  Arc::new(SqlitePartitions::new(db.connection()))
}

pub fn get(url: &str) -> Request {
  Request::get(Url::parse(url).unwrap())
}

pub fn api_get(url: &str) -> Request {
  get(url).with_header("Accept", "application/json")
}

pub fn html_get(url: &str) -> Request {
  get(url).with_header("Accept", "text/html,application/xhtml+xml")
}

/// Transport answering from a fixed table. Unknown or failed URLs are
/// network errors.
#[derive(Default)]
pub struct ScriptedTransport {
  responses: HashMap<String, Option<Response>>,
  requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, url: &str, response: Response) -> Self {
    self.responses.insert(url.to_string(), Some(response));
    self
  }

  pub fn fail(mut self, url: &str) -> Self {
    self.responses.insert(url.to_string(), None);
    self
  }

  /// URLs fetched so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.requests().iter().map(|r| r.url.to_string()).collect()
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.requests.lock().unwrap().push(request.clone());

    match self.responses.get(request.url.as_str()) {
      Some(Some(response)) => Ok(response.clone()),
      _ => Err(NetworkError::unreachable(request.url.as_str(), "offline")),
    }
  }
}

/// Transport that must never be reached.
pub struct PanicTransport;

#[async_trait]
impl Transport for PanicTransport {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    panic!("network must not be called, got {}", request.url);
  }
}

/// Store whose every operation fails.
pub struct BrokenStore;

impl PartitionStore for BrokenStore {
  fn open(&self, _name: &str) -> Result<PartitionHandle, StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn get(
    &self,
    _partition: &PartitionHandle,
    _key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn put(
    &self,
    _partition: &PartitionHandle,
    _key: &RequestKey,
    _response: &Response,
  ) -> Result<(), StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn put_all(
    &self,
    _partition: &PartitionHandle,
    _entries: &[(RequestKey, Response)],
  ) -> Result<(), StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn lookup(
    &self,
    _partition: &str,
    _key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn match_any(&self, _key: &RequestKey) -> Result<Option<CachedResponse>, StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn delete_partition(&self, _name: &str) -> Result<bool, StorageError> {
    Err(StorageError::LockPoisoned)
  }

  fn list_partition_names(&self) -> Result<Vec<String>, StorageError> {
    Err(StorageError::LockPoisoned)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
  SkipWaiting,
  ClaimClients,
  ShowNotification(Notification),
  CloseNotification,
  OpenWindow(String),
}

/// Host that records every call.
#[derive(Default)]
pub struct RecordingHost {
  events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
  pub fn events(&self) -> Vec<HostEvent> {
    self.events.lock().unwrap().clone()
  }

  fn record(&self, event: HostEvent) {
    self.events.lock().unwrap().push(event);
  }
}

impl Host for RecordingHost {
  fn skip_waiting(&self) {
    self.record(HostEvent::SkipWaiting);
  }

  fn claim_clients(&self) {
    self.record(HostEvent::ClaimClients);
  }

  fn show_notification(&self, notification: &Notification) {
    self.record(HostEvent::ShowNotification(notification.clone()));
  }

  fn close_notification(&self) {
    self.record(HostEvent::CloseNotification);
  }

  fn open_window(&self, url: &Url) {
    self.record(HostEvent::OpenWindow(url.to_string()));
  }
}
