//! Deferred writes and their replay when connectivity returns.

use chrono::{DateTime, Utc};
use reqwest::Method;
use rusqlite::params;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::db::{lock, SharedConnection};
use crate::error::{StorageError, SyncError};
use crate::http::Request;
use crate::transport::Transport;

/// A write captured while offline, replayed by background sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
  pub id: i64,
  pub method: String,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub created_at: DateTime<Utc>,
}

impl PendingAction {
  /// Rebuild the request. `None` if the stored method or URL is unusable.
  pub fn to_request(&self) -> Option<Request> {
    let method = Method::from_bytes(self.method.as_bytes()).ok()?;
    let url = Url::parse(&self.url).ok()?;

    Some(Request {
      method,
      url,
      headers: self.headers.clone(),
      body: self.body.clone(),
    })
  }
}

/// One row of the queue. `action` is an error when the stored columns no
/// longer decode.
#[derive(Debug)]
pub struct QueueEntry {
  pub id: i64,
  pub action: Result<PendingAction, StorageError>,
}

/// Durable ordered list of pending actions.
pub trait PendingQueue: Send + Sync {
  /// Append a request; returns its id.
  fn append(&self, request: &Request) -> Result<i64, StorageError>;

  /// All pending actions, oldest first. Rows are decoded one by one.
  fn list(&self) -> Result<Vec<QueueEntry>, StorageError>;

  /// Remove an action. Returns whether it was present.
  fn remove(&self, id: i64) -> Result<bool, StorageError>;
}

/// SQLite-backed pending queue.
pub struct SqliteQueue {
  conn: SharedConnection,
}

impl SqliteQueue {
  pub fn new(conn: SharedConnection) -> Self {
    Self { conn }
  }
}

impl PendingQueue for SqliteQueue {
  fn append(&self, request: &Request) -> Result<i64, StorageError> {
    let conn = lock(&self.conn)?;
    let headers = serde_json::to_string(&request.headers)?;

    conn.execute(
      "INSERT INTO pending_actions (method, url, headers, body, created_at)
       VALUES (?, ?, ?, ?, ?)",
      params![
        request.method.as_str(),
        request.url.as_str(),
        headers,
        request.body,
        Utc::now().to_rfc3339(),
      ],
    )?;

    Ok(conn.last_insert_rowid())
  }

  fn list(&self) -> Result<Vec<QueueEntry>, StorageError> {
    let conn = lock(&self.conn)?;

    let mut stmt = conn.prepare(
      "SELECT id, method, url, headers, body, created_at FROM pending_actions ORDER BY id",
    )?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Option<Vec<u8>>>(4)?,
          row.get::<_, String>(5)?,
        ))
      })?
      .collect::<Result<Vec<_>, _>>()?;

    let entries = rows
      .into_iter()
      .map(|(id, method, url, headers, body, created_at)| QueueEntry {
        id,
        action: decode_action(id, method, url, &headers, body, &created_at),
      })
      .collect();

    Ok(entries)
  }

  fn remove(&self, id: i64) -> Result<bool, StorageError> {
    let conn = lock(&self.conn)?;
    let removed = conn.execute("DELETE FROM pending_actions WHERE id = ?", params![id])?;
    Ok(removed > 0)
  }
}

fn decode_action(
  id: i64,
  method: String,
  url: String,
  headers: &str,
  body: Option<Vec<u8>>,
  created_at: &str,
) -> Result<PendingAction, StorageError> {
  Ok(PendingAction {
    id,
    method,
    url,
    headers: serde_json::from_str(headers)?,
    body,
    created_at: DateTime::parse_from_rfc3339(created_at)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|_| StorageError::Timestamp(created_at.to_string()))?,
  })
}

/// Outcome of one background sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Delivered and removed from the queue
  pub replayed: usize,
  /// Network failure; left queued for the next sync
  pub failed: usize,
  /// Undecodable or unreplayable actions dropped from the queue
  pub discarded: usize,
}

/// Replay every pending action in order.
///
/// Any HTTP response counts as delivered. A network failure is logged and the
/// action stays queued; it never stops the rest of the batch.
pub async fn drain(
  queue: &dyn PendingQueue,
  transport: &dyn Transport,
) -> Result<SyncReport, SyncError> {
  let entries = queue.list()?;
  let mut report = SyncReport::default();

  for entry in entries {
    let action = match entry.action {
      Ok(action) => action,
      Err(e) => {
        warn!(id = entry.id, error = %e, "discarding undecodable action");
        discard(queue, entry.id, &mut report);
        continue;
      }
    };

    debug!(id = action.id, queued_at = %action.created_at, "replaying pending action");
    let Some(request) = action.to_request() else {
      warn!(id = action.id, method = %action.method, url = %action.url, "discarding unreplayable action");
      discard(queue, action.id, &mut report);
      continue;
    };

    match transport.fetch(&request).await {
      Ok(response) => {
        info!(id = action.id, url = %action.url, status = response.status, "replayed pending action");
        match queue.remove(action.id) {
          Ok(_) => report.replayed += 1,
          Err(e) => {
            // Delivered but still queued; it will be sent again next time
            error!(id = action.id, error = %e, "failed to remove replayed action");
            report.failed += 1;
          }
        }
      }
      Err(e) => {
        error!(id = action.id, url = %action.url, error = %e, "background sync failed for action");
        report.failed += 1;
      }
    }
  }

  Ok(report)
}

fn discard(queue: &dyn PendingQueue, id: i64, report: &mut SyncReport) {
  match queue.remove(id) {
    Ok(_) => report.discarded += 1,
    Err(e) => {
      error!(id, error = %e, "failed to discard action");
      report.failed += 1;
    }
  }
}
