//! Partition store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{lock, SharedConnection};
use crate::error::StorageError;
use crate::http::Response;

use super::key::{CachedResponse, RequestKey};

/// Handle to an open partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
  id: i64,
  name: String,
}

impl PartitionHandle {
  pub fn name(&self) -> &str {
    &self.name
  }
}

/// Named durable partitions of `RequestKey -> CachedResponse` entries.
pub trait PartitionStore: Send + Sync {
  /// Open a partition, creating it if absent.
  fn open(&self, name: &str) -> Result<PartitionHandle, StorageError>;

  /// Look up an entry in one partition.
  fn get(
    &self,
    partition: &PartitionHandle,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError>;

  /// Store an entry, replacing any existing one for the same key.
  fn put(
    &self,
    partition: &PartitionHandle,
    key: &RequestKey,
    response: &Response,
  ) -> Result<(), StorageError>;

  /// Store several entries in one transaction: either all land or none do.
  fn put_all(
    &self,
    partition: &PartitionHandle,
    entries: &[(RequestKey, Response)],
  ) -> Result<(), StorageError>;

  /// Look up an entry by partition name. A missing partition is a miss and
  /// is not created.
  fn lookup(
    &self,
    partition: &str,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError>;

  /// Search every partition, oldest first, for an entry matching `key`.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError>;

  /// Remove a partition and all of its entries. Returns whether it existed.
  fn delete_partition(&self, name: &str) -> Result<bool, StorageError>;

  /// Names of all partitions in creation order.
  fn list_partition_names(&self) -> Result<Vec<String>, StorageError>;
}

/// SQLite-based partition store.
pub struct SqlitePartitions {
  conn: SharedConnection,
}

impl SqlitePartitions {
  pub fn new(conn: SharedConnection) -> Self {
    Self { conn }
  }
}

const INSERT_ENTRY: &str = "INSERT OR REPLACE INTO partition_entries
  (partition_id, key_hash, method, url, status, status_text, headers, body, stored_at)
  VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

fn insert_entry(
  conn: &rusqlite::Connection,
  partition: &PartitionHandle,
  key: &RequestKey,
  response: &Response,
) -> Result<(), StorageError> {
  let headers = serde_json::to_string(&response.headers)?;
  conn.execute(
    INSERT_ENTRY,
    params![
      partition.id,
      key.cache_hash(),
      key.method(),
      key.url(),
      response.status,
      response.status_text,
      headers,
      response.body,
      Utc::now().to_rfc3339(),
    ],
  )?;
  Ok(())
}

/// Raw columns of an entry row, decoded outside the rusqlite closure.
struct EntryRow {
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
  stored_at: String,
}

impl EntryRow {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      status: row.get(0)?,
      status_text: row.get(1)?,
      headers: row.get(2)?,
      body: row.get(3)?,
      stored_at: row.get(4)?,
    })
  }

  fn decode(self) -> Result<CachedResponse, StorageError> {
    Ok(CachedResponse {
      response: Response {
        status: self.status,
        status_text: self.status_text,
        headers: serde_json::from_str(&self.headers)?,
        body: self.body,
      },
      stored_at: parse_datetime(&self.stored_at)?,
    })
  }
}

impl PartitionStore for SqlitePartitions {
  fn open(&self, name: &str) -> Result<PartitionHandle, StorageError> {
    let conn = lock(&self.conn)?;

    conn.execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![name],
    )?;
    let id: i64 = conn.query_row(
      "SELECT id FROM partitions WHERE name = ?",
      params![name],
      |row| row.get(0),
    )?;

    Ok(PartitionHandle {
      id,
      name: name.to_string(),
    })
  }

  fn get(
    &self,
    partition: &PartitionHandle,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError> {
    let conn = lock(&self.conn)?;

    let row = conn
      .query_row(
        "SELECT status, status_text, headers, body, stored_at FROM partition_entries
         WHERE partition_id = ? AND key_hash = ?",
        params![partition.id, key.cache_hash()],
        EntryRow::from_row,
      )
      .optional()?;

    row.map(EntryRow::decode).transpose()
  }

  fn put(
    &self,
    partition: &PartitionHandle,
    key: &RequestKey,
    response: &Response,
  ) -> Result<(), StorageError> {
    let conn = lock(&self.conn)?;
    insert_entry(&conn, partition, key, response)
  }

  fn put_all(
    &self,
    partition: &PartitionHandle,
    entries: &[(RequestKey, Response)],
  ) -> Result<(), StorageError> {
    let mut conn = lock(&self.conn)?;
    let tx = conn.transaction()?;

    for (key, response) in entries {
      insert_entry(&tx, partition, key, response)?;
    }

    tx.commit()?;
    Ok(())
  }

  fn lookup(
    &self,
    partition: &str,
    key: &RequestKey,
  ) -> Result<Option<CachedResponse>, StorageError> {
    let conn = lock(&self.conn)?;

    let row = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body, e.stored_at
         FROM partition_entries e
         INNER JOIN partitions p ON p.id = e.partition_id
         WHERE p.name = ? AND e.key_hash = ?",
        params![partition, key.cache_hash()],
        EntryRow::from_row,
      )
      .optional()?;

    row.map(EntryRow::decode).transpose()
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>, StorageError> {
    let conn = lock(&self.conn)?;

    let row = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body, e.stored_at
         FROM partition_entries e
         INNER JOIN partitions p ON p.id = e.partition_id
         WHERE e.key_hash = ?
         ORDER BY p.id
         LIMIT 1",
        params![key.cache_hash()],
        EntryRow::from_row,
      )
      .optional()?;

    row.map(EntryRow::decode).transpose()
  }

  fn delete_partition(&self, name: &str) -> Result<bool, StorageError> {
    let mut conn = lock(&self.conn)?;
    let tx = conn.transaction()?;

    tx.execute(
      "DELETE FROM partition_entries WHERE partition_id IN
       (SELECT id FROM partitions WHERE name = ?)",
      params![name],
    )?;
    let removed = tx.execute("DELETE FROM partitions WHERE name = ?", params![name])?;

    tx.commit()?;
    Ok(removed > 0)
  }

  fn list_partition_names(&self) -> Result<Vec<String>, StorageError> {
    let conn = lock(&self.conn)?;

    let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY id")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;

    Ok(names)
  }
}

/// Parse an RFC 3339 timestamp written by `insert_entry`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| StorageError::Timestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use reqwest::Method;
  use url::Url;

  fn store() -> SqlitePartitions {
    let db = Database::open_in_memory().unwrap();
    SqlitePartitions::new(db.connection())
  }

  fn key(url: &str) -> RequestKey {
    RequestKey::new(&Method::GET, &Url::parse(url).unwrap()).unwrap()
  }

  #[test]
  fn test_open_is_idempotent() {
    let store = store();
    let a = store.open("static-v1").unwrap();
    let b = store.open("static-v1").unwrap();

    assert_eq!(a, b);
    assert_eq!(store.list_partition_names().unwrap(), vec!["static-v1"]);
  }

  #[test]
  fn test_put_overwrites_wholesale() {
    let store = store();
    let partition = store.open("dynamic-v1").unwrap();
    let k = key("http://localhost/api/customers");

    let first = Response::new(200, "first").with_header("X-Version", "1");
    store.put(&partition, &k, &first).unwrap();

    let second = Response::new(200, "second");
    store.put(&partition, &k, &second).unwrap();

    let cached = store.get(&partition, &k).unwrap().unwrap();
    assert_eq!(cached.response, second);
    assert!(cached.response.header("x-version").is_none());
  }

  #[test]
  fn test_get_is_scoped_to_partition() {
    let store = store();
    let static_p = store.open("static-v1").unwrap();
    let dynamic_p = store.open("dynamic-v1").unwrap();
    let k = key("http://localhost/static/css/app.css");

    store.put(&static_p, &k, &Response::new(200, "body {}")).unwrap();

    assert!(store.get(&static_p, &k).unwrap().is_some());
    assert!(store.get(&dynamic_p, &k).unwrap().is_none());
  }

  #[test]
  fn test_lookup_by_name_does_not_create_partition() {
    let store = store();
    let k = key("http://localhost/static/css/app.css");

    assert!(store.lookup("static-v1", &k).unwrap().is_none());
    assert!(store.list_partition_names().unwrap().is_empty());

    let partition = store.open("static-v1").unwrap();
    store.put(&partition, &k, &Response::new(200, "body {}")).unwrap();
    let cached = store.lookup("static-v1", &k).unwrap().unwrap();
    assert_eq!(cached.response.body, b"body {}");
    assert!(store.lookup("dynamic-v1", &k).unwrap().is_none());
  }

  #[test]
  fn test_match_any_searches_oldest_partition_first() {
    let store = store();
    let older = store.open("static-v1").unwrap();
    let newer = store.open("dynamic-v1").unwrap();
    let k = key("http://localhost/");

    store.put(&newer, &k, &Response::new(200, "newer")).unwrap();
    assert_eq!(store.match_any(&k).unwrap().unwrap().response.body, b"newer");

    store.put(&older, &k, &Response::new(200, "older")).unwrap();
    assert_eq!(store.match_any(&k).unwrap().unwrap().response.body, b"older");

    assert!(store.match_any(&key("http://localhost/missing")).unwrap().is_none());
  }

  #[test]
  fn test_delete_partition_removes_entries() {
    let store = store();
    let partition = store.open("static-v1").unwrap();
    let k = key("http://localhost/static/app.js");
    store.put(&partition, &k, &Response::new(200, "js")).unwrap();

    assert!(store.delete_partition("static-v1").unwrap());
    assert!(!store.delete_partition("static-v1").unwrap());
    assert!(store.match_any(&k).unwrap().is_none());
    assert!(store.list_partition_names().unwrap().is_empty());
  }

  #[test]
  fn test_put_all_stores_every_entry() {
    let store = store();
    let partition = store.open("static-v1").unwrap();
    let entries = vec![
      (key("http://localhost/"), Response::new(200, "index")),
      (key("http://localhost/offline.html"), Response::new(200, "offline")),
    ];

    store.put_all(&partition, &entries).unwrap();

    for (k, response) in &entries {
      assert_eq!(&store.get(&partition, k).unwrap().unwrap().response, response);
    }
  }

  #[test]
  fn test_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let k = key("http://localhost/static/manifest.json");

    {
      let db = Database::open(Some(&path)).unwrap();
      let store = SqlitePartitions::new(db.connection());
      let partition = store.open("static-v1").unwrap();
      store.put(&partition, &k, &Response::new(200, "{}")).unwrap();
    }

    let db = Database::open(Some(&path)).unwrap();
    let store = SqlitePartitions::new(db.connection());
    let cached = store.match_any(&k).unwrap().unwrap();
    assert_eq!(cached.response.body, b"{}");
  }
}
