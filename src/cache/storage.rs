//! Store providers: durable SQLite-backed stores and an in-memory variant.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CapturedResponse, RequestKey, StoreKind, StoreName, StoreProvider};

/// SQLite-backed store provider. Entries survive process restarts.
pub struct SqliteStores {
  conn: Mutex<Connection>,
}

impl SqliteStores {
  /// Open or create the store database at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let stores = Self {
      conn: Mutex::new(conn),
    };
    stores.run_migrations()?;

    Ok(stores)
  }

  /// Open an in-memory database. Contents are lost on drop; used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let stores = Self {
      conn: Mutex::new(conn),
    };
    stores.run_migrations()?;

    Ok(stores)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the store tables.
const STORE_SCHEMA: &str = r#"
-- One row per named store
CREATE TABLE IF NOT EXISTS stores (
    kind TEXT NOT NULL,
    version TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (kind, version)
);

-- Captured responses, keyed by request identity digest within a store
CREATE TABLE IF NOT EXISTS entries (
    store_kind TEXT NOT NULL,
    store_version TEXT NOT NULL,
    request_digest TEXT NOT NULL,
    request_identity TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (store_kind, store_version, request_digest)
);

CREATE INDEX IF NOT EXISTS idx_entries_store ON entries(store_kind, store_version);
"#;

impl StoreProvider for SqliteStores {
  fn put(&self, store: &StoreName, key: &RequestKey, response: &CapturedResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let result = conn
      .execute(
        "INSERT OR IGNORE INTO stores (kind, version) VALUES (?, ?)",
        params![store.kind.as_str(), store.version],
      )
      .and_then(|_| {
        conn.execute(
          "INSERT OR REPLACE INTO entries
           (store_kind, store_version, request_digest, request_identity, status, headers, body, fetched_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
          params![
            store.kind.as_str(),
            store.version,
            key.digest(),
            key.identity(),
            response.status,
            headers,
            response.body,
            response.fetched_at.to_rfc3339(),
          ],
        )
      });

    if let Err(e) = result {
      let _ = conn.execute("ROLLBACK", []);
      return Err(eyre!("Failed to store entry for {}: {}", key, e));
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get(&self, store: &StoreName, key: &RequestKey) -> Result<Option<CapturedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, fetched_at FROM entries
         WHERE store_kind = ? AND store_version = ? AND request_digest = ?",
        params![store.kind.as_str(), store.version, key.digest()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query entry for {}: {}", key, e))?;

    match row {
      Some((status, headers, body, fetched_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        let fetched_at = parse_timestamp(&fetched_at)?;

        Ok(Some(CapturedResponse {
          status,
          headers,
          body,
          fetched_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete_store(&self, store: &StoreName) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM entries WHERE store_kind = ? AND store_version = ?",
        params![store.kind.as_str(), store.version],
      )
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", store, e))?;

    let removed = conn
      .execute(
        "DELETE FROM stores WHERE kind = ? AND version = ?",
        params![store.kind.as_str(), store.version],
      )
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    Ok(removed > 0)
  }

  fn list_stores(&self) -> Result<Vec<StoreName>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT kind, version FROM stores ORDER BY kind, version")
      .map_err(|e| eyre!("Failed to prepare store listing: {}", e))?;

    let names = stmt
      .query_map([], |row| {
        let kind: String = row.get(0)?;
        let version: String = row.get(1)?;
        Ok((kind, version))
      })
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|(kind, version)| StoreKind::parse(&kind).map(|k| StoreName::new(k, version)))
      .collect();

    Ok(names)
  }

  fn list_keys(&self, store: &StoreName) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT request_identity FROM entries
         WHERE store_kind = ? AND store_version = ? ORDER BY request_identity",
      )
      .map_err(|e| eyre!("Failed to prepare key listing: {}", e))?;

    let keys = stmt
      .query_map(params![store.kind.as_str(), store.version], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", store, e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}

/// In-memory store provider.
///
/// Backs ephemeral runs and serves as the injected fake in tests; behavior
/// matches `SqliteStores` minus durability.
#[derive(Default)]
pub struct MemoryStores {
  inner: Mutex<HashMap<StoreName, HashMap<String, (String, CapturedResponse)>>>,
}

impl MemoryStores {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StoreProvider for MemoryStores {
  fn put(&self, store: &StoreName, key: &RequestKey, response: &CapturedResponse) -> Result<()> {
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    inner
      .entry(store.clone())
      .or_default()
      .insert(key.digest(), (key.identity(), response.clone()));

    Ok(())
  }

  fn get(&self, store: &StoreName, key: &RequestKey) -> Result<Option<CapturedResponse>> {
    let inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      inner
        .get(store)
        .and_then(|entries| entries.get(&key.digest()))
        .map(|(_, response)| response.clone()),
    )
  }

  fn delete_store(&self, store: &StoreName) -> Result<bool> {
    let mut inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(inner.remove(store).is_some())
  }

  fn list_stores(&self) -> Result<Vec<StoreName>> {
    let inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<StoreName> = inner.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn list_keys(&self, store: &StoreName) -> Result<Vec<String>> {
    let inner = self
      .inner
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut keys: Vec<String> = inner
      .get(store)
      .map(|entries| entries.values().map(|(identity, _)| identity.clone()).collect())
      .unwrap_or_default();
    keys.sort();
    Ok(keys)
  }
}
