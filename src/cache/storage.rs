//! SQLite-backed local cache.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::traits::LocalCache;

/// A stored slot and when it was last written.
#[derive(Debug, Clone)]
pub struct SlotInfo {
  pub name: String,
  pub written_at: DateTime<Utc>,
}

/// SQLite-based local cache, one row per slot.
pub struct SqliteCache {
  conn: Mutex<Connection>,
}

impl SqliteCache {
  /// Open the cache at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open the cache at the given path, creating parent directories.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a cache that lives only as long as this value.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let cache = Self {
      conn: Mutex::new(conn),
    };
    cache.run_migrations()?;
    Ok(cache)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("studysync").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  /// Raw text stored in a slot, without deserializing it.
  pub fn read_raw(&self, name: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT data FROM cache_entries WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache slot {}: {}", name, e))
  }

  /// Store raw text in a slot. The text is not validated.
  pub fn write_raw(&self, name: &str, data: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (name, data, written_at)
         VALUES (?, ?, datetime('now'))",
        params![name, data],
      )
      .map_err(|e| eyre!("Failed to write cache slot {}: {}", name, e))?;

    Ok(())
  }

  fn delete(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to remove cache slot {}: {}", name, e))?;

    Ok(())
  }

  /// Every slot with its last write time, ordered by name.
  pub fn entries(&self) -> Result<Vec<SlotInfo>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name, written_at FROM cache_entries ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to list cache slots: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    rows
      .into_iter()
      .map(|(name, written_at)| {
        Ok(SlotInfo {
          name,
          written_at: parse_datetime(&written_at)?,
        })
      })
      .collect()
  }
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    name TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl LocalCache for SqliteCache {
  fn read(&self, name: &str) -> Option<Value> {
    let raw = match self.read_raw(name) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(slot = name, error = %e, "cache read failed");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(value) => Some(value),
      Err(e) => {
        debug!(slot = name, error = %e, "discarding malformed cache slot");
        None
      }
    }
  }

  fn write(&self, name: &str, value: &Value) {
    let data = value.to_string();
    if let Err(e) = self.write_raw(name, &data) {
      warn!(slot = name, error = %e, "cache write failed");
    }
  }

  fn remove(&self, name: &str) {
    if let Err(e) = self.delete(name) {
      warn!(slot = name, error = %e, "cache remove failed");
    }
  }

  fn names(&self) -> Vec<String> {
    match self.entries() {
      Ok(entries) => entries.into_iter().map(|e| e.name).collect(),
      Err(e) => {
        warn!(error = %e, "cache listing failed");
        Vec::new()
      }
    }
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
