//! SQLite-backed option store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::OptionStore;
use crate::error::HarvestError;

struct State {
  conn: Connection,
  /// Last saved values plus staged changes, as callers see them
  values: BTreeMap<String, String>,
  /// Changes since the last save; `None` marks a removal
  staged: BTreeMap<String, Option<String>>,
}

/// Option store persisted in a single SQLite table.
pub struct SqliteOptions {
  state: Mutex<State>,
}

impl SqliteOptions {
  /// Open the option store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  /// Open or create the option store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open option store at {}: {}", path.display(), e))?;

    conn
      .execute_batch(OPTIONS_SCHEMA)
      .map_err(|e| eyre!("Failed to run option store migrations: {}", e))?;

    let values = load_values(&conn)?;
    debug!(path = %path.display(), count = values.len(), "loaded options");

    Ok(Self {
      state: Mutex::new(State {
        conn,
        values,
        staged: BTreeMap::new(),
      }),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("hrvst").join("options.db"))
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Schema for the option table.
const OPTIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS options (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

fn load_values(conn: &Connection) -> Result<BTreeMap<String, String>> {
  let mut stmt = conn
    .prepare("SELECT key, value FROM options")
    .map_err(|e| eyre!("Failed to prepare option query: {}", e))?;

  let rows = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
    .map_err(|e| eyre!("Failed to query options: {}", e))?;

  rows
    .collect::<rusqlite::Result<BTreeMap<_, _>>>()
    .map_err(|e| eyre!("Failed to read options: {}", e))
}

impl OptionStore for SqliteOptions {
  fn get(&self, key: &str) -> Option<String> {
    self.state().values.get(key).cloned()
  }

  fn set(&self, key: &str, value: &str) {
    let mut state = self.state();
    state.values.insert(key.to_string(), value.to_string());
    state
      .staged
      .insert(key.to_string(), Some(value.to_string()));
  }

  fn remove(&self, key: &str) {
    let mut state = self.state();
    state.values.remove(key);
    state.staged.insert(key.to_string(), None);
  }

  fn save(&self) -> crate::error::Result<()> {
    let mut state = self.state();
    if state.staged.is_empty() {
      return Ok(());
    }

    let storage = |e: rusqlite::Error| HarvestError::Storage(e.to_string());

    let tx = state.conn.unchecked_transaction().map_err(storage)?;
    for (key, value) in &state.staged {
      match value {
        Some(value) => tx
          .execute(
            "INSERT OR REPLACE INTO options (key, value, updated_at) VALUES (?, ?, datetime('now'))",
            params![key, value],
          )
          .map_err(storage)?,
        None => tx
          .execute("DELETE FROM options WHERE key = ?", params![key])
          .map_err(storage)?,
      };
    }
    tx.commit().map_err(storage)?;

    debug!(count = state.staged.len(), "saved options");
    state.staged.clear();
    Ok(())
  }
}
