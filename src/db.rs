use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One write in a [`KvStore::apply_batch`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum KvWrite {
    Set(String, Value),
    Remove(String),
}

/// Synchronous key-value persistence holding structured JSON values.
pub trait KvStore {
    fn has(&self, key: &str) -> Result<bool>;
    fn get_value(&self, key: &str) -> Result<Option<Value>>;
    fn set_value(&self, key: &str, value: Value) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Applies the writes in order, stopping at the first failure.
    ///
    /// Stores that can roll back override this so a failed batch leaves
    /// nothing behind.
    fn apply_batch(&self, writes: Vec<KvWrite>) -> Result<()> {
        for write in writes {
            match write {
                KvWrite::Set(key, value) => self.set_value(&key, value)?,
                KvWrite::Remove(key) => self.remove(&key)?,
            }
        }
        Ok(())
    }
}

/// Typed accessors over any [`KvStore`], trait objects included.
pub trait KvStoreExt: KvStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .with_context(|| format!("stored value under '{key}' has an unexpected shape")),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)
            .with_context(|| format!("failed to encode value for '{key}'"))?;
        self.set_value(key, value)
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory().context("failed to open in-memory database")?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl KvStore for Database {
    fn has(&self, key: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM kv_store WHERE key = ?1", params![key], |_| {
                Ok(())
            })
            .optional()
            .with_context(|| format!("failed to look up key '{key}'"))?;
        Ok(found.is_some())
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read key '{key}'"))?;
        match raw {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("stored value under '{key}' is not valid JSON"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        write_value(&self.conn, key, &value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        delete_key(&self.conn, key)
    }

    fn apply_batch(&self, writes: Vec<KvWrite>) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to start a write batch")?;
        for write in &writes {
            match write {
                KvWrite::Set(key, value) => write_value(&tx, key, value)?,
                KvWrite::Remove(key) => delete_key(&tx, key)?,
            }
        }
        tx.commit().context("failed to commit a write batch")?;
        Ok(())
    }
}

fn write_value(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        r#"
        INSERT INTO kv_store (key, value, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at
        "#,
        params![key, value.to_string(), now],
    )
    .with_context(|| format!("failed to write key '{key}'"))?;
    Ok(())
}

fn delete_key(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
        .with_context(|| format!("failed to remove key '{key}'"))?;
    Ok(())
}
