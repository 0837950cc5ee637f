use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::StorageOptions;

mod schema;

pub const QUOTES_KEY: &str = "quotes";
pub const SELECTED_CATEGORY_KEY: &str = "selectedCategory";
pub const LAST_QUOTE_KEY: &str = "lastQuote";
pub const PENDING_MERGE_KEY: &str = "pendingMerge";

/// String-valued get/set storage, shared by the durable and session scopes.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }
}

impl KeyValueStore for StorageHandle {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("reading key '{key}'"))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key '{key}'"))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("removing key '{key}'"))?;
            Ok(())
        })
    }
}

pub fn init(storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "quote storage ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy timeout")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConfigPaths;
    use tempfile::TempDir;

    pub(crate) fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        options.session_file = paths.session_file.clone();
        let storage = init(&options)?;
        Ok((temp, storage))
    }

    #[test]
    fn set_then_get_overwrites_previous_value() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_eq!(storage.get(QUOTES_KEY)?, None);

        storage.set(QUOTES_KEY, "[]")?;
        storage.set(QUOTES_KEY, r#"[{"text":"A","category":"X"}]"#)?;

        assert_eq!(
            storage.get(QUOTES_KEY)?.as_deref(),
            Some(r#"[{"text":"A","category":"X"}]"#)
        );
        Ok(())
    }

    #[test]
    fn values_survive_a_fresh_handle() -> anyhow::Result<()> {
        let (temp, storage) = init_storage()?;
        storage.set(SELECTED_CATEGORY_KEY, "Life")?;

        let paths = ConfigPaths::rooted_at(temp.path());
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path;
        let reopened = init(&options)?;
        assert_eq!(reopened.get(SELECTED_CATEGORY_KEY)?.as_deref(), Some("Life"));
        Ok(())
    }

    #[test]
    fn remove_is_a_noop_for_missing_keys() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.remove("absent")?;
        storage.set("present", "1")?;
        storage.remove("present")?;
        assert_eq!(storage.get("present")?, None);
        Ok(())
    }
}
