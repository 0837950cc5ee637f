use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::storage::KeyValueStore;

const SESSION_TMP_EXTENSION: &str = "json.tmp";

/// Session-scoped key/value storage backed by a single snapshot file.
///
/// The file lives until [`SessionStore::end`] removes it, mirroring a browser
/// session that is discarded when the window closes.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    session_id: Uuid,
    started_at: i64,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub started_at: OffsetDateTime,
    pub keys: Vec<String>,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> Result<Option<SessionInfo>> {
        let Some(record) = self.read_record()? else {
            return Ok(None);
        };
        let started_at = OffsetDateTime::from_unix_timestamp(record.started_at)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());
        Ok(Some(SessionInfo {
            session_id: record.session_id,
            started_at,
            keys: record.entries.into_keys().collect(),
        }))
    }

    /// Ends the session, dropping every session-scoped value.
    pub fn end(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "session ended");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("removing session file {}", self.path.display()))
            }
        }
    }

    fn read_record(&self) -> Result<Option<SessionRecord>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading session file {}", self.path.display()))
            }
        };
        match serde_json::from_slice::<SessionRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                tracing::warn!(?err, path = %self.path.display(), "discarding unreadable session file");
                Ok(None)
            }
        }
    }

    fn write_record(&self, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(record).context("serialising session snapshot")?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("ensuring session dir {}", dir.display()))?;
        }
        let tmp_path = self.path.with_extension(SESSION_TMP_EXTENSION);
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary session file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("atomically persisting session file {}", self.path.display())
        })?;
        Ok(())
    }

    fn fresh_record() -> SessionRecord {
        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            started_at: OffsetDateTime::now_utc().unix_timestamp(),
            entries: BTreeMap::new(),
        };
        tracing::debug!(session_id = %record.session_id, "session started");
        record
    }
}

impl KeyValueStore for SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_record()?
            .and_then(|mut record| record.entries.remove(key)))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut record = self.read_record()?.unwrap_or_else(Self::fresh_record);
        record.entries.insert(key.to_string(), value.to_string());
        self.write_record(&record)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let Some(mut record) = self.read_record()? else {
            return Ok(());
        };
        if record.entries.remove(key).is_some() {
            self.write_record(&record)?;
        }
        Ok(())
    }
}
