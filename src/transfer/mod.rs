use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;

use crate::quotes::Quote;

pub const DEFAULT_EXPORT_FILE: &str = "quotes.json";
const EXPORT_TMP_EXTENSION: &str = "json.tmp";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid JSON format: expected an array of quotes")]
    NotAnArray,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBatch {
    pub quotes: Vec<Quote>,
    /// Array elements that could not be read as quotes.
    pub skipped: usize,
}

/// Writes the full store as a pretty JSON array, replacing `path` atomically.
pub fn export_quotes(quotes: &[Quote], path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(quotes).context("serialising quotes for export")?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating export directory {}", dir.display()))?;
    }
    let tmp_path = path.with_extension(EXPORT_TMP_EXTENSION);
    fs::write(&tmp_path, &json)
        .with_context(|| format!("writing temporary export {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("moving export into place at {}", path.display()))?;
    tracing::info!(path = %path.display(), count = quotes.len(), "exported quotes");
    Ok(())
}

pub fn import_quotes(path: &Path) -> Result<ImportBatch, ImportError> {
    let raw = fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_import(&raw)
}

/// Accepts any JSON array. Object elements are taken field-for-field; an
/// element that cannot become a quote is skipped and counted, never fatal.
pub fn parse_import(raw: &str) -> Result<ImportBatch, ImportError> {
    let Value::Array(items) = serde_json::from_str::<Value>(raw)? else {
        return Err(ImportError::NotAnArray);
    };
    let mut batch = ImportBatch::default();
    for item in items {
        match quote_from_entry(&item) {
            Some(quote) => batch.quotes.push(quote),
            None => {
                tracing::warn!(element = %item, "skipping unusable import entry");
                batch.skipped += 1;
            }
        }
    }
    Ok(batch)
}

fn quote_from_entry(item: &Value) -> Option<Quote> {
    let object = item.as_object()?;
    Some(Quote {
        text: import_field(object.get("text"))?,
        category: import_field(object.get("category"))?,
    })
}

/// Strings are kept verbatim, scalars are stringified, absent or null is empty.
fn import_field(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::Array(_) | Value::Object(_)) => None,
    }
}
