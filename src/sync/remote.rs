use anyhow::Context;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde_json::Value;
use thiserror::Error;

use crate::config::SyncOptions;
use crate::quotes::{Quote, RemoteQuote, DEFAULT_CATEGORY};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote answered with HTTP {0}")]
    Status(u16),
    #[error("remote body is not valid JSON: {0}")]
    Body(#[from] serde_json::Error),
    #[error("remote body is not a JSON array")]
    NotAnArray,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOrigin {
    Remote,
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub quotes: Vec<RemoteQuote>,
    pub origin: BatchOrigin,
}

impl FetchOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, BatchOrigin::Fallback { .. })
    }
}

/// Source of remote quotes. Fetching never fails: errors degrade to a fallback batch.
pub trait RemoteSource: Send + Sync {
    fn fetch_batch(&self) -> FetchOutcome;
    fn push(&self, quotes: &[Quote]) -> Result<(), SyncError>;
}

#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub text_fields: Vec<String>,
    pub category_field: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::from(&SyncOptions::default())
    }
}

impl From<&SyncOptions> for FieldMapping {
    fn from(options: &SyncOptions) -> Self {
        Self {
            text_fields: options.text_fields.clone(),
            category_field: options.category_field.clone(),
        }
    }
}

/// Canned batch substituted whenever the remote cannot be read.
pub fn fallback_batch() -> Vec<RemoteQuote> {
    vec![
        Quote::new(
            "In the middle of difficulty lies opportunity.",
            "Motivation",
        ),
        Quote::new("Simplicity is the ultimate sophistication.", "Design"),
        Quote::new("Well begun is half done.", DEFAULT_CATEGORY),
    ]
}

/// Turns raw remote records into quotes, silently dropping those without usable text.
pub fn normalize_batch(records: &[Value], mapping: &FieldMapping) -> Vec<RemoteQuote> {
    records
        .iter()
        .filter_map(|record| {
            let object = record.as_object()?;
            let text = mapping
                .text_fields
                .iter()
                .find_map(|field| object.get(field).and_then(coerce_field))?;
            let category = object
                .get(&mapping.category_field)
                .and_then(coerce_field)
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
            Some(Quote::new(text, category))
        })
        .collect()
}

fn coerce_field(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

pub struct HttpRemote {
    client: Client,
    endpoint: String,
    push_endpoint: String,
    mapping: FieldMapping,
}

impl HttpRemote {
    pub fn new(options: &SyncOptions) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            endpoint: options.endpoint.clone(),
            push_endpoint: options.push_target().to_string(),
            mapping: FieldMapping::from(options),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn try_fetch(&self) -> Result<Vec<RemoteQuote>, SyncError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(CACHE_CONTROL, "no-cache")
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        let body = response.text()?;
        let Value::Array(records) = serde_json::from_str::<Value>(&body)? else {
            return Err(SyncError::NotAnArray);
        };
        let quotes = normalize_batch(&records, &self.mapping);
        if quotes.len() < records.len() {
            tracing::debug!(
                dropped = records.len() - quotes.len(),
                "dropped remote records without usable text"
            );
        }
        Ok(quotes)
    }
}

impl RemoteSource for HttpRemote {
    fn fetch_batch(&self) -> FetchOutcome {
        match self.try_fetch() {
            Ok(quotes) => {
                tracing::info!(endpoint = %self.endpoint, count = quotes.len(), "fetched remote quotes");
                FetchOutcome {
                    quotes,
                    origin: BatchOrigin::Remote,
                }
            }
            Err(err) => {
                tracing::warn!(endpoint = %self.endpoint, %err, "remote fetch failed, using fallback quotes");
                FetchOutcome {
                    quotes: fallback_batch(),
                    origin: BatchOrigin::Fallback {
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    fn push(&self, quotes: &[Quote]) -> Result<(), SyncError> {
        let body = serde_json::to_string(quotes)?;
        let response = self
            .client
            .post(&self.push_endpoint)
            .header(CONTENT_TYPE, "application/json; charset=UTF-8")
            .body(body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        tracing::info!(endpoint = %self.push_endpoint, count = quotes.len(), "pushed local quotes");
        Ok(())
    }
}

/// In-process source serving a fixed batch; used when no endpoint is configured.
pub struct StaticRemote {
    batch: Vec<RemoteQuote>,
    origin: BatchOrigin,
    pushed: Mutex<Vec<Vec<Quote>>>,
}

impl StaticRemote {
    pub fn new(batch: Vec<RemoteQuote>, origin: BatchOrigin) -> Self {
        Self {
            batch,
            origin,
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn offline() -> Self {
        Self::new(
            fallback_batch(),
            BatchOrigin::Fallback {
                reason: "no sync endpoint configured".to_string(),
            },
        )
    }

    pub fn pushes(&self) -> Vec<Vec<Quote>> {
        self.pushed.lock().clone()
    }
}

impl RemoteSource for StaticRemote {
    fn fetch_batch(&self) -> FetchOutcome {
        FetchOutcome {
            quotes: self.batch.clone(),
            origin: self.origin.clone(),
        }
    }

    fn push(&self, quotes: &[Quote]) -> Result<(), SyncError> {
        self.pushed.lock().push(quotes.to_vec());
        Ok(())
    }
}
