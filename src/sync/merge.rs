use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::quotes::{Quote, RemoteQuote};

/// Extracts the join key used to decide whether two quotes are "the same".
pub type KeyFn = Arc<dyn Fn(&Quote) -> String + Send + Sync>;

/// Default identity: whitespace-trimmed, case-sensitive text.
pub fn text_key(quote: &Quote) -> String {
    quote.text.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub before: Quote,
    pub after: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "localBefore")]
    pub local_before: Quote,
    pub server: RemoteQuote,
}

/// Outcome of a single merge cycle. Only the most recent one is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub added: Vec<RemoteQuote>,
    pub updated: Vec<QuoteUpdate>,
    pub conflicts: Vec<Conflict>,
    #[serde(rename = "mergedAt", with = "time::serde::rfc3339")]
    pub merged_at: OffsetDateTime,
}

impl MergeResult {
    pub fn empty(merged_at: OffsetDateTime) -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            conflicts: Vec::new(),
            merged_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.conflicts.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Reconciles a remote batch into the local quote list, remote wins.
#[derive(Clone)]
pub struct MergeEngine {
    key: KeyFn,
}

impl fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeEngine").finish_non_exhaustive()
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::with_key(Arc::new(text_key))
    }
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: KeyFn) -> Self {
        Self { key }
    }

    pub fn key(&self, quote: &Quote) -> String {
        (self.key)(quote)
    }

    /// Merges `remote` into `local` in place.
    ///
    /// Unknown remote quotes are appended; known ones whose category differs
    /// are overwritten with the remote category and reported as conflicts.
    /// Local-only quotes are never removed. Remote records sharing a key
    /// collapse into one entry at the first position, carrying the last values.
    pub fn merge(&self, local: &mut Vec<Quote>, remote: &[RemoteQuote]) -> MergeResult {
        let mut result = MergeResult::empty(OffsetDateTime::now_utc());

        let mut local_index: HashMap<String, usize> = local
            .iter()
            .enumerate()
            .map(|(idx, quote)| (self.key(quote), idx))
            .collect();

        let mut remote_index: IndexMap<String, &RemoteQuote> = IndexMap::new();
        for record in remote {
            remote_index.insert(self.key(record), record);
        }

        for (key, server) in remote_index {
            match local_index.get(&key).copied() {
                None => {
                    local.push(server.clone());
                    local_index.insert(key, local.len() - 1);
                    result.added.push(server.clone());
                }
                Some(idx) => {
                    let current = &mut local[idx];
                    if current.category == server.category {
                        continue;
                    }
                    let before = current.clone();
                    current.category = server.category.clone();
                    result.updated.push(QuoteUpdate {
                        before: before.clone(),
                        after: current.clone(),
                    });
                    result.conflicts.push(Conflict {
                        local_before: before,
                        server: server.clone(),
                    });
                }
            }
        }

        tracing::debug!(
            added = result.added.len(),
            updated = result.updated.len(),
            conflicts = result.conflicts.len(),
            total = local.len(),
            "merged remote batch"
        );
        result
    }
}
