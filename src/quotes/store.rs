use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use super::{default_quotes, Quote, RemoteQuote};
use crate::storage::{KeyValueStore, StorageHandle, QUOTES_KEY};
use crate::sync::merge::{MergeEngine, MergeResult};

/// Handle shared between the sync runner, the conflict review and the app.
pub type SharedStore = Arc<Mutex<QuoteStore>>;

/// Ordered quote list mirrored wholesale to durable storage after every mutation.
pub struct QuoteStore {
    quotes: Vec<Quote>,
    storage: StorageHandle,
}

impl QuoteStore {
    /// Loads the persisted list, seeding the first-run quotes when nothing is stored.
    pub fn load(storage: StorageHandle) -> Result<Self> {
        let quotes = match storage.get(QUOTES_KEY)? {
            Some(raw) => match serde_json::from_str::<Vec<Quote>>(&raw) {
                Ok(quotes) => quotes,
                Err(err) => {
                    tracing::warn!(?err, "stored quotes are unreadable, starting from defaults");
                    default_quotes()
                }
            },
            None => {
                tracing::info!("no stored quotes, seeding first-run quotes");
                default_quotes()
            }
        };
        Ok(Self { quotes, storage })
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// Appends a quote without deduplicating its text.
    pub fn add(&mut self, quote: Quote) -> Result<()> {
        self.edit(|quotes| quotes.push(quote))
    }

    pub fn extend(&mut self, batch: Vec<Quote>) -> Result<usize> {
        let count = batch.len();
        if count == 0 {
            return Ok(0);
        }
        self.edit(|quotes| quotes.extend(batch))?;
        Ok(count)
    }

    pub fn apply_merge(
        &mut self,
        engine: &MergeEngine,
        remote: &[RemoteQuote],
    ) -> Result<MergeResult> {
        let result = engine.merge(&mut self.quotes, remote);
        if !result.is_empty() {
            self.persist().context("persisting merged quotes")?;
        }
        Ok(result)
    }

    /// Runs `f` against the list and persists the outcome.
    pub fn edit<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Quote>) -> T,
    {
        let value = f(&mut self.quotes);
        self.persist()?;
        Ok(value)
    }

    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.quotes).context("serialising quotes")?;
        self.storage.set(QUOTES_KEY, &json)?;
        tracing::trace!(count = self.quotes.len(), "quotes persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::init_storage;

    #[test]
    fn first_load_seeds_defaults_without_writing() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let store = QuoteStore::load(storage.clone())?;
        assert_eq!(store.quotes(), default_quotes().as_slice());
        assert_eq!(storage.get(QUOTES_KEY)?, None);
        Ok(())
    }

    #[test]
    fn mutations_are_written_through() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut store = QuoteStore::load(storage.clone())?;
        store.add(Quote::new("Fresh", "New"))?;
        store.add(Quote::new("Fresh", "New"))?;

        let reloaded = QuoteStore::load(storage)?;
        assert_eq!(reloaded.len(), default_quotes().len() + 2);
        assert_eq!(reloaded.quotes().last(), Some(&Quote::new("Fresh", "New")));
        Ok(())
    }

    #[test]
    fn unreadable_payload_falls_back_to_defaults() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set(QUOTES_KEY, "{broken")?;
        let store = QuoteStore::load(storage.clone())?;
        assert_eq!(store.len(), default_quotes().len());
        assert_eq!(storage.get(QUOTES_KEY)?.as_deref(), Some("{broken"));
        Ok(())
    }

    #[test]
    fn no_op_merge_skips_the_write() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set(QUOTES_KEY, r#"[{"text":"A","category":"X"}]"#)?;
        let mut store = QuoteStore::load(storage.clone())?;
        storage.remove(QUOTES_KEY)?;

        let result = store.apply_merge(&MergeEngine::new(), &[Quote::new("A", "X")])?;
        assert!(result.is_empty());
        assert_eq!(storage.get(QUOTES_KEY)?, None);

        store.apply_merge(&MergeEngine::new(), &[Quote::new("B", "Y")])?;
        assert!(storage.get(QUOTES_KEY)?.is_some());
        Ok(())
    }
}
