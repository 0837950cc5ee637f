use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::AppConfig;
use crate::present::Presenter;
use crate::quotes::category::filter;
use crate::quotes::{CategoryIndex, Quote, QuoteStore, SharedStore, ALL_CATEGORIES};
use crate::session::{SessionInfo, SessionStore};
use crate::storage::{
    KeyValueStore, StorageHandle, LAST_QUOTE_KEY, PENDING_MERGE_KEY, SELECTED_CATEGORY_KEY,
};
use crate::sync::{
    self, BatchOrigin, Choice, Conflict, ConflictReview, CycleOutcome, CycleReport, MergeEngine,
    MergeResult, RemoteSource, ResolutionReport, SyncRunner, WatchOptions,
};
use crate::transfer::{export_quotes, import_quotes};

pub const MISSING_INPUT_MESSAGE: &str = "Please enter both a quote and a category.";

/// The quote application: store, category filter, sync and review behind one presenter.
pub struct QuoteApp<P: Presenter> {
    pub config: Arc<AppConfig>,
    storage: StorageHandle,
    session: SessionStore,
    store: SharedStore,
    categories: CategoryIndex,
    runner: Arc<SyncRunner>,
    presenter: P,
    rng: StdRng,
}

impl<P: Presenter> QuoteApp<P> {
    pub fn new(
        config: Arc<AppConfig>,
        storage: StorageHandle,
        session: SessionStore,
        remote: Arc<dyn RemoteSource>,
        mut presenter: P,
    ) -> Result<Self> {
        let store = QuoteStore::load(storage.clone())
            .context("loading stored quotes")?
            .into_shared();
        let categories = CategoryIndex::rebuild(store.lock().quotes());
        let selected = storage
            .get(SELECTED_CATEGORY_KEY)?
            .unwrap_or_else(|| ALL_CATEGORIES.to_string());
        presenter.select_filter(&selected);
        let runner = Arc::new(
            SyncRunner::new(store.clone(), MergeEngine::new(), remote)
                .with_push_after_merge(config.sync.push_after_merge),
        );
        Ok(Self {
            config,
            storage,
            session,
            store,
            categories,
            runner,
            presenter,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    pub fn quotes(&self) -> Vec<Quote> {
        self.store.lock().quotes().to_vec()
    }

    pub fn categories(&self) -> &CategoryIndex {
        &self.categories
    }

    pub fn selected_category(&self) -> String {
        self.presenter.selected_filter()
    }

    pub fn visible_quotes(&self) -> Vec<Quote> {
        let selected = self.selected_category();
        let store = self.store.lock();
        let visible: Vec<Quote> = filter(store.quotes(), &selected)
            .into_iter()
            .cloned()
            .collect();
        visible
    }

    pub fn show_random(&mut self) -> Result<Option<Quote>> {
        let visible = self.visible_quotes();
        let pick = visible.choose(&mut self.rng).cloned();
        self.presenter.render_random(pick.as_ref());
        if let Some(quote) = &pick {
            let json = serde_json::to_string(quote).context("serialising last quote")?;
            self.session.set(LAST_QUOTE_KEY, &json)?;
        }
        Ok(pick)
    }

    /// Redisplays the quote last shown in this session.
    pub fn show_last(&mut self) -> Result<Option<Quote>> {
        let last = match self.session.get(LAST_QUOTE_KEY)? {
            Some(raw) => serde_json::from_str::<Quote>(&raw)
                .map_err(|err| tracing::warn!(?err, "ignoring unreadable last quote"))
                .ok(),
            None => None,
        };
        match &last {
            Some(quote) => self.presenter.render_random(Some(quote)),
            None => self.presenter.notify("No quote has been shown in this session yet."),
        }
        Ok(last)
    }

    pub fn add_quote(&mut self, text: &str, category: &str) -> Result<Quote> {
        let quote = match Quote::new_checked(text, category) {
            Ok(quote) => quote,
            Err(err) => {
                self.presenter.notify(MISSING_INPUT_MESSAGE);
                return Err(err.into());
            }
        };
        self.store
            .lock()
            .add(quote.clone())
            .context("saving new quote")?;
        self.refresh();
        self.presenter.render_random(Some(&quote));
        self.presenter.notify("New quote added successfully!");
        tracing::info!(category = %quote.category, "quote added");
        Ok(quote)
    }

    pub fn list(&mut self) {
        let visible = self.visible_quotes();
        self.presenter.render_list(&visible);
    }

    pub fn show_categories(&mut self) {
        let selected = self.selected_category();
        let categories: Vec<&str> = self.categories.categories().collect();
        self.presenter.render_categories(&categories, &selected);
    }

    /// Persists `category` as the active filter and renders the filtered list.
    pub fn set_filter(&mut self, category: &str) -> Result<()> {
        let category = match category.trim() {
            "" => ALL_CATEGORIES,
            trimmed => trimmed,
        };
        self.storage
            .set(SELECTED_CATEGORY_KEY, category)
            .context("saving selected category")?;
        self.presenter.select_filter(category);
        if !self.categories.contains(category) {
            self.presenter
                .notify(&format!("No quotes in category '{category}' yet."));
        }
        self.list();
        Ok(())
    }

    pub fn export(&mut self, path: &Path) -> Result<usize> {
        let quotes = self.quotes();
        export_quotes(&quotes, path)?;
        self.presenter.notify(&format!(
            "Exported {} quote{} to {}",
            quotes.len(),
            plural(quotes.len()),
            path.display()
        ));
        Ok(quotes.len())
    }

    pub fn import(&mut self, path: &Path) -> Result<usize> {
        let batch = match import_quotes(path) {
            Ok(batch) => batch,
            Err(err) => {
                self.presenter.notify(&format!("Import failed: {err}"));
                return Err(err).with_context(|| format!("importing {}", path.display()));
            }
        };
        let imported = self
            .store
            .lock()
            .extend(batch.quotes)
            .context("saving imported quotes")?;
        self.refresh();
        self.list();
        if batch.skipped > 0 {
            self.presenter.notify(&format!(
                "Skipped {} entr{} that could not be read as quotes.",
                batch.skipped,
                if batch.skipped == 1 { "y" } else { "ies" }
            ));
        }
        self.presenter.notify("Quotes imported successfully!");
        tracing::info!(imported, skipped = batch.skipped, "import complete");
        Ok(imported)
    }

    pub fn sync_once(&mut self) -> Result<Option<CycleReport>> {
        match self.runner.run_cycle()? {
            CycleOutcome::Skipped => {
                self.presenter.notify("A sync is already running.");
                Ok(None)
            }
            CycleOutcome::Completed(report) => {
                self.absorb(&report)?;
                Ok(Some(report))
            }
        }
    }

    /// Folds a finished cycle into the app: notices, category index and pending review.
    pub fn absorb(&mut self, report: &CycleReport) -> Result<()> {
        if let BatchOrigin::Fallback { reason } = &report.origin {
            self.presenter
                .notify(&format!("Server unavailable ({reason}); merged offline quotes."));
        }
        self.refresh();
        self.list();
        if report.result.has_conflicts() {
            let json =
                serde_json::to_string(&report.result).context("serialising merge result")?;
            self.session.set(PENDING_MERGE_KEY, &json)?;
        } else {
            self.session.remove(PENDING_MERGE_KEY)?;
        }
        self.presenter.notify(&format_merge_summary(&report.result));
        match &report.push {
            Some(Ok(())) => self.presenter.notify("Local quotes pushed to server."),
            Some(Err(err)) => self.presenter.notify(&format!("Push failed: {err}")),
            None => {}
        }
        Ok(())
    }

    pub fn pending_conflicts(&self) -> Result<Vec<Conflict>> {
        Ok(self
            .load_pending()?
            .map(|result| result.conflicts)
            .unwrap_or_default())
    }

    /// Reverts the conflicts at `local` (0-based) to their pre-merge category.
    pub fn review(&mut self, local: &[usize]) -> Result<Option<ResolutionReport>> {
        let mut review = ConflictReview::with_pending(self.load_pending()?);
        if !review.begin() {
            self.presenter.notify("No conflicts to review.");
            return Ok(None);
        }
        for &index in local {
            review.choose(index, Choice::Local)?;
        }
        let report = {
            let mut store = self.store.lock();
            review.apply(&mut store, self.runner.engine())?
        };
        self.session.remove(PENDING_MERGE_KEY)?;
        self.refresh();
        self.list();
        self.presenter.notify(&format!(
            "Review applied: {} reverted to local, {} restored, {} kept from server.",
            report.reverted, report.reinserted, report.kept_remote
        ));
        Ok(Some(report))
    }

    /// Accepts every remote value from the last merge.
    pub fn dismiss(&mut self) -> Result<bool> {
        let had_pending = self.load_pending()?.is_some();
        self.session.remove(PENDING_MERGE_KEY)?;
        if had_pending {
            self.presenter.notify("Kept all server changes.");
        } else {
            self.presenter.notify("No conflicts to review.");
        }
        Ok(had_pending)
    }

    pub fn push(&mut self) -> Result<()> {
        match self.runner.push_now() {
            Ok(count) => self
                .presenter
                .notify(&format!("Pushed {count} quote{} to server.", plural(count))),
            Err(err) => {
                tracing::warn!(%err, "manual push failed");
                self.presenter.notify(&format!("Push failed: {err}"));
            }
        }
        Ok(())
    }

    /// Runs periodic sync until the cycle budget is spent, then ends the session.
    pub fn watch(&mut self, options: WatchOptions) -> Result<u64> {
        let runner = Arc::clone(&self.runner);
        tracing::info!(interval = ?options.interval, max_cycles = ?options.max_cycles, "watching remote");
        let completed = sync::watch(runner, options, |report| self.absorb(&report))?;
        self.end_session()?;
        Ok(completed)
    }

    /// Discards session values, returning what the ended session held.
    pub fn end_session(&mut self) -> Result<Option<SessionInfo>> {
        let info = self.session.info()?;
        self.session.end()?;
        Ok(info)
    }

    fn load_pending(&self) -> Result<Option<MergeResult>> {
        let Some(raw) = self.session.get(PENDING_MERGE_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(result) => Ok(Some(result)),
            Err(err) => {
                tracing::warn!(?err, "discarding unreadable pending merge");
                self.session.remove(PENDING_MERGE_KEY)?;
                Ok(None)
            }
        }
    }

    fn refresh(&mut self) {
        self.categories = CategoryIndex::rebuild(self.store.lock().quotes());
    }
}

pub fn format_merge_summary(result: &MergeResult) -> String {
    if result.is_empty() {
        return "Sync complete: already up to date.".to_string();
    }
    let mut summary = format!(
        "Sync complete: {} added, {} updated",
        result.added.len(),
        result.updated.len()
    );
    let conflicts = result.conflicts.len();
    if conflicts > 0 {
        summary.push_str(&format!(
            " ({conflicts} conflict{} awaiting review)",
            plural(conflicts)
        ));
    }
    summary
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPaths;
    use crate::present::tests::RecordingPresenter;
    use crate::quotes::{default_quotes, QuoteError};
    use crate::storage::{self, QUOTES_KEY};
    use crate::sync::StaticRemote;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        temp: TempDir,
        app: QuoteApp<RecordingPresenter>,
        remote: Arc<StaticRemote>,
    }

    fn harness(local: Option<&str>, remote_batch: Vec<Quote>) -> anyhow::Result<Harness> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::rooted_at(temp.path());
        paths.ensure_directories()?;
        let mut config = AppConfig::default();
        config.storage.database_path = paths.database_path.clone();
        config.storage.session_file = paths.session_file.clone();
        let storage = storage::init(&config.storage)?;
        if let Some(local) = local {
            storage.set(QUOTES_KEY, local)?;
        }
        let remote = Arc::new(StaticRemote::new(remote_batch, BatchOrigin::Remote));
        let app = QuoteApp::new(
            Arc::new(config),
            storage,
            SessionStore::new(paths.session_file),
            remote.clone(),
            RecordingPresenter::new(),
        )?
        .with_rng(StdRng::seed_from_u64(7));
        Ok(Harness { temp, app, remote })
    }

    #[test]
    fn add_rejects_blank_input_without_touching_the_store() -> anyhow::Result<()> {
        let mut h = harness(None, Vec::new())?;
        let err = h.app.add_quote("   ", "Life").unwrap_err();
        assert_eq!(err.downcast_ref::<QuoteError>(), Some(&QuoteError::MissingText));
        assert_eq!(h.app.presenter().notices, vec![MISSING_INPUT_MESSAGE]);
        assert_eq!(h.app.quotes(), default_quotes());
        Ok(())
    }

    #[test]
    fn add_keeps_duplicates_and_updates_categories() -> anyhow::Result<()> {
        let mut h = harness(Some("[]"), Vec::new())?;
        h.app.add_quote(" Ship it. ", " Work ")?;
        h.app.add_quote("Ship it.", "Work")?;

        assert_eq!(
            h.app.quotes(),
            vec![Quote::new("Ship it.", "Work"), Quote::new("Ship it.", "Work")]
        );
        assert!(h.app.categories().contains("Work"));
        assert_eq!(
            h.app.presenter().randoms.last(),
            Some(&Some(Quote::new("Ship it.", "Work")))
        );
        Ok(())
    }

    #[test]
    fn random_quote_respects_filter_and_is_remembered() -> anyhow::Result<()> {
        let mut h = harness(None, Vec::new())?;
        h.app.set_filter("Courage")?;

        let shown = h.app.show_random()?;
        assert_eq!(
            shown,
            Some(Quote::new("Do one thing every day that scares you.", "Courage"))
        );

        let last = h.app.show_last()?;
        assert_eq!(last, shown);
        Ok(())
    }

    #[test]
    fn selected_filter_persists_and_stale_filter_is_empty() -> anyhow::Result<()> {
        let mut h = harness(None, Vec::new())?;
        h.app.set_filter("Vanished")?;
        assert!(h.app.visible_quotes().is_empty());
        assert_eq!(h.app.presenter().lists.last(), Some(&Vec::new()));

        let paths = ConfigPaths::rooted_at(h.temp.path());
        let mut config = AppConfig::default();
        config.storage.database_path = paths.database_path.clone();
        let reopened = QuoteApp::new(
            Arc::new(config.clone()),
            storage::init(&config.storage)?,
            SessionStore::new(paths.session_file),
            h.remote.clone(),
            RecordingPresenter::new(),
        )?;
        assert_eq!(reopened.selected_category(), "Vanished");
        assert!(reopened.visible_quotes().is_empty());
        Ok(())
    }

    #[test]
    fn import_of_empty_array_succeeds_without_changes() -> anyhow::Result<()> {
        let mut h = harness(None, Vec::new())?;
        let path = h.temp.path().join("empty.json");
        fs::write(&path, "[]")?;

        assert_eq!(h.app.import(&path)?, 0);
        assert_eq!(h.app.quotes(), default_quotes());
        assert_eq!(
            h.app.presenter().notices.last().map(String::as_str),
            Some("Quotes imported successfully!")
        );
        Ok(())
    }

    #[test]
    fn import_of_object_is_rejected_and_surfaced() -> anyhow::Result<()> {
        let mut h = harness(None, Vec::new())?;
        let path = h.temp.path().join("object.json");
        fs::write(&path, r#"{"not":"an array"}"#)?;

        assert!(h.app.import(&path).is_err());
        assert_eq!(h.app.quotes(), default_quotes());
        assert!(h.app.presenter().notices[0].starts_with("Import failed"));
        Ok(())
    }

    #[test]
    fn import_keeps_good_entries_next_to_loose_ones() -> anyhow::Result<()> {
        let mut h = harness(Some("[]"), Vec::new())?;
        let path = h.temp.path().join("mixed.json");
        fs::write(
            &path,
            r#"[{"text":"Good","category":"X"},{"text":"Other","category":null},[1]]"#,
        )?;

        assert_eq!(h.app.import(&path)?, 2);
        assert_eq!(
            h.app.quotes(),
            vec![Quote::new("Good", "X"), Quote::new("Other", "")]
        );
        assert!(h
            .app
            .presenter()
            .notices
            .iter()
            .any(|notice| notice.starts_with("Skipped 1 entry")));
        Ok(())
    }

    #[test]
    fn export_then_import_appends_a_copy() -> anyhow::Result<()> {
        let mut h = harness(Some(r#"[{"text":"A","category":"X"}]"#), Vec::new())?;
        let path = h.temp.path().join("backup.json");
        h.app.export(&path)?;
        h.app.import(&path)?;
        assert_eq!(h.app.quotes(), vec![Quote::new("A", "X"), Quote::new("A", "X")]);
        Ok(())
    }

    #[test]
    fn sync_then_review_restores_local_category() -> anyhow::Result<()> {
        let mut h = harness(
            Some(r#"[{"text":"A","category":"X"}]"#),
            vec![Quote::new("A", "Y"), Quote::new("B", "Z")],
        )?;

        let report = h.app.sync_once()?.expect("cycle completed");
        assert_eq!(report.result.conflicts.len(), 1);
        assert_eq!(
            h.app.presenter().notices.last().map(String::as_str),
            Some("Sync complete: 1 added, 1 updated (1 conflict awaiting review)")
        );
        assert_eq!(h.app.pending_conflicts()?.len(), 1);

        let resolution = h.app.review(&[0])?.expect("review applied");
        assert_eq!(resolution.reverted, 1);
        assert_eq!(
            h.app.quotes(),
            vec![Quote::new("A", "X"), Quote::new("B", "Z")]
        );
        assert!(h.app.pending_conflicts()?.is_empty());
        assert_eq!(h.app.review(&[])?, None);

        h.app.sync_once()?;
        assert_eq!(h.app.quotes()[0], Quote::new("A", "Y"));
        Ok(())
    }

    #[test]
    fn dismiss_accepts_server_values() -> anyhow::Result<()> {
        let mut h = harness(
            Some(r#"[{"text":"A","category":"X"}]"#),
            vec![Quote::new("A", "Y")],
        )?;
        h.app.sync_once()?;
        assert!(h.app.dismiss()?);
        assert!(!h.app.dismiss()?);
        assert_eq!(h.app.quotes(), vec![Quote::new("A", "Y")]);
        Ok(())
    }

    #[test]
    fn push_sends_current_store() -> anyhow::Result<()> {
        let mut h = harness(Some(r#"[{"text":"A","category":"X"}]"#), Vec::new())?;
        h.app.push()?;
        assert_eq!(h.remote.pushes(), vec![vec![Quote::new("A", "X")]]);
        Ok(())
    }

    #[test]
    fn watch_ends_the_session_when_done() -> anyhow::Result<()> {
        let mut h = harness(
            Some(r#"[{"text":"A","category":"X"}]"#),
            vec![Quote::new("A", "Y")],
        )?;
        h.app.show_random()?;
        let session_file = ConfigPaths::rooted_at(h.temp.path()).session_file;
        assert!(session_file.exists());

        let completed = h.app.watch(WatchOptions {
            interval: Duration::from_millis(10),
            max_cycles: Some(2),
        })?;

        assert_eq!(completed, 2);
        assert!(!session_file.exists());
        assert_eq!(h.app.quotes(), vec![Quote::new("A", "Y")]);
        Ok(())
    }

    #[test]
    fn sync_and_import_rerender_the_filtered_list() -> anyhow::Result<()> {
        let mut h = harness(
            Some(r#"[{"text":"A","category":"X"}]"#),
            vec![Quote::new("B", "Z")],
        )?;
        h.app.sync_once()?;
        assert_eq!(
            h.app.presenter().lists,
            vec![vec![Quote::new("A", "X"), Quote::new("B", "Z")]]
        );

        h.app.set_filter("W")?;
        let path = h.temp.path().join("more.json");
        fs::write(&path, r#"[{"text":"C","category":"W"}]"#)?;
        h.app.import(&path)?;
        assert_eq!(
            h.app.presenter().lists.last(),
            Some(&vec![Quote::new("C", "W")])
        );
        assert_eq!(h.app.presenter().lists.len(), 3);
        Ok(())
    }

    #[test]
    fn end_session_reports_what_was_discarded() -> anyhow::Result<()> {
        let mut h = harness(Some(r#"[{"text":"A","category":"X"}]"#), Vec::new())?;
        assert!(h.app.end_session()?.is_none());

        h.app.show_random()?;
        let info = h.app.end_session()?.expect("session was active");
        assert_eq!(info.keys, vec![LAST_QUOTE_KEY.to_string()]);
        assert_eq!(h.app.show_last()?, None);
        Ok(())
    }

    #[test]
    fn summary_for_quiet_cycle() {
        let result = MergeResult::empty(time::OffsetDateTime::UNIX_EPOCH);
        assert_eq!(
            format_merge_summary(&result),
            "Sync complete: already up to date."
        );
    }
}
