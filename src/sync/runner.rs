use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{select, tick, unbounded, Sender};

use super::merge::{MergeEngine, MergeResult};
use super::remote::{BatchOrigin, RemoteSource, SyncError};
use crate::quotes::SharedStore;

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub result: MergeResult,
    pub origin: BatchOrigin,
    pub generation: u64,
    /// Outcome of the optional push that follows the merge.
    pub push: Option<Result<(), String>>,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Another cycle was still running; nothing was fetched.
    Skipped,
    Completed(CycleReport),
}

/// Runs fetch → merge → persist cycles, never more than one at a time.
pub struct SyncRunner {
    store: SharedStore,
    engine: MergeEngine,
    remote: Arc<dyn RemoteSource>,
    push_after_merge: bool,
    in_flight: AtomicBool,
    generation: AtomicU64,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncRunner {
    pub fn new(store: SharedStore, engine: MergeEngine, remote: Arc<dyn RemoteSource>) -> Self {
        Self {
            store,
            engine,
            remote,
            push_after_merge: false,
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_push_after_merge(mut self, enabled: bool) -> Self {
        self.push_after_merge = enabled;
        self
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of cycles completed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("sync cycle already in flight, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let fetched = self.remote.fetch_batch();
        let (result, snapshot) = {
            let mut store = self.store.lock();
            let result = store
                .apply_merge(&self.engine, &fetched.quotes)
                .context("applying remote batch")?;
            let snapshot = self.push_after_merge.then(|| store.quotes().to_vec());
            (result, snapshot)
        };

        let push = snapshot.map(|quotes| {
            self.remote.push(&quotes).map_err(|err| {
                tracing::warn!(%err, "push after merge failed");
                err.to_string()
            })
        });

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(
            generation,
            added = result.added.len(),
            conflicts = result.conflicts.len(),
            fallback = fetched.is_fallback(),
            "sync cycle complete"
        );
        Ok(CycleOutcome::Completed(CycleReport {
            result,
            origin: fetched.origin,
            generation,
            push,
        }))
    }

    pub fn push_now(&self) -> Result<usize, SyncError> {
        let quotes = self.store.lock().quotes().to_vec();
        self.remote.push(&quotes)?;
        Ok(quotes.len())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Stop after this many completed cycles; run forever when `None`.
    pub max_cycles: Option<u64>,
}

/// Periodically runs sync cycles on worker threads until `max_cycles` complete.
///
/// The first cycle starts immediately. Ticks that land while a cycle is in
/// flight are dropped. Returns the number of completed cycles.
pub fn watch<F>(runner: Arc<SyncRunner>, options: WatchOptions, mut on_report: F) -> Result<u64>
where
    F: FnMut(CycleReport) -> Result<()>,
{
    let ticker = tick(options.interval);
    let (tx, rx) = unbounded::<Result<CycleOutcome>>();
    let mut completed = 0u64;
    let mut pending = 0u64;

    let budget_left = |completed: u64, pending: u64| {
        options
            .max_cycles
            .map_or(true, |max| completed + pending < max)
    };

    if budget_left(completed, pending) {
        spawn_cycle(&runner, &tx)?;
        pending += 1;
    }

    loop {
        if !budget_left(completed, pending) && pending == 0 {
            break;
        }
        select! {
            recv(ticker) -> _ => {
                if !budget_left(completed, pending) {
                    continue;
                }
                if runner.is_in_flight() {
                    tracing::debug!("sync tick while a cycle is in flight, skipping");
                    continue;
                }
                spawn_cycle(&runner, &tx)?;
                pending += 1;
            }
            recv(rx) -> message => {
                pending = pending.saturating_sub(1);
                match message.context("sync worker channel closed")? {
                    Ok(CycleOutcome::Completed(report)) => {
                        completed += 1;
                        on_report(report)?;
                    }
                    Ok(CycleOutcome::Skipped) => {}
                    Err(err) => tracing::error!(?err, "sync cycle failed"),
                }
            }
        }
    }
    Ok(completed)
}

fn spawn_cycle(runner: &Arc<SyncRunner>, tx: &Sender<Result<CycleOutcome>>) -> Result<()> {
    let runner = Arc::clone(runner);
    let tx = tx.clone();
    thread::Builder::new()
        .name("quote-sync".to_string())
        .spawn(move || {
            let _ = tx.send(runner.run_cycle());
        })
        .context("spawning sync worker")?;
    Ok(())
}
