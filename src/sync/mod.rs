//! Remote reconciliation: fetch a batch, merge it into the store, review conflicts.

pub mod conflict;
pub mod merge;
pub mod remote;
pub mod runner;

pub use conflict::{Choice, ConflictReview, ResolutionReport, ReviewError, ReviewPhase};
pub use merge::{text_key, Conflict, KeyFn, MergeEngine, MergeResult, QuoteUpdate};
pub use remote::{
    fallback_batch, normalize_batch, BatchOrigin, FetchOutcome, FieldMapping, HttpRemote,
    RemoteSource, StaticRemote, SyncError,
};
pub use runner::{watch, CycleOutcome, CycleReport, SyncRunner, WatchOptions};
