pub mod app;
pub mod cli;
pub mod config;
pub mod present;
pub mod quotes;
pub mod session;
pub mod storage;
pub mod sync;
pub mod transfer;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use quotes::{Quote, QuoteStore};
pub use sync::{MergeEngine, MergeResult};
