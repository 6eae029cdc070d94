//! Scrapes the fetch-field site listing, keeps the rows that have no seller
//! assigned, and reports the ones the record store has not seen before.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod merge;
pub mod notify;
pub mod pipeline;
pub mod pool;
pub mod reconcile;
pub mod store;
pub mod types;

pub use config::{Cli, Config};
pub use error::{ConfigError, NotifyError, PageError, StoreError};
pub use extract::RowExtractor;
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use merge::MergeStrategy;
pub use notify::Notifier;
pub use pipeline::{Pipeline, RunSummary};
pub use pool::{FetchPool, PoolReport};
pub use store::RecordStore;
pub use types::{CandidateRecord, NewRecord, PageNumber, StoredRow};
