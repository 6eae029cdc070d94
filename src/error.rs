use thiserror::Error;

use crate::types::PageNumber;

/// Per-page failure. Never leaves the worker that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("page {page}: fetch failed: {reason}")]
    FetchFailed { page: PageNumber, reason: String },

    #[error("page {page}: redirected with status {status}, session cookie is probably expired")]
    StaleCredentials { page: PageNumber, status: u16 },

    #[error("page {page}: unparsable listing: {reason}")]
    ParseFailed { page: PageNumber, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record store unreachable: {0:#}")]
    Connect(anyhow::Error),

    #[error("record store write failed: {0:#}")]
    Write(anyhow::Error),
}

#[derive(Error, Debug)]
#[error("notification failed: {0:#}")]
pub struct NotifyError(pub anyhow::Error);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page range is empty: start {start} > end {end}")]
    EmptyPageRange { start: PageNumber, end: PageNumber },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("{name} must contain the `{placeholder}` placeholder")]
    MissingPlaceholder {
        name: &'static str,
        placeholder: &'static str,
    },

    #[error("{name} is not a valid url: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{0} is required for the selected record store")]
    MissingSetting(&'static str),
}
