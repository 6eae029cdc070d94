//! How a run's new records land in the record store.

use async_trait::async_trait;
use time::Date;

use crate::config::MergeMode;
use crate::error::StoreError;
use crate::reconcile::IdOrder;
use crate::store::RecordStore;
use crate::types::{NewRecord, StoredRow};

pub const APPEND_HEADER: &[&str] = &["site_id", "URL", "ff_site"];
pub const OVERWRITE_HEADER: &[&str] = &["site_id", "URL", "ff_site", "found_at"];

#[async_trait]
pub trait MergeStrategy: Send + Sync {
    fn mode(&self) -> MergeMode;

    /// Column names the store must carry in its first row.
    fn header(&self) -> &'static [&'static str];

    /// Order new records must be in before `persist`.
    fn order(&self) -> IdOrder;

    /// Writes `fresh` in a single store call. `existing` is the snapshot read
    /// at the start of the run.
    async fn persist(
        &self,
        store: &dyn RecordStore,
        existing: &[StoredRow],
        fresh: &[NewRecord],
    ) -> Result<(), StoreError>;
}

/// Appends new rows, oldest id first, leaving existing rows untouched.
pub struct AppendOldestFirst;

#[async_trait]
impl MergeStrategy for AppendOldestFirst {
    fn mode(&self) -> MergeMode {
        MergeMode::Append
    }

    fn header(&self) -> &'static [&'static str] {
        APPEND_HEADER
    }

    fn order(&self) -> IdOrder {
        IdOrder::Ascending
    }

    async fn persist(
        &self,
        store: &dyn RecordStore,
        _existing: &[StoredRow],
        fresh: &[NewRecord],
    ) -> Result<(), StoreError> {
        let rows: Vec<StoredRow> = fresh.iter().map(StoredRow::from).collect();
        store.append_rows(&rows).await
    }
}

/// Rewrites the table with new rows on top, newest id first, each stamped
/// with the run date. Existing rows follow in their stored order.
pub struct OverwriteNewestFirst {
    found_at: String,
}

impl OverwriteNewestFirst {
    pub fn new(run_date: Date) -> Self {
        Self {
            found_at: run_date.to_string(),
        }
    }
}

#[async_trait]
impl MergeStrategy for OverwriteNewestFirst {
    fn mode(&self) -> MergeMode {
        MergeMode::Overwrite
    }

    fn header(&self) -> &'static [&'static str] {
        OVERWRITE_HEADER
    }

    fn order(&self) -> IdOrder {
        IdOrder::Descending
    }

    async fn persist(
        &self,
        store: &dyn RecordStore,
        existing: &[StoredRow],
        fresh: &[NewRecord],
    ) -> Result<(), StoreError> {
        let rows: Vec<StoredRow> = fresh
            .iter()
            .map(|record| StoredRow {
                found_at: Some(self.found_at.clone()),
                ..StoredRow::from(record)
            })
            .chain(existing.iter().cloned())
            .collect();
        store.overwrite_all(&rows).await
    }
}

pub fn strategy_for(mode: MergeMode, run_date: Date) -> Box<dyn MergeStrategy> {
    match mode {
        MergeMode::Append => Box::new(AppendOldestFirst),
        MergeMode::Overwrite => Box::new(OverwriteNewestFirst::new(run_date)),
    }
}
