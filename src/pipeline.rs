//! One scrape-and-reconcile cycle.
//!
//! snapshot → fetch pool → reconcile → single store write → notification.
//! The store is only touched for writing after every page has been processed.

use crate::config::Config;
use crate::error::StoreError;
use crate::merge::MergeStrategy;
use crate::notify::{self, Notifier};
use crate::pool::FetchPool;
use crate::reconcile::{self, KnownIds, ReviewItem};
use crate::store::RecordStore;
use crate::types::NewRecord;

pub struct Pipeline<'a> {
    pub config: &'a Config,
    pub store: &'a dyn RecordStore,
    pub strategy: &'a dyn MergeStrategy,
    pub pool: &'a FetchPool,
    pub notifier: Option<&'a dyn Notifier>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub known_before: usize,
    pub pages_ok: usize,
    pub pages_stale: usize,
    pub pages_failed: usize,
    pub pages_unparsable: usize,
    pub pages_lost: usize,
    pub candidates: usize,
    pub new_records: Vec<NewRecord>,
    pub needs_review: Vec<ReviewItem>,
    /// True once the store accepted the new rows.
    pub persisted: bool,
    pub notified: bool,
}

impl RunSummary {
    pub fn log(&self) {
        tracing::info!(
            known_before = self.known_before,
            pages_ok = self.pages_ok,
            pages_stale = self.pages_stale,
            pages_failed = self.pages_failed + self.pages_lost,
            pages_unparsable = self.pages_unparsable,
            candidates = self.candidates,
            new = self.new_records.len(),
            persisted = self.persisted,
            notified = self.notified,
            review = self.needs_review.len(),
            "run finished"
        );
    }
}

impl Pipeline<'_> {
    /// Runs one cycle. Only a store that cannot be read is fatal, and that is
    /// detected before any page is requested.
    pub async fn run(&self) -> Result<RunSummary, StoreError> {
        self.store.ensure_header().await?;
        let existing = self.store.read_all().await?;
        let mut known = KnownIds::from_rows(&existing);

        tracing::info!(
            pages = %format!("{}..={}", self.config.start_page, self.config.end_page),
            merge = ?self.strategy.mode(),
            "starting scrape cycle"
        );
        let report = self.pool.run(self.config.pages()).await;

        let mut summary = RunSummary {
            known_before: known.len(),
            pages_ok: report.pages_ok,
            pages_stale: report.pages_stale,
            pages_failed: report.pages_failed,
            pages_unparsable: report.pages_unparsable,
            pages_lost: report.lost.len(),
            candidates: report.candidates.len(),
            ..RunSummary::default()
        };

        if summary.pages_stale > 0 && summary.pages_stale == report.pages_total() {
            tracing::error!("every page redirected; the session cookie has expired");
        }

        let rec = reconcile::reconcile(
            report.candidates,
            &mut known,
            &self.config.detail_url,
            self.strategy.order(),
        );
        summary.needs_review = rec.needs_review;
        if rec.new_records.is_empty() {
            tracing::info!(duplicates = rec.duplicates, "no new sites");
            return Ok(summary);
        }

        match self
            .strategy
            .persist(self.store, &existing, &rec.new_records)
            .await
        {
            Ok(()) => {
                tracing::info!(added = rec.new_records.len(), "new sites stored");
                summary.persisted = true;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    lost = rec.new_records.len(),
                    "could not store new sites; they will be picked up next run"
                );
            }
        }
        summary.new_records = rec.new_records;

        if summary.persisted {
            summary.notified = self.notify(&summary.new_records).await;
        }
        Ok(summary)
    }

    async fn notify(&self, records: &[NewRecord]) -> bool {
        let Some(notifier) = self.notifier else {
            tracing::info!("no webhook configured, skipping notification");
            return false;
        };
        let text = notify::summary_message(records, self.config.notify_cap);
        match notifier.send(&text).await {
            Ok(()) => {
                tracing::info!("notification sent");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "notification failed");
                false
            }
        }
    }
}
