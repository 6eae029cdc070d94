//! Bounded worker pool over the listing pages.
//!
//! Workers pull page numbers from a pre-loaded queue, fetch and extract each
//! page, and push one [`PageOutcome`] per page onto a results channel. The
//! collector loop in [`FetchPool::run`] is the only owner of the accumulated
//! records, so nothing on the result path needs a lock.

use std::collections::{BTreeSet, VecDeque};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::PageError;
use crate::extract::RowExtractor;
use crate::fetch::PageFetcher;
use crate::types::{CandidateRecord, PageNumber};

pub const DEFAULT_WIDTH: usize = 20;

#[derive(Debug)]
pub struct PageOutcome {
    pub page: PageNumber,
    pub result: Result<Vec<CandidateRecord>, PageError>,
}

/// What one pass over the page range produced.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub candidates: Vec<CandidateRecord>,
    /// Pages in the order their outcome reached the collector.
    pub processed: Vec<PageNumber>,
    /// Pages whose worker vanished before reporting.
    pub lost: Vec<PageNumber>,
    pub pages_ok: usize,
    pub pages_stale: usize,
    pub pages_failed: usize,
    pub pages_unparsable: usize,
}

impl PoolReport {
    fn record(&mut self, outcome: PageOutcome) {
        self.processed.push(outcome.page);
        match outcome.result {
            Ok(rows) => {
                self.pages_ok += 1;
                self.candidates.extend(rows);
            }
            Err(PageError::StaleCredentials { .. }) => self.pages_stale += 1,
            Err(PageError::FetchFailed { .. }) => self.pages_failed += 1,
            Err(PageError::ParseFailed { .. }) => self.pages_unparsable += 1,
        }
    }

    pub fn pages_total(&self) -> usize {
        self.processed.len() + self.lost.len()
    }
}

/// Exhaustible FIFO of page numbers. The lock is only held for a pop.
struct PageQueue {
    pages: Mutex<VecDeque<PageNumber>>,
}

impl PageQueue {
    fn new(pages: RangeInclusive<PageNumber>) -> Self {
        Self {
            pages: Mutex::new(pages.collect()),
        }
    }

    fn next(&self) -> Option<PageNumber> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

pub struct FetchPool {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<RowExtractor>,
    width: usize,
}

impl FetchPool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, extractor: Arc<RowExtractor>, width: usize) -> Self {
        Self {
            fetcher,
            extractor,
            width: width.max(1),
        }
    }

    /// Processes every page in `pages` exactly once and returns once all of
    /// them have reported (or their worker is known to be gone).
    pub async fn run(&self, pages: RangeInclusive<PageNumber>) -> PoolReport {
        let expected: BTreeSet<PageNumber> = pages.clone().collect();
        let queue = Arc::new(PageQueue::new(pages));
        let width = self.width.min(expected.len().max(1));

        tracing::info!(pages = expected.len(), width, "[pool] starting");

        let (tx, mut rx) = mpsc::channel::<PageOutcome>(width * 2);
        let mut workers = JoinSet::new();
        for id in 0..width {
            let queue = Arc::clone(&queue);
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let tx = tx.clone();
            workers.spawn(async move { work(id, &queue, fetcher.as_ref(), &extractor, tx).await });
        }
        drop(tx);

        let mut report = PoolReport::default();
        while let Some(outcome) = rx.recv().await {
            report.record(outcome);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "[pool] worker task failed");
            }
        }

        let seen: BTreeSet<PageNumber> = report.processed.iter().copied().collect();
        report.lost = expected.difference(&seen).copied().collect();
        if !report.lost.is_empty() {
            tracing::error!(lost = ?report.lost, "[pool] pages never reported a result");
        }

        tracing::info!(
            ok = report.pages_ok,
            stale = report.pages_stale,
            failed = report.pages_failed,
            unparsable = report.pages_unparsable,
            lost = report.lost.len(),
            candidates = report.candidates.len(),
            "[pool] drained"
        );
        report
    }
}

async fn work(
    id: usize,
    queue: &PageQueue,
    fetcher: &dyn PageFetcher,
    extractor: &RowExtractor,
    tx: mpsc::Sender<PageOutcome>,
) {
    while let Some(page) = queue.next() {
        let result = match fetcher.fetch(page).await {
            Ok(html) => extractor.extract(page, &html),
            Err(e) => Err(e),
        };

        match &result {
            Ok(rows) => tracing::debug!(worker = id, page, rows = rows.len(), "[pool] page done"),
            Err(e @ PageError::StaleCredentials { .. }) => {
                tracing::error!(worker = id, page, "{e}; refresh the session cookie")
            }
            Err(e) => tracing::warn!(worker = id, page, "{e}"),
        }

        if tx.send(PageOutcome { page, result }).await.is_err() {
            break;
        }
    }
}
