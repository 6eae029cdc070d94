#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use clap::Parser;

use fieldwatch::{
    Cli, Config, NotifyError, Notifier, PageError, PageFetcher, PageNumber, RecordStore,
    StoreError, StoredRow,
};

pub const DETAIL: &str = "https://admin.example/site?site_id={id}";

pub fn config(pages: (PageNumber, PageNumber), width: usize, extra: &[&str]) -> Config {
    let start = pages.0.to_string();
    let end = pages.1.to_string();
    let width = width.to_string();
    let mut argv = vec![
        "fieldwatch",
        "--cookie",
        "sid=test",
        "--listing-url",
        "https://admin.example/list/{page}",
        "--detail-url",
        DETAIL,
        "--start-page",
        start.as_str(),
        "--end-page",
        end.as_str(),
        "--concurrency",
        width.as_str(),
    ];
    argv.extend_from_slice(extra);
    Config::from_cli(Cli::try_parse_from(argv).unwrap()).unwrap()
}

/// Listing markup in the admin grid layout; `seller` may be empty.
pub fn listing(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(id, url, seller)| {
            format!(
                "<tr><td>{id}</td><td><a href=\"#\">{url}</a></td>\
                 <td>{seller}</td><td>edit</td></tr>"
            )
        })
        .collect();
    format!(
        r#"<html><body><div id="ff-grid" class="grid-view"><table class="items">
        <thead><tr><th>ID</th><th>Site</th><th>Seller</th><th></th></tr></thead>
        <tbody>{body}</tbody></table></div></body></html>"#
    )
}

// -------------------------
// Fetcher
// -------------------------

#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<PageNumber, Result<String, PageError>>,
    pub hits: AtomicUsize,
}

impl FakeFetcher {
    pub fn page(mut self, page: PageNumber, html: String) -> Self {
        self.pages.insert(page, Ok(html));
        self
    }

    pub fn fail(mut self, page: PageNumber, err: PageError) -> Self {
        self.pages.insert(page, Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, page: PageNumber) -> Result<String, PageError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.pages
            .get(&page)
            .cloned()
            .unwrap_or_else(|| Ok(listing(&[])))
    }
}

// -------------------------
// Store
// -------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<StoredRow>>,
    pub appends: AtomicUsize,
    pub overwrites: AtomicUsize,
    pub fail_connect: bool,
    pub fail_write: bool,
}

impl MemoryStore {
    pub fn with_ids(ids: &[&str]) -> Self {
        let rows = ids
            .iter()
            .map(|id| StoredRow::from_cells(&[*id, "known.example", "link"]))
            .collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.identifier.clone())
            .collect()
    }

    pub fn writes(&self) -> usize {
        self.appends.load(Ordering::SeqCst) + self.overwrites.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_header(&self) -> Result<(), StoreError> {
        if self.fail_connect {
            return Err(StoreError::Connect(anyhow!("permission denied")));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<StoredRow>, StoreError> {
        if self.fail_connect {
            return Err(StoreError::Connect(anyhow!("permission denied")));
        }
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn append_rows(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        if self.fail_write {
            return Err(StoreError::Write(anyhow!("quota exceeded")));
        }
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn overwrite_all(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        if self.fail_write {
            return Err(StoreError::Write(anyhow!("quota exceeded")));
        }
        self.overwrites.fetch_add(1, Ordering::SeqCst);
        *self.rows.lock().unwrap() = rows.to_vec();
        Ok(())
    }
}

// -------------------------
// Notifier
// -------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError(anyhow!("webhook answered 500")));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

// -------------------------
// Logs
// -------------------------

/// Plain-text log sink for asserting on what a run reported.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A fmt subscriber writing here; install it with `tracing::subscriber::set_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::INFO)
            .finish()
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
