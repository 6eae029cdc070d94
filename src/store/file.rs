use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use super::{RecordStore, data_rows, is_header};
use crate::error::StoreError;
use crate::types::StoredRow;

/// Record store backed by a local CSV file.
///
/// A missing file is an empty table. Overwrites go through a sibling temp
/// file and a rename so a crash never leaves a half-written table behind.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    header: Vec<String>,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>, header: Vec<String>) -> Self {
        Self {
            path: path.into(),
            header,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CsvStore) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| anyhow!("csv store task failed: {e}"))?
    }

    fn read_table(&self) -> Result<Vec<Vec<String>>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        rdr.records()
            .map(|rec| {
                rec.map(|r| r.iter().map(str::to_string).collect())
                    .with_context(|| format!("reading {}", self.path.display()))
            })
            .collect()
    }

    fn write_table(&self, rows: impl IntoIterator<Item = Vec<String>>) -> Result<()> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            wtr.write_record(&self.header)?;
            for row in rows {
                wtr.write_record(&row)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn append_table(&self, rows: &[StoredRow]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {} for append", self.path.display()))?;

        // a previous editor may have left the last line unterminated
        let len = file.metadata()?.len();
        let mut unterminated = false;
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))?;
            file.read_exact(&mut last)?;
            unterminated = last[0] != b'\n';
        }

        let batch = encode_batch(rows, self.header.len(), unterminated)?;
        if let Err(e) = file.write_all(&batch).and_then(|()| file.flush()) {
            // drop whatever part of the batch made it to disk
            let _ = file.set_len(len);
            return Err(anyhow!(e).context(format!("appending to {}", self.path.display())));
        }
        Ok(())
    }
}

/// The whole append as one buffer, so it reaches the file in a single write.
fn encode_batch(rows: &[StoredRow], width: usize, unterminated: bool) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if unterminated {
        buf.push(b'\n');
    }
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(buf);
    for row in rows {
        wtr.write_record(row.to_cells(width))?;
    }
    wtr.into_inner().map_err(|e| anyhow!("encoding csv rows: {}", e.error()))
}

#[async_trait]
impl RecordStore for CsvStore {
    async fn ensure_header(&self) -> Result<(), StoreError> {
        self.blocking(|store| {
            let table = store.read_table()?;
            if table.first().is_some_and(|first| is_header(first.as_slice(), &store.header)) {
                return Ok(());
            }
            tracing::info!(path = %store.path.display(), "header missing, inserting");
            store.write_table(table)
        })
        .await
        .map_err(StoreError::Connect)
    }

    async fn read_all(&self) -> Result<Vec<StoredRow>, StoreError> {
        self.blocking(|store| Ok(data_rows(&store.read_table()?, &store.header)))
            .await
            .map_err(StoreError::Connect)
    }

    async fn append_rows(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let rows = rows.to_vec();
        self.blocking(move |store| store.append_table(&rows))
            .await
            .map_err(StoreError::Write)
    }

    async fn overwrite_all(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let width = self.header.len();
        let cells: Vec<Vec<String>> = rows.iter().map(|r| r.to_cells(width)).collect();
        self.blocking(move |store| store.write_table(cells))
            .await
            .map_err(StoreError::Write)
    }
}
