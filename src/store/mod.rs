//! Durable table of known sites.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::types::StoredRow;

pub mod file;
pub mod sheets;

pub use self::file::CsvStore;
pub use self::sheets::SheetsStore;

/// The record store as the pipeline sees it. A deployment calls exactly one
/// of `append_rows` / `overwrite_all` per run, and only after the fetch phase.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts the header above existing data if the first row is not it.
    async fn ensure_header(&self) -> Result<(), StoreError>;

    /// All data rows in stored order, header excluded.
    async fn read_all(&self) -> Result<Vec<StoredRow>, StoreError>;

    /// Adds rows after existing content in one write.
    async fn append_rows(&self, rows: &[StoredRow]) -> Result<(), StoreError>;

    /// Replaces the table with the header followed by `rows`.
    async fn overwrite_all(&self, rows: &[StoredRow]) -> Result<(), StoreError>;
}

/// Builds the configured store; `header` comes from the merge strategy.
pub fn open(settings: &StoreSettings, header: &[&str]) -> Result<Box<dyn RecordStore>> {
    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    Ok(match settings {
        StoreSettings::Csv { path } => Box::new(CsvStore::new(path.clone(), header)),
        StoreSettings::Sheets {
            spreadsheet_id,
            sheet_name,
            sheet_gid,
            access_token,
        } => Box::new(SheetsStore::new(
            spreadsheet_id,
            sheet_name,
            *sheet_gid,
            access_token.clone(),
            header,
        )?),
    })
}

/// A row is the header when its first cell names the first column.
pub(crate) fn is_header<S: AsRef<str>>(cells: &[S], header: &[String]) -> bool {
    match (cells.first(), header.first()) {
        (Some(cell), Some(name)) => cell.as_ref().trim().eq_ignore_ascii_case(name),
        _ => false,
    }
}

/// Data rows of a raw table: the header row and blank rows are skipped.
pub(crate) fn data_rows<S: AsRef<str>>(table: &[Vec<S>], header: &[String]) -> Vec<StoredRow> {
    table
        .iter()
        .enumerate()
        .filter(|(i, cells)| !(*i == 0 && is_header(cells.as_slice(), header)))
        .map(|(_, cells)| StoredRow::from_cells(cells.as_slice()))
        .filter(|row| !row.is_blank())
        .collect()
}
