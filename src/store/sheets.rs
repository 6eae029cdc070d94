//! Google Sheets values API adapter.
//!
//! Only the first `header.len()` columns of one worksheet are used. The access
//! token is taken as-is from configuration; minting it is left to whatever
//! schedules the run.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{RecordStore, data_rows, is_header};
use crate::config::Secret;
use crate::error::StoreError;
use crate::types::StoredRow;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";

pub struct SheetsStore {
    client: reqwest::Client,
    base: Url,
    sheet_name: String,
    sheet_gid: i64,
    token: Secret,
    header: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsStore {
    pub fn new(
        spreadsheet_id: &str,
        sheet_name: &str,
        sheet_gid: i64,
        token: Secret,
        header: Vec<String>,
    ) -> Result<Self> {
        let mut base = Url::parse(API_BASE)?;
        base.path_segments_mut()
            .map_err(|_| anyhow!("sheets api base cannot hold a path"))?
            .pop_if_empty()
            .push(spreadsheet_id);
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("building sheets client")?;
        Ok(Self {
            client,
            base,
            sheet_name: sheet_name.to_string(),
            sheet_gid,
            token,
            header,
        })
    }

    fn last_column(&self) -> char {
        let width = self.header.len().clamp(1, 26) as u8;
        char::from(b'A' + width - 1)
    }

    /// `'Sheet1'!A1:C`, or `'Sheet1'!A7:C` with `from_row = 7`.
    fn range(&self, from_row: usize) -> String {
        format!(
            "'{}'!A{}:{}",
            self.sheet_name.replace('\'', "''"),
            from_row,
            self.last_column()
        )
    }

    /// `values/{range}{suffix}` under the spreadsheet.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("sheets url cannot hold a path"))?
            .push("values")
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let body: ValueRange = self
            .client
            .get(url)
            .bearer_auth(self.token.expose())
            .send()
            .await
            .context("sheets values.get")?
            .error_for_status()
            .context("sheets values.get")?
            .json()
            .await
            .context("decoding sheets values")?;
        Ok(body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn put_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<()> {
        let mut url = self.values_url(range, "")?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        self.client
            .put(url)
            .bearer_auth(self.token.expose())
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .context("sheets values.update")?
            .error_for_status()
            .context("sheets values.update")?;
        Ok(())
    }

    async fn clear_values(&self, range: &str) -> Result<()> {
        let url = self.values_url(range, ":clear")?;
        self.client
            .post(url)
            .bearer_auth(self.token.expose())
            .json(&json!({}))
            .send()
            .await
            .context("sheets values.clear")?
            .error_for_status()
            .context("sheets values.clear")?;
        Ok(())
    }

    async fn insert_first_row(&self) -> Result<()> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("sheets url cannot hold a path"))?
            .pop()
            .push(&format!("{}:batchUpdate", self.spreadsheet_id()));
        let request = json!({
            "requests": [{
                "insertDimension": {
                    "range": {
                        "sheetId": self.sheet_gid,
                        "dimension": "ROWS",
                        "startIndex": 0,
                        "endIndex": 1
                    },
                    "inheritFromBefore": false
                }
            }]
        });
        self.client
            .post(url)
            .bearer_auth(self.token.expose())
            .json(&request)
            .send()
            .await
            .context("sheets batchUpdate")?
            .error_for_status()
            .context("sheets batchUpdate")?;
        Ok(())
    }

    fn spreadsheet_id(&self) -> &str {
        self.base
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
    }

    fn header_cells(&self) -> Vec<Vec<String>> {
        vec![self.header.clone()]
    }
}

#[async_trait]
impl RecordStore for SheetsStore {
    async fn ensure_header(&self) -> Result<(), StoreError> {
        let first_row_range = format!("{}1", self.range(1));
        let inner = async {
            let first = self.get_values(&first_row_range).await?;
            match first.first() {
                Some(cells) if is_header(cells.as_slice(), &self.header) => return Ok(()),
                Some(_) => {
                    tracing::info!(sheet = %self.sheet_name, "header missing, inserting row 1");
                    self.insert_first_row().await?;
                }
                None => tracing::info!(sheet = %self.sheet_name, "empty sheet, writing header"),
            }
            self.put_values(&first_row_range, self.header_cells()).await
        };
        inner.await.map_err(StoreError::Connect)
    }

    async fn read_all(&self) -> Result<Vec<StoredRow>, StoreError> {
        let table = self
            .get_values(&self.range(1))
            .await
            .map_err(StoreError::Connect)?;
        Ok(data_rows(&table, &self.header))
    }

    async fn append_rows(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let width = self.header.len();
        let values: Vec<Vec<String>> = rows.iter().map(|r| r.to_cells(width)).collect();
        let inner = async {
            let mut url = self.values_url(&self.range(1), ":append")?;
            url.query_pairs_mut()
                .append_pair("valueInputOption", "RAW")
                .append_pair("insertDataOption", "INSERT_ROWS");
            self.client
                .post(url)
                .bearer_auth(self.token.expose())
                .json(&json!({ "majorDimension": "ROWS", "values": values }))
                .send()
                .await
                .context("sheets values.append")?
                .error_for_status()
                .context("sheets values.append")?;
            Ok(())
        };
        inner.await.map_err(StoreError::Write)
    }

    /// Writes header and rows over the top of the sheet in one update, then
    /// clears whatever is left below. A failed update leaves the old table
    /// untouched; a failed clear only leaves stale trailing rows.
    async fn overwrite_all(&self, rows: &[StoredRow]) -> Result<(), StoreError> {
        let width = self.header.len();
        let mut values = self.header_cells();
        values.extend(rows.iter().map(|r| r.to_cells(width)));
        let written = values.len();

        self.put_values(&self.range(1), values)
            .await
            .map_err(StoreError::Write)?;

        if let Err(e) = self.clear_values(&self.range(written + 1)).await {
            tracing::warn!(
                error = %format!("{e:#}"),
                "could not clear rows below the rewritten table"
            );
        }
        Ok(())
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(header: &[&str]) -> SheetsStore {
        SheetsStore::new(
            "sheet-123",
            "New FF Alert",
            0,
            Secret::new("tok"),
            header.iter().map(|h| h.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn ranges_cover_header_width() {
        let s = store(&["site_id", "URL", "ff_site"]);
        assert_eq!(s.range(1), "'New FF Alert'!A1:C");
        assert_eq!(s.range(40), "'New FF Alert'!A40:C");
        let wide = store(&["site_id", "URL", "ff_site", "found_at"]);
        assert_eq!(wide.range(1), "'New FF Alert'!A1:D");
    }

    #[test]
    fn urls_are_built_under_the_spreadsheet() {
        let s = store(&["site_id", "URL", "ff_site"]);
        assert_eq!(s.spreadsheet_id(), "sheet-123");
        let url = s.values_url(&s.range(1), ":append").unwrap();
        assert!(url.as_str().starts_with(
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/"
        ));
        assert!(url.as_str().ends_with(":append"));
    }

    #[test]
    fn numeric_cells_become_text() {
        assert_eq!(cell_text(json!(3615)), "3615");
        assert_eq!(cell_text(json!(3615.0)), "3615.0");
        assert_eq!(cell_text(json!("x")), "x");
        assert_eq!(cell_text(Value::Null), "");
    }
}
