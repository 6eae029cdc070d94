use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

use crate::error::PageError;
use crate::types::{CandidateRecord, PageNumber};

const GRID_SELECTOR: &str = "#ff-grid";
const ROW_SELECTOR: &str = "#ff-grid table.items tbody tr";
const CELL_SELECTOR: &str = "td";

/// Pulls unassigned-seller rows out of one listing page.
///
/// Selectors are compiled once; the extractor is shared by every worker.
#[derive(Debug)]
pub struct RowExtractor {
    grid: Selector,
    rows: Selector,
    cells: Selector,
}

impl RowExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            grid: parse_selector(GRID_SELECTOR)?,
            rows: parse_selector(ROW_SELECTOR)?,
            cells: parse_selector(CELL_SELECTOR)?,
        })
    }

    /// Rows whose third cell is blank, in document order.
    ///
    /// A document without the grid container is a login or error page and is
    /// reported as [`PageError::ParseFailed`]; a grid with no matching rows is
    /// simply an empty page.
    pub fn extract(&self, page: PageNumber, html: &str) -> Result<Vec<CandidateRecord>, PageError> {
        let doc = Html::parse_document(html);
        if doc.select(&self.grid).next().is_none() {
            return Err(PageError::ParseFailed {
                page,
                reason: format!("no `{GRID_SELECTOR}` container in {} bytes", html.len()),
            });
        }

        Ok(doc
            .select(&self.rows)
            .filter_map(|row| self.unassigned(&row))
            .collect())
    }

    fn unassigned(&self, row: &ElementRef) -> Option<CandidateRecord> {
        let cols: Vec<String> = row.select(&self.cells).map(|td| cell_text(&td)).collect();
        if cols.len() < 3 || !cols[2].is_empty() {
            return None;
        }
        Some(CandidateRecord::new(cols[0].clone(), cols[1].clone()))
    }
}

fn cell_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector `{css}`: {e}"))
}
