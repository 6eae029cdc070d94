use serde::Serialize;

pub type PageNumber = u32;

/// A listing row whose seller cell was empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateRecord {
    pub identifier: String,
    pub display_url: String,
}

impl CandidateRecord {
    pub fn new(identifier: impl Into<String>, display_url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_url: display_url.into(),
        }
    }
}

/// A candidate that survived reconciliation. `identifier` is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    pub identifier: String,
    pub display_url: String,
    pub detail_link: String,
}

/// One data row of the record store, header excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRow {
    pub identifier: String,
    pub display_url: String,
    pub detail_link: String,
    pub found_at: Option<String>,
}

impl StoredRow {
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Self {
        let cell = |i: usize| {
            cells
                .get(i)
                .map(|c| c.as_ref().trim().to_string())
                .unwrap_or_default()
        };
        let found_at = cell(3);
        Self {
            identifier: cell(0),
            display_url: cell(1),
            detail_link: cell(2),
            found_at: (!found_at.is_empty()).then_some(found_at),
        }
    }

    /// Cells padded or cut to `width` columns.
    pub fn to_cells(&self, width: usize) -> Vec<String> {
        let mut cells = vec![
            self.identifier.clone(),
            self.display_url.clone(),
            self.detail_link.clone(),
        ];
        if width > 3 {
            cells.push(self.found_at.clone().unwrap_or_default());
        }
        cells.resize(width, String::new());
        cells
    }

    pub fn is_blank(&self) -> bool {
        self.identifier.is_empty() && self.display_url.is_empty() && self.detail_link.is_empty()
    }
}

impl From<&NewRecord> for StoredRow {
    fn from(record: &NewRecord) -> Self {
        Self {
            identifier: record.identifier.clone(),
            display_url: record.display_url.clone(),
            detail_link: record.detail_link.clone(),
            found_at: None,
        }
    }
}
