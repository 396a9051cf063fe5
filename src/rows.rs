//! Turning search results into sheet rows.
//!
//! Rows are built against a [`ColumnMap`] so the sheet's column order is
//! whatever its header row says. Items that are malformed, untitled, or
//! already in the sheet are skipped without stopping the batch.

use crate::columns::{ColumnMap, ABSTRACT, AUTHORS, DATE, LINK, TITLE};
use crate::semanticscholar::SSPaper;
use crate::store::CellValue;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One row ready to be written, exactly as wide as the map it was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow(Vec<CellValue>);

impl OutputRow {
    /// A row of `width` empty-string cells.
    pub fn blank(width: usize) -> Self {
        Self(vec![CellValue::from(""); width])
    }

    /// Cell at a 1-based column.
    pub fn get(&self, column: usize) -> Option<&CellValue> {
        column.checked_sub(1).and_then(|c| self.0.get(c))
    }

    /// Set the cell under `key` if the map has that column.
    fn set(&mut self, columns: &ColumnMap, key: &str, value: CellValue) {
        if let Some(cell) = columns
            .get(key)
            .and_then(|c| c.checked_sub(1))
            .and_then(|c| self.0.get_mut(c))
        {
            *cell = value;
        }
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.0
    }

    pub fn into_cells(self) -> Vec<CellValue> {
        self.0
    }
}

/// Fields of one paper as they land in the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperEntry {
    pub title: String,
    pub publication_date: String,
    pub link: String,
    /// Kept as `None` when the API sent no abstract
    pub abstract_text: Option<String>,
    pub authors: String,
    pub paper_id: String,
}

impl From<SSPaper> for PaperEntry {
    fn from(paper: SSPaper) -> Self {
        let link = paper.link();
        let authors = paper.author_names();
        Self {
            title: paper.title.unwrap_or_default().trim().to_string(),
            publication_date: paper.publication_date.unwrap_or_default(),
            link,
            abstract_text: paper.abstract_text,
            authors,
            paper_id: paper.paper_id.unwrap_or_default(),
        }
    }
}

impl PaperEntry {
    /// Lay the entry out along `columns`; unmapped fields are dropped.
    pub fn to_row(&self, columns: &ColumnMap) -> OutputRow {
        let mut row = OutputRow::blank(columns.width());
        row.set(columns, DATE, self.publication_date.as_str().into());
        row.set(columns, TITLE, self.title.as_str().into());
        row.set(columns, AUTHORS, self.authors.as_str().into());
        row.set(columns, LINK, self.link.as_str().into());
        row.set(columns, ABSTRACT, self.abstract_text.clone().into());
        row
    }
}

/// Rows produced from one page of results, with what was left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltRows {
    pub rows: Vec<OutputRow>,
    pub skipped_duplicates: usize,
    pub skipped_missing_title: usize,
    pub failed_items: usize,
}

/// Builds deduplicated rows for a fixed column layout.
pub struct RowBuilder<'a> {
    columns: &'a ColumnMap,
    existing_titles: &'a HashSet<String>,
    limit: usize,
}

impl<'a> RowBuilder<'a> {
    pub fn new(columns: &'a ColumnMap, existing_titles: &'a HashSet<String>, limit: usize) -> Self {
        Self {
            columns,
            existing_titles,
            limit,
        }
    }

    /// Process `items` in order until `limit` rows exist.
    pub fn build(&self, items: Vec<Value>) -> BuiltRows {
        let mut built = BuiltRows::default();

        for item in items {
            if built.rows.len() >= self.limit {
                break;
            }

            let paper = match SSPaper::from_value(item) {
                Ok(paper) => paper,
                Err(e) => {
                    warn!(error = %e, "Error processing a paper item");
                    built.failed_items += 1;
                    continue;
                }
            };
            let entry = PaperEntry::from(paper);

            if entry.title.is_empty() {
                info!(paper_id = %entry.paper_id, "Skipping: missing title");
                built.skipped_missing_title += 1;
                continue;
            }

            if self.existing_titles.contains(&entry.title) {
                info!(title = %entry.title, "Duplicate (by title), skipping");
                built.skipped_duplicates += 1;
                continue;
            }

            debug!(title = %entry.title, link = %entry.link, "New paper");
            built.rows.push(entry.to_row(self.columns));
        }

        built
    }
}

/// Convenience wrapper around [`RowBuilder`].
pub fn build_rows(
    items: Vec<Value>,
    columns: &ColumnMap,
    existing_titles: &HashSet<String>,
    limit: usize,
) -> BuiltRows {
    RowBuilder::new(columns, existing_titles, limit).build(items)
}
