//! Tabular store abstraction.
//!
//! A [`Workbook`] holds named [`Sheet`]s; a sheet is a grid addressed with
//! 1-based rows and columns, the way spreadsheet tools address cells.
//! [`Grid`] is the in-memory sheet used by every backend in this crate.

use crate::error::{LitReviewError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Content of a single cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CellValue {
    /// Never written, or written with a null value
    #[default]
    Empty,
    Text(String),
}

impl CellValue {
    /// True for `Empty` and for empty text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CellValue::Empty => "",
            CellValue::Text(s) => s,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<Option<String>> for CellValue {
    fn from(s: Option<String>) -> Self {
        s.map_or(CellValue::Empty, CellValue::Text)
    }
}

/// A rectangular block of cells, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub row: usize,
    pub column: usize,
    pub num_rows: usize,
    pub num_columns: usize,
}

impl CellRange {
    pub fn new(row: usize, column: usize, num_rows: usize, num_columns: usize) -> Self {
        Self {
            row,
            column,
            num_rows,
            num_columns,
        }
    }

    pub fn cell(row: usize, column: usize) -> Self {
        Self::new(row, column, 1, 1)
    }

    fn validate(&self) -> Result<()> {
        if self.row == 0 || self.column == 0 {
            return Err(LitReviewError::Store(format!(
                "range must start at row/column 1 or later, got ({}, {})",
                self.row, self.column
            )));
        }
        if self.num_rows == 0 || self.num_columns == 0 {
            return Err(LitReviewError::Store(format!(
                "range must span at least one cell, got {}x{}",
                self.num_rows, self.num_columns
            )));
        }
        Ok(())
    }

    fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row..self.row + self.num_rows)
            .flat_map(move |r| (self.column..self.column + self.num_columns).map(move |c| (r, c)))
    }
}

/// Cosmetic cell formatting. Nothing in the feed depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub background: Option<String>,
}

/// A single sheet of a workbook.
pub trait Sheet {
    fn name(&self) -> &str;

    /// Last row holding a non-blank cell, 0 for an empty sheet.
    fn last_row(&self) -> usize;

    /// Last column holding a non-blank cell, 0 for an empty sheet.
    fn last_column(&self) -> usize;

    /// Values of `range`, row-major; cells past the data read as `Empty`.
    fn get_values(&self, range: CellRange) -> Result<Vec<Vec<CellValue>>>;

    /// Overwrite `range`; `values` must match its dimensions exactly.
    fn set_values(&mut self, range: CellRange, values: &[Vec<CellValue>]) -> Result<()>;

    fn set_bold(&mut self, range: CellRange) -> Result<()>;

    fn set_background(&mut self, range: CellRange, color: &str) -> Result<()>;
}

/// A named collection of sheets.
pub trait Workbook {
    type Sheet: Sheet;

    fn has_sheet(&self, name: &str) -> bool;

    /// The named sheet, `None` when absent. Fails when the sheet exists but
    /// cannot be read.
    fn sheet_mut(&mut self, name: &str) -> Result<Option<&mut Self::Sheet>>;

    /// Create an empty sheet. Fails if one with that name exists.
    fn insert_sheet(&mut self, name: &str) -> Result<&mut Self::Sheet>;

    /// Persist pending changes. A no-op for in-memory workbooks.
    fn flush(&mut self) -> Result<()>;

    /// The named sheet, created when absent.
    fn sheet_or_insert(&mut self, name: &str) -> Result<&mut Self::Sheet> {
        if !self.has_sheet(name) {
            self.insert_sheet(name)?;
        }
        self.sheet_mut(name)?
            .ok_or_else(|| LitReviewError::Store(format!("sheet {} vanished after insert", name)))
    }
}

/// In-memory sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    name: String,
    rows: Vec<Vec<CellValue>>,
    styles: BTreeMap<(usize, usize), CellStyle>,
}

impl Grid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build a sheet from row-major text, row 1 first.
    pub fn from_rows<R, C>(name: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<CellValue>,
    {
        Self {
            name: name.into(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            styles: BTreeMap::new(),
        }
    }

    /// Cell at (row, column), 1-based; `Empty` outside the data.
    pub fn value(&self, row: usize, column: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        row.checked_sub(1)
            .and_then(|r| self.rows.get(r))
            .and_then(|cells| column.checked_sub(1).and_then(|c| cells.get(c)))
            .unwrap_or(&EMPTY)
    }

    pub fn style(&self, row: usize, column: usize) -> Option<&CellStyle> {
        self.styles.get(&(row, column))
    }

    /// All styled cells, ordered by (row, column).
    pub fn styles(&self) -> impl Iterator<Item = (&(usize, usize), &CellStyle)> {
        self.styles.iter()
    }

    /// Rows 1..=last_row padded to last_column, for export.
    pub fn to_rows(&self) -> Vec<Vec<CellValue>> {
        let width = self.last_column();
        (1..=self.last_row())
            .map(|r| (1..=width).map(|c| self.value(r, c).clone()).collect())
            .collect()
    }

    pub(crate) fn set_style(&mut self, row: usize, column: usize, style: CellStyle) {
        self.styles.insert((row, column), style);
    }

    fn set_value(&mut self, row: usize, column: usize, value: CellValue) {
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < column {
            cells.resize(column, CellValue::Empty);
        }
        cells[column - 1] = value;
    }
}

impl Sheet for Grid {
    fn name(&self) -> &str {
        &self.name
    }

    fn last_row(&self) -> usize {
        self.rows
            .iter()
            .rposition(|cells| cells.iter().any(|c| !c.is_blank()))
            .map_or(0, |idx| idx + 1)
    }

    fn last_column(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|cells| cells.iter().rposition(|c| !c.is_blank()))
            .max()
            .map_or(0, |idx| idx + 1)
    }

    fn get_values(&self, range: CellRange) -> Result<Vec<Vec<CellValue>>> {
        range.validate()?;
        Ok((range.row..range.row + range.num_rows)
            .map(|r| {
                (range.column..range.column + range.num_columns)
                    .map(|c| self.value(r, c).clone())
                    .collect()
            })
            .collect())
    }

    fn set_values(&mut self, range: CellRange, values: &[Vec<CellValue>]) -> Result<()> {
        range.validate()?;
        if values.len() != range.num_rows
            || values.iter().any(|row| row.len() != range.num_columns)
        {
            return Err(LitReviewError::Store(format!(
                "values do not match a {}x{} range",
                range.num_rows, range.num_columns
            )));
        }

        for (offset, row) in values.iter().enumerate() {
            for (col_offset, value) in row.iter().enumerate() {
                self.set_value(range.row + offset, range.column + col_offset, value.clone());
            }
        }
        Ok(())
    }

    fn set_bold(&mut self, range: CellRange) -> Result<()> {
        range.validate()?;
        for cell in range.cells() {
            self.styles.entry(cell).or_default().bold = true;
        }
        Ok(())
    }

    fn set_background(&mut self, range: CellRange, color: &str) -> Result<()> {
        range.validate()?;
        for cell in range.cells() {
            self.styles.entry(cell).or_default().background = Some(color.to_string());
        }
        Ok(())
    }
}

/// Workbook living only in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: BTreeMap<String, Grid>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a sheet.
    pub fn with_sheet(mut self, grid: Grid) -> Self {
        self.sheets.insert(grid.name.clone(), grid);
        self
    }

    pub fn sheet(&self, name: &str) -> Option<&Grid> {
        self.sheets.get(name)
    }

    pub fn sheets(&self) -> impl Iterator<Item = &Grid> {
        self.sheets.values()
    }
}

impl Workbook for MemoryWorkbook {
    type Sheet = Grid;

    fn has_sheet(&self, name: &str) -> bool {
        self.sheets.contains_key(name)
    }

    fn sheet_mut(&mut self, name: &str) -> Result<Option<&mut Grid>> {
        Ok(self.sheets.get_mut(name))
    }

    fn insert_sheet(&mut self, name: &str) -> Result<&mut Grid> {
        if self.sheets.contains_key(name) {
            return Err(LitReviewError::Store(format!("sheet {} already exists", name)));
        }
        Ok(self.sheets.entry(name.to_string()).or_insert_with(|| Grid::new(name)))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
