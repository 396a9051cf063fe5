//! Workbook persisted as a directory of CSV files.
//!
//! Each sheet is `<dir>/<name>.csv` with no implicit header handling: row 1 of
//! the file is row 1 of the sheet. Styles cannot live in CSV, so they go to a
//! `<name>.styles.json` sidecar; a missing or unreadable sidecar only loses
//! formatting.

use crate::error::{LitReviewError, Result};
use crate::store::{CellStyle, CellValue, Grid, Sheet, Workbook};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default workbook directory: `<data dir>/rustlitreview`
pub fn default_workbook_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("rustlitreview"))
        .unwrap_or_else(|| PathBuf::from("rustlitreview-workbook"))
}

#[derive(Debug, Serialize, Deserialize)]
struct StyledCell {
    row: usize,
    column: usize,
    #[serde(flatten)]
    style: CellStyle,
}

/// CSV-directory workbook. Sheets are loaded on first access and written back
/// by [`Workbook::flush`].
pub struct CsvWorkbook {
    dir: PathBuf,
    sheets: BTreeMap<String, Grid>,
}

impl CsvWorkbook {
    /// Open (creating if needed) the workbook directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened CSV workbook");
        Ok(Self {
            dir,
            sheets: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    fn styles_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.styles.json", name))
    }

    fn load(&mut self, name: &str) -> Result<bool> {
        if self.sheets.contains_key(name) {
            return Ok(true);
        }
        let path = self.csv_path(name);
        if !path.exists() {
            return Ok(false);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::from(field)
                        }
                    })
                    .collect::<Vec<_>>(),
            );
        }

        let mut grid = Grid::from_rows(name, rows);
        for cell in self.load_styles(name) {
            grid.set_style(cell.row, cell.column, cell.style);
        }

        info!(sheet = name, path = %path.display(), "Loaded sheet");
        self.sheets.insert(name.to_string(), grid);
        Ok(true)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn load_styles(&self, name: &str) -> Vec<StyledCell> {
        let path = self.styles_path(name);
        if !path.exists() {
            return Vec::new();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<StyledCell>>(&content) {
                Ok(cells) => cells,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse styles");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read styles");
                Vec::new()
            }
        }
    }

    /// Write the sheet and its styles. Each file is written to a temporary
    /// file in the workbook directory and renamed over the old one, so a
    /// failed save leaves the previous contents intact.
    fn save(&self, grid: &Grid) -> Result<()> {
        let path = self.csv_path(grid.name());
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut wtr = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_writer(tmp.as_file_mut());

            for row in grid.to_rows() {
                wtr.write_record(row.iter().map(CellValue::as_str))?;
            }
            wtr.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        let styles: Vec<StyledCell> = grid
            .styles()
            .map(|(&(row, column), style)| StyledCell {
                row,
                column,
                style: style.clone(),
            })
            .collect();
        self.write_atomic(
            &self.styles_path(grid.name()),
            serde_json::to_string_pretty(&styles)?.as_bytes(),
        )?;

        debug!(sheet = grid.name(), path = %path.display(), "Saved sheet");
        Ok(())
    }
}

impl Workbook for CsvWorkbook {
    type Sheet = Grid;

    fn has_sheet(&self, name: &str) -> bool {
        self.sheets.contains_key(name) || self.csv_path(name).exists()
    }

    fn sheet_mut(&mut self, name: &str) -> Result<Option<&mut Grid>> {
        if !self.load(name)? {
            return Ok(None);
        }
        Ok(self.sheets.get_mut(name))
    }

    fn insert_sheet(&mut self, name: &str) -> Result<&mut Grid> {
        if self.has_sheet(name) {
            return Err(LitReviewError::Store(format!("sheet {} already exists", name)));
        }
        info!(sheet = name, "Creating sheet");
        let grid = Grid::new(name);
        self.save(&grid)?;
        Ok(self.sheets.entry(name.to_string()).or_insert(grid))
    }

    fn flush(&mut self) -> Result<()> {
        for grid in self.sheets.values() {
            self.save(grid)?;
        }
        Ok(())
    }
}
