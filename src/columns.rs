//! Header-driven column mapping.
//!
//! Row 1 of a sheet names its columns. Headers are matched case-insensitively
//! after trimming, so `" Date "`, `"DATE"` and `"date"` are the same column.
//! When two headers normalize to the same key the rightmost one wins; which
//! of them should be used is undecided, so the collision is left as is.

use crate::error::Result;
use crate::store::{CellRange, Sheet};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

pub const DATE: &str = "date";
pub const TITLE: &str = "title";
pub const AUTHORS: &str = "authors";
pub const ABSTRACT: &str = "abstract";
pub const LINK: &str = "link";

/// Columns every feed sheet must have, in the order they get created.
pub const REQUIRED_HEADERS: &[&str] = &[DATE, TITLE, AUTHORS, ABSTRACT, LINK];

/// Lowercase header name -> 1-based column index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap(BTreeMap<String, usize>);

impl ColumnMap {
    pub fn get(&self, key: &str) -> Option<usize> {
        self.0.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Highest mapped column, 0 when empty. Output rows are this wide.
    pub fn width(&self) -> usize {
        self.0.values().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Keys from `required` that have no column, in `required` order.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|key| !self.contains(key)).collect()
    }
}

impl FromIterator<(String, usize)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ColumnMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, column)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", key, column)?;
        }
        f.write_str("}")
    }
}

/// Trimmed, lowercased header; `None` when blank.
pub fn normalize_header(header: &str) -> Option<String> {
    let key = header.trim().to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Display label for a header key: first character uppercased.
pub fn display_label(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Map the headers in row 1 of `sheet`.
pub fn build_column_map<S: Sheet + ?Sized>(sheet: &S) -> Result<ColumnMap> {
    let last_column = sheet.last_column();
    if last_column == 0 {
        return Ok(ColumnMap::default());
    }

    let headers = sheet.get_values(CellRange::new(1, 1, 1, last_column))?;
    Ok(headers
        .into_iter()
        .next()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter_map(|(idx, cell)| normalize_header(cell.as_str()).map(|key| (key, idx + 1)))
        .collect())
}

/// Append a column for every key in `required` missing from the header row,
/// then return the map rebuilt from the sheet.
pub fn ensure_required_headers<S: Sheet + ?Sized>(
    sheet: &mut S,
    required: &[&str],
) -> Result<ColumnMap> {
    let columns = build_column_map(&*sheet)?;
    let missing = columns.missing(required);
    if missing.is_empty() {
        return Ok(columns);
    }

    info!(
        sheet = sheet.name(),
        missing = %missing.join(", "),
        "Missing required headers, adding them"
    );

    let last_column = sheet.last_column();
    for (offset, key) in missing.iter().enumerate() {
        let cell = CellRange::cell(1, last_column + 1 + offset);
        sheet.set_values(cell, &[vec![display_label(key).into()]])?;
        if let Err(e) = sheet.set_bold(cell) {
            warn!(header = *key, error = %e, "Failed to style header");
        }
    }

    build_column_map(&*sheet)
}
