//! Common types shared by the local and remote readers.
//!
//! Both sources produce the same shape: one [`Record`] per data row, keyed
//! by the trimmed values of the first row.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::numfmt;

/// One data row, keyed by column header.
pub type Record = HashMap<String, String>;

/// Records together with the header row they were keyed by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    /// Trimmed header values in column order.
    pub headers: Vec<String>,
    /// One record per data row.
    pub records: Vec<Record>,
}

impl RecordSet {
    /// Creates an empty record set with the given headers.
    #[must_use]
    pub const fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            records: Vec::new(),
        }
    }

    /// Appends a row, padding missing trailing cells with empty strings.
    pub fn push_row<S: AsRef<str>>(&mut self, cells: &[S]) {
        self.records.push(build_record(&self.headers, cells));
    }

    /// Returns `true` if there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the cells of a record in header order.
    ///
    /// Duplicate headers yield the same (last written) value.
    #[must_use]
    pub fn ordered_values<'a>(&'a self, record: &'a Record) -> Vec<&'a str> {
        self.headers
            .iter()
            .map(|h| record.get(h).map_or("", String::as_str))
            .collect()
    }
}

/// A typed cell value, independent of the file format it was read from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// An error value such as `#DIV/0!`.
    Error(String),
}

impl CellValue {
    /// Formats the value as a spreadsheet displays it.
    ///
    /// Numbers use the cell's number format code when it has one, and
    /// Excel's General format otherwise.
    #[must_use]
    pub fn display(&self, number_format: Option<&str>) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Number(n) => number_format
                .map_or_else(|| numfmt::general(*n), |code| numfmt::format(*n, code)),
            Self::Text(s) | Self::Error(s) => s.clone(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
        }
    }
}

/// Builds a record from headers and a row of cell strings.
///
/// Cells beyond the row's length become empty strings; values are trimmed.
pub fn build_record<S: AsRef<str>>(headers: &[String], cells: &[S]) -> Record {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let value = cells.get(i).map_or("", |c| c.as_ref().trim());
            (header.clone(), value.to_string())
        })
        .collect()
}

/// Trims header cells and warns about names that appear more than once.
pub fn normalize_headers<S: AsRef<str>>(cells: &[S]) -> Vec<String> {
    let headers: Vec<String> = cells.iter().map(|c| c.as_ref().trim().to_string()).collect();

    let mut seen = HashMap::new();
    for (i, header) in headers.iter().enumerate().filter(|(_, h)| !h.is_empty()) {
        if let Some(first) = seen.insert(header.as_str(), i) {
            warn!(header = %header, first, duplicate = i, "duplicate header, later column wins");
        }
    }

    headers
}

/// Collects every field key that has no matching header, sorted.
pub fn unmatched_fields<'a, I>(keys: I, has_header: impl Fn(&str) -> bool) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut missing: Vec<String> = keys
        .into_iter()
        .filter(|k| !has_header(k.as_str()))
        .cloned()
        .collect();
    missing.sort();
    missing
}
