//! testdata-sheets: spreadsheet rows as header-keyed test data records.
//!
//! Two independent readers share one output shape, a list of
//! [`Record`]s keyed by the first row's values:
//!
//! - [`excel`] reads local `.xlsx`/`.xls` workbooks and can update or append
//!   rows in `.xlsx` files. Cells display through their number format
//!   ([`numfmt`]) and formulas are evaluated on read ([`recalc`]).
//! - [`google`] reads a cell range from Google Sheets with a service-account
//!   key.
//!
//! [`datasource`] names either kind of source in a YAML file.

pub mod datasource;
pub mod error;
pub mod excel;
pub mod google;
pub mod numfmt;
pub mod recalc;
pub mod types;

#[cfg(test)]
mod test_fixtures;

pub use error::{ErrorKind, Result, SheetError};
pub use types::{CellValue, Record, RecordSet};
