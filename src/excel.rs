//! Local Excel workbooks as header-keyed records.
//!
//! `.xlsx` files are read and edited with umya-spreadsheet. An edit loads
//! the whole package, changes the target cells, and saves it again, so
//! styles, number formats, defined names, merged ranges, column widths,
//! and other sheets come through untouched. Legacy `.xls` files are read
//! with calamine and cannot be written.
//!
//! Formula cells are evaluated against the workbook's current values when
//! read. Where the engine cannot evaluate a formula, the result cached in
//! the file is shown instead.
//!
//! Saving overwrites the source file in place. The write is not atomic: a
//! failure mid-write can leave a truncated file behind.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use calamine::{open_workbook_auto, Data, ExcelDateTime, Range, Reader, SheetType};
use tracing::{debug, info};
use umya_spreadsheet::{Cell, Spreadsheet, Worksheet};

use crate::error::{Result, SheetError};
use crate::recalc::Recalc;
use crate::types::{normalize_headers, unmatched_fields, CellValue, Record, RecordSet};

/// Rows in an Excel worksheet.
pub const MAX_ROWS: u32 = 1_048_576;

/// Columns in an Excel worksheet.
pub const MAX_COLS: u32 = 16_384;

/// Spreadsheet file format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcelFormat {
    /// Office Open XML workbook (`.xlsx`).
    Xlsx,
    /// Legacy BIFF workbook (`.xls`).
    Xls,
}

impl ExcelFormat {
    /// Detects the format from the file extension, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("xlsx") => Ok(Self::Xlsx),
            Some("xls") => Ok(Self::Xls),
            _ => Err(SheetError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Returns `true` if workbooks of this format can be written back.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Xlsx)
    }
}

/// A cell loaded from a worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
struct GridCell {
    /// Constant value, or the formula's result once evaluated.
    value: CellValue,
    formula: Option<String>,
    number_format: Option<String>,
}

impl GridCell {
    fn display(&self) -> String {
        self.value.display(self.number_format.as_deref())
    }
}

/// Sparse worksheet contents addressed by zero-based `(row, col)`.
///
/// A row with no cells has no entry, which is how absent rows are told
/// apart from rows of blank cells.
#[derive(Debug, Default)]
struct SheetGrid {
    name: String,
    rows: BTreeMap<u32, BTreeMap<u32, GridCell>>,
}

impl SheetGrid {
    fn from_worksheet(worksheet: &Worksheet) -> Self {
        let mut grid = Self {
            name: worksheet.get_name().to_string(),
            ..Self::default()
        };

        for cell in worksheet.get_cell_collection() {
            // umya coordinates are one-based.
            let coordinate = cell.get_coordinate();
            let row = coordinate.get_row_num().saturating_sub(1);
            let col = coordinate.get_col_num().saturating_sub(1);

            let formula = cell.get_formula();
            *grid.cell_mut(row, col) = GridCell {
                value: umya_value(cell),
                formula: (!formula.is_empty()).then(|| formula.to_string()),
                number_format: cell
                    .get_style()
                    .get_number_format()
                    .map(|nf| nf.get_format_code().to_string()),
            };
        }
        grid
    }

    fn from_calamine(name: &str, values: &Range<Data>, formulas: &Range<String>) -> Self {
        let mut grid = Self {
            name: name.to_string(),
            ..Self::default()
        };

        if let Some(start) = values.start() {
            for (r, c, data) in values.used_cells() {
                let (row, col) = absolute(start, r, c);
                let (value, number_format) = calamine_value(data);
                let cell = grid.cell_mut(row, col);
                cell.value = value;
                cell.number_format = number_format;
            }
        }

        if let Some(start) = formulas.start() {
            for (r, c, formula) in formulas.used_cells() {
                if formula.is_empty() {
                    continue;
                }
                let (row, col) = absolute(start, r, c);
                grid.cell_mut(row, col).formula = Some(formula.clone());
            }
        }
        grid
    }

    fn cell_mut(&mut self, row: u32, col: u32) -> &mut GridCell {
        self.rows.entry(row).or_default().entry(col).or_default()
    }

    fn row(&self, index: u32) -> Option<&BTreeMap<u32, GridCell>> {
        self.rows.get(&index)
    }

    fn last_row(&self) -> Option<u32> {
        self.rows.keys().next_back().copied()
    }

    fn has_formulas(&self) -> bool {
        self.rows
            .values()
            .flat_map(BTreeMap::values)
            .any(|c| c.formula.is_some())
    }

    /// Formats a row as strings for columns `0..width`, blank where missing.
    fn display_row(row: &BTreeMap<u32, GridCell>, width: u32) -> Vec<String> {
        (0..width)
            .map(|col| row.get(&col).map_or_else(String::new, GridCell::display))
            .collect()
    }

    /// Trimmed header values from row 0, or `None` if row 0 is absent.
    fn headers(&self) -> Option<Vec<String>> {
        let row = self.row(0)?;
        let width = row.keys().next_back().map_or(0, |last| last + 1);
        Some(normalize_headers(&Self::display_row(row, width)))
    }

    /// Maps each non-empty header to its column index.
    fn header_index(&self) -> Option<HashMap<String, u32>> {
        let headers = self.headers()?;
        Some(
            (0_u32..)
                .zip(headers)
                .filter(|(_, h)| !h.is_empty())
                .map(|(col, h)| (h, col))
                .collect(),
        )
    }

    /// Resolves every field key to a column, failing with all unmatched
    /// keys at once.
    fn resolve_columns<'a>(&self, fields: &'a Record) -> Result<Vec<(u32, &'a str)>> {
        let index = self
            .header_index()
            .ok_or_else(|| SheetError::HeaderRowMissing(self.name.clone()))?;

        let missing = unmatched_fields(fields.keys(), |k| index.contains_key(k));
        if !missing.is_empty() {
            return Err(SheetError::ColumnsNotFound(missing));
        }

        Ok(fields
            .iter()
            .filter_map(|(k, v)| index.get(k).map(|&col| (col, v.as_str())))
            .collect())
    }

    fn to_record_set(&self) -> RecordSet {
        let Some(headers) = self.headers() else {
            return RecordSet::default();
        };

        #[allow(clippy::cast_possible_truncation)] // header width comes from a u32 column
        let width = headers.len() as u32;
        let mut set = RecordSet::new(headers);
        for row in self.rows.range(1..).map(|(_, cells)| cells) {
            set.push_row(&Self::display_row(row, width));
        }
        set
    }
}

#[allow(clippy::cast_possible_truncation)] // calamine ranges are addressed in u32
const fn absolute(start: (u32, u32), row: usize, col: usize) -> (u32, u32) {
    (start.0 + row as u32, start.1 + col as u32)
}

fn umya_value(cell: &Cell) -> CellValue {
    let raw = cell.get_value();
    if raw.is_empty() {
        return CellValue::Empty;
    }
    match cell.get_data_type() {
        "n" => raw
            .parse()
            .map_or_else(|_| CellValue::Text(raw.to_string()), CellValue::Number),
        "b" => CellValue::Bool(raw == "1" || raw.eq_ignore_ascii_case("TRUE")),
        "e" => CellValue::Error(raw.to_string()),
        _ => CellValue::Text(raw.to_string()),
    }
}

/// Converts a calamine cell. Date cells keep their serial number and get a
/// format code, since calamine reports that a cell is a date but not how
/// it was formatted.
#[allow(clippy::cast_precision_loss)]
fn calamine_value(data: &Data) -> (CellValue, Option<String>) {
    match data {
        Data::Empty => (CellValue::Empty, None),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            (CellValue::Text(s.clone()), None)
        }
        Data::Int(i) => (CellValue::Number(*i as f64), None),
        Data::Float(f) => (CellValue::Number(*f), None),
        Data::Bool(b) => (CellValue::Bool(*b), None),
        Data::DateTime(dt) => (
            CellValue::Number(dt.as_f64()),
            Some(date_format_code(dt).to_string()),
        ),
        Data::Error(e) => (CellValue::Error(e.to_string()), None),
    }
}

fn date_format_code(dt: &ExcelDateTime) -> &'static str {
    let serial = dt.as_f64();
    if dt.is_duration() {
        "[h]:mm:ss"
    } else if serial < 1.0 {
        "hh:mm:ss"
    } else if serial.fract() == 0.0 {
        "yyyy-mm-dd"
    } else {
        "yyyy-mm-dd hh:mm:ss"
    }
}

/// Replaces each formula cell's cached value in `sheets[target]` with the
/// engine's result, using every sheet as context.
fn evaluate_formulas(sheets: &mut [SheetGrid], target: usize) {
    let mut recalc = Recalc::new();
    for sheet in sheets.iter() {
        if !recalc.add_sheet(&sheet.name) {
            continue;
        }
        for (&row, cells) in &sheet.rows {
            for (&col, cell) in cells {
                recalc.set_cell(&sheet.name, row, col, &cell.value, cell.formula.as_deref());
            }
        }
    }

    let Some(sheet) = sheets.get_mut(target) else {
        return;
    };
    let mut evaluated = 0_usize;
    for (&row, cells) in &mut sheet.rows {
        for (&col, cell) in cells.iter_mut().filter(|(_, c)| c.formula.is_some()) {
            match recalc.evaluate(&sheet.name, row, col) {
                // Unknown function or name: Excel's cached result is better.
                Some(CellValue::Error(e)) if e.starts_with("#NAME?") => {}
                Some(value) => {
                    cell.value = value;
                    evaluated += 1;
                }
                None => {}
            }
        }
    }
    debug!(sheet = %sheet.name, evaluated, "evaluated formulas");
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().to_string())
}

fn ensure_exists(path: &Path) -> Result<ExcelFormat> {
    if !path.exists() {
        return Err(SheetError::FileNotFound(path.to_path_buf()));
    }
    ExcelFormat::from_path(path)
}

/// Loads every worksheet of a workbook as a grid, in workbook order.
fn load_grids(path: &Path, format: ExcelFormat) -> Result<Vec<SheetGrid>> {
    match format {
        ExcelFormat::Xlsx => {
            let book = umya_spreadsheet::reader::xlsx::read(path)?;
            Ok(book
                .get_sheet_collection()
                .iter()
                .map(SheetGrid::from_worksheet)
                .collect())
        }
        ExcelFormat::Xls => {
            let mut workbook = open_workbook_auto(path)?;
            let names: Vec<String> = workbook
                .sheets_metadata()
                .iter()
                .filter(|s| s.typ == SheetType::WorkSheet)
                .map(|s| s.name.clone())
                .collect();

            let mut grids = Vec::with_capacity(names.len());
            for name in names {
                let values = workbook.worksheet_range(&name)?;
                let formulas = workbook.worksheet_formula(&name)?;
                grids.push(SheetGrid::from_calamine(&name, &values, &formulas));
            }
            Ok(grids)
        }
    }
}

/// Reads a sheet into one record per data row.
///
/// Row 0 supplies the headers. Absent rows are skipped, missing cells are
/// empty strings. A sheet without a header row yields no records.
///
/// # Errors
///
/// Returns an Io error if the file is missing or unreadable, and a
/// Validation error for an unsupported extension or unknown sheet.
pub fn read(path: &Path, sheet: &str) -> Result<Vec<Record>> {
    Ok(read_table(path, sheet)?.records)
}

/// Like [`read`], but also returns the headers in column order.
///
/// # Errors
///
/// Same as [`read`].
pub fn read_table(path: &Path, sheet: &str) -> Result<RecordSet> {
    let format = ensure_exists(path)?;
    let mut grids = load_grids(path, format)?;

    let target = grids
        .iter()
        .position(|g| g.name == sheet)
        .ok_or_else(|| SheetError::SheetNotFound {
            sheet: sheet.to_string(),
            file: file_label(path),
        })?;

    if grids[target].has_formulas() {
        evaluate_formulas(&mut grids, target);
    }
    let set = grids[target].to_record_set();

    debug!(
        file = %path.display(),
        sheet,
        headers = set.headers.len(),
        records = set.records.len(),
        "read sheet"
    );
    Ok(set)
}

/// Sets the given columns on an existing row and saves the file.
///
/// `row_index` is zero-based over the whole sheet, so row 0 is the header
/// row and row 1 the first data row. Missing cells are created.
///
/// # Errors
///
/// Returns a Validation error naming the missing sheet, header row, every
/// unmatched column, or the row index, and an Io error if the file cannot
/// be read or written. Nothing is written unless all checks pass.
pub fn update_row(path: &Path, sheet: &str, row_index: u32, fields: &Record) -> Result<()> {
    let mut book = open_writable(path)?;
    let worksheet = worksheet_mut(&mut book, path, sheet)?;

    let grid = SheetGrid::from_worksheet(worksheet);
    let columns = grid.resolve_columns(fields)?;
    if grid.row(row_index).is_none() {
        return Err(SheetError::RowNotFound(row_index));
    }

    for (col, value) in columns {
        write_value(worksheet, row_index, col, value)?;
    }
    debug!(sheet, row = row_index, fields = fields.len(), "updated row");

    save(&book, path)
}

/// Appends a row one past the last populated row and saves the file.
///
/// Only the columns present in `fields` are set.
///
/// # Errors
///
/// Same taxonomy as [`update_row`], without the row check.
pub fn insert_row(path: &Path, sheet: &str, fields: &Record) -> Result<()> {
    let mut book = open_writable(path)?;
    let worksheet = worksheet_mut(&mut book, path, sheet)?;

    let grid = SheetGrid::from_worksheet(worksheet);
    let columns = grid.resolve_columns(fields)?;

    // The header row exists, so the sheet has at least row 0.
    let new_row = grid.last_row().map_or(0, |last| last + 1);
    for (col, value) in columns {
        write_value(worksheet, new_row, col, value)?;
    }
    debug!(sheet, row = new_row, fields = fields.len(), "inserted row");

    save(&book, path)
}

fn open_writable(path: &Path) -> Result<Spreadsheet> {
    let format = ensure_exists(path)?;
    if !format.is_writable() {
        return Err(SheetError::ReadOnlyFormat(path.to_path_buf()));
    }
    Ok(umya_spreadsheet::reader::xlsx::read(path)?)
}

fn worksheet_mut<'a>(
    book: &'a mut Spreadsheet,
    path: &Path,
    sheet: &str,
) -> Result<&'a mut Worksheet> {
    book.get_sheet_by_name_mut(sheet)
        .ok_or_else(|| SheetError::SheetNotFound {
            sheet: sheet.to_string(),
            file: file_label(path),
        })
}

/// Writes `value` into a cell.
///
/// The value is stored as a number when the cell's number format displays
/// that number as exactly `value`, so formulas can compute with it and a
/// later read returns the same string. Anything else is stored as text.
/// The cell's style is kept.
fn write_value(worksheet: &mut Worksheet, row: u32, col: u32, value: &str) -> Result<()> {
    if row >= MAX_ROWS || col >= MAX_COLS {
        return Err(SheetError::CellOutOfRange { row, col });
    }

    let cell = worksheet.get_cell_mut((col + 1, row + 1));
    let number_format = cell
        .get_style()
        .get_number_format()
        .map(|nf| nf.get_format_code().to_string());
    let number = value.parse::<f64>().ok().filter(|n| {
        n.is_finite() && CellValue::Number(*n).display(number_format.as_deref()) == value
    });

    match number {
        Some(n) => {
            cell.set_value_number(n);
        }
        None => {
            cell.set_value_string(value);
        }
    }
    Ok(())
}

fn save(book: &Spreadsheet, path: &Path) -> Result<()> {
    umya_spreadsheet::writer::xlsx::write(book, path)?;
    info!(file = %path.display(), "saved workbook");
    Ok(())
}
