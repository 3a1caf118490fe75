//! Formula evaluation for workbook reads.
//!
//! Cells are loaded into a formualizer workbook, constants as literal
//! formulas, and formula cells are evaluated on demand. The engine works in
//! one-based coordinates; this module takes the zero-based ones used
//! everywhere else in the crate.

use formualizer_common::LiteralValue;
use formualizer_workbook::Workbook;
use tracing::debug;

use crate::types::CellValue;

/// A workbook's cells loaded into the formula engine.
pub struct Recalc {
    engine: Workbook,
}

impl Default for Recalc {
    fn default() -> Self {
        Self::new()
    }
}

impl Recalc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: Workbook::new(),
        }
    }

    /// Registers a sheet. Returns `false` if the engine refuses it, in which
    /// case its cells should not be loaded.
    pub fn add_sheet(&mut self, name: &str) -> bool {
        match self.engine.add_sheet(name) {
            Ok(_) => true,
            Err(e) => {
                debug!(sheet = name, error = ?e, "sheet not loaded into formula engine");
                false
            }
        }
    }

    /// Loads a cell. `formula` takes precedence over `value` and may carry
    /// a leading `=`.
    pub fn set_cell(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
        value: &CellValue,
        formula: Option<&str>,
    ) {
        let source = match formula {
            Some(f) => f.trim_start_matches('=').to_string(),
            None => match literal_formula(value) {
                Some(literal) => literal,
                None => return,
            },
        };

        if let Err(e) = self.engine.set_formula(sheet, row + 1, col + 1, &source) {
            debug!(sheet, row, col, formula = %source, error = ?e, "formula not loaded");
        }
    }

    /// Evaluates a cell, or `None` if the engine cannot produce a value.
    pub fn evaluate(&mut self, sheet: &str, row: u32, col: u32) -> Option<CellValue> {
        if let Err(e) = self.engine.evaluate_cell(sheet, row + 1, col + 1) {
            debug!(sheet, row, col, error = ?e, "formula evaluation failed");
            return None;
        }
        self.engine
            .get_value(sheet, row + 1, col + 1)
            .and_then(from_literal)
    }
}

/// Spells a constant as a formula the engine parses back to the same value.
fn literal_formula(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        CellValue::Number(n) => Some(n.to_string()),
        CellValue::Text(s) => Some(format!("\"{}\"", s.replace('"', "\"\""))),
        CellValue::Bool(true) => Some("TRUE".to_string()),
        CellValue::Bool(false) => Some("FALSE".to_string()),
        CellValue::Error(e) => Some(e.clone()),
    }
}

#[allow(clippy::cast_precision_loss)] // spreadsheet numbers are f64
fn from_literal(value: LiteralValue) -> Option<CellValue> {
    match value {
        LiteralValue::Number(n) => Some(CellValue::Number(n)),
        LiteralValue::Int(i) => Some(CellValue::Number(i as f64)),
        LiteralValue::Text(s) => Some(CellValue::Text(s)),
        LiteralValue::Boolean(b) => Some(CellValue::Bool(b)),
        // A reference to a blank cell shows as zero.
        LiteralValue::Empty => Some(CellValue::Number(0.0)),
        LiteralValue::Error(e) => Some(CellValue::Error(e.to_string())),
        _ => None,
    }
}
