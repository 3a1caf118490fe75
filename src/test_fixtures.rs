//! Workbook fixtures built at test time.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Formula, Workbook, XlsxError};

use crate::types::Record;

/// Creates a workbook with a "Data" sheet of people and a "Totals" sheet
/// whose profit row is the formula `B2-B3` with a cached result.
pub fn create_people_xlsx(path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();

    let data = workbook.add_worksheet();
    data.set_name("Data")?;
    data.write(0, 0, "id")?;
    data.write(0, 1, "name")?;
    data.write(1, 0, 1.0)?;
    data.write(1, 1, "Alice")?;

    let totals = workbook.add_worksheet();
    totals.set_name("Totals")?;
    totals.write(0, 0, "Name")?;
    totals.write(0, 1, "Value")?;
    totals.write(1, 0, "revenue")?;
    totals.write(1, 1, 100_000.0)?;
    totals.write(2, 0, "costs")?;
    totals.write(2, 1, 40_000.0)?;
    totals.write(3, 0, "profit")?;
    totals.write_formula(3, 1, Formula::new("=B2-B3").set_result("60000"))?;

    workbook.save(path)?;
    Ok(())
}

pub fn people_fixture() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Book.xlsx");
    create_people_xlsx(&path).unwrap();
    (dir, path)
}

/// Creates a "Rates" sheet whose cells carry percent, fixed-decimal,
/// thousands, and date number formats.
pub fn create_formatted_xlsx(path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Rates")?;

    for (col, header) in (0_u16..).zip(["plan", "rate", "fee", "volume", "starts"]) {
        sheet.write(0, col, header)?;
    }
    sheet.write(1, 0, "basic")?;
    sheet.write_number_with_format(1, 1, 0.5, &Format::new().set_num_format("0%"))?;
    sheet.write_number_with_format(1, 2, 1.5, &Format::new().set_num_format("0.00"))?;
    sheet.write_number_with_format(1, 3, 1_234_567.0, &Format::new().set_num_format("#,##0"))?;
    sheet.write_number_with_format(1, 4, 45_000.0, &Format::new().set_num_format("d-mmm-yyyy"))?;

    workbook.save(path)?;
    Ok(())
}

pub fn fields(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// A cell of a legacy workbook fixture.
pub enum XlsCell<'a> {
    Text(&'a str),
    Number(f64),
}

const RECORD_BOF: u16 = 0x0809;
const RECORD_EOF: u16 = 0x000A;
const RECORD_CODEPAGE: u16 = 0x0042;
const RECORD_WINDOW1: u16 = 0x003D;
const RECORD_FONT: u16 = 0x0031;
const RECORD_XF: u16 = 0x00E0;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_SST: u16 = 0x00FC;
const RECORD_DIMENSIONS: u16 = 0x0200;
const RECORD_WINDOW2: u16 = 0x023E;
const RECORD_NUMBER: u16 = 0x0203;
const RECORD_LABELSST: u16 = 0x00FD;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOF_WORKBOOK_GLOBALS: u16 = 0x0005;
const BOF_WORKSHEET: u16 = 0x0010;

/// The first 16 XFs are style XFs; cells use the one after them.
const CELL_XF: u16 = 16;

/// Builds a single-sheet BIFF8 `.xls` file, one row per slice, starting at
/// row 0. Only strings and numbers are supported.
pub fn build_xls(sheet_name: &str, rows: &[&[XlsCell<'_>]]) -> Vec<u8> {
    let mut strings: Vec<&str> = Vec::new();
    let mut cells = Vec::new();
    for (row, values) in (0_u16..).zip(rows) {
        for (col, value) in (0_u16..).zip(values.iter()) {
            let mut payload = Vec::new();
            payload.extend_from_slice(&row.to_le_bytes());
            payload.extend_from_slice(&col.to_le_bytes());
            payload.extend_from_slice(&CELL_XF.to_le_bytes());
            match value {
                XlsCell::Text(s) => {
                    let index = strings.iter().position(|t| t == s).unwrap_or_else(|| {
                        strings.push(*s);
                        strings.len() - 1
                    });
                    payload.extend_from_slice(&u32::try_from(index).unwrap().to_le_bytes());
                    cells.push((RECORD_LABELSST, payload));
                }
                XlsCell::Number(n) => {
                    payload.extend_from_slice(&n.to_le_bytes());
                    cells.push((RECORD_NUMBER, payload));
                }
            }
        }
    }

    let mut globals = Vec::new();
    push_record(&mut globals, RECORD_BOF, &bof(BOF_WORKBOOK_GLOBALS));
    push_record(&mut globals, RECORD_CODEPAGE, &1252_u16.to_le_bytes());
    push_record(&mut globals, RECORD_WINDOW1, &window1());
    push_record(&mut globals, RECORD_FONT, &font("Arial"));
    for _ in 0..CELL_XF {
        push_record(&mut globals, RECORD_XF, &xf(true));
    }
    push_record(&mut globals, RECORD_XF, &xf(false));

    let boundsheet_start = globals.len();
    let mut boundsheet = vec![0_u8; 4]; // stream offset, patched below
    boundsheet.push(0x00); // visible
    boundsheet.push(0x00); // worksheet
    write_short_string(&mut boundsheet, sheet_name);
    push_record(&mut globals, RECORD_BOUNDSHEET, &boundsheet);

    let count = u32::try_from(strings.len()).unwrap();
    let mut sst = Vec::new();
    sst.extend_from_slice(&count.to_le_bytes());
    sst.extend_from_slice(&count.to_le_bytes());
    for s in &strings {
        write_string(&mut sst, s);
    }
    push_record(&mut globals, RECORD_SST, &sst);
    push_record(&mut globals, RECORD_EOF, &[]);

    let mut sheet = Vec::new();
    push_record(&mut sheet, RECORD_BOF, &bof(BOF_WORKSHEET));
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut dimensions = Vec::new();
    dimensions.extend_from_slice(&0_u32.to_le_bytes());
    dimensions.extend_from_slice(&u32::try_from(rows.len()).unwrap().to_le_bytes());
    dimensions.extend_from_slice(&0_u16.to_le_bytes());
    dimensions.extend_from_slice(&u16::try_from(width).unwrap().to_le_bytes());
    dimensions.extend_from_slice(&0_u16.to_le_bytes());
    push_record(&mut sheet, RECORD_DIMENSIONS, &dimensions);
    for (id, payload) in &cells {
        push_record(&mut sheet, *id, payload);
    }
    push_record(&mut sheet, RECORD_WINDOW2, &window2());
    push_record(&mut sheet, RECORD_EOF, &[]);

    let offset = u32::try_from(globals.len()).unwrap();
    globals[boundsheet_start + 4..boundsheet_start + 8].copy_from_slice(&offset.to_le_bytes());
    globals.extend_from_slice(&sheet);

    let mut ole = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
    {
        let mut stream = ole.create_stream("Workbook").unwrap();
        stream.write_all(&globals).unwrap();
    }
    ole.into_inner().into_inner()
}

fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&u16::try_from(data.len()).unwrap().to_le_bytes());
    out.extend_from_slice(data);
}

fn bof(stream_type: u16) -> [u8; 16] {
    let mut out = [0_u8; 16];
    out[0..2].copy_from_slice(&BOF_VERSION_BIFF8.to_le_bytes());
    out[2..4].copy_from_slice(&stream_type.to_le_bytes());
    out[4..6].copy_from_slice(&0x0DBB_u16.to_le_bytes()); // build
    out[6..8].copy_from_slice(&0x07CC_u16.to_le_bytes()); // year
    out
}

fn window1() -> [u8; 18] {
    let mut out = [0_u8; 18];
    out[14..16].copy_from_slice(&1_u16.to_le_bytes()); // selected tabs
    out[16..18].copy_from_slice(&600_u16.to_le_bytes()); // tab ratio
    out
}

fn window2() -> [u8; 18] {
    let mut out = [0_u8; 18];
    out[0..2].copy_from_slice(&0x02B6_u16.to_le_bytes());
    out
}

fn font(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&200_u16.to_le_bytes()); // 10pt
    out.extend_from_slice(&0_u16.to_le_bytes()); // flags
    out.extend_from_slice(&0x7FFF_u16.to_le_bytes()); // automatic color
    out.extend_from_slice(&400_u16.to_le_bytes()); // weight
    out.extend_from_slice(&0_u16.to_le_bytes()); // escapement
    out.extend_from_slice(&[0, 0, 0, 0]); // underline, family, charset, reserved
    write_short_string(&mut out, name);
    out
}

fn xf(style: bool) -> [u8; 20] {
    let mut out = [0_u8; 20];
    let flags: u16 = if style { 0x0005 } else { 0x0001 }; // locked, style bit
    out[4..6].copy_from_slice(&flags.to_le_bytes());
    out[6] = 0x20; // bottom aligned
    out[9] = 0x3F;
    out
}

/// BIFF8 `ShortXLUnicodeString`, stored compressed (Latin-1 only).
fn write_short_string(out: &mut Vec<u8>, s: &str) {
    out.push(u8::try_from(s.chars().count()).unwrap());
    out.push(0);
    out.extend(s.chars().map(|c| u8::try_from(u32::from(c)).unwrap()));
}

/// BIFF8 `XLUnicodeString`, stored compressed (Latin-1 only).
fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&u16::try_from(s.chars().count()).unwrap().to_le_bytes());
    out.push(0);
    out.extend(s.chars().map(|c| u8::try_from(u32::from(c)).unwrap()));
}
