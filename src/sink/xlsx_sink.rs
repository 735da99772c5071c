//! Rewrite-on-every-reading XLSX sink.
use super::TableSink;
use crate::error::AppResult;
#[cfg(not(feature = "storage_xlsx"))]
use crate::error::LoggerError;
use crate::parser::Reading;
use std::path::{Path, PathBuf};

/// Worksheet that holds the table.
pub const SHEET_NAME: &str = "Sheet1";

/// A workbook that is fully rewritten for every new row.
#[derive(Debug, Clone)]
pub struct XlsxSink {
    path: PathBuf,
}

impl XlsxSink {
    /// Sink rewriting the workbook at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(feature = "storage_xlsx")]
impl XlsxSink {
    fn write_table(&self, rows: &[Vec<String>]) -> AppResult<()> {
        use rust_xlsxwriter::{Format, FormatBorder, Workbook};

        let mut workbook = Workbook::new();
        let header = Format::new().set_bold().set_border(FormatBorder::Thin);
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, title) in super::COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *title, &header)?;
        }
        for (i, row) in rows.iter().enumerate() {
            let excel_row = i as u32 + 1;
            for (col, cell) in row.iter().enumerate() {
                sheet.write_string(excel_row, col as u16, cell)?;
            }
        }

        workbook.save(&self.path)?;
        Ok(())
    }
}

#[cfg(feature = "storage_xlsx")]
fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;

    match cell {
        Data::String(s) => unescape_ooxml(s),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

#[cfg(feature = "storage_xlsx")]
/// Undo the `_xHHHH_` escaping the writer applies to control characters and
/// to literal `_xHHHH_` text (whose underscore becomes `_x005F_`).
///
/// The reader returns shared strings still escaped, and every rewrite would
/// otherwise escape the already-escaped text again.
fn unescape_ooxml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match decode_escape(candidate) {
            Some(c) => {
                out.push(c);
                rest = &candidate[7..];
            }
            None => {
                out.push_str("_x");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(feature = "storage_xlsx")]
/// Decode a leading `_xHHHH_` token.
fn decode_escape(token: &str) -> Option<char> {
    let bytes = token.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' {
        return None;
    }
    let hex = token.get(2..6)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

#[cfg(feature = "storage_xlsx")]
impl TableSink for XlsxSink {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn append_row(&self, reading: &Reading) -> AppResult<()> {
        let mut rows = self.rows()?;
        rows.push(reading.cells().iter().map(|c| (*c).to_owned()).collect());
        self.write_table(&rows)
    }

    fn rows(&self) -> AppResult<Vec<Vec<String>>> {
        use calamine::{open_workbook, Reader, Xlsx};

        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;
        let range = match workbook.worksheet_range_at(0) {
            Some(range) => range?,
            None => return Ok(Vec::new()),
        };

        let width = super::COLUMNS.len();
        Ok(range
            .rows()
            .skip(1)
            .map(|row| {
                (0..width)
                    .map(|col| row.get(col).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect())
    }
}

#[cfg(not(feature = "storage_xlsx"))]
impl TableSink for XlsxSink {
    fn name(&self) -> &'static str {
        "xlsx"
    }
    fn path(&self) -> &Path {
        &self.path
    }
    fn append_row(&self, _reading: &Reading) -> AppResult<()> {
        Err(LoggerError::FeatureNotEnabled("storage_xlsx".to_string()))
    }
    fn rows(&self) -> AppResult<Vec<Vec<String>>> {
        Err(LoggerError::FeatureNotEnabled("storage_xlsx".to_string()))
    }
}
