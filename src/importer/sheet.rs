//! Workbook reading and header normalization
//!
//! Only the first worksheet is read. Its first used row is the header row;
//! header text is normalized so that `"Published Date"`, `published_date`
//! and `Published_Date` name the same column.

use anyhow::{anyhow, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;

use super::coerce::cell_text;

/// Columns every import file must carry (after normalization)
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "title",
    "subtitle",
    "authors",
    "publisher",
    "published_date",
    "category",
    "distribution_expense",
];

/// The first worksheet of an uploaded workbook
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Normalized header names, in column order
    pub headers: Vec<String>,
    /// Data rows (header excluded)
    pub rows: Vec<Vec<Data>>,
    /// 1-based spreadsheet row number of the header row
    pub header_row_number: usize,
}

impl Sheet {
    /// Spreadsheet row number (1-based) of the data row at `index`
    pub fn row_number(&self, index: usize) -> usize {
        self.header_row_number + index + 1
    }
}

/// Trim, lower-case, and turn every space into an underscore
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Decode workbook bytes (xlsx, xlsm, xlsb, xls or ods) and read the first sheet
pub fn read_first_sheet(bytes: &[u8]) -> Result<Sheet> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| anyhow!("File is not a readable spreadsheet: {}", e))?;

    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("Workbook contains no worksheet"))?;

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| anyhow!("Failed to read sheet '{}': {}", name, e))?;

    let header_row_number = range.start().map(|(row, _)| row as usize + 1).unwrap_or(1);

    let mut rows = range.rows().map(|r| r.to_vec());
    let headers = rows
        .next()
        .map(|header| header.iter().map(|c| normalize_header(&cell_text(c))).collect())
        .unwrap_or_default();

    Ok(Sheet {
        name,
        headers,
        rows: rows.collect(),
        header_row_number,
    })
}

/// Position of each required column in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub title: usize,
    pub subtitle: usize,
    pub authors: usize,
    pub publisher: usize,
    pub published_date: usize,
    pub category: usize,
    pub distribution_expense: usize,
}

impl ColumnMap {
    /// Locate the required columns among normalized headers.
    ///
    /// Returns the full set of missing column names when any is absent.
    /// A header that appears twice resolves to its first occurrence.
    pub fn from_headers(headers: &[String]) -> Result<Self, BTreeSet<String>> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            positions.entry(header.as_str()).or_insert(index);
        }

        let missing: BTreeSet<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| !positions.contains_key(*column))
            .map(|column| column.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(missing);
        }

        let at = |column: &str| positions[column];
        Ok(ColumnMap {
            title: at("title"),
            subtitle: at("subtitle"),
            authors: at("authors"),
            publisher: at("publisher"),
            published_date: at("published_date"),
            category: at("category"),
            distribution_expense: at("distribution_expense"),
        })
    }
}

/// Cell at `index`, or Empty when the row is shorter than the header
pub fn cell(row: &[Data], index: usize) -> &Data {
    row.get(index).unwrap_or(&Data::Empty)
}
