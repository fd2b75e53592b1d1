//! Spreadsheet bulk import
//!
//! One call imports one workbook, all or nothing:
//!
//! 1. read the first sheet and normalize its headers
//! 2. refuse the file when a required column is missing (nothing else runs)
//! 3. drop rows without a title, coerce every other row
//! 4. refuse the whole batch when any row has a bad date, amount or field
//! 5. inside one IMMEDIATE transaction: resolve categories against a bulk read,
//!    insert the new ones, bulk-insert the books, record the batch event
//!
//! A failure at any point drops the transaction, so no category or book from
//! a rejected batch is ever visible.

pub mod coerce;
pub mod resolve;
pub mod sheet;

use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

use crate::db::{insert_event, Event};
use crate::entities::book::{insert_books, BookInput};
use crate::entities::category::{save_category, Category};
use crate::error::{StoreError, StoreResult};
use coerce::{cell_text, parse_date_cell, parse_expense_cell};
use resolve::CategoryResolver;
use sheet::{cell, read_first_sheet, ColumnMap, Sheet};

/// A lost category race rolls the batch back and starts over, this many times at most
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

const IMPORT_ACTOR: &str = "spreadsheet_importer";

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// Every row committed
    Success { count: usize, new_categories: usize },

    /// Header row lacks required columns; no row was looked at
    RejectedSchema { missing_columns: BTreeSet<String> },

    /// At least one row failed coercion; nothing was written
    RejectedRows {
        bad_row_count: usize,
        issues: Vec<RowIssue>,
    },

    /// Unreadable file or storage failure; nothing was written
    Failure { reason: String },
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Success { .. })
    }

    /// Human-readable status line for the CLI and the upload redirect
    pub fn message(&self) -> String {
        match self {
            ImportOutcome::Success {
                count,
                new_categories,
            } => format!(
                "Import complete: {} book(s) added, {} new categor{}.",
                count,
                new_categories,
                if *new_categories == 1 { "y" } else { "ies" }
            ),
            ImportOutcome::RejectedSchema { missing_columns } => format!(
                "Missing columns in spreadsheet: {}",
                missing_columns.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            ImportOutcome::RejectedRows { bad_row_count, .. } => format!(
                "{} row(s) have invalid dates, costs or fields. Check your file.",
                bad_row_count
            ),
            ImportOutcome::Failure { reason } => format!("Import failed: {}", reason),
        }
    }
}

/// One rejected spreadsheet row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 1-based row number as shown by spreadsheet software
    pub row_number: usize,
    pub fields: Vec<FieldIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    /// Cell content as text
    pub value: String,
    pub reason: String,
}

impl FieldIssue {
    fn new(field: &str, value: String, reason: impl Into<String>) -> Self {
        FieldIssue {
            field: field.to_string(),
            value,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}:", self.row_number)?;
        for issue in &self.fields {
            write!(f, " {} '{}' ({})", issue.field, issue.value, issue.reason)?;
        }
        Ok(())
    }
}

// ============================================================================
// BATCH
// ============================================================================

/// A row that passed coercion; its category is still a name
#[derive(Debug, Clone)]
pub struct StagedRow {
    pub row_number: usize,
    pub category: String,
    pub book: BookInput,
}

/// Everything one commit writes
#[derive(Debug)]
pub struct ImportBatch {
    pub books: Vec<BookInput>,
    pub new_categories: Vec<Category>,
}

impl ImportBatch {
    /// Point every row at a category id, staging categories that do not exist yet
    pub fn stage(rows: &[StagedRow], mut resolver: CategoryResolver) -> Self {
        let books = rows
            .iter()
            .map(|row| BookInput {
                category_id: resolver.resolve(&row.category),
                ..row.book.clone()
            })
            .collect();

        ImportBatch {
            books,
            new_categories: resolver.into_staged(),
        }
    }
}

// ============================================================================
// IMPORT
// ============================================================================

/// Import a workbook held in memory
pub fn import_workbook(conn: &mut Connection, bytes: &[u8]) -> ImportOutcome {
    let digest = sha256_hex(bytes);
    log::info!(
        "Importing spreadsheet ({} bytes, sha256 {})",
        bytes.len(),
        &digest[..12]
    );

    let outcome = run_import(conn, bytes, &digest).unwrap_or_else(|e| {
        ImportOutcome::Failure {
            reason: format!("{:#}", e),
        }
    });

    match &outcome {
        ImportOutcome::Success { .. } => log::info!("{}", outcome.message()),
        ImportOutcome::Failure { .. } => log::error!("{}", outcome.message()),
        _ => log::warn!("{}", outcome.message()),
    }

    outcome
}

/// Import a workbook from disk
pub fn import_file(conn: &mut Connection, path: &Path) -> ImportOutcome {
    match std::fs::read(path) {
        Ok(bytes) => import_workbook(conn, &bytes),
        Err(e) => ImportOutcome::Failure {
            reason: format!("Failed to read {}: {}", path.display(), e),
        },
    }
}

fn run_import(conn: &mut Connection, bytes: &[u8], digest: &str) -> Result<ImportOutcome> {
    let sheet = read_first_sheet(bytes)?;
    log::debug!(
        "Sheet '{}': {} data row(s), headers {:?}",
        sheet.name,
        sheet.rows.len(),
        sheet.headers
    );

    let columns = match ColumnMap::from_headers(&sheet.headers) {
        Ok(columns) => columns,
        Err(missing_columns) => return Ok(ImportOutcome::RejectedSchema { missing_columns }),
    };

    let (rows, issues) = stage_rows(&sheet, &columns);
    if !issues.is_empty() {
        for issue in &issues {
            log::warn!("Invalid {}", issue);
        }
        return Ok(ImportOutcome::RejectedRows {
            bad_row_count: issues.len(),
            issues,
        });
    }

    let (count, new_categories) = commit_with_retry(conn, &rows, digest)?;
    Ok(ImportOutcome::Success {
        count,
        new_categories,
    })
}

/// Coerce every titled row; untitled rows are padding and vanish here
fn stage_rows(sheet: &Sheet, columns: &ColumnMap) -> (Vec<StagedRow>, Vec<RowIssue>) {
    let mut staged = Vec::new();
    let mut issues = Vec::new();

    for (index, row) in sheet.rows.iter().enumerate() {
        let title = cell_text(cell(row, columns.title));
        if title.is_empty() {
            continue;
        }

        let row_number = sheet.row_number(index);
        match stage_row(row, columns, title) {
            Ok((category, book)) => staged.push(StagedRow {
                row_number,
                category,
                book,
            }),
            Err(fields) => issues.push(RowIssue { row_number, fields }),
        }
    }

    (staged, issues)
}

fn stage_row(
    row: &[calamine::Data],
    columns: &ColumnMap,
    title: String,
) -> std::result::Result<(String, BookInput), Vec<FieldIssue>> {
    let mut problems = Vec::new();

    let date_cell = cell(row, columns.published_date);
    let published_date = parse_date_cell(date_cell);
    if published_date.is_none() {
        problems.push(FieldIssue::new(
            "published_date",
            cell_text(date_cell),
            "not a recognizable date",
        ));
    }

    let expense_cell = cell(row, columns.distribution_expense);
    let expense = match parse_expense_cell(expense_cell) {
        Ok(value) => Some(value),
        Err(reason) => {
            problems.push(FieldIssue::new(
                "distribution_expense",
                cell_text(expense_cell),
                reason,
            ));
            None
        }
    };

    let category = cell_text(cell(row, columns.category));
    if category.is_empty() {
        problems.push(FieldIssue::new("category", category.clone(), "category is required"));
    }

    let (Some(published_date), Some(distribution_expense)) = (published_date, expense) else {
        return Err(problems);
    };
    if !problems.is_empty() {
        return Err(problems);
    }

    let input = BookInput {
        title,
        subtitle: cell_text(cell(row, columns.subtitle)),
        authors: cell_text(cell(row, columns.authors)),
        publisher: cell_text(cell(row, columns.publisher)),
        published_date,
        category_id: String::new(),
        distribution_expense,
    };

    match input.validate_details() {
        Ok(book) => Ok((category, book)),
        Err(StoreError::Invalid { field, message }) => {
            let value = match field {
                "title" => input.title.clone(),
                "subtitle" => input.subtitle.clone(),
                "authors" => input.authors.clone(),
                "publisher" => input.publisher.clone(),
                _ => String::new(),
            };
            Err(vec![FieldIssue::new(field, value, message)])
        }
        Err(other) => Err(vec![FieldIssue::new("row", String::new(), other.to_string())]),
    }
}

/// Retry only when another writer created one of our new categories first
fn is_retryable(err: &StoreError) -> bool {
    matches!(err, StoreError::DuplicateCategory { .. })
}

fn commit_with_retry(
    conn: &mut Connection,
    rows: &[StagedRow],
    digest: &str,
) -> Result<(usize, usize)> {
    let mut attempt = 1;

    loop {
        match commit_batch(conn, rows, digest) {
            Ok(summary) => return Ok(summary),
            Err(e) if is_retryable(&e) && attempt < MAX_COMMIT_ATTEMPTS => {
                log::warn!(
                    "Category conflict on attempt {}/{} ({}); retrying batch",
                    attempt,
                    MAX_COMMIT_ATTEMPTS,
                    e
                );
                attempt += 1;
            }
            Err(e) if is_retryable(&e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Category conflict persisted after {} attempts",
                    attempt
                )));
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to commit import batch")),
        }
    }
}

/// One attempt: read, resolve, write, commit. Dropping `tx` on error rolls back.
fn commit_batch(
    conn: &mut Connection,
    rows: &[StagedRow],
    digest: &str,
) -> StoreResult<(usize, usize)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let resolver = CategoryResolver::load(&tx)?;
    let batch = ImportBatch::stage(rows, resolver);

    for category in &batch.new_categories {
        save_category(&tx, category, IMPORT_ACTOR)?;
    }

    let count = insert_books(&tx, &batch.books)?;

    insert_event(
        &tx,
        &Event::new(
            "batch_imported",
            "import",
            digest,
            serde_json::json!({
                "records": count,
                "new_categories": batch
                    .new_categories
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>(),
            }),
            IMPORT_ACTOR,
        ),
    )?;

    tx.commit()?;
    Ok((count, batch.new_categories.len()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================
