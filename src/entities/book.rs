// 📚 Book Entity - one catalog item with a distribution cost
//
// Books always reference an existing category (foreign key, cascade on delete).
// The expense is a fixed-precision decimal kept as TEXT in SQLite so that
// aggregation never goes through floating point.

use crate::db::{insert_event, Event};
use crate::entities::category::get_category;
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const TITLE_MAX_LEN: usize = 200;
pub const SUBTITLE_MAX_LEN: usize = 250;
pub const AUTHORS_MAX_LEN: usize = 100;
pub const PUBLISHER_MAX_LEN: usize = 100;

/// Fractional digits kept for distribution expenses
pub const EXPENSE_SCALE: u32 = 2;

/// Ten significant digits with two decimals: 99 999 999.99 is the largest value
pub const EXPENSE_LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// BOOK ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub authors: String,
    pub publisher: String,
    pub published_date: NaiveDate,
    pub category_id: String,
    /// Joined from categories for display
    pub category_name: String,
    pub distribution_expense: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Book fields as entered by hand (or staged by the importer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookInput {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub publisher: String,
    pub published_date: NaiveDate,
    pub category_id: String,
    pub distribution_expense: Decimal,
}

impl BookInput {
    /// Trim text fields, round the expense, and check every field limit.
    pub fn validate(&self) -> StoreResult<BookInput> {
        let input = self.validate_details()?;

        if input.category_id.is_empty() {
            return Err(StoreError::invalid("category_id", "category is required"));
        }

        Ok(input)
    }

    /// Same as `validate` minus the category reference, which the importer
    /// only knows after category resolution.
    pub fn validate_details(&self) -> StoreResult<BookInput> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(StoreError::invalid("title", "title is required"));
        }
        check_len("title", title, TITLE_MAX_LEN)?;

        let subtitle = self.subtitle.trim();
        check_len("subtitle", subtitle, SUBTITLE_MAX_LEN)?;
        let authors = self.authors.trim();
        check_len("authors", authors, AUTHORS_MAX_LEN)?;
        let publisher = self.publisher.trim();
        check_len("publisher", publisher, PUBLISHER_MAX_LEN)?;

        Ok(BookInput {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            authors: authors.to_string(),
            publisher: publisher.to_string(),
            published_date: self.published_date,
            category_id: self.category_id.trim().to_string(),
            distribution_expense: validate_expense(self.distribution_expense)?,
        })
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> StoreResult<()> {
    if value.chars().count() > max {
        return Err(StoreError::invalid(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(())
}

/// Round to two decimals and enforce 0 <= expense < 100 000 000
pub fn validate_expense(value: Decimal) -> StoreResult<Decimal> {
    let mut rounded =
        value.round_dp_with_strategy(EXPENSE_SCALE, RoundingStrategy::MidpointAwayFromZero);

    if rounded < Decimal::ZERO {
        return Err(StoreError::invalid(
            "distribution_expense",
            format!("must not be negative, got {}", value),
        ));
    }
    if rounded >= EXPENSE_LIMIT {
        return Err(StoreError::invalid(
            "distribution_expense",
            format!("must be below {}, got {}", EXPENSE_LIMIT, value),
        ));
    }

    // -0.001 rounds to -0.00; store it as 0.00
    rounded.set_sign_positive(true);
    rounded.rescale(EXPENSE_SCALE);
    Ok(rounded)
}

const BOOK_COLUMNS: &str = "b.id, b.title, b.subtitle, b.authors, b.publisher, b.published_date,
     b.category_id, c.name, b.distribution_expense, b.created_at";

fn book_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    let published_date: String = row.get(5)?;
    let expense: String = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        subtitle: row.get(2)?,
        authors: row.get(3)?,
        publisher: row.get(4)?,
        published_date: NaiveDate::parse_from_str(&published_date, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        category_id: row.get(6)?,
        category_name: row.get(7)?,
        distribution_expense: Decimal::from_str(&expense)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
    })
}

// ============================================================================
// BOOK STORE
// ============================================================================

/// Create a single book from manual entry
pub fn insert_book(conn: &Connection, input: &BookInput) -> StoreResult<Book> {
    let input = input.validate()?;

    let tx = conn.unchecked_transaction()?;
    // Surface a readable "not found" instead of a foreign key failure
    let category = get_category(&tx, &input.category_id)?;

    let id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO books (
            id, title, subtitle, authors, publisher, published_date,
            category_id, distribution_expense, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            input.title,
            input.subtitle,
            input.authors,
            input.publisher,
            input.published_date.format(DATE_FORMAT).to_string(),
            category.id,
            input.distribution_expense.to_string(),
            Utc::now().to_rfc3339(),
        ],
    )?;

    insert_event(
        &tx,
        &Event::new(
            "book_created",
            "book",
            &id,
            serde_json::json!({
                "title": input.title,
                "category": category.name,
                "distribution_expense": input.distribution_expense.to_string(),
            }),
            "manual_entry",
        ),
    )?;

    let book = get_book(&tx, &id)?;
    tx.commit()?;

    Ok(book)
}

/// Bulk-insert already validated books.
///
/// Opens no transaction: callers wrap it (the importer commits it together
/// with the categories it created). Returns the number of rows written.
pub fn insert_books(conn: &Connection, books: &[BookInput]) -> StoreResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO books (
            id, title, subtitle, authors, publisher, published_date,
            category_id, distribution_expense, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    let created_at = Utc::now().to_rfc3339();
    let mut inserted = 0;

    for book in books {
        stmt.execute(params![
            uuid::Uuid::new_v4().to_string(),
            book.title,
            book.subtitle,
            book.authors,
            book.publisher,
            book.published_date.format(DATE_FORMAT).to_string(),
            book.category_id,
            book.distribution_expense.to_string(),
            created_at,
        ])?;
        inserted += 1;
    }

    Ok(inserted)
}

/// All books with their category name, ordered by title
pub fn get_all_books(conn: &Connection) -> StoreResult<Vec<Book>> {
    let sql = format!(
        "SELECT {} FROM books b JOIN categories c ON c.id = b.category_id
         ORDER BY b.title COLLATE NOCASE, b.id",
        BOOK_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let books = stmt
        .query_map([], book_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(books)
}

pub fn get_book(conn: &Connection, id: &str) -> StoreResult<Book> {
    let sql = format!(
        "SELECT {} FROM books b JOIN categories c ON c.id = b.category_id WHERE b.id = ?1",
        BOOK_COLUMNS
    );

    conn.query_row(&sql, [id], book_from_row)
        .optional()?
        .ok_or_else(|| StoreError::not_found("book", id))
}

pub fn update_book(conn: &Connection, id: &str, input: &BookInput) -> StoreResult<Book> {
    let input = input.validate()?;

    let tx = conn.unchecked_transaction()?;
    let category = get_category(&tx, &input.category_id)?;

    let updated = tx.execute(
        "UPDATE books SET
            title = ?1, subtitle = ?2, authors = ?3, publisher = ?4,
            published_date = ?5, category_id = ?6, distribution_expense = ?7
         WHERE id = ?8",
        params![
            input.title,
            input.subtitle,
            input.authors,
            input.publisher,
            input.published_date.format(DATE_FORMAT).to_string(),
            category.id,
            input.distribution_expense.to_string(),
            id,
        ],
    )?;

    if updated == 0 {
        return Err(StoreError::not_found("book", id));
    }

    insert_event(
        &tx,
        &Event::new(
            "book_updated",
            "book",
            id,
            serde_json::to_value(&input)?,
            "manual_entry",
        ),
    )?;

    let book = get_book(&tx, id)?;
    tx.commit()?;

    Ok(book)
}

pub fn delete_book(conn: &Connection, id: &str) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;

    let deleted = tx.execute("DELETE FROM books WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("book", id));
    }

    insert_event(
        &tx,
        &Event::new("book_deleted", "book", id, serde_json::json!({}), "manual_entry"),
    )?;

    tx.commit()?;
    Ok(())
}

pub fn count_books(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
    Ok(count)
}
