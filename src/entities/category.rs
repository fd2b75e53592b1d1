// 🏷️ Category Entity - named grouping for books
//
// "Category name is a VALUE (can change), Category UUID is IDENTITY (never changes)"
//
// Identity for lookups is the name key: trimmed + lower-cased.
// At most one category per name key; the display name keeps the casing
// it was first written with.

use crate::db::{insert_event, Event};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

pub const CATEGORY_NAME_MAX_LEN: usize = 100;

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,

    /// Display name, e.g. "Science Fiction"
    pub name: String,

    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Create new category entity with UUID (name is trimmed, not validated)
    pub fn new(name: &str) -> Self {
        Category {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Case-insensitive identity of this category
    pub fn key(&self) -> String {
        name_key(&self.name)
    }
}

/// Normalized lookup key: "  Fiction " and "FICTION" share the key "fiction"
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Trim and check a category name against the data model limits
pub fn validate_name(name: &str) -> StoreResult<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(StoreError::invalid("name", "category name is required"));
    }

    if trimmed.chars().count() > CATEGORY_NAME_MAX_LEN {
        return Err(StoreError::invalid(
            "name",
            format!("must be at most {} characters", CATEGORY_NAME_MAX_LEN),
        ));
    }

    Ok(trimmed.to_string())
}

fn map_unique_violation(err: rusqlite::Error, name: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::DuplicateCategory {
                name: name.to_string(),
            }
        }
        other => StoreError::Sqlite(other),
    }
}

fn category_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    let created_at: String = row.get(2)?;

    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
    })
}

// ============================================================================
// CATEGORY STORE
// ============================================================================

/// Persist an already-built category and record the audit event.
///
/// Does not open a transaction of its own, so the importer can call it
/// inside its batch transaction.
pub fn save_category(conn: &Connection, category: &Category, actor: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO categories (id, name, name_key, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            category.id,
            category.name,
            category.key(),
            category.created_at.to_rfc3339(),
        ],
    )
    .map_err(|e| map_unique_violation(e, &category.name))?;

    insert_event(
        conn,
        &Event::new(
            "category_created",
            "category",
            &category.id,
            serde_json::json!({ "name": category.name }),
            actor,
        ),
    )?;

    Ok(())
}

/// Create a category from manual entry
pub fn insert_category(conn: &Connection, name: &str) -> StoreResult<Category> {
    let name = validate_name(name)?;
    let category = Category::new(&name);

    let tx = conn.unchecked_transaction()?;
    save_category(&tx, &category, "manual_entry")?;
    tx.commit()?;

    log::info!("Created category '{}' ({})", category.name, category.id);
    Ok(category)
}

/// All categories, ordered by name (case-insensitive)
pub fn get_all_categories(conn: &Connection) -> StoreResult<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, created_at FROM categories ORDER BY name_key, id",
    )?;

    let categories = stmt
        .query_map([], category_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

pub fn get_category(conn: &Connection, id: &str) -> StoreResult<Category> {
    conn.query_row(
        "SELECT id, name, created_at FROM categories WHERE id = ?1",
        [id],
        category_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("category", id))
}

/// Find category by name (case-insensitive, surrounding whitespace ignored)
pub fn find_category_by_name(conn: &Connection, name: &str) -> StoreResult<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, created_at FROM categories WHERE name_key = ?1",
            [name_key(name)],
            category_from_row,
        )
        .optional()?;

    Ok(category)
}

/// Rename a category; the new name must still be unique
pub fn update_category(conn: &Connection, id: &str, name: &str) -> StoreResult<Category> {
    let name = validate_name(name)?;

    let tx = conn.unchecked_transaction()?;
    let updated = tx
        .execute(
            "UPDATE categories SET name = ?1, name_key = ?2 WHERE id = ?3",
            params![name, name_key(&name), id],
        )
        .map_err(|e| map_unique_violation(e, &name))?;

    if updated == 0 {
        return Err(StoreError::not_found("category", id));
    }

    insert_event(
        &tx,
        &Event::new(
            "category_updated",
            "category",
            id,
            serde_json::json!({ "name": name }),
            "manual_entry",
        ),
    )?;

    let category = get_category(&tx, id)?;
    tx.commit()?;

    Ok(category)
}

/// Delete a category and, through the cascade, every book filed under it
pub fn delete_category(conn: &Connection, id: &str) -> StoreResult<()> {
    let tx = conn.unchecked_transaction()?;

    let books_removed: i64 = tx.query_row(
        "SELECT COUNT(*) FROM books WHERE category_id = ?1",
        [id],
        |row| row.get(0),
    )?;

    let deleted = tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(StoreError::not_found("category", id));
    }

    insert_event(
        &tx,
        &Event::new(
            "category_deleted",
            "category",
            id,
            serde_json::json!({ "books_removed": books_removed }),
            "manual_entry",
        ),
    )?;

    tx.commit()?;

    log::info!("Deleted category {} ({} books removed)", id, books_removed);
    Ok(())
}

pub fn count_categories(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, setup_database};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_category_creation() {
        let category = Category::new("  Science Fiction ");

        assert!(!category.id.is_empty());
        assert_eq!(category.name, "Science Fiction");
        assert_eq!(category.key(), "science fiction");
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();

        let created = insert_category(&conn, "Fiction").unwrap();
        let loaded = get_category(&conn, &created.id).unwrap();

        assert_eq!(loaded, created);
        assert_eq!(count_categories(&conn).unwrap(), 1);

        let events = get_events_for_entity(&conn, "category", &created.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "category_created");
    }

    #[test]
    fn test_duplicate_name_is_case_insensitive() {
        let conn = test_db();
        insert_category(&conn, "Fiction").unwrap();

        let err = insert_category(&conn, "  FICTION ").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCategory { .. }));
        assert_eq!(count_categories(&conn).unwrap(), 1);
    }

    #[test]
    fn test_name_validation() {
        let conn = test_db();

        assert!(matches!(
            insert_category(&conn, "   ").unwrap_err(),
            StoreError::Invalid { field: "name", .. }
        ));

        let long_name = "x".repeat(CATEGORY_NAME_MAX_LEN + 1);
        assert!(insert_category(&conn, &long_name).is_err());

        let max_name = "y".repeat(CATEGORY_NAME_MAX_LEN);
        assert!(insert_category(&conn, &max_name).is_ok());
    }

    #[test]
    fn test_find_by_name() {
        let conn = test_db();
        let created = insert_category(&conn, "History").unwrap();

        let found = find_category_by_name(&conn, " history").unwrap();
        assert_eq!(found.map(|c| c.id), Some(created.id));
        assert!(find_category_by_name(&conn, "Poetry").unwrap().is_none());
    }

    #[test]
    fn test_list_is_sorted_by_name() {
        let conn = test_db();
        insert_category(&conn, "poetry").unwrap();
        insert_category(&conn, "Biography").unwrap();
        insert_category(&conn, "Art").unwrap();

        let names: Vec<String> = get_all_categories(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Art", "Biography", "poetry"]);
    }

    #[test]
    fn test_rename() {
        let conn = test_db();
        let created = insert_category(&conn, "scifi").unwrap();

        let renamed = update_category(&conn, &created.id, "SciFi").unwrap();
        assert_eq!(renamed.name, "SciFi");
        assert_eq!(renamed.id, created.id);
    }

    #[test]
    fn test_rename_onto_existing_name_fails() {
        let conn = test_db();
        insert_category(&conn, "Fiction").unwrap();
        let other = insert_category(&conn, "Drama").unwrap();

        let err = update_category(&conn, &other.id, "fiction").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCategory { .. }));
        assert_eq!(get_category(&conn, &other.id).unwrap().name, "Drama");
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let conn = test_db();

        assert!(get_category(&conn, "nope").unwrap_err().is_not_found());
        assert!(update_category(&conn, "nope", "Name").unwrap_err().is_not_found());
        assert!(delete_category(&conn, "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete() {
        let conn = test_db();
        let created = insert_category(&conn, "Travel").unwrap();

        delete_category(&conn, &created.id).unwrap();

        assert_eq!(count_categories(&conn).unwrap(), 0);
    }
}
