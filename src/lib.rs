// Bookshelf - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod importer; // Spreadsheet bulk import
pub mod logging;
pub mod report; // Cost per category

// Re-export commonly used types
pub use config::Config;
pub use db::{get_events_by_type, get_events_for_entity, insert_event, open_database, setup_database, Event};
pub use entities::{
    count_books, count_categories, delete_book, delete_category, find_category_by_name,
    get_all_books, get_all_categories, get_book, get_category, insert_book, insert_category,
    update_book, update_category, Book, BookInput, Category,
};
pub use error::{StoreError, StoreResult};
pub use importer::{import_file, import_workbook, ImportOutcome, RowIssue};
pub use report::{aggregate, write_csv, CategoryTotal, ExpenseReport, CHART_COLORS};
