// Entity Models
//
// Each entity has:
// - Stable identity (UUID) that NEVER changes
// - Free functions over a rusqlite Connection for create/read/update/delete

pub mod book;
pub mod category;

pub use book::{
    count_books, delete_book, get_all_books, get_book, insert_book, insert_books, update_book,
    validate_expense, Book, BookInput,
};
pub use category::{
    count_categories, delete_category, find_category_by_name, get_all_categories, get_category,
    insert_category, name_key, save_category, update_category, Category,
};
