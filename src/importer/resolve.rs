//! Request-scoped category resolution
//!
//! Built once per import attempt from a bulk read of every stored category,
//! then grown in place as the batch introduces new names. Nothing here is
//! persisted on its own; the staged categories are written by the commit.

use crate::entities::category::{get_all_categories, name_key, Category};
use crate::error::StoreResult;
use rusqlite::Connection;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CategoryResolver {
    by_key: HashMap<String, Category>,
    staged: Vec<Category>,
}

impl CategoryResolver {
    /// Seed from every category currently stored (one query)
    pub fn load(conn: &Connection) -> StoreResult<Self> {
        Ok(Self::from_existing(get_all_categories(conn)?))
    }

    pub fn from_existing(categories: Vec<Category>) -> Self {
        let by_key = categories.into_iter().map(|c| (c.key(), c)).collect();

        CategoryResolver {
            by_key,
            staged: Vec::new(),
        }
    }

    /// Id of the category called `name` (case-insensitive).
    ///
    /// An unknown name stages a new category with the name as written here,
    /// so later rows spelled "FICTION" reuse the "Fiction" staged earlier.
    pub fn resolve(&mut self, name: &str) -> String {
        let key = name_key(name);

        if let Some(existing) = self.by_key.get(&key) {
            return existing.id.clone();
        }

        let category = Category::new(name);
        log::debug!("Staging new category '{}'", category.name);

        let id = category.id.clone();
        self.staged.push(category.clone());
        self.by_key.insert(key, category);
        id
    }

    /// Categories discovered during this batch, in first-seen order
    pub fn staged(&self) -> &[Category] {
        &self.staged
    }

    pub fn into_staged(self) -> Vec<Category> {
        self.staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_category_is_reused() {
        let existing = Category::new("Fiction");
        let mut resolver = CategoryResolver::from_existing(vec![existing.clone()]);

        assert_eq!(resolver.resolve("fiction"), existing.id);
        assert_eq!(resolver.resolve("  FICTION "), existing.id);
        assert!(resolver.staged().is_empty());
    }

    #[test]
    fn test_new_name_is_staged_once_with_first_seen_casing() {
        let mut resolver = CategoryResolver::default();

        let first = resolver.resolve("Science Fiction");
        let second = resolver.resolve("science fiction");
        let other = resolver.resolve("Poetry");

        assert_eq!(first, second);
        assert_ne!(first, other);

        let staged = resolver.into_staged();
        let names: Vec<&str> = staged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Science Fiction", "Poetry"]);
    }
}
