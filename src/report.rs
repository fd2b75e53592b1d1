// 📊 Expense Report - distribution cost per category
//
// Read-only. Amounts are summed as Decimal in Rust; SQLite's SUM would
// push the TEXT-stored amounts through floating point.

use crate::error::StoreResult;
use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;

/// Display palette, cycled over report rows
pub const CHART_COLORS: [&str; 8] = [
    "#4f46e5", "#6366f1", "#8b5cf6", "#a855f7", "#d946ef", "#ec4899", "#f97316", "#f59e0b",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseReport {
    /// Highest total first, then by category name
    pub rows: Vec<CategoryTotal>,
    pub grand_total: Decimal,
    /// grand_total / number of categories, two decimals
    pub average: Decimal,
    pub top_category: Option<CategoryTotal>,
    pub colors: Vec<String>,
}

impl ExpenseReport {
    /// Build a report from unordered per-category totals
    pub fn from_totals(mut rows: Vec<CategoryTotal>) -> Self {
        rows.sort_by(|a, b| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.category.cmp(&b.category))
        });

        let grand_total: Decimal = rows.iter().map(|r| r.total).sum();
        let average = if rows.is_empty() {
            Decimal::ZERO
        } else {
            (grand_total / Decimal::from(rows.len()))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };

        ExpenseReport {
            top_category: rows.first().cloned(),
            grand_total,
            average,
            colors: CHART_COLORS.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn color_for(&self, index: usize) -> &str {
        CHART_COLORS[index % CHART_COLORS.len()]
    }
}

/// Aggregate every book's expense by category (one consistent read)
pub fn aggregate(conn: &Connection) -> StoreResult<ExpenseReport> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, b.distribution_expense
         FROM books b JOIN categories c ON c.id = b.category_id",
    )?;

    let mut totals: HashMap<String, CategoryTotal> = HashMap::new();
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let category_id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let raw: String = row.get(2)?;

        let amount = Decimal::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        totals
            .entry(category_id)
            .or_insert_with(|| CategoryTotal {
                category: name,
                total: Decimal::ZERO,
            })
            .total += amount;
    }

    Ok(ExpenseReport::from_totals(totals.into_values().collect()))
}

/// Write the report as `category,total_expense` CSV
pub fn write_csv<W: Write>(report: &ExpenseReport, writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["category", "total_expense"])?;

    for row in &report.rows {
        let total = row.total.to_string();
        csv_writer.write_record([row.category.as_str(), total.as_str()])?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::book::{insert_book, BookInput};
    use crate::entities::category::insert_category;
    use chrono::NaiveDate;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn add_book(conn: &Connection, category_id: &str, expense: &str) {
        insert_book(
            conn,
            &BookInput {
                title: "Book".to_string(),
                subtitle: String::new(),
                authors: String::new(),
                publisher: String::new(),
                published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                category_id: category_id.to_string(),
                distribution_expense: dec(expense),
            },
        )
        .unwrap();
    }

    #[test]
    fn test_empty_report() {
        let conn = test_db();
        insert_category(&conn, "Unused").unwrap();

        let report = aggregate(&conn).unwrap();

        assert!(report.rows.is_empty());
        assert_eq!(report.grand_total, Decimal::ZERO);
        assert_eq!(report.average, Decimal::ZERO);
        assert_eq!(report.top_category, None);
        assert_eq!(report.colors.len(), 8);
    }

    #[test]
    fn test_totals_are_exact_and_ordered() {
        let conn = test_db();
        let a = insert_category(&conn, "A").unwrap();
        let b = insert_category(&conn, "B").unwrap();
        add_book(&conn, &a.id, "10.00");
        add_book(&conn, &b.id, "5.50");
        add_book(&conn, &b.id, "5.50");

        let report = aggregate(&conn).unwrap();

        assert_eq!(
            report.rows,
            vec![
                CategoryTotal {
                    category: "B".to_string(),
                    total: dec("11.00")
                },
                CategoryTotal {
                    category: "A".to_string(),
                    total: dec("10.00")
                },
            ]
        );
        assert_eq!(report.grand_total, dec("21.00"));
        assert_eq!(report.average, dec("10.50"));
        assert_eq!(report.top_category.unwrap().category, "B");
    }

    #[test]
    fn test_aggregate_is_repeatable_and_matches_stored_sum() {
        let conn = test_db();
        let a = insert_category(&conn, "Art").unwrap();
        let b = insert_category(&conn, "Biography").unwrap();
        add_book(&conn, &a.id, "3.33");
        add_book(&conn, &b.id, "3.33");
        add_book(&conn, &b.id, "0.01");

        let first = aggregate(&conn).unwrap();
        let second = aggregate(&conn).unwrap();

        assert_eq!(first, second);
        let stored: Decimal = crate::entities::book::get_all_books(&conn)
            .unwrap()
            .iter()
            .map(|book| book.distribution_expense)
            .sum();
        assert_eq!(first.grand_total, stored);
        assert_eq!(first.average, dec("3.34"));
    }

    #[test]
    fn test_decimal_sums_do_not_drift() {
        let conn = test_db();
        let c = insert_category(&conn, "Pennies").unwrap();
        for _ in 0..10 {
            add_book(&conn, &c.id, "0.10");
        }

        let report = aggregate(&conn).unwrap();

        assert_eq!(report.grand_total.to_string(), "1.00");
    }

    #[test]
    fn test_ties_break_by_name_and_average_rounds() {
        let report = ExpenseReport::from_totals(vec![
            CategoryTotal {
                category: "Zoology".to_string(),
                total: dec("1.00"),
            },
            CategoryTotal {
                category: "Art".to_string(),
                total: dec("1.00"),
            },
            CategoryTotal {
                category: "Maps".to_string(),
                total: dec("0.00"),
            },
        ]);

        let names: Vec<&str> = report.rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(names, vec!["Art", "Zoology", "Maps"]);
        assert_eq!(report.average, dec("0.67"));
    }

    #[test]
    fn test_palette_cycles() {
        let report = ExpenseReport::from_totals(Vec::new());

        assert_eq!(report.color_for(0), "#4f46e5");
        assert_eq!(report.color_for(8), "#4f46e5");
        assert_eq!(report.color_for(9), "#6366f1");
    }

    #[test]
    fn test_csv_export() {
        let report = ExpenseReport::from_totals(vec![CategoryTotal {
            category: "Science, Popular".to_string(),
            total: dec("12.30"),
        }]);

        let mut out = Vec::new();
        write_csv(&report, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "category,total_expense\n\"Science, Popular\",12.30\n"
        );
    }
}
