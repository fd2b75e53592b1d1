//! Cell coercion: spreadsheet cells to text, calendar dates and decimals

use calamine::Data;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::entities::book::validate_expense;

/// Date formats for text that starts with a four-digit year
const YEAR_FIRST_DATES: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];
const YEAR_FIRST_DATETIMES: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Day-first formats. Two-digit years come first: "%y" refuses a four-digit
/// year, while "%Y" would happily read "21" as the year 21.
const DAY_FIRST_DATES: [&str; 12] = [
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
];
const DAY_FIRST_DATETIMES: [&str; 3] = ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M", "%d-%m-%Y %H:%M:%S"];

/// Render a cell as trimmed text (empty string for blank cells)
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(date) if !dt.is_duration() => date.format("%Y-%m-%d").to_string(),
            _ => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
    }
}

/// Convert an Excel serial day number (1900 date system) to a date.
///
/// Excel counts 1900-02-29, a day that never existed; serials from 61 on
/// are shifted by one to compensate.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }

    let days = serial.floor() as i64;
    let epoch = if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };

    epoch.checked_add_signed(Duration::days(days))
}

fn starts_with_year(text: &str) -> bool {
    text.len() >= 4 && text.as_bytes()[..4].iter().all(u8::is_ascii_digit)
}

/// Parse date text, ISO forms first, otherwise day before month
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    let (dates, datetimes): (&[&str], &[&str]) = if starts_with_year(text) {
        (&YEAR_FIRST_DATES, &YEAR_FIRST_DATETIMES)
    } else {
        (&DAY_FIRST_DATES, &DAY_FIRST_DATETIMES)
    };

    dates
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            datetimes
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Coerce a `published_date` cell.
///
/// Native date cells and date text are accepted. Bare numbers are not:
/// a number in a date column is almost always a data-entry mistake.
pub fn parse_date_cell(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) if !dt.is_duration() => excel_serial_to_date(dt.as_f64()),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_text(s),
        _ => None,
    }
}

/// Coerce a `distribution_expense` cell to a rounded, non-negative decimal.
///
/// The error is a short reason suitable for a row report.
pub fn parse_expense_cell(cell: &Data) -> Result<Decimal, String> {
    let value = match cell {
        Data::Int(i) => Decimal::from(*i),
        Data::Float(f) => {
            Decimal::from_f64(*f).ok_or_else(|| format!("{} is not a representable amount", f))?
        }
        Data::String(s) => parse_decimal_text(s)?,
        Data::Empty => return Err("missing amount".to_string()),
        other => return Err(format!("'{}' is not a number", cell_text(other))),
    };

    validate_expense(value).map_err(|e| e.to_string())
}

fn parse_decimal_text(text: &str) -> Result<Decimal, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("missing amount".to_string());
    }

    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| format!("'{}' is not a number", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_dates() {
        assert_eq!(parse_date_text("2021-03-05"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("2021/03/05"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("2021-03-05 14:30:00"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("2021-03-05T14:30:00"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("2021-03-05T14:30:00+02:00"), Some(date(2021, 3, 5)));
    }

    #[test]
    fn test_day_first_when_ambiguous() {
        assert_eq!(parse_date_text("05/03/2021"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("5/3/2021"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("05-03-2021"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("05.03.2021"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("05/03/21"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("25/12/2020 08:15"), Some(date(2020, 12, 25)));
    }

    #[test]
    fn test_month_names() {
        assert_eq!(parse_date_text("5 March 2021"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("5 Mar 2021"), Some(date(2021, 3, 5)));
        assert_eq!(parse_date_text("March 5, 2021"), Some(date(2021, 3, 5)));
    }

    #[test]
    fn test_invalid_dates() {
        assert_eq!(parse_date_text(""), None);
        assert_eq!(parse_date_text("not a date"), None);
        assert_eq!(parse_date_text("31/02/2021"), None);
        // month 13 cannot be read day-first
        assert_eq!(parse_date_text("12/13/2021"), None);
        assert_eq!(parse_date_cell(&Data::Float(44000.0)), None);
        assert_eq!(parse_date_cell(&Data::Empty), None);
    }

    #[test]
    fn test_excel_serial_dates() {
        assert_eq!(excel_serial_to_date(1.0), Some(date(1900, 1, 1)));
        assert_eq!(excel_serial_to_date(59.0), Some(date(1900, 2, 28)));
        assert_eq!(excel_serial_to_date(61.0), Some(date(1900, 3, 1)));
        assert_eq!(excel_serial_to_date(44197.0), Some(date(2021, 1, 1)));
        assert_eq!(excel_serial_to_date(44197.75), Some(date(2021, 1, 1)));
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_expense_cells() {
        assert_eq!(parse_expense_cell(&Data::Float(12.5)).unwrap().to_string(), "12.50");
        assert_eq!(parse_expense_cell(&Data::Int(7)).unwrap().to_string(), "7.00");
        assert_eq!(
            parse_expense_cell(&Data::String(" 19.999 ".to_string())).unwrap().to_string(),
            "20.00"
        );
        assert_eq!(
            parse_expense_cell(&Data::String("1.5e2".to_string())).unwrap().to_string(),
            "150.00"
        );
    }

    #[test]
    fn test_invalid_expense_cells() {
        assert!(parse_expense_cell(&Data::Empty).is_err());
        assert!(parse_expense_cell(&Data::String("".to_string())).is_err());
        assert!(parse_expense_cell(&Data::String("twelve".to_string())).is_err());
        assert!(parse_expense_cell(&Data::String("12,50".to_string())).is_err());
        assert!(parse_expense_cell(&Data::Bool(true)).is_err());
        assert!(parse_expense_cell(&Data::Float(-4.0)).is_err());
        assert!(parse_expense_cell(&Data::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::String("  Dune  ".to_string())), "Dune");
        assert_eq!(cell_text(&Data::Float(1984.0)), "1984");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
