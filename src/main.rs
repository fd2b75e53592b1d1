// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use bookshelf::{
    aggregate, delete_book, delete_category, get_all_books, get_all_categories, import_file,
    insert_book, insert_category, logging, open_database, update_category, write_csv, BookInput,
    Config, ImportOutcome,
};

#[derive(Parser)]
#[command(name = "bookshelf", version, about = "Book catalog with spreadsheet import and cost report")]
struct Cli {
    /// Config file (defaults to $BOOKSHELF_CONFIG or ./bookshelf.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import books from a spreadsheet (all rows or none)
    Import {
        file: PathBuf,
    },
    /// Distribution expense per category
    Report {
        /// Print CSV instead of a table
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage books
    #[command(subcommand)]
    Book(BookCommand),
    /// Interactive terminal UI
    Ui,
}

#[derive(Subcommand)]
enum CategoryCommand {
    List,
    Add { name: String },
    Rename { id: String, name: String },
    /// Delete a category and every book in it
    Delete { id: String },
}

#[derive(Subcommand)]
enum BookCommand {
    List,
    Add(BookAddArgs),
    Delete { id: String },
}

#[derive(Args)]
struct BookAddArgs {
    #[arg(long)]
    title: String,

    /// YYYY-MM-DD
    #[arg(long)]
    published_date: NaiveDate,

    #[arg(long)]
    category_id: String,

    #[arg(long)]
    expense: Decimal,

    #[arg(long, default_value = "")]
    subtitle: String,

    #[arg(long, default_value = "")]
    authors: String,

    #[arg(long, default_value = "")]
    publisher: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    logging::init(&config.log_level);

    match cli.command {
        Command::Import { file } => {
            let mut conn = open_store(&config)?;
            run_import(&mut conn, &file)?;
        }
        Command::Report { csv } => run_report(&open_store(&config)?, csv)?,
        Command::Category(cmd) => run_category(&open_store(&config)?, cmd)?,
        Command::Book(cmd) => run_book(&open_store(&config)?, cmd)?,
        Command::Ui => run_ui_mode(&config)?,
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Connection> {
    config.ensure_database_dir()?;
    log::debug!("Using database {}", config.database_path.display());
    open_database(&config.database_path, config.busy_timeout())
}

fn run_import(conn: &mut Connection, file: &Path) -> Result<()> {
    println!("📂 Importing {}...", file.display());

    let outcome = import_file(conn, file);

    match &outcome {
        ImportOutcome::Success { .. } => {
            println!("✅ {}", outcome.message());
            Ok(())
        }
        ImportOutcome::RejectedRows { issues, .. } => {
            eprintln!("❌ {}", outcome.message());
            for issue in issues {
                eprintln!("   {}", issue);
            }
            std::process::exit(1);
        }
        _ => {
            eprintln!("❌ {}", outcome.message());
            std::process::exit(1);
        }
    }
}

fn run_report(conn: &Connection, csv: bool) -> Result<()> {
    let report = aggregate(conn)?;

    if csv {
        return write_csv(&report, std::io::stdout().lock());
    }

    println!("📊 Distribution expense by category");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in &report.rows {
        println!("{:<32} {:>12}", row.category, row.total);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{:<32} {:>12}", "Grand total", report.grand_total);
    println!("{:<32} {:>12}", "Average per category", report.average);
    match &report.top_category {
        Some(top) => println!("Top category: {} ({})", top.category, top.total),
        None => println!("No books yet."),
    }

    Ok(())
}

fn run_category(conn: &Connection, cmd: CategoryCommand) -> Result<()> {
    match cmd {
        CategoryCommand::List => {
            for category in get_all_categories(conn)? {
                println!("{}  {}", category.id, category.name);
            }
        }
        CategoryCommand::Add { name } => {
            let category = insert_category(conn, &name)?;
            println!("✓ Created category '{}' ({})", category.name, category.id);
        }
        CategoryCommand::Rename { id, name } => {
            let category = update_category(conn, &id, &name)?;
            println!("✓ Renamed category {} to '{}'", category.id, category.name);
        }
        CategoryCommand::Delete { id } => {
            delete_category(conn, &id)?;
            println!("✓ Deleted category {}", id);
        }
    }
    Ok(())
}

fn run_book(conn: &Connection, cmd: BookCommand) -> Result<()> {
    match cmd {
        BookCommand::List => {
            for book in get_all_books(conn)? {
                println!(
                    "{}  {:<40} {:<20} {}  {:>12}",
                    book.id, book.title, book.category_name, book.published_date, book.distribution_expense
                );
            }
        }
        BookCommand::Add(args) => {
            let input = BookInput {
                title: args.title,
                subtitle: args.subtitle,
                authors: args.authors,
                publisher: args.publisher,
                published_date: args.published_date,
                category_id: args.category_id,
                distribution_expense: args.expense,
            };
            let book = insert_book(conn, &input).context("Failed to add book")?;
            println!("✓ Added '{}' ({})", book.title, book.id);
        }
        BookCommand::Delete { id } => {
            delete_book(conn, &id)?;
            println!("✓ Deleted book {}", id);
        }
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    let conn = open_store(config)?;

    let books = get_all_books(&conn)?;
    let report = aggregate(&conn)?;
    log::info!("Loaded {} books for the UI", books.len());

    let mut app = ui::App::new(books, report);
    ui::run_ui(&mut app)
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web server: cargo run --bin bookshelf-server --features server");
    std::process::exit(1);
}
