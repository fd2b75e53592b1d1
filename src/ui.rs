use anyhow::Result;
use bookshelf::{Book, ExpenseReport};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::io;

const PAGE_JUMP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Books,
    Report,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Books => Page::Report,
            Page::Report => Page::Books,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Books => "Books",
            Page::Report => "Expense Report",
        }
    }
}

pub struct App {
    pub books: Vec<Book>,
    /// Books shown in the table (after the category filter)
    pub visible_books: Vec<Book>,
    pub report: ExpenseReport,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    /// Category name the table is restricted to
    pub category_filter: Option<String>,
}

impl App {
    pub fn new(books: Vec<Book>, report: ExpenseReport) -> Self {
        let mut state = TableState::default();
        if !books.is_empty() {
            state.select(Some(0));
        }

        Self {
            visible_books: books.clone(),
            books,
            report,
            state,
            current_page: Page::Books,
            show_detail: false,
            category_filter: None,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_book(&self) -> Option<&Book> {
        self.state.selected().and_then(|i| self.visible_books.get(i))
    }

    /// Step the filter through the report's categories (largest first), then back to all
    pub fn cycle_category_filter(&mut self) {
        let names: Vec<&str> = self.report.rows.iter().map(|r| r.category.as_str()).collect();

        let next = match &self.category_filter {
            None => names.first().map(|n| n.to_string()),
            Some(current) => names
                .iter()
                .position(|n| *n == current.as_str())
                .and_then(|i| names.get(i + 1))
                .map(|n| n.to_string()),
        };

        self.apply_filter(next);
    }

    pub fn apply_filter(&mut self, category: Option<String>) {
        self.visible_books = match &category {
            None => self.books.clone(),
            Some(name) => self
                .books
                .iter()
                .filter(|b| &b.category_name == name)
                .cloned()
                .collect(),
        };
        self.category_filter = category;

        if self.visible_books.is_empty() {
            self.state.select(None);
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn next(&mut self) {
        let len = self.visible_books.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.visible_books.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.visible_books.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + PAGE_JUMP).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.visible_books.is_empty() {
            return;
        }
        let i = self.state.selected().map_or(0, |i| i.saturating_sub(PAGE_JUMP));
        self.state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("UI loop failed: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab | KeyCode::BackTab => app.current_page = app.current_page.next(),
                KeyCode::Char('f') => app.cycle_category_filter(),
                KeyCode::Char('c') => app.apply_filter(None),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home if !app.visible_books.is_empty() => app.state.select(Some(0)),
                KeyCode::End if !app.visible_books.is_empty() => {
                    app.state.select(Some(app.visible_books.len() - 1))
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Books if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);

            render_table(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::Books => render_table(f, chunks[1], app),
        Page::Report => render_report(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Books, Page::Report].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Books: {}", app.books.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Categories: {}", app.report.rows.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Total: {}", app.report.grand_total),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Title", "Authors", "Published", "Category", "Expense"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.visible_books.iter().map(|book| {
        let cells = vec![
            Cell::from(truncate(&book.title, 40)),
            Cell::from(truncate(&book.authors, 24)),
            Cell::from(book.published_date.to_string()),
            Cell::from(truncate(&book.category_name, 20)),
            Cell::from(format!("{:>12}", book.distribution_expense))
                .style(Style::default().fg(Color::Green)),
        ];

        Row::new(cells).height(1)
    });

    let title = match &app.category_filter {
        Some(name) => format!(" Books in {} ", name),
        None => " Books ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(42),
            Constraint::Length(26),
            Constraint::Length(12),
            Constraint::Length(22),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let Some(book) = app.selected_book() else {
        let empty = Paragraph::new("  No book selected").block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Book Details "),
        );
        f.render_widget(empty, area);
        return;
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let field = |name: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("  {}: ", name), label),
            Span::styled(value, Style::default().fg(Color::White)),
        ])
    };

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("  {}", book.title),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("  {}", book.subtitle),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
        Line::from(""),
        field("Authors", book.authors.clone()),
        field("Publisher", book.publisher.clone()),
        field("Published", book.published_date.to_string()),
        field("Category", book.category_name.clone()),
        field("Expense", book.distribution_expense.to_string()),
        Line::from(""),
        field("ID", book.id.clone()),
        field("Added", book.created_at.format("%Y-%m-%d %H:%M").to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    let panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Book Details "),
    );

    f.render_widget(panel, area);
}

fn render_report(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(5)])
        .split(area);

    let bars: Vec<Bar> = app
        .report
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let color = app
                .report
                .color_for(i)
                .parse::<Color>()
                .unwrap_or(Color::Cyan);

            Bar::default()
                .value(cents(row.total))
                .text_value(row.total.to_string())
                .label(Line::from(truncate(&row.category, 12)))
                .style(Style::default().fg(color))
        })
        .collect();

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Distribution Expense by Category "),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(12)
        .bar_gap(2);

    f.render_widget(chart, chunks[0]);

    let top = match &app.report.top_category {
        Some(top) => format!("{} ({})", top.category, top.total),
        None => "-".to_string(),
    };

    let summary = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("  Grand total: ", Style::default().fg(Color::Cyan)),
            Span::raw(app.report.grand_total.to_string()),
            Span::styled("   Average: ", Style::default().fg(Color::Cyan)),
            Span::raw(app.report.average.to_string()),
        ]),
        Line::from(vec![
            Span::styled("  Top category: ", Style::default().fg(Color::Cyan)),
            Span::styled(top, Style::default().fg(Color::Yellow)),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Summary "));

    f.render_widget(summary, chunks[1]);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.visible_books.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(name) = &app.category_filter {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            format!("Filter: {}", name),
            Style::default().fg(Color::Green),
        ));
        status_spans.push(Span::raw(" ("));
        status_spans.push(Span::styled("c", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" clear)"));
    }

    for (key, action) in [
        ("Enter", " Details"),
        ("Tab", " Page"),
        ("f", " Filter"),
        ("↑/↓", " Nav"),
        ("PgUp/PgDn", " Fast"),
    ] {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(action));
    }
    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

/// Bar heights are whole cents
fn cents(amount: Decimal) -> u64 {
    (amount * Decimal::ONE_HUNDRED).to_u64().unwrap_or(0)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf::{CategoryTotal, ExpenseReport};
    use chrono::{NaiveDate, Utc};

    fn book(title: &str, category: &str) -> Book {
        Book {
            id: title.to_lowercase(),
            title: title.to_string(),
            subtitle: String::new(),
            authors: String::new(),
            publisher: String::new(),
            published_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            category_id: category.to_lowercase(),
            category_name: category.to_string(),
            distribution_expense: Decimal::ONE,
            created_at: Utc::now(),
        }
    }

    fn test_app() -> App {
        let books = vec![book("A", "Fiction"), book("B", "Poetry"), book("C", "Fiction")];
        let report = ExpenseReport::from_totals(vec![
            CategoryTotal {
                category: "Fiction".to_string(),
                total: Decimal::from(2),
            },
            CategoryTotal {
                category: "Poetry".to_string(),
                total: Decimal::ONE,
            },
        ]);
        App::new(books, report)
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = test_app();

        app.previous();
        assert_eq!(app.selected_book().map(|b| b.title.as_str()), Some("C"));
        app.next();
        assert_eq!(app.selected_book().map(|b| b.title.as_str()), Some("A"));
        app.page_down();
        assert_eq!(app.state.selected(), Some(2));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_category_filter_cycles_back_to_all() {
        let mut app = test_app();

        app.cycle_category_filter();
        assert_eq!(app.category_filter.as_deref(), Some("Fiction"));
        assert_eq!(app.visible_books.len(), 2);

        app.cycle_category_filter();
        assert_eq!(app.category_filter.as_deref(), Some("Poetry"));
        assert_eq!(app.visible_books.len(), 1);

        app.cycle_category_filter();
        assert_eq!(app.category_filter, None);
        assert_eq!(app.visible_books.len(), 3);
    }

    #[test]
    fn test_page_cycle_and_helpers() {
        assert_eq!(Page::Books.next(), Page::Report);
        assert_eq!(Page::Report.next(), Page::Books);
        assert_eq!(cents(Decimal::new(1234, 2)), 1234);
        assert_eq!(truncate("Encyclopaedia", 8), "Encyc...");
    }
}
