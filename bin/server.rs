// Bookshelf - Web Server
// JSON API over the catalog, cost report, and spreadsheet upload

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use bookshelf::{
    aggregate, delete_book, delete_category, get_all_books, get_all_categories, get_book,
    get_category, import_workbook, insert_book, insert_category, logging, open_database,
    update_book, update_category, Book, BookInput, Category, Config, ExpenseReport,
    ImportOutcome, StoreError,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Failed request: status plus a message in the standard envelope
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Invalid { .. } => StatusCode::BAD_REQUEST,
            StoreError::DuplicateCategory { .. } => StatusCode::CONFLICT,
            _ => {
                log::error!("Store failure: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::ok(data))))
}

fn created<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

#[derive(Deserialize)]
struct CategoryPayload {
    name: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    let conn = state.conn()?;
    ok(get_all_categories(&conn)?)
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryPayload>,
) -> ApiResult<Category> {
    let conn = state.conn()?;
    created(insert_category(&conn, &payload.name)?)
}

/// GET /api/categories/:id
async fn show_category(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Category> {
    let conn = state.conn()?;
    ok(get_category(&conn, &id)?)
}

/// PUT /api/categories/:id
async fn rename_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CategoryPayload>,
) -> ApiResult<Category> {
    let conn = state.conn()?;
    ok(update_category(&conn, &id, &payload.name)?)
}

/// DELETE /api/categories/:id - cascades to the category's books
async fn remove_category(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let conn = state.conn()?;
    delete_category(&conn, &id)?;
    ok(())
}

/// GET /api/books
async fn list_books(State(state): State<AppState>) -> ApiResult<Vec<Book>> {
    let conn = state.conn()?;
    ok(get_all_books(&conn)?)
}

/// POST /api/books
async fn create_book(State(state): State<AppState>, Json(input): Json<BookInput>) -> ApiResult<Book> {
    let conn = state.conn()?;
    created(insert_book(&conn, &input)?)
}

/// GET /api/books/:id
async fn show_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Book> {
    let conn = state.conn()?;
    ok(get_book(&conn, &id)?)
}

/// PUT /api/books/:id
async fn edit_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<BookInput>,
) -> ApiResult<Book> {
    let conn = state.conn()?;
    ok(update_book(&conn, &id, &input)?)
}

/// DELETE /api/books/:id
async fn remove_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let conn = state.conn()?;
    delete_book(&conn, &id)?;
    ok(())
}

/// GET /api/report - Expense totals per category
async fn get_report(State(state): State<AppState>) -> ApiResult<ExpenseReport> {
    let conn = state.conn()?;
    ok(aggregate(&conn)?)
}

// ============================================================================
// Upload
// ============================================================================

/// POST /books/import - multipart field `file`; always answers with a redirect
async fn upload_books(State(state): State<AppState>, multipart: Multipart) -> Redirect {
    let outcome = match read_upload(multipart).await {
        Ok(bytes) => run_import(state, bytes).await,
        Err(reason) => ImportOutcome::Failure { reason },
    };

    redirect_for(&outcome)
}

async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Malformed upload: {}", e))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("Failed to read upload: {}", e))?;
            if bytes.is_empty() {
                return Err("Uploaded file is empty".to_string());
            }
            return Ok(bytes.to_vec());
        }
    }

    Err("No file was uploaded".to_string())
}

/// Imports hold the connection for the whole batch; keep them off the async workers
async fn run_import(state: AppState, bytes: Vec<u8>) -> ImportOutcome {
    let joined = tokio::task::spawn_blocking(move || -> Result<ImportOutcome, ApiError> {
        let mut conn = state.conn()?;
        Ok(import_workbook(&mut conn, &bytes))
    })
    .await;

    match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => ImportOutcome::Failure { reason: e.message },
        Err(e) => ImportOutcome::Failure {
            reason: format!("import task failed: {}", e),
        },
    }
}

fn redirect_for(outcome: &ImportOutcome) -> Redirect {
    let message = urlencoding::encode(&outcome.message()).into_owned();

    if outcome.is_success() {
        Redirect::to(&format!("/books?success={}", message))
    } else {
        Redirect::to(&format!("/books/import?error={}", message))
    }
}

/// GET /books/import - Serve upload form
async fn serve_import_form() -> impl IntoResponse {
    Html(include_str!("../web/import.html"))
}

/// GET /books - Serve book list page
async fn serve_books() -> impl IntoResponse {
    Html(include_str!("../web/books.html"))
}

// ============================================================================
// Main Server
// ============================================================================

fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(show_category).put(rename_category).delete(remove_category),
        )
        .route("/books", get(list_books).post(create_book))
        .route("/books/:id", get(show_book).put(edit_book).delete(remove_book))
        .route("/report", get(get_report))
        .with_state(state.clone());

    Router::new()
        .route("/", get(|| async { Redirect::to("/books") }))
        .route("/books", get(serve_books))
        .route("/books/import", get(serve_import_form).post(upload_books))
        .with_state(state)
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load(None)?;
    logging::init(&config.log_level);

    println!("🌐 Bookshelf - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    config.ensure_database_dir()?;
    let conn = open_database(&config.database_path, config.busy_timeout())?;
    println!("✓ Database opened: {:?}", config.database_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };
    let app = build_router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API:    http://{}/api/books", config.bind_addr);
    println!("   Import: http://{}/books/import", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
