//! HTTP API consumed by the browser extension.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/parse` | Chunk scraped emails and stream extracted events as NDJSON |
//! | `POST` | `/parse_free_text` | Extract events (with participants) from free text |
//! | `POST` | `/contacts` | Ranked contact suggestions, filtered by substring |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "No text provided" } }
//! ```
//!
//! Error codes: `bad_request` (400), `remote_error` (502),
//! `malformed_response` (502), `internal` (500).
//!
//! Per-chunk failures during `/parse` are not HTTP errors: they travel inside
//! the stream as records with an `error` field.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the extension calls the
//! service from arbitrary page origins.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::blocks::build_blocks;
use crate::chunk::chunk_blocks;
use crate::config::Config;
use crate::db;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::extract::extract_free_text;
use crate::llm::{ChatClient, OpenAiClient};
use crate::migrate;
use crate::models::{EmailBatch, FreeTextEvent};
use crate::prompt::{build_free_text_prompt, PromptContext};
use crate::store::{ContactStore, DedupStore, SqliteStore};
use crate::tokens::{create_counter, TokenCounter};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    counter: Arc<dyn TokenCounter>,
    client: Arc<dyn ChatClient>,
    contacts: Arc<dyn ContactStore>,
    dispatcher: Dispatcher,
}

impl AppState {
    /// Wire the pipeline together. `store` backs both dedup and contacts.
    pub fn new<S>(
        config: Config,
        counter: Arc<dyn TokenCounter>,
        client: Arc<dyn ChatClient>,
        store: Arc<S>,
    ) -> Self
    where
        S: DedupStore + ContactStore + 'static,
    {
        let dedup: Arc<dyn DedupStore> = store.clone();
        let contacts: Arc<dyn ContactStore> = store;
        let dispatcher = Dispatcher::new(client.clone(), dedup, config.dispatch.concurrency());
        Self {
            config: Arc::new(config),
            counter,
            client,
            contacts,
            dispatcher,
        }
    }
}

/// Build the router. Exposed so tests can drive it without binding a port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/parse", post(handle_parse))
        .route("/parse_free_text", post(handle_parse_free_text))
        .route("/contacts", post(handle_contacts))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on `[server].bind`.
///
/// Opens the SQLite pool once, applies the schema, builds the OpenAI client
/// from `OPENAI_API_KEY`, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let counter = create_counter(&config.chunking.tokenizer)?;
    let client: Arc<dyn ChatClient> = Arc::new(OpenAiClient::from_env(&config.llm)?);
    let store = Arc::new(SqliteStore::new(pool));

    let state = AppState::new(config.clone(), counter, client, store);
    let app = router(state);

    tracing::info!(
        bind = %config.server.bind,
        model = %config.llm.model,
        tokenizer = %config.chunking.tokenizer,
        max_tokens = config.chunking.max_tokens,
        concurrency = config.dispatch.concurrency(),
        "server listening"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Input(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::RemoteCall(_) => (StatusCode::BAD_GATEWAY, "remote_error"),
            Error::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, "malformed_response"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /parse ============

#[derive(Deserialize)]
pub struct ParseRequest {
    /// JSON-encoded `{"emails": [...]}`.
    #[serde(default)]
    text: String,
    #[serde(default)]
    user_timezone: Option<String>,
    #[serde(default)]
    user_email: Option<String>,
}

/// Handler for `POST /parse`.
///
/// Validates and chunks the request up front (so input errors are a plain
/// 400), then streams one NDJSON line per progress record.
async fn handle_parse(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload?;

    if req.text.trim().is_empty() {
        return Err(Error::Input("No text provided".to_string()).into());
    }

    let batch: EmailBatch = serde_json::from_str(&req.text)
        .map_err(|e| Error::Input(format!("text is not a valid email batch: {}", e)))?;

    let user = req
        .user_email
        .unwrap_or_else(|| state.config.server.default_user.clone());
    let timezone = req
        .user_timezone
        .unwrap_or_else(|| state.config.server.default_timezone.clone());

    // Tokenizing large batches is CPU-bound; keep it off the async workers.
    let counter = state.counter.clone();
    let max_tokens = state.config.chunking.max_tokens;
    let chunks = tokio::task::spawn_blocking(move || {
        let blocks = build_blocks(&batch.emails);
        chunk_blocks(&blocks, max_tokens, counter.as_ref())
    })
    .await
    .map_err(|e| AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("chunking task failed: {}", e),
    })?;

    tracing::info!(
        user = %user,
        timezone = %timezone,
        chunks = chunks.len(),
        "parse request accepted"
    );

    let ctx = PromptContext::new(timezone).with_now(Some(chrono::Utc::now().to_rfc3339()));
    let lines = state
        .dispatcher
        .process(chunks, user, ctx)
        .map(|record| Ok::<_, Infallible>(Bytes::from(record.to_ndjson())));

    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response())
}

// ============ POST /parse_free_text ============

#[derive(Deserialize)]
pub struct FreeTextRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    user_timezone: Option<String>,
    #[serde(default)]
    user_now: Option<String>,
    #[serde(default)]
    user_email: Option<String>,
}

#[derive(Serialize)]
pub struct FreeTextResponse {
    events: Vec<FreeTextEvent>,
}

/// Handler for `POST /parse_free_text`.
///
/// Runs one extraction synchronously and records every participant as a
/// contact. Contact storage failures are logged and do not fail the request.
async fn handle_parse_free_text(
    State(state): State<AppState>,
    payload: Result<Json<FreeTextRequest>, JsonRejection>,
) -> Result<Json<FreeTextResponse>, AppError> {
    let Json(req) = payload?;

    if req.text.trim().is_empty() {
        return Err(Error::Input("Empty input".to_string()).into());
    }

    let user = req
        .user_email
        .unwrap_or_else(|| state.config.server.default_user.clone());
    let timezone = req
        .user_timezone
        .unwrap_or_else(|| state.config.server.default_timezone.clone());

    let ctx = PromptContext::new(timezone).with_now(req.user_now);
    let prompt = build_free_text_prompt(&req.text, &ctx);
    let events = extract_free_text(state.client.as_ref(), &prompt).await?;

    for participant in events.iter().flat_map(|e| e.participants.iter()) {
        match state.contacts.save(&user, participant).await {
            Ok(()) => tracing::debug!(user = %user, contact = %participant, "saved contact"),
            Err(e) => {
                tracing::warn!(user = %user, contact = %participant, error = %e, "failed to save contact")
            }
        }
    }

    Ok(Json(FreeTextResponse { events }))
}

// ============ POST /contacts ============

#[derive(Deserialize)]
pub struct ContactsRequest {
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ContactEntry {
    email: String,
}

#[derive(Serialize)]
pub struct ContactsResponse {
    status: &'static str,
    contacts: Vec<ContactEntry>,
    count: usize,
}

/// Handler for `POST /contacts`.
///
/// Fetches ranked suggestions, then keeps those containing `query`
/// (case-insensitive). The limit applies before filtering; `0` means none.
async fn handle_contacts(
    State(state): State<AppState>,
    payload: Result<Json<ContactsRequest>, JsonRejection>,
) -> Result<Json<ContactsResponse>, AppError> {
    let Json(req) = payload?;

    let user = req
        .user_email
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| bad_request("user_email parameter is required"))?;
    let query = req.query.unwrap_or_default().to_lowercase();
    let limit = match req.limit {
        Some(0) => None,
        Some(n) => Some(n),
        None => state.config.contacts.limit(),
    };

    let suggestions = state.contacts.suggest(&user, limit).await?;
    let contacts: Vec<ContactEntry> = suggestions
        .into_iter()
        .filter(|email| query.is_empty() || email.to_lowercase().contains(&query))
        .map(|email| ContactEntry { email })
        .collect();

    Ok(Json(ContactsResponse {
        status: "success",
        count: contacts.len(),
        contacts,
    }))
}
