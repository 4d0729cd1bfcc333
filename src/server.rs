//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, and loaded index metadata |
//! | `POST` | `/ask` | Answer a question with citations, or abstain |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `index_unavailable` (503),
//! `retrieval_error` (500), `internal` (500).
//!
//! # Request ids
//!
//! Every request runs inside a `request` span carrying the `x-request-id`
//! header value, or a fresh UUID v4 when absent. The id is echoed in the
//! response header and in the `/ask` body. Request bodies are never logged.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use docassist_core::trace::millis;
use docassist_core::{RetrievalError, RetrievalParams};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use crate::ask::Answer;
use crate::config::Config;
use crate::db;
use crate::index_store::{IndexError, SharedIndex};
use crate::sqlite_store::SqliteChunkStore;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_QUESTION_CHARS: usize = 4000;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    index: Arc<SharedIndex>,
    store: Arc<SqliteChunkStore>,
    params: Arc<RetrievalParams>,
}

impl AppState {
    pub fn new(index: Arc<SharedIndex>, store: SqliteChunkStore, params: RetrievalParams) -> Self {
        Self {
            index,
            store: Arc::new(store),
            params: Arc::new(params),
        }
    }
}

/// Starts the HTTP server on `[server].bind`.
///
/// The index is loaded before the listener is bound, so a missing or
/// mismatched index stops the process instead of failing every request.
pub async fn run_server(config: &Config) -> Result<()> {
    let config = Arc::new(config.clone());
    let index = Arc::new(SharedIndex::new(config.clone()));
    let bundle = index.get().await.context("Failed to load index")?;

    let pool = db::connect(&config).await?;
    let store = SqliteChunkStore::for_index(pool, &bundle.meta);
    let state = AppState::new(index, store, config.retrieval.to_params());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    tracing::info!(bind = %config.server.bind, vectors = bundle.meta.num_vectors, "server started");
    println!("docassist listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .layer(middleware::from_fn(request_id_layer))
        .layer(cors)
        .with_state(state)
}

// ============ Request id middleware ============

#[derive(Debug, Clone)]
struct RequestId(String);

async fn request_id_layer(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);
    let start = Instant::now();

    let mut response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_ms = millis(start.elapsed()),
            "handled_request"
        );
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
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
#[derive(Debug)]
struct AppError {
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

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        if err.is_client_error() {
            return bad_request(err.to_string());
        }
        tracing::error!(error = %err, "retrieval failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "retrieval_error",
            message: err.to_string(),
        }
    }
}

/// Index load failures are 503 when the index itself is the problem.
fn index_error(err: anyhow::Error) -> AppError {
    if let Some(e) = err.downcast_ref::<IndexError>() {
        return AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "index_unavailable",
            message: e.to_string(),
        };
    }
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index: Option<IndexInfo>,
}

#[derive(Serialize)]
struct IndexInfo {
    model_name: String,
    dims: usize,
    num_vectors: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.index.loaded().map(|bundle| IndexInfo {
        model_name: bundle.meta.model_name.clone(),
        dims: bundle.meta.dims,
        num_vectors: bundle.meta.num_vectors,
    });
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index,
    })
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    #[serde(flatten)]
    answer: Answer,
    request_id: String,
    latency_ms: f64,
    cost_usd: f64,
}

async fn handle_ask(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let start = Instant::now();
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;

    let chars = req.question.chars().count();
    if chars == 0 {
        return Err(bad_request("question must not be empty"));
    }
    if chars > MAX_QUESTION_CHARS {
        return Err(bad_request(format!(
            "question must be at most {} characters (got {})",
            MAX_QUESTION_CHARS, chars
        )));
    }
    tracing::info!(input_chars = chars, "ask_received");

    let bundle = state.index.get().await.map_err(index_error)?;
    let result = bundle
        .retriever(state.store.as_ref())
        .retrieve(&req.question, &state.params)
        .await?;

    Ok(Json(AskResponse {
        answer: Answer::from(result),
        request_id,
        latency_ms: millis(start.elapsed()),
        cost_usd: 0.0,
    }))
}
