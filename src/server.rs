//! JSON HTTP API over the question-answering engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Plain retrieval: top matching chunks for a query |
//! | `POST` | `/converse` | Conversational answer with citations |
//! | `POST` | `/ingest` | Chunk and index submitted documents |
//! | `GET`  | `/count` | Number of indexed chunks |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{IngestDocument, QaEngine};
use crate::models::{IngestReport, Reference, ScoredChunk};

/// Starts the HTTP server on the configured `[server].bind` address.
///
/// Runs until the process is terminated.
pub async fn run_server(engine: QaEngine) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let state = Arc::new(engine);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(handle_ask))
        .route("/converse", post(handle_converse))
        .route("/ingest", post(handle_ingest))
        .route("/count", get(handle_count))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("legalctx server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
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
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error".to_string(),
        message: message.into(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps engine errors to HTTP status codes. Validation failures become
/// 400s and provider connectivity failures become 502s, so clients can
/// tell their mistake from an outage.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains("must not be empty") || msg.contains("must be in") {
        bad_request(msg)
    } else if msg.contains("connection error")
        || msg.contains("request failed")
        || msg.contains("API error")
        || msg.contains("Chroma error")
    {
        upstream_error(msg)
    } else {
        internal_error(msg)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskBody {
    query: String,
    /// Result count override; defaults to the configured `top_k`.
    k: Option<usize>,
}

#[derive(Serialize)]
struct AskResponseBody {
    results: Vec<ResultItem>,
    message: String,
}

/// One retrieval hit as exposed over the wire.
#[derive(Serialize)]
struct ResultItem {
    content: String,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    article_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    topics: Vec<String>,
    score: f64,
}

impl From<ScoredChunk> for ResultItem {
    fn from(chunk: ScoredChunk) -> Self {
        Self {
            content: chunk.content,
            source: chunk.meta.source,
            heading: chunk.meta.heading,
            article_number: chunk.meta.article_number,
            summary: chunk.meta.summary,
            topics: chunk.meta.topics,
            score: chunk.score,
        }
    }
}

async fn handle_ask(
    State(engine): State<Arc<QaEngine>>,
    Json(body): Json<AskBody>,
) -> Result<Json<AskResponseBody>, AppError> {
    let response = engine
        .ask(&body.query, body.k)
        .await
        .map_err(classify_error)?;

    Ok(Json(AskResponseBody {
        results: response.results.into_iter().map(ResultItem::from).collect(),
        message: response.message,
    }))
}

// ============ POST /converse ============

#[derive(Deserialize)]
struct ConverseBody {
    query: String,
    /// Session id for conversation memory. Omitted means one shared
    /// `"default"` session.
    session: Option<String>,
}

#[derive(Serialize)]
struct ConverseResponseBody {
    response: String,
    references: Vec<Reference>,
}

async fn handle_converse(
    State(engine): State<Arc<QaEngine>>,
    Json(body): Json<ConverseBody>,
) -> Result<Json<ConverseResponseBody>, AppError> {
    let session = body.session.as_deref().unwrap_or("default");
    let response = engine
        .converse(&body.query, session)
        .await
        .map_err(classify_error)?;

    Ok(Json(ConverseResponseBody {
        response: response.answer,
        references: response.references,
    }))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestBody {
    documents: Vec<IngestItem>,
    /// Empty the index before writing.
    #[serde(default)]
    clear: bool,
}

#[derive(Deserialize)]
struct IngestItem {
    source: String,
    text: String,
}

async fn handle_ingest(
    State(engine): State<Arc<QaEngine>>,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestReport>, AppError> {
    if body.documents.is_empty() {
        return Err(bad_request("documents must not be empty"));
    }

    let documents: Vec<IngestDocument> = body
        .documents
        .into_iter()
        .map(|d| IngestDocument {
            source: d.source,
            text: d.text,
        })
        .collect();

    let report = engine
        .ingest_documents(&documents, body.clear)
        .await
        .map_err(classify_error)?;
    Ok(Json(report))
}

// ============ GET /count ============

#[derive(Serialize)]
struct CountResponse {
    count: usize,
}

async fn handle_count(
    State(engine): State<Arc<QaEngine>>,
) -> Result<Json<CountResponse>, AppError> {
    let count = engine.count().await.map_err(classify_error)?;
    Ok(Json(CountResponse { count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converse_body_serializes_response_field() {
        let body = ConverseResponseBody {
            response: "Article 1 protects the right to life.".to_string(),
            references: vec![Reference {
                title: "Constitution - Article 1".to_string(),
                summary: None,
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["response"],
            "Article 1 protects the right to life."
        );
        assert!(json.get("answer").is_none());
        assert_eq!(json["references"][0]["title"], "Constitution - Article 1");
    }

    #[test]
    fn test_error_body_shape() {
        let err = bad_request("Query must not be empty");
        let json = serde_json::json!({
            "error": { "code": err.code, "message": err.message }
        });
        assert_eq!(json["error"]["code"], "bad_request");
        assert_eq!(json["error"]["message"], "Query must not be empty");
    }

    #[test]
    fn test_classify_error_maps_validation_to_bad_request() {
        let err = classify_error(anyhow::anyhow!("Query must not be empty"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");

        let err = classify_error(anyhow::anyhow!("Chroma connection error (is Chroma running?)"));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "upstream_error");

        let err = classify_error(anyhow::anyhow!("something else broke"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
    }
}
