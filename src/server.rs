//! HTTP adapter over [`DocumentService`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Status, version, indexed chunk count |
//! | `GET`    | `/documents` | Document listing, newest first |
//! | `POST`   | `/documents?filename=<name>` | Upload raw bytes (body) |
//! | `GET`    | `/documents/{id}` | Full document with extracted text |
//! | `DELETE` | `/documents/{id}` | Remove document and its chunks |
//! | `POST`   | `/documents/{id}/summary[?refresh=true]` | Cached or fresh summary |
//! | `POST`   | `/query` | `{ "query": "...", "document_id": "..." }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_chunks", "message": "no chunks available for ..." } }
//! ```
//!
//! `unsupported_format`, `bad_request`, `empty_document` → 400;
//! `not_found` → 404; `no_chunks` → 409; `ocr_unavailable`,
//! `embedding_unavailable`, `capability_unavailable` → 503; everything
//! else → 500.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use docsage_core::models::{Document, DocumentInfo, IngestReport, QueryResult, SummaryOutcome};
use docsage_core::PipelineError;

use crate::config::Config;
use crate::service::DocumentService;

/// Starts the HTTP server on `[server].bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(DocumentService::open(config).await?);
    let app = router(service, config.extraction.max_file_bytes as usize);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = %bind_addr, "docsage server listening");
    println!("docsage listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router. `max_upload_bytes` bounds request bodies.
pub fn router(service: Arc<DocumentService>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list).post(handle_upload))
        .route("/documents/{id}", get(handle_get).delete(handle_delete))
        .route("/documents/{id}/summary", post(handle_summary))
        .route("/query", post(handle_query))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(service)
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

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::UnsupportedFormat(_)
            | PipelineError::InvalidInput(_)
            | PipelineError::EmptyDocument => StatusCode::BAD_REQUEST,
            PipelineError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::NoChunksAvailable { .. } => StatusCode::CONFLICT,
            PipelineError::OcrUnavailable(_)
            | PipelineError::EmbeddingUnavailable(_)
            | PipelineError::CapabilityUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.user_message(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    embedding_model: String,
    indexed_chunks: usize,
}

async fn handle_health(State(service): State<Arc<DocumentService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_model: service.embedding_model().to_string(),
        indexed_chunks: service.indexed_chunks(),
    })
}

// ============ Documents ============

#[derive(Serialize)]
struct ListResponse {
    documents: Vec<DocumentInfo>,
}

async fn handle_list(State(service): State<Arc<DocumentService>>) -> ApiResult<ListResponse> {
    Ok(Json(ListResponse {
        documents: service.list().await?,
    }))
}

#[derive(Deserialize)]
struct UploadParams {
    filename: Option<String>,
}

/// `POST /documents?filename=<name>`. The `Content-Type` header, when it
/// names a known format, takes precedence over the extension.
async fn handle_upload(
    State(service): State<Arc<DocumentService>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    let filename = params.filename.unwrap_or_default();
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let report = service.ingest(body.to_vec(), &filename, declared).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn handle_get(
    State(service): State<Arc<DocumentService>>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    Ok(Json(service.get(&id).await?))
}

async fn handle_delete(
    State(service): State<Arc<DocumentService>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SummaryParams {
    #[serde(default)]
    refresh: bool,
}

async fn handle_summary(
    State(service): State<Arc<DocumentService>>,
    Path(id): Path<String>,
    Query(params): Query<SummaryParams>,
) -> ApiResult<SummaryOutcome> {
    Ok(Json(service.summarize(&id, params.refresh).await?))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    document_id: Option<String>,
}

async fn handle_query(
    State(service): State<Arc<DocumentService>>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResult> {
    Ok(Json(
        service
            .query(&req.query, req.document_id.as_deref())
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use docsage_core::embedding::HashingEmbedder;
    use docsage_core::store::memory::InMemoryStore;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = DocumentService::new(
            &Config::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingEmbedder::new(64)),
            None,
        )
        .unwrap();
        router(Arc::new(service), 1024 * 1024)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = send(&app(), Method::GET, "/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["embedding_model"], "hashing-v1");
    }

    #[tokio::test]
    async fn test_upload_query_and_delete() {
        let app = app();
        let (status, report) = send(
            &app,
            Method::POST,
            "/documents?filename=notes.txt",
            Body::from("The warehouse in Lyon ships orders every Tuesday."),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(report["chunk_count"], 1);
        let id = report["document_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"query": "When does Lyon ship?", "document_id": id})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let answer: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(answer["filename"], "notes.txt");
        assert_eq!(answer["mode"], "extracted");

        let (status, _) = send(&app, Method::DELETE, &format!("/documents/{}", id), Body::empty()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, err) = send(&app, Method::GET, &format!("/documents/{}", id), Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_unsupported_upload_is_400() {
        let (status, err) = send(
            &app(),
            Method::POST,
            "/documents?filename=archive.xyz",
            Body::from(vec![0u8, 1, 2, 3]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"]["code"], "unsupported_format");
        assert!(err["error"]["message"].as_str().unwrap().contains("archive.xyz"));
    }

    #[tokio::test]
    async fn test_query_empty_corpus_is_409() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query": "anything"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let err: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err["error"]["code"], "no_chunks");
    }

    #[tokio::test]
    async fn test_summary_endpoint_is_extractive_without_generator() {
        let app = app();
        let (_, report) = send(
            &app,
            Method::POST,
            "/documents?filename=a.md",
            Body::from("# Title\n\nFirst point here. Second point follows. Third point ends."),
        )
        .await;
        let id = report["document_id"].as_str().unwrap();
        let uri = format!("/documents/{}/summary", id);
        let (status, summary) = send(&app, Method::POST, &uri, Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["mode"], "extractive");
        assert_eq!(summary["cached"], false);

        let (_, again) = send(&app, Method::POST, &uri, Body::empty()).await;
        assert_eq!(again["cached"], true);
        assert_eq!(again["summary"], summary["summary"]);
    }
}
