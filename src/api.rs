//! HTTP surface.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | multipart upload, file field `receipt` → `{message, text}` |
//! | `GET`  | `/receipts` | caller's receipts, newest first |
//! | `GET`  | `/search?q=` | caller's receipts whose text contains `q` |
//! | `GET`  | `/health` | liveness + version |
//!
//! Errors are returned as `{ "error": { "code": "...", "message": "..." } }`
//! with codes `unauthenticated` (401), `no_file` (400), `bad_request` (400)
//! and `internal` (500). Internal failures are logged and reported with a
//! fixed message.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, FromRef, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::identity::{Caller, IdentityProvider};
use crate::ingest::{IngestError, Ingestion, Rejection, Upload, UPLOAD_FIELD};
use crate::receipt::Receipt;
use crate::retrieval::{Retrieval, RetrievalError};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Ingestion,
    pub retrieval: Retrieval,
    pub identity: Arc<dyn IdentityProvider>,
}

impl FromRef<AppState> for Arc<dyn IdentityProvider> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.identity)
    }
}

/// Build the router. When `static_dir` is set, unmatched paths are served
/// from it, falling back to its `index.html` for client-side routes.
pub fn router(state: AppState, max_upload_bytes: usize, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_receipt))
        .route("/receipts", get(list_receipts))
        .route("/search", get(search_receipts))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => {
            info!("Serving static files from {}", dir.display());
            api.fallback_service(
                ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
            )
        }
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Bodies
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Error converted into an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthenticated",
            message: "Login required".to_string(),
        }
    }

    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
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

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Unauthenticated => Self::unauthenticated(),
            IngestError::Rejected(Rejection::NoFileAttached) => Self {
                status: StatusCode::BAD_REQUEST,
                code: "no_file",
                message: "No file uploaded".to_string(),
            },
            IngestError::Rejected(rejection @ Rejection::Malformed(_)) => Self {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message: rejection.to_string(),
            },
            IngestError::BinaryWrite(e) => {
                error!("Upload write failed: {}", e);
                Self::internal("File upload failed")
            }
            IngestError::Storage(e) => {
                error!("Receipt insert failed: {}", e);
                Self::internal("DB insert failed")
            }
            IngestError::Interrupted(e) => {
                error!("Ingestion task failed: {}", e);
                Self::internal("File upload failed")
            }
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Unauthenticated => Self::unauthenticated(),
            RetrievalError::Storage(e) => {
                error!("Receipt query failed: {}", e);
                Self::internal("DB query failed")
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Upload a receipt image and return its recognized text.
async fn upload_receipt(
    State(state): State<AppState>,
    Caller(caller): Caller,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    // Anonymous callers are turned away without reading the body.
    let upload = match caller {
        Some(_) => read_upload(multipart).await,
        None => Ok(None),
    };

    let ingested = state.ingestion.ingest(caller, upload).await?;

    Ok(Json(UploadResponse {
        message: "Receipt saved".to_string(),
        text: ingested.text().to_string(),
    }))
}

async fn list_receipts(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Receipt>>, ApiError> {
    Ok(Json(state.retrieval.list(caller, None).await?))
}

async fn search_receipts(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Receipt>>, ApiError> {
    Ok(Json(state.retrieval.list(caller, query.q.as_deref()).await?))
}

/// Pull the single `receipt` file out of a multipart body.
///
/// Non-file fields and fields under other names are skipped. A second
/// `receipt` file makes the request malformed.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<Upload>, Rejection> {
    let mut multipart = multipart.map_err(|e| Rejection::Malformed(e.body_text()))?;
    let mut found: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Rejection::Malformed(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if found.is_some() {
            return Err(Rejection::Malformed(format!(
                "more than one file attached under '{}'",
                UPLOAD_FIELD
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| Rejection::Malformed(e.body_text()))?;
        info!("Received file: {} ({} bytes)", filename, data.len());

        found = Some(Upload {
            filename,
            data: data.to_vec(),
        });
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobError;
    use crate::receipt::StoreError;

    fn status_and_code(err: impl Into<ApiError>) -> (StatusCode, &'static str) {
        let err = err.into();
        (err.status, err.code)
    }

    #[test]
    fn test_ingest_error_mapping() {
        assert_eq!(
            status_and_code(IngestError::Unauthenticated),
            (StatusCode::UNAUTHORIZED, "unauthenticated")
        );
        assert_eq!(
            status_and_code(IngestError::Rejected(Rejection::NoFileAttached)),
            (StatusCode::BAD_REQUEST, "no_file")
        );
        assert_eq!(
            status_and_code(IngestError::Rejected(Rejection::Malformed("x".into()))),
            (StatusCode::BAD_REQUEST, "bad_request")
        );
        assert_eq!(
            status_and_code(IngestError::BinaryWrite(BlobError {
                filename: "a.png".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        );
        assert_eq!(
            status_and_code(IngestError::Storage(StoreError::Unavailable(
                sqlx::Error::PoolClosed
            ))),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        );
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err: ApiError = RetrievalError::Storage(StoreError::Corrupt {
            id: 9,
            reason: "created_at out of range".into(),
        })
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "DB query failed");
    }
}
