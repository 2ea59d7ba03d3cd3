//! HTTP surface: upload, list, fetch and delete documents.

use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{AuthUser, TokenVerifier};
use crate::ingest::{AnalysisRequest, Ingestor};
use crate::store::{DocumentRecord, DocumentStore, StoreError};
use crate::uploads::{self, UploadDir};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub store: Arc<dyn DocumentStore>,
    pub uploads: UploadDir,
    pub verifier: TokenVerifier,
}

impl FromRef<AppState> for TokenVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

type ApiError = (StatusCode, String);

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/documents", get(list_documents))
        .route("/documents/upload", post(upload_document))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// Upload an image and analyze it. Analysis failures still return 200 with
/// a degraded record.
async fn upload_document(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<DocumentRecord>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (e.status(), format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("document").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| (e.status(), format!("Failed to read file: {}", e)))?;
            upload = Some((file_name, content_type, bytes));
            break;
        }
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| (StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;

    info!(
        "Received file: {} ({} bytes) from {}",
        file_name,
        bytes.len(),
        claims.sub
    );

    let request = AnalysisRequest {
        media_type: uploads::resolve_media_type(content_type.as_deref(), &bytes),
        size_bytes: bytes.len() as u64,
        file_path: state.uploads.save(&file_name, &bytes).await,
        file_name,
    };

    let record = state.ingestor.ingest(request).await.map_err(store_error)?;
    info!("Stored document {}", record.id);
    Ok(Json(record))
}

/// All documents, newest first.
async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentRecord>>, ApiError> {
    state.store.list().await.map(Json).map_err(store_error)
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentRecord>, ApiError> {
    state.store.get(id).await.map(Json).map_err(store_error)
}

async fn delete_document(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let removed = state.store.delete(id).await.map_err(store_error)?;
    state.uploads.remove(&removed.file_path).await;
    info!("Document {} deleted by {}", id, claims.sub);
    Ok(Json(removed))
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::Backend(_) => {
            error!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
