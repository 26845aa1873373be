use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::domain::error::AppError;
use crate::domain::models::FileId;
use crate::domain::ports::{EmbeddingProvider, VectorStore};
use crate::security::AuthenticatedUser;
use crate::state::AppState;

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: FileId,
    pub status: &'static str,
}

/// `POST /files/upload` (§6). Writes the raw bytes to disk and records a
/// `pending` file row; extraction into `FileSection`s happens outside this
/// crate (§1's out-of-scope boundary) before `/embeddings/index/{fid}` is
/// called — mirrors `handlers/upload.rs`'s field-by-field multipart parse.
pub async fn upload(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(axum::http::StatusCode, Json<UploadResponse>), AppError> {
    let mut filename: Option<String> = None;
    let mut bytes: Option<bytes::Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation(e.to_string()))? {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            bytes = Some(field.bytes().await.map_err(|e| AppError::Validation(e.to_string()))?);
        }
    }

    let filename = filename.ok_or_else(|| AppError::Validation("file field required".to_string()))?;
    let bytes = bytes.ok_or_else(|| AppError::Validation("file field required".to_string()))?;

    tokio::fs::create_dir_all(&state.settings.server.storage_dir)
        .await
        .map_err(|e| AppError::Internal(format!("failed to create storage dir: {e}")))?;

    let stored_name = format!("{}-{}", Uuid::new_v4(), filename);
    let path = format!("{}/{}", state.settings.server.storage_dir, stored_name);

    let mut file = tokio::fs::File::create(&path).await.map_err(|e| AppError::Internal(format!("write failed: {e}")))?;
    file.write_all(&bytes).await.map_err(|e| AppError::Internal(format!("write failed: {e}")))?;

    let document = state.repository.create_file(&filename, &path).await?;
    info!(fid = document.fid, filename = %filename, "file uploaded");

    Ok((axum::http::StatusCode::CREATED, Json(UploadResponse { file_id: document.fid, status: "pending" })))
}

#[derive(Serialize)]
pub struct IndexAcceptedResponse {
    pub accepted: bool,
}

/// `POST /embeddings/index/{fid}` (§6). Rate limited 5/min; runs the
/// pipeline on a detached task and returns immediately.
pub async fn index_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(fid): Path<FileId>,
) -> Result<(axum::http::StatusCode, Json<IndexAcceptedResponse>), AppError> {
    state.rate_limit_index.check(&user.claims.sub)?;

    state.repository.get_file(fid).await?;

    let pipeline = state.indexing_pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.run(fid).await {
            tracing::warn!(fid, error = %e, "indexing pipeline failed");
        }
    });

    Ok((axum::http::StatusCode::ACCEPTED, Json(IndexAcceptedResponse { accepted: true })))
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub file_id: Option<FileId>,
    pub top_k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub chunk_index: i64,
    pub distance: f32,
    pub text: String,
    pub page_number: Option<i32>,
    pub section_type: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// `GET /embeddings/search` (§6).
pub async fn search(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let qvec = state.embedder.embed_one(&params.q).await?;
    let top_k = params.top_k.unwrap_or(state.settings.rag.top_k);

    let hits = state.vector_store.search(params.file_id, &qvec, top_k).await?;

    let results = hits
        .into_iter()
        .map(|(chunk, distance)| SearchHit {
            chunk_index: chunk.chunk_index,
            distance,
            text: chunk.text,
            page_number: chunk.page_number,
            section_type: chunk.section_type,
        })
        .collect();

    Ok(Json(SearchResponse { results }))
}
