//! HTTP handlers for uploads, listing, sharing and stats.
//! Request bodies are staged to disk before the engine sees them; everything
//! else delegates to the `UploadPipeline`, `BatchCoordinator` and
//! `MetadataIndex` held in `AppState`.

use crate::{
    errors::{AppError, EngineError},
    models::{
        batch::{BatchOutcome, UploadResult},
        file_record::{FileRecord, PresignedUpload, ShareLink},
        stats::IndexStats,
    },
    services::{
        metadata_index::{ListParams, Page},
        staging::StagedFile,
        upload_pipeline::UploadRequest,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const OWNER_HEADER: &str = "x-owner-id";
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_SHARE_TTL: u64 = 3600;

/// Query params accepted by `GET /files`.
#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    #[serde(rename = "type")]
    pub type_filter: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareReq {
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignReq {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResp {
    pub file_id: Uuid,
    pub deleted: bool,
}

/// `POST /files`: multipart upload of exactly one file.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResult>), AppError> {
    let mut requests = stage_multipart(&state, &headers, multipart).await?;
    if requests.len() != 1 {
        return Err(AppError::bad_request(format!(
            "expected exactly one file, got {}",
            requests.len()
        )));
    }
    let request = requests.remove(0);
    let result = state.pipeline.ingest(request).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// `POST /files/batch`: multipart upload of one or more files.
///
/// Responds 201 when every file was stored, 207 when some failed.
pub async fn upload_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<BatchOutcome>), AppError> {
    let requests = stage_multipart(&state, &headers, multipart).await?;
    if requests.is_empty() {
        return Err(AppError::bad_request("no files provided"));
    }
    let outcome = state.batch.ingest_many(requests).await;
    let status = if outcome.summary.failed == 0 {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(outcome)))
}

/// `GET /files`: paginated listing, supports ?page=&limit=&type=&search=
pub async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListFilesQuery>,
) -> Result<Json<Page<FileRecord>>, AppError> {
    let page = q.page.unwrap_or(1);
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return Err(AppError::bad_request("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let params = ListParams {
        page,
        limit,
        type_filter: q.type_filter,
        search: q.search,
    };
    Ok(Json(state.index.list(&params)))
}

/// `GET /files/{id}`: file metadata.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    let file_id = parse_file_id(&id)?;
    let record = state.index.get(file_id).map_err(EngineError::from)?;
    Ok(Json(record))
}

/// `GET /files/{id}/download`: count the access and redirect to a signed URL.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    let file_id = parse_file_id(&id)?;
    let url = state.pipeline.download_url(file_id).await?;
    Ok(Redirect::temporary(&url))
}

/// `POST /files/{id}/share`: mint a time-limited link.
pub async fn share_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<ShareReq>>,
) -> Result<Json<ShareLink>, AppError> {
    let file_id = parse_file_id(&id)?;
    let expires_in = payload
        .and_then(|Json(p)| p.expires_in)
        .unwrap_or(DEFAULT_SHARE_TTL);
    let link = state.pipeline.share(file_id, expires_in).await?;
    Ok(Json(link))
}

/// `DELETE /files/{id}`: remove bytes, then metadata.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResp>, AppError> {
    let file_id = parse_file_id(&id)?;
    let deleted = state.pipeline.delete(file_id).await?;
    Ok(Json(DeleteResp { file_id, deleted }))
}

/// `POST /files/presign`: signed URL for a direct upload.
pub async fn presign_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PresignReq>,
) -> Result<Json<PresignedUpload>, AppError> {
    let presigned = state
        .pipeline
        .presign_upload(owner_from_headers(&headers), &req.filename, &req.content_type)
        .await?;
    Ok(Json(presigned))
}

/// `GET /stats`: aggregate statistics.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json::<IndexStats>(state.index.stats())
}

fn parse_file_id(raw: &str) -> Result<Uuid, EngineError> {
    Uuid::parse_str(raw).map_err(|_| EngineError::validation(format!("invalid file id `{}`", raw)))
}

fn owner_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Stage every file field to disk. A text field named `owner` overrides the
/// owner header for all files in the request.
async fn stage_multipart(
    state: &AppState,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Result<Vec<UploadRequest>, AppError> {
    let mut owner = owner_from_headers(headers);
    let mut requests = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some("owner") && field.file_name().is_none() {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::bad_request(e.to_string()))?;
            owner = Some(value);
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().unwrap_or_default().to_string();

        let staged = StagedFile::write_stream(&state.staging_dir, field)
            .await
            .map_err(|e| {
                AppError::bad_request(format!("failed to receive `{}`: {}", file_name, e))
            })?;
        requests.push(UploadRequest::new(staged, file_name, content_type));
    }

    if let Some(owner) = owner {
        requests = requests
            .into_iter()
            .map(|r| r.with_owner(owner.clone()))
            .collect();
    }
    Ok(requests)
}
