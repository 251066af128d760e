//! Signed object access: `GET` and `PUT` on `/objects/{*key}`.
//! These are the targets of the URLs minted by `UrlSigner`; every request
//! must carry a valid, unexpired signature for its key and method.

use crate::{
    errors::AppError,
    models::batch::UploadResult,
    services::{
        object_store::GatewayError,
        signing::{SignedOp, SignedQuery},
    },
    state::AppState,
};
use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

/// Largest body accepted by a signed `PUT`.
const MAX_SIGNED_PUT_BYTES: usize = 512 * 1024 * 1024;

/// GET `/objects/{*key}`: serve the payload behind a signed read URL.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, AppError> {
    verify(&state, &key, SignedOp::Get, &query)?;

    let object = state
        .store
        .get(&key)
        .await
        .map_err(|e| storage_failure(&key, e))?
        .ok_or_else(|| AppError::not_found(format!("object `{}` not found", key)))?;

    let filename = key.rsplit('/').next().unwrap_or(&key);
    let disposition = if query.force_download() {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!("inline; filename=\"{}\"", filename)
    };

    let mut response = Response::new(Body::from(object.bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// PUT `/objects/{*key}`: commit a direct upload behind a signed write URL.
///
/// The body is validated and indexed like a multipart upload. A second `PUT`
/// to the same key is answered with 409.
pub async fn put_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<UploadResult>), AppError> {
    verify(&state, &key, SignedOp::Put, &query)?;

    let signed_type = query.content_type.clone().unwrap_or_default();
    let sent_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !sent_type.eq_ignore_ascii_case(&signed_type) {
        return Err(AppError::forbidden(
            "content type does not match the signed upload",
        ));
    }

    let bytes = to_bytes(body, MAX_SIGNED_PUT_BYTES)
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read body: {}", e)))?;
    let size = bytes.len();
    let result = state
        .pipeline
        .complete_direct_upload(&key, &signed_type, bytes)
        .await?;

    debug!(%key, size, "committed direct upload");
    Ok((StatusCode::CREATED, Json(result)))
}

fn verify(state: &AppState, key: &str, op: SignedOp, query: &SignedQuery) -> Result<(), AppError> {
    state.signer.verify(key, op, query, Utc::now()).map_err(|e| {
        debug!(%key, error = %e, "rejected signed url");
        AppError::forbidden(e.to_string())
    })
}

fn storage_failure(key: &str, err: GatewayError) -> AppError {
    match err {
        GatewayError::InvalidKey(_) => AppError::bad_request(err.to_string()),
        other => {
            warn!(%key, error = %other, "object store request failed");
            AppError::new(StatusCode::BAD_GATEWAY, other.to_string())
        }
    }
}
