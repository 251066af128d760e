//! Defines routes for the file service.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST   /files`              : upload one file (multipart)
//!   - `POST   /files/batch`        : upload many files (multipart)
//!   - `POST   /files/presign`      : signed URL for a direct upload
//!   - `GET    /files`              : list (supports page, limit, type, search)
//!   - `GET    /files/{id}`         : metadata
//!   - `GET    /files/{id}/download`: redirect to a signed read URL
//!   - `POST   /files/{id}/share`   : time-limited share link
//!   - `DELETE /files/{id}`         : delete bytes and metadata
//!   - `GET    /stats`              : aggregate statistics
//!
//! - **Signed object endpoints**
//!   - `GET    /objects/{*key}`: read via signed URL
//!   - `PUT    /objects/{*key}`: write via signed URL

use crate::{
    handlers::{
        file_handlers::{
            delete_file, download_file, get_file, list_files, presign_upload, share_file, stats,
            upload_batch, upload_file,
        },
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, put_object},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for all routes.
///
/// `max_upload_bytes` caps multipart request bodies.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file routes
        .route("/files", post(upload_file).get(list_files))
        .route("/files/batch", post(upload_batch))
        .route("/files/presign", post(presign_upload))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/files/{id}/download", get(download_file))
        .route("/files/{id}/share", post(share_file))
        .route("/stats", get(stats))
        // signed object routes
        .route("/objects/{*key}", get(get_object).put(put_object))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
