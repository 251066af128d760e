//! Represents an uploaded file and its share history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner recorded when an upload arrives without an authenticated user.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Metadata describing one uploaded file.
///
/// The bytes themselves live in the object store under `storage_key`; the
/// record is owned by the `MetadataIndex` and handed out as clones.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Identifier assigned at upload time.
    pub file_id: Uuid,

    /// User-supplied filename after sanitization.
    pub original_name: String,

    /// Validated content type (MIME type).
    pub mime_type: String,

    /// Size in bytes of the stored payload.
    pub size: u64,

    /// Locator of the payload in the object store. Never changes once set.
    pub storage_key: String,

    /// Uploading user, or `"anonymous"`.
    pub owner_id: String,

    /// When the upload completed.
    pub uploaded_at: DateTime<Utc>,

    /// Bumped on every mutation.
    pub updated_at: DateTime<Utc>,

    /// Number of recorded accesses. Only ever increases.
    pub access_count: u64,

    /// Timestamp of the most recent recorded access.
    pub last_accessed: Option<DateTime<Utc>>,
}

/// One entry in a file's append-only share log.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareActivityEntry {
    pub shared_at: DateTime<Utc>,
    /// Lifetime of the issued link, in seconds.
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// A time-limited download link handed out by a share.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub file_id: Uuid,
    pub url: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// A signed URL a client can `PUT` bytes to directly.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub file_id: Uuid,
    pub storage_key: String,
    pub url: String,
    pub content_type: String,
    pub expires_in: u64,
}
