//! src/services/upload_pipeline.rs
//!
//! UploadPipeline: validate, optionally re-encode, store and index one file.
//!
//! Ordering guarantees:
//! - a type mismatch aborts before anything reaches the object store
//! - a failed `put` never produces an index record
//! - `put` and the index `create` run together in a detached task, so a
//!   cancelled caller cannot strand bytes without at least attempting to index
//!   them
//! - the staged input is released on every exit path (it is dropped with the
//!   request)
//! - a presigned key is committed at most once

use crate::{
    errors::{EngineError, EngineResult},
    models::{
        batch::UploadResult,
        file_record::{ANONYMOUS_OWNER, FileRecord, PresignedUpload, ShareLink},
    },
    services::{
        content_validator::{ContentValidator, mime_compatible},
        metadata_index::MetadataIndex,
        object_store::{ObjectStoreGateway, ObjectTags},
        staging::StagedFile,
    },
};
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashSet,
    ops::RangeInclusive,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 255;
const FALLBACK_NAME: &str = "file";
const DEFAULT_MIME: &str = "application/octet-stream";

/// Allowed lifetimes for share links, in seconds (1 minute to 7 days).
pub const SHARE_TTL_RANGE: RangeInclusive<u64> = 60..=604_800;

/// One file to ingest, as handed over by the HTTP layer.
pub struct UploadRequest {
    pub file: StagedFile,
    pub declared_name: String,
    pub declared_mime: String,
    pub declared_size: u64,
    /// `None` or empty means anonymous.
    pub owner_id: Option<String>,
}

impl UploadRequest {
    /// Request whose declared size is the staged length.
    pub fn new(file: StagedFile, name: impl Into<String>, mime: impl Into<String>) -> Self {
        let declared_size = file.len();
        Self {
            file,
            declared_name: name.into(),
            declared_mime: mime.into(),
            declared_size,
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Lifetime of the read URL returned with each upload and download.
    pub read_url_ttl: Duration,
    pub write_url_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            read_url_ttl: Duration::from_secs(3600),
            write_url_ttl: Duration::from_secs(900),
        }
    }
}

/// Where one file lands: its id, owner, display name and object key.
struct Placement {
    file_id: Uuid,
    owner_id: String,
    original_name: String,
    storage_key: String,
}

pub struct UploadPipeline {
    store: Arc<dyn ObjectStoreGateway>,
    validator: Arc<dyn ContentValidator>,
    index: Arc<MetadataIndex>,
    config: PipelineConfig,
    /// File ids of direct uploads currently being committed.
    direct_claims: Mutex<HashSet<Uuid>>,
}

impl UploadPipeline {
    pub fn new(
        store: Arc<dyn ObjectStoreGateway>,
        validator: Arc<dyn ContentValidator>,
        index: Arc<MetadataIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            validator,
            index,
            config,
            direct_claims: Mutex::new(HashSet::new()),
        }
    }

    /// Ingest one file. On success the object store and the index agree on the
    /// file's existence and storage key.
    pub async fn ingest(&self, request: UploadRequest) -> EngineResult<UploadResult> {
        let UploadRequest {
            file,
            declared_name,
            declared_mime,
            declared_size,
            owner_id,
        } = request;

        let file_id = Uuid::new_v4();
        let owner_id = normalize_owner(owner_id);
        let original_name = sanitize_name(&declared_name);
        let storage_key = storage_key(&owner_id, file_id, &original_name);

        if file.len() != declared_size {
            return Err(EngineError::validation(format!(
                "declared size {} does not match received {} bytes",
                declared_size,
                file.len()
            )));
        }

        let bytes = file
            .read()
            .await
            .map_err(|e| EngineError::Internal(format!("reading staged upload: {e}")))?;

        let placement = Placement {
            file_id,
            owner_id,
            original_name,
            storage_key,
        };
        self.commit(placement, &declared_mime, bytes).await
    }

    /// Commit the body of a signed `PUT` to a key minted by
    /// [`presign_upload`](Self::presign_upload).
    ///
    /// The upload is validated and indexed exactly like [`ingest`](Self::ingest).
    /// A key whose file is already indexed, or is being committed by another
    /// request, is rejected with `Conflict`.
    pub async fn complete_direct_upload(
        &self,
        key: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> EngineResult<UploadResult> {
        let (owner, file_id, name) = parse_storage_key(key)
            .ok_or_else(|| EngineError::validation("key was not issued by this service"))?;
        let owner_id = normalize_owner(Some(owner.to_string()));
        if storage_key(&owner_id, file_id, name) != key {
            return Err(EngineError::validation("key was not issued by this service"));
        }

        let _claim = self.claim_direct(file_id)?;
        let placement = Placement {
            file_id,
            owner_id,
            original_name: name.to_string(),
            storage_key: key.to_string(),
        };
        self.commit(placement, content_type, bytes).await
    }

    fn claim_direct(&self, file_id: Uuid) -> EngineResult<DirectClaim<'_>> {
        let mut claims = self
            .direct_claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.index.contains(file_id) || !claims.insert(file_id) {
            return Err(EngineError::Conflict(file_id));
        }
        Ok(DirectClaim {
            claims: &self.direct_claims,
            file_id,
        })
    }

    /// Sniff, re-encode, store, index and sign one payload.
    async fn commit(
        &self,
        placement: Placement,
        declared_mime: &str,
        bytes: Bytes,
    ) -> EngineResult<UploadResult> {
        let Placement {
            file_id,
            owner_id,
            original_name,
            storage_key,
        } = placement;
        let declared_mime = match declared_mime.trim() {
            "" => DEFAULT_MIME.to_string(),
            mime => mime.to_ascii_lowercase(),
        };

        let detected = self.validator.sniff(&bytes);
        if !mime_compatible(&declared_mime, detected.as_deref()) {
            let detected = detected.unwrap_or_default();
            warn!(%file_id, declared = %declared_mime, %detected, "content type mismatch");
            return Err(EngineError::validation(format!(
                "declared content type `{declared_mime}` but content is `{detected}`"
            )));
        }

        let bytes = self.optimize(bytes, &declared_mime).await;

        let uploaded_at = Utc::now();
        let record = FileRecord {
            file_id,
            original_name: original_name.clone(),
            mime_type: declared_mime,
            size: bytes.len() as u64,
            storage_key,
            owner_id: owner_id.clone(),
            uploaded_at,
            updated_at: uploaded_at,
            access_count: 0,
            last_accessed: None,
        };
        let tags = ObjectTags {
            owner_id,
            file_id,
            original_name,
            uploaded_at,
        };

        let persisted = tokio::spawn(persist(
            self.store.clone(),
            self.index.clone(),
            bytes,
            record,
            tags,
        ));
        let record = persisted
            .await
            .map_err(|e| EngineError::Internal(format!("persist task failed: {e}")))??;

        let url = match self
            .store
            .signed_read_url(&record.storage_key, self.config.read_url_ttl, false)
            .await
        {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(%file_id, error = %err, "could not sign read url for fresh upload");
                None
            }
        };

        info!(
            %file_id,
            key = %record.storage_key,
            size = record.size,
            mime = %record.mime_type,
            "upload complete"
        );
        Ok(UploadResult { record, url })
    }

    /// Re-encode eligible images on a blocking worker. Falls back to the
    /// original bytes if the worker itself fails.
    async fn optimize(&self, bytes: Bytes, mime: &str) -> Bytes {
        if !self.validator.should_reencode(mime) {
            return bytes;
        }
        let validator = self.validator.clone();
        let original = bytes.clone();
        let mime_owned = mime.to_string();
        match tokio::task::spawn_blocking(move || validator.reencode(bytes, &mime_owned)).await {
            Ok(out) => out,
            Err(err) => {
                warn!(error = %err, mime, "re-encode worker failed, keeping original");
                original
            }
        }
    }

    /// Delete a file's bytes, then its record.
    ///
    /// If the object store delete fails the record stays, so the index never
    /// points at bytes that may or may not exist.
    pub async fn delete(&self, file_id: Uuid) -> EngineResult<bool> {
        let record = self.index.get(file_id)?;
        if let Err(err) = self.store.delete(&record.storage_key).await {
            warn!(
                %file_id,
                key = %record.storage_key,
                error = %err,
                "object delete failed, keeping record"
            );
            return Err(err.into());
        }
        let removed = self.index.delete(file_id);
        info!(%file_id, key = %record.storage_key, removed, "file deleted");
        Ok(removed)
    }

    /// Mint a download link valid for `expires_in` seconds and log the share.
    pub async fn share(&self, file_id: Uuid, expires_in: u64) -> EngineResult<ShareLink> {
        if !SHARE_TTL_RANGE.contains(&expires_in) {
            return Err(EngineError::validation(format!(
                "expiresIn must be between {} and {} seconds",
                SHARE_TTL_RANGE.start(),
                SHARE_TTL_RANGE.end()
            )));
        }
        let record = self.index.get(file_id)?;
        let url = self
            .store
            .signed_read_url(&record.storage_key, Duration::from_secs(expires_in), true)
            .await?;
        self.index.log_share(file_id, expires_in);
        debug!(%file_id, expires_in, "share link issued");

        Ok(ShareLink {
            file_id,
            url,
            expires_in,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in as i64),
        })
    }

    /// Record an access and return a fresh read URL.
    pub async fn download_url(&self, file_id: Uuid) -> EngineResult<String> {
        let record = self.index.get(file_id)?;
        self.index.record_access(file_id);
        Ok(self
            .store
            .signed_read_url(&record.storage_key, self.config.read_url_ttl, true)
            .await?)
    }

    /// Signed URL for a direct client upload to a fresh key. Nothing is
    /// stored or indexed until the client's `PUT` reaches
    /// [`complete_direct_upload`](Self::complete_direct_upload).
    pub async fn presign_upload(
        &self,
        owner_id: Option<String>,
        filename: &str,
        content_type: &str,
    ) -> EngineResult<PresignedUpload> {
        let content_type = content_type.trim();
        if content_type.is_empty() {
            return Err(EngineError::validation("contentType is required"));
        }
        let file_id = Uuid::new_v4();
        let owner_id = normalize_owner(owner_id);
        let storage_key = storage_key(&owner_id, file_id, &sanitize_name(filename));
        let url = self
            .store
            .signed_write_url(&storage_key, content_type, self.config.write_url_ttl)
            .await?;
        Ok(PresignedUpload {
            file_id,
            storage_key,
            url,
            content_type: content_type.to_string(),
            expires_in: self.config.write_url_ttl.as_secs(),
        })
    }
}

/// Holds a direct upload's file id until its commit finishes.
struct DirectClaim<'a> {
    claims: &'a Mutex<HashSet<Uuid>>,
    file_id: Uuid,
}

impl Drop for DirectClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.file_id);
    }
}

/// Store the bytes, then index the record.
async fn persist(
    store: Arc<dyn ObjectStoreGateway>,
    index: Arc<MetadataIndex>,
    bytes: Bytes,
    record: FileRecord,
    tags: ObjectTags,
) -> EngineResult<FileRecord> {
    store
        .put(&record.storage_key, bytes, &record.mime_type, &tags)
        .await
        .map_err(|err| {
            error!(
                file_id = %record.file_id,
                key = %record.storage_key,
                error = %err,
                "object store put failed"
            );
            EngineError::Storage(err)
        })?;

    if let Err(err) = index.create(record.clone()) {
        error!(
            file_id = %record.file_id,
            key = %record.storage_key,
            error = %err,
            "orphaned object: stored but not indexed"
        );
        return Err(err.into());
    }
    Ok(record)
}

fn normalize_owner(owner_id: Option<String>) -> String {
    owner_id
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .unwrap_or_else(|| ANONYMOUS_OWNER.to_string())
}

/// Display name: last path component, no control characters.
pub fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Restrict one key segment to `[A-Za-z0-9._-]`, whitespace becoming `_`.
fn key_segment(value: &str, fallback: &str) -> String {
    let segment: String = value
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let segment = segment.trim_start_matches('.');
    if segment.is_empty() {
        fallback.to_string()
    } else {
        segment.to_string()
    }
}

/// `uploads/{owner}/{file_id}/{name}`, deterministic in its inputs.
pub fn storage_key(owner_id: &str, file_id: Uuid, name: &str) -> String {
    format!(
        "uploads/{}/{}/{}",
        key_segment(owner_id, ANONYMOUS_OWNER),
        file_id,
        key_segment(name, FALLBACK_NAME)
    )
}

/// Split a key produced by [`storage_key`] into `(owner, file_id, name)`.
pub fn parse_storage_key(key: &str) -> Option<(&str, Uuid, &str)> {
    let mut parts = key.splitn(4, '/');
    if parts.next()? != "uploads" {
        return None;
    }
    let owner = parts.next()?;
    let file_id = Uuid::parse_str(parts.next()?).ok()?;
    let name = parts.next()?;
    Some((owner, file_id, name))
}
