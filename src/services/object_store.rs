//! Gateway over the remote blob store.
//!
//! The engine only talks to storage through [`ObjectStoreGateway`]. Concrete
//! backends live in `disk_store` and `memory_store`; both mint URLs through the
//! shared [`UrlSigner`](super::signing::UrlSigner).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{io, time::Duration};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("object store transport failure: {0}")]
    Transport(String),
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("url signing failed: {0}")]
    Signature(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Descriptive tags attached to every stored object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTags {
    pub owner_id: String,
    pub file_id: Uuid,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    pub key: String,
    pub location: String,
}

/// A stored payload as returned by [`ObjectStoreGateway::get`].
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Uniform interface over a key-addressed blob store.
///
/// Every operation is fallible with a [`GatewayError`]; callers never retry at
/// this layer.
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous payload.
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        tags: &ObjectTags,
    ) -> GatewayResult<PutOutcome>;

    /// Remove the payload. A missing key is not an error.
    async fn delete(&self, key: &str) -> GatewayResult<()>;

    async fn head_exists(&self, key: &str) -> GatewayResult<bool>;

    /// Fetch a payload, `None` when the key is absent.
    async fn get(&self, key: &str) -> GatewayResult<Option<StoredObject>>;

    /// Time-limited URL granting read access to one key.
    async fn signed_read_url(
        &self,
        key: &str,
        ttl: Duration,
        force_download: bool,
    ) -> GatewayResult<String>;

    /// Time-limited URL granting a `PUT` of `content_type` to one key.
    async fn signed_write_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> GatewayResult<String>;

    /// Short backend name, used in logs and readiness output.
    fn backend_name(&self) -> &'static str;
}

/// Reject keys that could escape the store root.
pub(crate) fn ensure_key_safe(key: &str) -> GatewayResult<()> {
    const MAX_KEY_LEN: usize = 1024;
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    Ok(())
}
