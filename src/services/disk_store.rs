//! src/services/disk_store.rs
//!
//! DiskObjectStore: an `ObjectStoreGateway` that keeps payloads on local disk
//! sharded beneath `base_path/{shard}/{shard}/{key}`, with the object's tags and
//! content type in a `{key}.meta.json` sidecar. Signed URLs point back at this
//! process's `/objects/{key}` route.

use super::{
    object_store::{
        GatewayResult, ObjectStoreGateway, ObjectTags, PutOutcome, StoredObject, ensure_key_safe,
    },
    signing::UrlSigner,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const SIDECAR_SUFFIX: &str = ".meta.json";

/// Sidecar persisted next to each payload.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Sidecar {
    content_type: String,
    etag: String,
    size: u64,
    tags: ObjectTags,
}

#[derive(Clone)]
pub struct DiskObjectStore {
    /// Root directory for payloads.
    base_path: PathBuf,

    signer: Arc<UrlSigner>,
}

impl DiskObjectStore {
    /// Create the store, making sure `base_path` exists.
    pub async fn new(base_path: impl Into<PathBuf>, signer: Arc<UrlSigner>) -> GatewayResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path, signer })
    }

    /// Two-level shard directories from MD5(key), lowercase hex (00–ff).
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/{shard}/{shard}/{key}`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    /// Write `bytes` to a temp file beside `target`, fsync, then rename over it.
    /// The temp file is removed on any failure.
    async fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, target).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    async fn remove_if_present(path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Ok(_) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{} already missing", path.display());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Remove empty shard directories up to (not including) `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStoreGateway for DiskObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        tags: &ObjectTags,
    ) -> GatewayResult<PutOutcome> {
        ensure_key_safe(key)?;
        let path = self.object_path(key);

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            etag: format!("{:x}", md5::compute(&bytes)),
            size: bytes.len() as u64,
            tags: tags.clone(),
        };
        let sidecar_json = serde_json::to_vec(&sidecar)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;

        Self::write_atomic(&path, &bytes).await?;
        if let Err(err) = Self::write_atomic(&Self::sidecar_path(&path), &sidecar_json).await {
            let _ = fs::remove_file(&path).await;
            return Err(err.into());
        }

        debug!(key, size = sidecar.size, etag = %sidecar.etag, "stored object on disk");
        Ok(PutOutcome {
            key: key.to_string(),
            location: self.signer.location(key),
        })
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        ensure_key_safe(key)?;
        let path = self.object_path(key);
        Self::remove_if_present(&path).await?;
        Self::remove_if_present(&Self::sidecar_path(&path)).await?;
        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> GatewayResult<bool> {
        ensure_key_safe(key)?;
        Ok(fs::try_exists(self.object_path(key)).await?)
    }

    async fn get(&self, key: &str) -> GatewayResult<Option<StoredObject>> {
        ensure_key_safe(key)?;
        let path = self.object_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let content_type = match fs::read(Self::sidecar_path(&path)).await {
            Ok(raw) => serde_json::from_slice::<Sidecar>(&raw)
                .map(|s| s.content_type)
                .unwrap_or_else(|_| "application/octet-stream".into()),
            Err(_) => "application/octet-stream".into(),
        };
        Ok(Some(StoredObject {
            bytes: Bytes::from(bytes),
            content_type,
        }))
    }

    async fn signed_read_url(
        &self,
        key: &str,
        ttl: Duration,
        force_download: bool,
    ) -> GatewayResult<String> {
        ensure_key_safe(key)?;
        self.signer.sign_read(key, ttl, force_download, Utc::now())
    }

    async fn signed_write_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> GatewayResult<String> {
        ensure_key_safe(key)?;
        self.signer.sign_write(key, content_type, ttl, Utc::now())
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::object_store::GatewayError;

    fn tags() -> ObjectTags {
        ObjectTags {
            owner_id: "alice".into(),
            file_id: Uuid::new_v4(),
            original_name: "notes.txt".into(),
            uploaded_at: Utc::now(),
        }
    }

    async fn store(dir: &Path) -> DiskObjectStore {
        let signer = Arc::new(UrlSigner::new("http://localhost:3000", "test-secret"));
        DiskObjectStore::new(dir, signer).await.unwrap()
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let key = "uploads/alice/1/notes.txt";

        let outcome = store
            .put(key, Bytes::from_static(b"hello"), "text/plain", &tags())
            .await
            .unwrap();
        assert_eq!(outcome.key, key);
        assert_eq!(outcome.location, format!("http://localhost:3000/objects/{key}"));
        assert!(store.head_exists(key).await.unwrap());

        let object = store.get(key).await.unwrap().unwrap();
        assert_eq!(&object.bytes[..], b"hello");
        assert_eq!(object.content_type, "text/plain");

        store.delete(key).await.unwrap();
        assert!(!store.head_exists(key).await.unwrap());
        assert!(store.get(key).await.unwrap().is_none());

        // missing key is fine
        store.delete(key).await.unwrap();
    }

    #[tokio::test]
    async fn delete_prunes_shard_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let key = "uploads/bob/2/a.bin";
        store
            .put(key, Bytes::from_static(b"x"), "application/octet-stream", &tags())
            .await
            .unwrap();
        store.delete(key).await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_unsafe_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        let err = store
            .put("../escape", Bytes::new(), "text/plain", &tags())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidKey(_)));
    }
}
