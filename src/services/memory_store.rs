//! In-process object store, used by `--backend memory` and in tests.

use super::{
    object_store::{
        GatewayError, GatewayResult, ObjectStoreGateway, ObjectTags, PutOutcome, StoredObject,
        ensure_key_safe,
    },
    signing::UrlSigner,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Clone, Debug)]
struct MemoryObject {
    bytes: Bytes,
    content_type: String,
    tags: ObjectTags,
}

pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, MemoryObject>>,
    signer: Arc<UrlSigner>,
    fail_puts: AtomicUsize,
    fail_deletes: AtomicBool,
    fail_signing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(signer: Arc<UrlSigner>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            signer,
            fail_puts: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            fail_signing: AtomicBool::new(false),
        }
    }

    /// Make the next `count` calls to `put` fail with a transport error.
    pub fn fail_next_puts(&self, count: usize) {
        self.fail_puts.store(count, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tags(&self, key: &str) -> Option<ObjectTags> {
        self.objects().get(key).map(|o| o.tags.clone())
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, MemoryObject>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_put_failure(&self) -> bool {
        self.fail_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn check_signing(&self) -> GatewayResult<()> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(GatewayError::Signature("signing disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStoreGateway for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
        tags: &ObjectTags,
    ) -> GatewayResult<PutOutcome> {
        ensure_key_safe(key)?;
        if self.take_put_failure() {
            return Err(GatewayError::Transport("injected put failure".into()));
        }
        self.objects().insert(
            key.to_string(),
            MemoryObject {
                bytes,
                content_type: content_type.to_string(),
                tags: tags.clone(),
            },
        );
        Ok(PutOutcome {
            key: key.to_string(),
            location: self.signer.location(key),
        })
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        ensure_key_safe(key)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("injected delete failure".into()));
        }
        self.objects().remove(key);
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> GatewayResult<bool> {
        ensure_key_safe(key)?;
        Ok(self.objects().contains_key(key))
    }

    async fn get(&self, key: &str) -> GatewayResult<Option<StoredObject>> {
        ensure_key_safe(key)?;
        Ok(self.objects().get(key).map(|o| StoredObject {
            bytes: o.bytes.clone(),
            content_type: o.content_type.clone(),
        }))
    }

    async fn signed_read_url(
        &self,
        key: &str,
        ttl: Duration,
        force_download: bool,
    ) -> GatewayResult<String> {
        ensure_key_safe(key)?;
        self.check_signing()?;
        self.signer.sign_read(key, ttl, force_download, Utc::now())
    }

    async fn signed_write_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> GatewayResult<String> {
        ensure_key_safe(key)?;
        self.check_signing()?;
        self.signer.sign_write(key, content_type, ttl, Utc::now())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
