//! Shared setup for integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use filevault::{
    services::{
        content_validator::MagicValidator, memory_store::MemoryObjectStore, signing::UrlSigner,
        staging::StagedFile, upload_pipeline::{PipelineConfig, UploadRequest},
    },
    state::AppState,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_URL: &str = "http://files.test";

/// Smallest valid PDF header; `infer` sniffs it as `application/pdf`.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\n";

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<MemoryObjectStore>,
    pub staging: TempDir,
}

pub fn setup() -> TestEnv {
    setup_with_parallelism(4)
}

pub fn setup_with_parallelism(parallelism: usize) -> TestEnv {
    let staging = tempfile::tempdir().expect("staging dir");
    let signer = Arc::new(UrlSigner::new(BASE_URL, "integration-secret"));
    let store = Arc::new(MemoryObjectStore::new(signer.clone()));
    let state = AppState::new(
        store.clone(),
        signer,
        Arc::new(MagicValidator::default()),
        staging.path().to_path_buf(),
        PipelineConfig::default(),
        parallelism,
    );
    TestEnv {
        state,
        store,
        staging,
    }
}

impl TestEnv {
    /// Stage `bytes` on disk, the way the HTTP layer does.
    pub async fn request(&self, name: &str, mime: &str, bytes: &[u8]) -> UploadRequest {
        let staged = StagedFile::write(self.staging.path(), Bytes::copy_from_slice(bytes))
            .await
            .expect("stage upload");
        UploadRequest::new(staged, name, mime)
    }

    /// Number of files left in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging.path())
            .expect("read staging dir")
            .count()
    }
}
