//! Shared handler state, built once at startup and dropped at shutdown.

use crate::{
    config::{AppConfig, Backend},
    services::{
        batch_coordinator::BatchCoordinator,
        content_validator::{ContentValidator, MagicValidator},
        disk_store::DiskObjectStore,
        memory_store::MemoryObjectStore,
        metadata_index::MetadataIndex,
        object_store::ObjectStoreGateway,
        signing::UrlSigner,
        upload_pipeline::{PipelineConfig, UploadPipeline},
    },
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    pub batch: Arc<BatchCoordinator>,
    pub index: Arc<MetadataIndex>,
    pub store: Arc<dyn ObjectStoreGateway>,
    pub signer: Arc<UrlSigner>,
    pub staging_dir: PathBuf,
}

impl AppState {
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let signer = Arc::new(UrlSigner::new(&cfg.public_base_url, &cfg.signing_secret));
        let store: Arc<dyn ObjectStoreGateway> = match cfg.backend {
            Backend::Disk => Arc::new(
                DiskObjectStore::new(&cfg.storage_dir, signer.clone())
                    .await
                    .with_context(|| format!("opening storage dir {}", cfg.storage_dir))?,
            ),
            Backend::Memory => Arc::new(MemoryObjectStore::new(signer.clone())),
        };
        tokio::fs::create_dir_all(&cfg.staging_dir)
            .await
            .with_context(|| format!("creating staging dir {}", cfg.staging_dir))?;

        Ok(Self::new(
            store,
            signer,
            Arc::new(MagicValidator::new(cfg.reencode_limits())),
            PathBuf::from(&cfg.staging_dir),
            cfg.pipeline_config(),
            cfg.batch_parallelism,
        ))
    }

    pub fn new(
        store: Arc<dyn ObjectStoreGateway>,
        signer: Arc<UrlSigner>,
        validator: Arc<dyn ContentValidator>,
        staging_dir: PathBuf,
        pipeline_config: PipelineConfig,
        batch_parallelism: usize,
    ) -> Self {
        let index = Arc::new(MetadataIndex::new());
        let pipeline = Arc::new(UploadPipeline::new(
            store.clone(),
            validator,
            index.clone(),
            pipeline_config,
        ));
        let batch = Arc::new(BatchCoordinator::new(pipeline.clone(), batch_parallelism));
        Self {
            pipeline,
            batch,
            index,
            store,
            signer,
            staging_dir,
        }
    }
}
