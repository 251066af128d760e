//! BatchCoordinator: run many uploads with per-file isolation.
//!
//! Each file goes through the pipeline in its own task, at most
//! `max_parallel` at a time. Outcomes are merged once, by input position, so
//! every filename lands in exactly one of `uploaded` or `failed`. Tasks are
//! detached: dropping the batch future lets in-flight uploads finish.

use crate::{
    models::batch::{BatchOutcome, BatchSummary, FailedUpload, UploadResult},
    services::upload_pipeline::{UploadPipeline, UploadRequest},
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const DEFAULT_BATCH_PARALLELISM: usize = 4;

pub struct BatchCoordinator {
    pipeline: Arc<UploadPipeline>,
    permits: Arc<Semaphore>,
}

impl BatchCoordinator {
    pub fn new(pipeline: Arc<UploadPipeline>, max_parallel: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    pub async fn ingest_many(&self, requests: Vec<UploadRequest>) -> BatchOutcome {
        let total = requests.len();
        let mut filenames = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);

        for request in requests {
            filenames.push(request.declared_name.clone());
            let pipeline = self.pipeline.clone();
            let permits = self.permits.clone();
            handles.push(tokio::spawn(async move {
                // never closed
                let _permit = permits.acquire_owned().await.ok();
                pipeline.ingest(request).await
            }));
        }

        let results = join_all(handles).await;

        let mut uploaded: Vec<UploadResult> = Vec::new();
        let mut failed: Vec<FailedUpload> = Vec::new();
        for (filename, result) in filenames.into_iter().zip(results) {
            match result {
                Ok(Ok(upload)) => uploaded.push(upload),
                Ok(Err(err)) => {
                    warn!(%filename, error = %err, "batch item failed");
                    failed.push(FailedUpload {
                        filename,
                        error: err.to_string(),
                    });
                }
                Err(join_err) => {
                    warn!(%filename, error = %join_err, "batch item task aborted");
                    failed.push(FailedUpload {
                        filename,
                        error: "internal error while processing file".to_string(),
                    });
                }
            }
        }

        let summary = BatchSummary {
            total,
            successful: uploaded.len(),
            failed: failed.len(),
        };
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "batch upload finished"
        );

        BatchOutcome {
            uploaded,
            failed,
            summary,
        }
    }
}
