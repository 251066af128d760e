//! Batch ingestion: per-file isolation and result accounting.

mod common;

use common::{PDF_BYTES, setup, setup_with_parallelism};

#[tokio::test]
async fn invalid_file_is_reported_without_failing_the_batch() {
    let env = setup();
    let requests = vec![
        env.request("a.txt", "text/plain", b"first file").await,
        env.request("fake.png", "image/png", PDF_BYTES).await,
        env.request("c.txt", "text/plain", b"third file").await,
    ];

    let outcome = env.state.batch.ingest_many(requests).await;
    assert_eq!(outcome.summary.total, 3);
    assert_eq!(outcome.summary.successful, 2);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.failed[0].filename, "fake.png");
    assert!(!outcome.failed[0].error.is_empty());

    let names: Vec<_> = outcome
        .uploaded
        .iter()
        .map(|r| r.record.original_name.as_str())
        .collect();
    assert_eq!(names, ["a.txt", "c.txt"]);
    assert_eq!(env.state.index.len(), 2);
    assert_eq!(env.staged_files(), 0);
}

#[tokio::test]
async fn summary_accounts_for_every_file() {
    let env = setup_with_parallelism(3);
    let mut requests = Vec::new();
    for i in 0..12 {
        let request = if i % 4 == 0 {
            env.request(&format!("bad-{i}.jpg"), "image/jpeg", PDF_BYTES).await
        } else {
            let body = format!("file number {i}");
            env.request(&format!("file-{i}.txt"), "text/plain", body.as_bytes())
                .await
        };
        requests.push(request);
    }

    let outcome = env.state.batch.ingest_many(requests).await;
    let summary = outcome.summary;
    assert_eq!(summary.total, 12);
    assert_eq!(summary.successful + summary.failed, summary.total);
    assert_eq!(summary.successful, outcome.uploaded.len());
    assert_eq!(summary.failed, outcome.failed.len());
    assert_eq!(summary.failed, 3);
    assert_eq!(env.state.index.len(), 9);
}

#[tokio::test]
async fn storage_failure_is_isolated_to_one_file() {
    let env = setup_with_parallelism(1);
    env.store.fail_next_puts(1);
    let requests = vec![
        env.request("one.txt", "text/plain", b"one").await,
        env.request("two.txt", "text/plain", b"two").await,
    ];

    let outcome = env.state.batch.ingest_many(requests).await;
    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.successful, 1);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(env.state.index.len(), 1);
    assert_eq!(env.store.len(), 1);
}

#[tokio::test]
async fn empty_batch_yields_empty_summary() {
    let env = setup();
    let outcome = env.state.batch.ingest_many(Vec::new()).await;
    assert_eq!(outcome.summary.total, 0);
    assert!(outcome.uploaded.is_empty());
    assert!(outcome.failed.is_empty());
}
