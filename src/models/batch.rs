//! Results returned by single and batch uploads.

use serde::Serialize;

use super::file_record::FileRecord;

/// A successfully ingested file plus a short-lived read URL.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    #[serde(flatten)]
    pub record: FileRecord,

    /// Signed read URL minted for the response. `None` if signing failed
    /// after the file was already stored and indexed.
    pub url: Option<String>,
}

/// A file from a batch that did not make it into the store.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
    pub filename: String,
    pub error: String,
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Outcome of a batch upload. Every input appears in exactly one of
/// `uploaded` or `failed`.
#[derive(Serialize, Clone, Debug, Default)]
pub struct BatchOutcome {
    pub uploaded: Vec<UploadResult>,
    pub failed: Vec<FailedUpload>,
    pub summary: BatchSummary,
}
