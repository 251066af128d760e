//! Aggregate statistics over the metadata index.

use serde::Serialize;
use std::collections::BTreeMap;

/// Coarse classification of a file derived from its MIME type.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Images,
    Videos,
    Audio,
    Documents,
    Text,
    Applications,
    Other,
}

impl Category {
    /// Classify a MIME type. Checks are applied in order, so
    /// `application/pdf` lands in `Documents`, not `Applications`.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Category::Images
        } else if mime.starts_with("video/") {
            Category::Videos
        } else if mime.starts_with("audio/") {
            Category::Audio
        } else if mime.contains("pdf") {
            Category::Documents
        } else if mime.starts_with("text/") {
            Category::Text
        } else if mime.starts_with("application/") {
            Category::Applications
        } else {
            Category::Other
        }
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total_files: u64,
    pub total_size: u64,
    pub total_accesses: u64,
    pub average_size: f64,
    pub average_accesses: f64,
    /// Files uploaded within the last 24 hours.
    pub recent_uploads_24h: u64,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub by_type: BTreeMap<Category, u64>,
    pub size_by_type: BTreeMap<Category, u64>,
}

/// Snapshot computed under a single index lock.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct IndexStats {
    pub overview: StatsOverview,
    pub distribution: Distribution,
}

impl IndexStats {
    pub fn files_in(&self, category: Category) -> u64 {
        self.distribution.by_type.get(&category).copied().unwrap_or(0)
    }
}
