//! src/services/metadata_index.rs
//!
//! MetadataIndex: in-process keyed store of `FileRecord`s plus each file's
//! share log. Every operation runs as one critical section under a single
//! mutex, so `list` and `stats` always see a consistent snapshot and
//! concurrent `record_access` calls never lose increments. Nothing awaits while
//! the lock is held.

use crate::models::{
    file_record::{FileRecord, ShareActivityEntry},
    stats::{Category, Distribution, IndexStats, StatsOverview},
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::{
    cmp::Reverse,
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("file `{0}` not found")]
    NotFound(Uuid),
    #[error("file `{0}` already indexed")]
    Conflict(Uuid),
}

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Clone, Debug, Default)]
pub struct ListParams {
    /// 1-indexed page number.
    pub page: usize,
    pub limit: usize,
    /// Substring matched against the MIME type.
    pub type_filter: Option<String>,
    /// Case-insensitive substring matched against the original name.
    pub search: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

struct Entry {
    /// Insertion sequence, used to break `uploaded_at` ties.
    seq: u64,
    record: FileRecord,
}

#[derive(Default)]
struct IndexState {
    records: HashMap<Uuid, Entry>,
    shares: HashMap<Uuid, Vec<ShareActivityEntry>>,
    next_seq: u64,
}

/// Process-lifetime metadata store. Only the operation contracts below are
/// exposed; the map itself never leaves this module.
#[derive(Default)]
pub struct MetadataIndex {
    state: Mutex<IndexState>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the index lock. Every operation leaves the state consistent
    /// before it can panic, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("metadata index lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn create(&self, record: FileRecord) -> IndexResult<()> {
        let mut state = self.lock();
        if state.records.contains_key(&record.file_id) {
            return Err(IndexError::Conflict(record.file_id));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(file_id = %record.file_id, key = %record.storage_key, "indexed file");
        state.records.insert(record.file_id, Entry { seq, record });
        Ok(())
    }

    pub fn get(&self, file_id: Uuid) -> IndexResult<FileRecord> {
        self.lock()
            .records
            .get(&file_id)
            .map(|entry| entry.record.clone())
            .ok_or(IndexError::NotFound(file_id))
    }

    pub fn contains(&self, file_id: Uuid) -> bool {
        self.lock().records.contains_key(&file_id)
    }

    /// Bump the access counter. Unknown ids are ignored.
    pub fn record_access(&self, file_id: Uuid) {
        let mut state = self.lock();
        match state.records.get_mut(&file_id) {
            Some(entry) => {
                let now = Utc::now();
                entry.record.access_count = entry.record.access_count.saturating_add(1);
                entry.record.last_accessed = Some(now);
                entry.record.updated_at = now;
            }
            None => debug!(%file_id, "access recorded for unknown file, ignoring"),
        }
    }

    /// Remove a record and its share log. Returns whether anything was removed.
    pub fn delete(&self, file_id: Uuid) -> bool {
        let mut state = self.lock();
        state.shares.remove(&file_id);
        state.records.remove(&file_id).is_some()
    }

    pub fn list(&self, params: &ListParams) -> Page<FileRecord> {
        let page = params.page.max(1);
        let limit = params.limit.max(1);
        let type_filter = params.type_filter.as_deref().filter(|t| !t.is_empty());
        let search = params
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let state = self.lock();
        let mut matched: Vec<&Entry> = state
            .records
            .values()
            .filter(|e| type_filter.is_none_or(|t| e.record.mime_type.contains(t)))
            .filter(|e| {
                search
                    .as_deref()
                    .is_none_or(|s| e.record.original_name.to_lowercase().contains(s))
            })
            .collect();
        matched.sort_by_key(|e| (Reverse(e.record.uploaded_at), e.seq));

        let total = matched.len();
        let pages = total.div_ceil(limit);
        let items = matched
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(|e| e.record.clone())
            .collect();

        Page {
            items,
            page,
            limit,
            total,
            pages,
            has_next: page < pages,
            has_prev: page > 1,
        }
    }

    /// Append to the file's share log. Unknown ids are ignored.
    pub fn log_share(&self, file_id: Uuid, expires_in: u64) {
        let mut state = self.lock();
        if !state.records.contains_key(&file_id) {
            debug!(%file_id, "share logged for unknown file, ignoring");
            return;
        }
        let shared_at = Utc::now();
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| shared_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        state.shares.entry(file_id).or_default().push(ShareActivityEntry {
            shared_at,
            expires_in,
            expires_at,
        });
    }

    pub fn share_activity(&self, file_id: Uuid) -> Vec<ShareActivityEntry> {
        self.lock().shares.get(&file_id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> IndexStats {
        self.stats_at(Utc::now())
    }

    /// Aggregate statistics with "recent" measured back from `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> IndexStats {
        let recent_cutoff = now - Duration::hours(24);
        let mut overview = StatsOverview::default();
        let mut distribution = Distribution::default();

        let state = self.lock();
        for entry in state.records.values() {
            let record = &entry.record;
            let category = Category::from_mime(&record.mime_type);
            overview.total_files += 1;
            overview.total_size += record.size;
            overview.total_accesses += record.access_count;
            if record.uploaded_at >= recent_cutoff {
                overview.recent_uploads_24h += 1;
            }
            *distribution.by_type.entry(category).or_default() += 1;
            *distribution.size_by_type.entry(category).or_default() += record.size;
        }
        drop(state);

        if overview.total_files > 0 {
            let count = overview.total_files as f64;
            overview.average_size = overview.total_size as f64 / count;
            overview.average_accesses = overview.total_accesses as f64 / count;
        }

        IndexStats {
            overview,
            distribution,
        }
    }
}
