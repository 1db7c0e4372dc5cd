//! Counters for ingestion, storage and payload traffic
//!
//! - Counters only, monotonic
//! - Relaxed atomics; values are exact once writers are quiescent

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    rows_added: AtomicU64,
    rows_filtered: AtomicU64,
    items_evicted: AtomicU64,
    lmdb_commits: AtomicU64,
    lmdb_put_failures: AtomicU64,
    payload_bytes_written: AtomicU64,
    payload_bytes_read: AtomicU64,
    responses_created: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_rows_added(&self) {
        self.rows_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rows_filtered(&self) {
        self.rows_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_items_evicted(&self, count: u64) {
        self.items_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_lmdb_commits(&self) {
        self.lmdb_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_lmdb_put_failures(&self) {
        self.lmdb_put_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_payload_bytes_written(&self, bytes: u64) {
        self.payload_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_payload_bytes_read(&self, bytes: u64) {
        self.payload_bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_responses_created(&self) {
        self.responses_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"rows_added":{},"rows_filtered":{},"items_evicted":{},"lmdb_commits":{},"lmdb_put_failures":{},"payload_bytes_written":{},"payload_bytes_read":{},"responses_created":{}}}"#,
            s.rows_added,
            s.rows_filtered,
            s.items_evicted,
            s.lmdb_commits,
            s.lmdb_put_failures,
            s.payload_bytes_written,
            s.payload_bytes_read,
            s.responses_created,
        )
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_added: self.rows_added.load(Ordering::Relaxed),
            rows_filtered: self.rows_filtered.load(Ordering::Relaxed),
            items_evicted: self.items_evicted.load(Ordering::Relaxed),
            lmdb_commits: self.lmdb_commits.load(Ordering::Relaxed),
            lmdb_put_failures: self.lmdb_put_failures.load(Ordering::Relaxed),
            payload_bytes_written: self.payload_bytes_written.load(Ordering::Relaxed),
            payload_bytes_read: self.payload_bytes_read.load(Ordering::Relaxed),
            responses_created: self.responses_created.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_added: u64,
    pub rows_filtered: u64,
    pub items_evicted: u64,
    pub lmdb_commits: u64,
    pub lmdb_put_failures: u64,
    pub payload_bytes_written: u64,
    pub payload_bytes_read: u64,
    pub responses_created: u64,
}
