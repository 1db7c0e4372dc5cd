//! Single writer thread
//!
//! All mutations of a store's table go through one thread holding the only
//! write transaction. Producers enqueue `WriteItem`s on a bounded channel and
//! block when it is full. The open transaction is committed every commit
//! interval, before an export, and whenever a `Sync` item arrives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use heed::{Env, RwTxn};

use crate::observability::{log_event, Event, MetricsRegistry, Timer};
use crate::plan::CompiledPlan;
use crate::store::PayloadBuilder;

use super::codec;
use super::env::Table;
use super::errors::LmdbResult;

pub(crate) enum WriteItem {
    Put { row_key: Vec<u8>, value: Vec<u8> },
    /// Commit, then run the callback on the writer thread.
    Sync(Box<dyn FnOnce() + Send>),
    /// Commit, then move up to `limit` bytes of rows into a payload.
    Export {
        limit: Option<usize>,
        reply: Sender<LmdbResult<PayloadBuilder>>,
    },
}

pub(crate) struct Writer {
    pub name: String,
    pub env: Env,
    pub table: Table,
    pub plan: Arc<CompiledPlan>,
    pub running: Arc<AtomicBool>,
    /// Distinct rows held in the table
    pub stored: Arc<AtomicU64>,
    pub metrics: Arc<MetricsRegistry>,
    pub commit_interval: Duration,
    pub poll_interval: Duration,
}

impl Writer {
    pub fn run(self, receiver: Receiver<WriteItem>) {
        let mut txn: Option<RwTxn<'_>> = None;
        let mut last_commit = Instant::now();

        while self.running.load(Ordering::Acquire) {
            match receiver.recv_timeout(self.poll_interval) {
                Ok(WriteItem::Put { row_key, value }) => {
                    if txn.is_none() {
                        match self.env.write_txn() {
                            Ok(t) => txn = Some(t),
                            Err(e) => {
                                self.put_failed(&e.to_string());
                                continue;
                            }
                        }
                    }
                    if let Some(t) = txn.as_mut() {
                        if let Err(e) = self.insert(t, &row_key, &value) {
                            self.put_failed(&e.to_string());
                        }
                    }
                }
                Ok(WriteItem::Sync(callback)) => {
                    self.commit(&mut txn);
                    last_commit = Instant::now();
                    callback();
                }
                Ok(WriteItem::Export { limit, reply }) => {
                    self.commit(&mut txn);
                    last_commit = Instant::now();
                    let _ = reply.send(self.export(limit));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if txn.is_some() && last_commit.elapsed() >= self.commit_interval {
                self.commit(&mut txn);
                last_commit = Instant::now();
            }
        }

        // Uncommitted puts are abandoned with the table.
        drop(txn);
        drop(receiver);
        if let Err(e) = self.clear_table() {
            log_event(
                Event::LmdbCommitFailed,
                &[("table", &self.name), ("reason", &e.to_string())],
            );
        }
        self.stored.store(0, Ordering::Release);
        log_event(Event::LmdbWriterStopped, &[("table", &self.name)]);
    }

    fn insert(&self, txn: &mut RwTxn<'_>, row_key: &[u8], value: &[u8]) -> LmdbResult<()> {
        let existing = if codec::is_grouped_row(row_key)? {
            self.table.get(txn, row_key)?.map(<[u8]>::to_vec)
        } else {
            None
        };

        let appended = match existing {
            Some(existing) => {
                let (merged, appended) = codec::merge_entries(&existing, value, self.plan.expressions())?;
                self.table.put(txn, row_key, &merged)?;
                appended
            }
            None => {
                self.table.put(txn, row_key, value)?;
                codec::count_entries(value)
            }
        };
        self.stored.fetch_add(appended as u64, Ordering::AcqRel);
        Ok(())
    }

    fn commit(&self, txn: &mut Option<RwTxn<'_>>) {
        let Some(t) = txn.take() else {
            return;
        };
        let timer = Timer::new();
        match t.commit() {
            Ok(()) => {
                self.metrics.increment_lmdb_commits();
                log_event(
                    Event::LmdbCommit,
                    &[("table", &self.name), ("elapsed_ms", &timer.elapsed_ms())],
                );
            }
            Err(e) => log_event(
                Event::LmdbCommitFailed,
                &[("table", &self.name), ("reason", &e.to_string())],
            ),
        }
    }

    fn put_failed(&self, reason: &str) {
        self.metrics.increment_lmdb_put_failures();
        log_event(Event::LmdbPutFailed, &[("table", &self.name), ("reason", reason)]);
    }

    /// Drain rows in key order into one payload, deleting what was taken.
    fn export(&self, limit: Option<usize>) -> LmdbResult<PayloadBuilder> {
        let mut builder = PayloadBuilder::new(limit);
        let mut wtxn = self.env.write_txn()?;
        let mut taken: Vec<Vec<u8>> = Vec::new();
        let mut entries = 0usize;
        {
            for row in self.table.iter(&wtxn)? {
                if !builder.has_room() {
                    break;
                }
                let (row_key, value) = row?;
                builder.push(row_key, value)?;
                entries += codec::count_entries(value);
                if limit.is_some() {
                    taken.push(row_key.to_vec());
                }
            }
        }

        if limit.is_none() {
            self.table.clear(&mut wtxn)?;
        } else {
            for row_key in &taken {
                self.table.delete(&mut wtxn, row_key)?;
            }
        }
        wtxn.commit()?;
        self.metrics.increment_lmdb_commits();

        let _ = self
            .stored
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(entries as u64)));
        Ok(builder)
    }

    fn clear_table(&self) -> LmdbResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.table.clear(&mut wtxn)?;
        wtxn.commit()?;
        Ok(())
    }
}
