//! Off-heap result store
//!
//! Rows live in a named LMDB table keyed by `(depth, parent, discriminator)`
//! so the children of one parent are a contiguous key range. Ingestion
//! thread(s) encode rows and hand them to the writer thread; reads open
//! their own read transactions and sort and trim on the way out.

use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use heed::Env;

use crate::codec::{Input, Output};
use crate::config::LmdbConfig;
use crate::expression::{read_generators, SelectionHint, Val};
use crate::observability::{log_event, Event, MetricsRegistry, ObservationScope};
use crate::plan::{CompiledPlan, CompiledSorter};
use crate::store::{
    next_unique_id, read_frame, write_frame, CompletionLatch, CompletionState, DataStore, DataStoreSettings,
    IngestEntry, Ingestor, Item, Items, Key, PayloadRows, StoreError, StoreResult,
};

use super::codec;
use super::env::{LmdbEnvironment, Table};
use super::errors::{LmdbError, LmdbResult};
use super::writer::{WriteItem, Writer};

/// Completion for an LMDB store. Signalling goes through the writer queue so
/// waiters are released only after everything enqueued before it is
/// committed.
pub struct LmdbCompletionState {
    latch: Arc<CompletionLatch>,
    queue: SyncSender<WriteItem>,
    running: Arc<AtomicBool>,
}

impl CompletionState for LmdbCompletionState {
    fn signal_complete(&self) {
        if !self.running.load(Ordering::Acquire) {
            self.latch.release();
            return;
        }
        let latch = Arc::clone(&self.latch);
        let sentinel = WriteItem::Sync(Box::new(move || latch.release()));
        if self.queue.send(sentinel).is_err() {
            self.latch.release();
        }
    }

    fn is_complete(&self) -> bool {
        self.latch.is_complete()
    }

    fn await_completion(&self) {
        self.latch.await_completion();
    }

    fn await_completion_timeout(&self, timeout: Duration) -> bool {
        self.latch.await_completion_timeout(timeout)
    }
}

pub struct LmdbDataStore {
    name: String,
    plan: Arc<CompiledPlan>,
    settings: DataStoreSettings,
    env: Env,
    table: Table,
    ingestor: Ingestor,
    queue: SyncSender<WriteItem>,
    running: Arc<AtomicBool>,
    stored: Arc<AtomicU64>,
    completion: LmdbCompletionState,
    writer: Mutex<Option<JoinHandle<()>>>,
    payload_limit: Option<usize>,
    metrics: Arc<MetricsRegistry>,
}

impl LmdbDataStore {
    pub fn new(
        name: impl Into<String>,
        plan: Arc<CompiledPlan>,
        settings: DataStoreSettings,
        environment: &LmdbEnvironment,
        config: &LmdbConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> LmdbResult<Self> {
        let name = name.into();
        let table = environment.open_table(&name)?;
        let env = environment.env().clone();
        let running = Arc::new(AtomicBool::new(true));
        let stored = Arc::new(AtomicU64::new(0));
        let (queue, receiver) = mpsc::sync_channel(config.queue_capacity);

        let writer = Writer {
            name: name.clone(),
            env: env.clone(),
            table,
            plan: Arc::clone(&plan),
            running: Arc::clone(&running),
            stored: Arc::clone(&stored),
            metrics: Arc::clone(&metrics),
            commit_interval: config.commit_interval(),
            poll_interval: config.poll_interval(),
        };
        let handle = thread::Builder::new()
            .name(format!("lmdb-writer-{}", name))
            .spawn(move || writer.run(receiver))?;

        let ingestor = Ingestor::new(&name, Arc::clone(&plan), settings.max_results.size(0), Arc::clone(&metrics));
        let completion = LmdbCompletionState {
            latch: Arc::new(CompletionLatch::new()),
            queue: queue.clone(),
            running: Arc::clone(&running),
        };
        log_event(Event::StoreCreated, &[("store", &name), ("backend", "lmdb")]);

        Ok(Self {
            name,
            plan,
            settings,
            env,
            table,
            ingestor,
            queue,
            running,
            stored,
            completion,
            writer: Mutex::new(Some(handle)),
            payload_limit: config.payload_limit(),
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn enqueue(&self, item: WriteItem) -> LmdbResult<()> {
        self.queue
            .send(item)
            .map_err(|_| LmdbError::WriterStopped(self.name.clone()))
    }

    fn encode(&self, entry: &IngestEntry) -> LmdbResult<WriteItem> {
        let key = entry.item.key();
        let key_bytes = key.to_bytes()?;
        let row_key = codec::row_key(&entry.parent, key, &key_bytes)?;
        let value = codec::single_entry(next_unique_id(), &key_bytes, entry.item.generators())?;
        Ok(WriteItem::Put { row_key, value })
    }

    /// Block until everything enqueued so far is committed.
    pub fn sync(&self) -> StoreResult<()> {
        let (done, wait) = mpsc::channel();
        self.enqueue(WriteItem::Sync(Box::new(move || {
            let _ = done.send(());
        })))?;
        // A writer that stops first drops the callback, which also unblocks us.
        let _ = wait.recv();
        Ok(())
    }

    /// Children of `parent` ordered by the depth's sorter, ties by arrival,
    /// keeping at most `limit`. With `trim_top` the last `limit` are kept.
    fn read_children(&self, parent: &Key, limit: usize, sort: bool, trim_top: bool) -> LmdbResult<Vec<Item>> {
        let depth = parent.depth();
        let limit = limit.min(self.settings.store_size.size(depth));
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sorter = if sort { self.plan.sorter(depth) } else { None };
        let grouped = self.plan.depths().is_grouped(depth);
        // Ungrouped row keys are in arrival order already.
        let stop_early = sorter.is_none() && !grouped && !trim_top;
        let batch = limit.saturating_mul(2).max(1024);

        let prefix = codec::child_prefix(parent)?;
        let mut rows: Vec<(u64, Item)> = Vec::new();
        let rtxn = self.env.read_txn()?;
        let range = (Bound::Included(&prefix[..]), Bound::Unbounded);
        for row in self.table.range(&rtxn, &range)? {
            let (row_key, value) = row?;
            if !row_key.starts_with(&prefix) {
                break;
            }
            for entry in codec::Entries::new(value) {
                let entry = entry?;
                let key = Key::from_bytes(entry.key)?;
                if key.parent().as_ref() != Some(parent) {
                    continue;
                }
                let generators = read_generators(&mut Input::new(entry.generators), self.plan.expressions())?;
                rows.push((entry.sequence, Item::new(key, generators)));
            }
            if stop_early && rows.len() >= limit {
                break;
            }
            if rows.len() > batch {
                sort_and_trim(&mut rows, sorter, limit, trim_top);
            }
        }
        drop(rtxn);

        sort_and_trim(&mut rows, sorter, limit, trim_top);
        Ok(rows.into_iter().map(|(_, item)| item).collect())
    }

    fn read_failed(&self, e: LmdbError) -> StoreError {
        log_event(Event::LmdbReadFailed, &[("table", &self.name), ("reason", &e.to_string())]);
        e.into()
    }

    fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn sort_and_trim(rows: &mut Vec<(u64, Item)>, sorter: Option<&CompiledSorter>, limit: usize, trim_top: bool) {
    match sorter {
        Some(sorter) => rows.sort_by(|a, b| {
            sorter
                .compare(a.1.generators(), b.1.generators())
                .then(a.0.cmp(&b.0))
        }),
        None => rows.sort_by_key(|(sequence, _)| *sequence),
    }
    if rows.len() > limit {
        if trim_top {
            rows.drain(..rows.len() - limit);
        } else {
            rows.truncate(limit);
        }
    }
}

impl DataStore for LmdbDataStore {
    fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    fn add(&self, values: &[Val]) {
        if !self.is_running() {
            return;
        }
        let Some(entries) = self.ingestor.prepare(values) else {
            return;
        };
        for entry in &entries {
            let result = self.encode(entry).and_then(|item| self.enqueue(item));
            if let Err(e) = result {
                self.metrics.increment_lmdb_put_failures();
                log_event(Event::LmdbPutFailed, &[("table", &self.name), ("reason", &e.to_string())]);
                return;
            }
        }
    }

    fn get_children(&self, parent: &Key) -> StoreResult<Items> {
        self.read_children(parent, usize::MAX, true, false)
            .map(Items::new)
            .map_err(|e| self.read_failed(e))
    }

    fn child_items(&self, parent: &Key, hint: SelectionHint) -> StoreResult<Vec<Item>> {
        self.read_children(parent, hint.limit, hint.sort, hint.trim_top)
            .map_err(|e| self.read_failed(e))
    }

    /// Distinct rows held in the table, before read-time trimming.
    fn size(&self) -> u64 {
        self.stored.load(Ordering::Acquire)
    }

    fn total_size(&self) -> u64 {
        self.ingestor.total()
    }

    fn clear(&self) {
        self.shutdown();
        self.ingestor.reset();
        self.completion.latch.release();
        log_event(Event::StoreCleared, &[("store", &self.name)]);
    }

    fn completion_state(&self) -> &dyn CompletionState {
        &self.completion
    }

    /// Export one payload of at most the configured byte limit. Once the
    /// store is complete, everything left is exported as further payloads.
    fn write_payload(&self, output: &mut Output) -> StoreResult<()> {
        let scope = ObservationScope::with_fields("PAYLOAD_EXPORT", &[("store", &self.name)]);

        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut rows = 0usize;
        if self.is_running() {
            loop {
                let (reply, wait) = mpsc::channel();
                self.enqueue(WriteItem::Export {
                    limit: self.payload_limit,
                    reply,
                })?;
                let builder = wait
                    .recv()
                    .map_err(|_| StoreError::Closed(self.name.clone()))??;
                if builder.is_empty() {
                    break;
                }
                rows += builder.rows();
                payloads.push(builder.into_bytes());
                if self.payload_limit.is_none() || !self.completion.is_complete() {
                    break;
                }
            }
        }

        let start = output.len();
        write_frame(output, &payloads)?;
        let bytes = (output.len() - start) as u64;
        self.metrics.add_payload_bytes_written(bytes);
        scope.complete_with_fields(&[
            ("payloads", &payloads.len().to_string()),
            ("rows", &rows.to_string()),
            ("bytes", &bytes.to_string()),
        ]);
        Ok(())
    }

    fn read_payload(&self, input: &mut Input<'_>) -> StoreResult<bool> {
        let start = input.position();
        let payloads = read_frame(input)?;
        self.metrics.add_payload_bytes_read((input.position() - start) as u64);

        let mut rows = 0usize;
        for payload in payloads {
            for row in PayloadRows::new(payload) {
                if !self.is_running() {
                    return Ok(false);
                }
                let (row_key, value) = row?;
                if !self.ingestor.admit_imported() {
                    break;
                }
                let item = if codec::is_grouped_row(row_key)? {
                    WriteItem::Put {
                        row_key: row_key.to_vec(),
                        value: codec::relocalize(value, None)?,
                    }
                } else {
                    let id = next_unique_id();
                    WriteItem::Put {
                        row_key: codec::with_unique_id(row_key, id)?,
                        value: codec::relocalize(value, Some(id))?,
                    }
                };
                self.enqueue(item)?;
                rows += 1;
            }
        }
        self.sync()?;

        log_event(Event::PayloadRead, &[("store", &self.name), ("rows", &rows.to_string())]);
        Ok(self.is_running() && !self.ingestor.has_enough_data())
    }
}

impl Drop for LmdbDataStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::plan::{FieldSettings, Sizes, SortDirection, TableSettings};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> LmdbConfig {
        LmdbConfig {
            path: dir.path().to_string_lossy().into_owned(),
            max_store_size_bytes: 64 * 1024 * 1024,
            max_dbs: 16,
            commit_interval_ms: 10,
            poll_interval_ms: 5,
            ..LmdbConfig::default()
        }
    }

    fn store(env: &LmdbEnvironment, config: &LmdbConfig, name: &str, store_size: Vec<usize>) -> LmdbDataStore {
        let plan = CompiledPlan::compile(&TableSettings {
            fields: vec![
                FieldSettings::new("key", Expression::field(0))
                    .grouped(0)
                    .sorted(0, SortDirection::Asc),
                FieldSettings::new("count", Expression::count()),
            ],
            show_detail: true,
            max_results: vec![],
        })
        .unwrap();
        LmdbDataStore::new(
            name,
            Arc::new(plan),
            DataStoreSettings {
                max_results: Sizes::new(vec![1_000_000]),
                store_size: Sizes::new(store_size),
            },
            env,
            config,
            Arc::new(MetricsRegistry::new()),
        )
        .unwrap()
    }

    fn count_of(item: &Item) -> Val {
        item.generators()[1].as_ref().unwrap().eval()
    }

    #[test]
    fn test_grouped_rows_merge() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let store = store(&env, &config, "merge", vec![10]);

        for key in ["B", "A", "B"] {
            store.add(&[Val::from(key)]);
        }
        store.sync().unwrap();

        let items = store.get().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.get(0).unwrap().key(), &Key::root().resolve_grouped(vec![Val::from("A")]));
        assert_eq!(count_of(items.get(1).unwrap()), Val::Integer(2));
        assert_eq!(store.get_children(items.get(1).unwrap().key()).unwrap().len(), 2);
        assert_eq!(store.size(), 5);
        assert_eq!(store.total_size(), 6);
    }

    #[test]
    fn test_read_trims_to_store_size() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let store = store(&env, &config, "trim", vec![2]);

        for key in ["C", "A", "B"] {
            store.add(&[Val::from(key)]);
        }
        store.sync().unwrap();

        let keys: Vec<Key> = store.get().unwrap().iter().map(|item| item.key().clone()).collect();
        assert_eq!(
            keys,
            vec![
                Key::root().resolve_grouped(vec![Val::from("A")]),
                Key::root().resolve_grouped(vec![Val::from("B")]),
            ]
        );
    }

    #[test]
    fn test_child_items_honour_hint() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let store = store(&env, &config, "hint", vec![10]);
        for key in ["A", "B", "C"] {
            store.add(&[Val::from(key)]);
        }
        store.sync().unwrap();

        let last = store
            .child_items(
                &Key::root(),
                SelectionHint {
                    limit: 1,
                    sort: true,
                    trim_top: true,
                },
            )
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].key(), &Key::root().resolve_grouped(vec![Val::from("C")]));
    }

    #[test]
    fn test_clear_stops_writer_and_releases() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let store = store(&env, &config, "clear", vec![10]);
        store.add(&[Val::from("A")]);
        store.clear();

        assert!(store.completion_state().is_complete());
        assert_eq!(store.size(), 0);
        assert!(store.get().unwrap().is_empty());
        store.add(&[Val::from("B")]);
        assert_eq!(store.total_size(), 0);
    }

    #[test]
    fn test_completion_waits_for_commit() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let store = store(&env, &config, "complete", vec![10]);
        store.add(&[Val::from("A")]);
        store.completion_state().signal_complete();
        assert!(store.completion_state().await_completion_timeout(Duration::from_secs(5)));
        assert_eq!(store.get().unwrap().len(), 1);
    }

    fn bounded_config(dir: &TempDir) -> LmdbConfig {
        LmdbConfig {
            payload_limit_bytes: 120,
            ..config(dir)
        }
    }

    /// Import every payload in `frame` into `target` and return how many there were.
    fn import(target: &LmdbDataStore, frame: &[u8]) -> usize {
        let payloads = read_frame(&mut Input::new(frame)).unwrap().len();
        target.read_payload(&mut Input::new(frame)).unwrap();
        payloads
    }

    fn assert_one_of_each(target: &LmdbDataStore, keys: usize) {
        let items = target.get().unwrap();
        assert_eq!(items.len(), keys);
        for item in items.iter() {
            assert_eq!(count_of(item), Val::Integer(1));
            assert_eq!(target.get_children(item.key()).unwrap().len(), 1);
        }
        assert_eq!(target.size(), (keys * 2) as u64);
    }

    #[test]
    fn test_bounded_export_before_completion_takes_one_payload_per_call() {
        let dir = TempDir::new().unwrap();
        let config = bounded_config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let source = store(&env, &config, "bounded-src", vec![100]);
        let target = store(&env, &config, "bounded-dst", vec![100]);

        for i in 0..10 {
            source.add(&[Val::from(format!("key-{}", i))]);
        }
        source.sync().unwrap();
        assert_eq!(source.size(), 20);

        let mut calls = 0;
        while source.size() > 0 {
            let mut out = Output::new();
            source.write_payload(&mut out).unwrap();
            assert_eq!(import(&target, out.as_slice()), 1);
            calls += 1;
            assert!(calls <= 20);
        }
        assert!(calls > 1);

        assert!(source.get().unwrap().is_empty());
        assert_one_of_each(&target, 10);
    }

    #[test]
    fn test_bounded_export_after_completion_drains_in_one_call() {
        let dir = TempDir::new().unwrap();
        let config = bounded_config(&dir);
        let env = LmdbEnvironment::open(&config).unwrap();
        let source = store(&env, &config, "drain-src", vec![100]);
        let target = store(&env, &config, "drain-dst", vec![100]);

        for i in 0..10 {
            source.add(&[Val::from(format!("key-{}", i))]);
        }
        source.completion_state().signal_complete();
        assert!(source.completion_state().await_completion_timeout(Duration::from_secs(5)));

        let mut out = Output::new();
        source.write_payload(&mut out).unwrap();
        assert!(import(&target, out.as_slice()) > 1);
        assert_eq!(source.size(), 0);

        let mut empty = Output::new();
        source.write_payload(&mut empty).unwrap();
        assert_eq!(import(&target, empty.as_slice()), 0);

        assert_one_of_each(&target, 10);
    }
}
