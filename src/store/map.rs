//! Heap-backed result store
//!
//! Children of each parent key live in an `ItemsList` inside a `DashMap`,
//! updated through entry guards so each list is mutated by one thread at a
//! time. Lists that group or sort accumulate up to twice their target size
//! before a single group/sort/trim pass. Keys trimmed away are handed to an
//! evictor thread, which removes their descendants breadth-first.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use dashmap::DashMap;

use crate::codec::{Input, Output};
use crate::expression::{merge_generators, read_generators, write_generators, SelectionHint, Val};
use crate::observability::{log_event, Event, MetricsRegistry, ObservationScope};
use crate::plan::{CompiledPlan, CompiledSorter};

use super::completion::{CompletionLatch, CompletionState};
use super::errors::{StoreError, StoreResult};
use super::ingest::Ingestor;
use super::item::{Item, Items};
use super::key::{next_unique_id, Key};
use super::payload::{read_frame, write_frame, PayloadBuilder, PayloadRows};
use super::{DataStore, DataStoreSettings};

struct ItemsList {
    trimmed_size: usize,
    max_size: usize,
    grouped: bool,
    sorter: Option<CompiledSorter>,
    items: Vec<Item>,
    dirty: bool,
}

impl ItemsList {
    fn new(plan: &CompiledPlan, settings: &DataStoreSettings, depth: usize) -> Self {
        let trimmed_size = settings.store_size.size(depth);
        Self {
            trimmed_size,
            max_size: trimmed_size.saturating_mul(2),
            grouped: plan.depths().is_grouped(depth),
            sorter: plan.sorter(depth).cloned(),
            items: Vec::new(),
            dirty: false,
        }
    }

    /// Returns keys trimmed away as a result of this add.
    fn add(&mut self, item: Item) -> Vec<Key> {
        if !self.grouped && self.sorter.is_none() {
            // First come, first kept.
            if self.items.len() < self.trimmed_size {
                self.items.push(item);
            }
            return Vec::new();
        }

        self.items.push(item);
        self.dirty = true;
        if self.items.len() > self.max_size {
            self.sort_and_trim()
        } else {
            Vec::new()
        }
    }

    fn sort_and_trim(&mut self) -> Vec<Key> {
        if !self.dirty {
            return Vec::new();
        }
        self.dirty = false;

        if self.grouped {
            let mut positions: HashMap<Key, usize> = HashMap::with_capacity(self.items.len());
            let mut merged: Vec<Item> = Vec::with_capacity(self.items.len());
            for item in self.items.drain(..) {
                match positions.get(item.key()) {
                    Some(pos) => merge_generators(merged[*pos].generators_mut(), item.generators()),
                    None => {
                        positions.insert(item.key().clone(), merged.len());
                        merged.push(item);
                    }
                }
            }
            self.items = merged;
        }

        if let Some(sorter) = &self.sorter {
            sorter.sort(&mut self.items, Item::generators);
        }

        if self.items.len() > self.trimmed_size {
            self.items
                .drain(self.trimmed_size..)
                .map(|item| item.into_parts().0)
                .collect()
        } else {
            Vec::new()
        }
    }
}

enum EvictorMessage {
    Evict(Vec<Key>),
    Barrier(Sender<()>),
}

fn run_evictor(
    name: String,
    child_map: Arc<DashMap<Key, ItemsList>>,
    receiver: Receiver<EvictorMessage>,
    metrics: Arc<MetricsRegistry>,
) {
    let mut queue: VecDeque<Key> = VecDeque::new();
    while let Ok(message) = receiver.recv() {
        match message {
            EvictorMessage::Evict(keys) => {
                queue.extend(keys);
                let mut removed = 0u64;
                while let Some(key) = queue.pop_front() {
                    if let Some((_, list)) = child_map.remove(&key) {
                        removed += list.items.len() as u64;
                        queue.extend(list.items.into_iter().map(|item| item.into_parts().0));
                    }
                }
                if removed > 0 {
                    metrics.add_items_evicted(removed);
                    log_event(Event::RowsEvicted, &[("store", &name), ("rows", &removed.to_string())]);
                }
            }
            EvictorMessage::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
}

pub struct MapDataStore {
    name: String,
    plan: Arc<CompiledPlan>,
    settings: DataStoreSettings,
    ingestor: Ingestor,
    child_map: Arc<DashMap<Key, ItemsList>>,
    evictor: Sender<EvictorMessage>,
    evictor_handle: Mutex<Option<JoinHandle<()>>>,
    completion: CompletionLatch,
    metrics: Arc<MetricsRegistry>,
}

impl MapDataStore {
    pub fn new(
        name: impl Into<String>,
        plan: Arc<CompiledPlan>,
        settings: DataStoreSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let name = name.into();
        let child_map = Arc::new(DashMap::new());
        let (sender, receiver) = mpsc::channel();

        let handle = {
            let name = name.clone();
            let child_map = Arc::clone(&child_map);
            let metrics = Arc::clone(&metrics);
            thread::Builder::new()
                .name(format!("evictor-{}", name))
                .spawn(move || run_evictor(name, child_map, receiver, metrics))
                .ok()
        };

        let ingestor = Ingestor::new(&name, Arc::clone(&plan), settings.max_results.size(0), Arc::clone(&metrics));
        log_event(Event::StoreCreated, &[("store", &name), ("backend", "map")]);

        Self {
            name,
            plan,
            settings,
            ingestor,
            child_map,
            evictor: sender,
            evictor_handle: Mutex::new(handle),
            completion: CompletionLatch::new(),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until every eviction queued so far has been applied.
    pub fn flush_evictions(&self) {
        let (done, wait) = mpsc::channel();
        if self.evictor.send(EvictorMessage::Barrier(done)).is_ok() {
            let _ = wait.recv();
        }
    }

    fn evict(&self, keys: Vec<Key>) {
        if keys.is_empty() {
            return;
        }
        if self.evictor.send(EvictorMessage::Evict(keys.clone())).is_err() {
            // Evictor thread is gone; cascade on this thread instead.
            let mut queue: VecDeque<Key> = keys.into();
            while let Some(key) = queue.pop_front() {
                if let Some((_, list)) = self.child_map.remove(&key) {
                    queue.extend(list.items.into_iter().map(|item| item.into_parts().0));
                }
            }
        }
    }

    fn put(&self, parent: Key, item: Item) {
        let depth = parent.depth();
        let evicted = {
            let mut list = self
                .child_map
                .entry(parent)
                .or_insert_with(|| ItemsList::new(&self.plan, &self.settings, depth));
            list.add(item)
        };
        self.evict(evicted);
    }

    fn sorted_children(&self, parent: &Key) -> Vec<Item> {
        let (items, evicted) = match self.child_map.get_mut(parent) {
            Some(mut list) => {
                let evicted = list.sort_and_trim();
                (list.items.clone(), evicted)
            }
            None => (Vec::new(), Vec::new()),
        };
        self.evict(evicted);
        items
    }
}

impl DataStore for MapDataStore {
    fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    fn add(&self, values: &[Val]) {
        if let Some(entries) = self.ingestor.prepare(values) {
            for entry in entries {
                self.put(entry.parent, entry.item);
            }
        }
    }

    fn get_children(&self, parent: &Key) -> StoreResult<Items> {
        Ok(Items::new(self.sorted_children(parent)))
    }

    fn child_items(&self, parent: &Key, _hint: SelectionHint) -> StoreResult<Vec<Item>> {
        Ok(self.sorted_children(parent))
    }

    /// Rows reachable from the root after trimming.
    fn size(&self) -> u64 {
        let mut size = 0u64;
        let mut queue = VecDeque::from([Key::root()]);
        while let Some(parent) = queue.pop_front() {
            let children = self.sorted_children(&parent);
            size += children.len() as u64;
            queue.extend(
                children
                    .into_iter()
                    .map(|item| item.into_parts().0)
                    .filter(Key::is_grouped),
            );
        }
        size
    }

    fn total_size(&self) -> u64 {
        self.ingestor.total()
    }

    fn clear(&self) {
        self.child_map.clear();
        self.ingestor.reset();
        self.completion.release();
        log_event(Event::StoreCleared, &[("store", &self.name)]);
    }

    fn completion_state(&self) -> &dyn CompletionState {
        &self.completion
    }

    fn write_payload(&self, output: &mut Output) -> StoreResult<()> {
        let scope = ObservationScope::with_fields("PAYLOAD_EXPORT", &[("store", &self.name)]);

        let parents: Vec<Key> = self.child_map.iter().map(|entry| entry.key().clone()).collect();
        let mut builder = PayloadBuilder::new(None);
        for parent in parents {
            let Some((_, mut list)) = self.child_map.remove(&parent) else {
                continue;
            };
            let evicted = list.sort_and_trim();
            self.evict(evicted);
            for item in list.items {
                let key = item.key().to_bytes()?;
                let mut value = Output::new();
                write_generators(&mut value, item.generators())?;
                builder.push(&key, value.as_slice())?;
            }
        }

        let rows = builder.rows();
        let payloads = if builder.is_empty() {
            Vec::new()
        } else {
            vec![builder.into_bytes()]
        };
        let start = output.len();
        write_frame(output, &payloads)?;
        let bytes = (output.len() - start) as u64;
        self.metrics.add_payload_bytes_written(bytes);

        scope.complete_with_fields(&[("rows", &rows.to_string()), ("bytes", &bytes.to_string())]);
        Ok(())
    }

    fn read_payload(&self, input: &mut Input<'_>) -> StoreResult<bool> {
        let start = input.position();
        let payloads = read_frame(input)?;
        self.metrics.add_payload_bytes_read((input.position() - start) as u64);

        let mut rows = 0usize;
        for payload in payloads {
            for row in PayloadRows::new(payload) {
                let (key_bytes, value_bytes) = row?;
                if !self.ingestor.admit_imported() {
                    break;
                }
                let mut key = Key::from_bytes(key_bytes)?;
                if !key.is_grouped() {
                    key = key.with_unique_id(next_unique_id());
                }
                let generators = read_generators(&mut Input::new(value_bytes), self.plan.expressions())?;
                let parent = key
                    .parent()
                    .ok_or_else(|| StoreError::InvalidGroupKey("payload row has root key".into()))?;
                self.put(parent, Item::new(key, generators));
                rows += 1;
            }
        }

        log_event(Event::PayloadRead, &[("store", &self.name), ("rows", &rows.to_string())]);
        Ok(!self.ingestor.has_enough_data())
    }
}

impl Drop for MapDataStore {
    fn drop(&mut self) {
        // Close the channel so the evictor exits, then wait for it.
        let (sender, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.evictor, sender));
        let handle = self.evictor_handle.get_mut().map(Option::take).unwrap_or_else(|e| e.into_inner().take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
