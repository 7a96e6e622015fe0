//! # Batched Writer
//!
//! **Write-behind persistence off the simulation thread**
//!
//! Saves are never written inline. Callers enqueue a record and return;
//! a single writer thread drains the queue and writes it in batches.
//!
//! ```text
//!   tick ──────┐
//!   collect ───┼──> [pending map, keyed by id] ──> [writer thread] ──> SpawnerStore
//!   sell ──────┘        (latest wins)              (batches + retry)
//! ```
//!
//! ## Rules
//!
//! - Repeated saves of one spawner coalesce; only the newest is written
//! - A batch is retried with exponential backoff before falling back to
//!   per-record writes
//! - Records that still fail stay queued as dirty for the next cycle
//! - [`WritePriority::Prompt`] wakes the writer immediately

use parking_lot::{Condvar, Mutex};
use spawnvault_core::StorageSettings;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{StorageError, StorageResult};
use crate::record::PersistedRecord;
use crate::store::SpawnerStore;

/// Writer tuning.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Longest time a deferred save waits.
    pub flush_interval: Duration,
    /// Records per store call.
    pub max_batch_size: usize,
    /// Distinct ids allowed in the queue before deferred saves are refused.
    pub queue_capacity: usize,
    /// Retries per batch after the first attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay: Duration,
}

impl From<&StorageSettings> for WriterConfig {
    fn from(settings: &StorageSettings) -> Self {
        Self {
            flush_interval: settings.flush_interval(),
            max_batch_size: settings.max_batch_size.max(1),
            queue_capacity: settings.queue_capacity.max(1),
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::from(&StorageSettings::default())
    }
}

/// How soon a save must reach the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePriority {
    /// Written on the next periodic flush.
    Deferred,
    /// Wakes the writer now. Used for player-visible changes.
    Prompt,
}

/// A queued write that has not reached the store yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingWrite {
    /// Insert or replace.
    Upsert(PersistedRecord),
    /// Remove the row.
    Delete,
}

/// Writer counters.
#[derive(Clone, Debug, Default)]
pub struct WriterStats {
    /// Rows upserted.
    pub records_written: u64,
    /// Rows deleted.
    pub deletes: u64,
    /// Successful store calls.
    pub batches: u64,
    /// Failed store calls, including retried ones.
    pub failed_attempts: u64,
    /// Ids whose last write failed and are waiting for another cycle.
    pub dirty_pending: usize,
    /// Ids waiting in the queue.
    pub queued: usize,
    /// Most recent driver error.
    pub last_error: Option<String>,
}

struct State {
    pending: HashMap<String, PendingWrite>,
    /// Drained but not yet acknowledged; keeps reads consistent mid-write.
    in_flight: HashMap<String, PendingWrite>,
    dirty: HashSet<String>,
    prompt: bool,
    shutdown: bool,
    enqueued_gen: u64,
    processed_gen: u64,
}

struct Shared {
    state: Mutex<State>,
    /// Wakes the writer thread.
    work: Condvar,
    /// Wakes flush waiters.
    done: Condvar,
    stats: Mutex<WriterStats>,
}

/// Background writer over one [`SpawnerStore`].
pub struct BatchedWriter {
    shared: Arc<Shared>,
    config: WriterConfig,
    handle: Option<JoinHandle<()>>,
}

impl BatchedWriter {
    /// Starts the writer thread.
    ///
    /// # Errors
    ///
    /// `Backend` if the thread cannot be spawned.
    pub fn start(store: Arc<dyn SpawnerStore>, config: WriterConfig) -> StorageResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: HashMap::new(),
                in_flight: HashMap::new(),
                dirty: HashSet::new(),
                prompt: false,
                shutdown: false,
                enqueued_gen: 0,
                processed_gen: 0,
            }),
            work: Condvar::new(),
            done: Condvar::new(),
            stats: Mutex::new(WriterStats::default()),
        });

        let writer_shared = Arc::clone(&shared);
        let writer_config = config.clone();
        let handle = thread::Builder::new()
            .name("spawnvault-writer".into())
            .spawn(move || writer_loop(&*store, &writer_shared, &writer_config))
            .map_err(|e| StorageError::Backend(format!("cannot start writer thread: {e}")))?;

        Ok(Self {
            shared,
            config,
            handle: Some(handle),
        })
    }

    /// Queues an upsert. Never touches the store.
    ///
    /// # Errors
    ///
    /// `QueueFull` when a deferred save of a new id would exceed the queue
    /// capacity, `WriterShutdown` once the writer is stopping.
    pub fn save(&self, record: PersistedRecord, priority: WritePriority) -> StorageResult<()> {
        let id = record.id.clone();
        self.enqueue(id, PendingWrite::Upsert(record), priority)
    }

    /// Queues a delete. Deletes are accepted past the queue capacity.
    ///
    /// # Errors
    ///
    /// `WriterShutdown` once the writer is stopping.
    pub fn delete(&self, id: impl Into<String>, priority: WritePriority) -> StorageResult<()> {
        self.enqueue(id.into(), PendingWrite::Delete, priority)
    }

    fn enqueue(&self, id: String, op: PendingWrite, priority: WritePriority) -> StorageResult<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(StorageError::WriterShutdown);
        }
        // Only deferred upserts are shed; deletes and prompt writes change
        // identity or player-visible state and must reach the store.
        let sheddable = priority == WritePriority::Deferred && matches!(op, PendingWrite::Upsert(_));
        if sheddable
            && !state.pending.contains_key(&id)
            && state.pending.len() >= self.config.queue_capacity
        {
            return Err(StorageError::QueueFull {
                capacity: self.config.queue_capacity,
            });
        }
        state.pending.insert(id, op);
        state.enqueued_gen += 1;
        if priority == WritePriority::Prompt {
            state.prompt = true;
            self.shared.work.notify_one();
        }
        Ok(())
    }

    /// Newest write for `id` that the store may not have yet.
    #[must_use]
    pub fn pending(&self, id: &str) -> Option<PendingWrite> {
        let state = self.shared.state.lock();
        state
            .pending
            .get(id)
            .or_else(|| state.in_flight.get(id))
            .cloned()
    }

    /// Snapshot of every queued write, newest per id.
    #[must_use]
    pub fn pending_all(&self) -> HashMap<String, PendingWrite> {
        let state = self.shared.state.lock();
        let mut all = state.in_flight.clone();
        all.extend(state.pending.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    /// Writes everything queued so far and waits for it.
    ///
    /// # Errors
    ///
    /// `PersistenceTransientFailure` if some records are still dirty after
    /// the cycle; they remain queued. `WriterShutdown` if the writer is gone.
    pub fn flush(&self) -> StorageResult<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(StorageError::WriterShutdown);
        }
        // Forces a fresh cycle so records left dirty earlier are retried.
        state.enqueued_gen += 1;
        let target = state.enqueued_gen;
        state.prompt = true;
        self.shared.work.notify_one();
        while state.processed_gen < target && !state.shutdown {
            self.shared.done.wait(&mut state);
        }
        if state.dirty.is_empty() {
            return Ok(());
        }
        let dirty = state.dirty.len();
        drop(state);
        let last_error = self
            .shared
            .stats
            .lock()
            .last_error
            .clone()
            .unwrap_or_default();
        tracing::warn!(dirty, %last_error, "flush left dirty records queued");
        Err(StorageError::PersistenceTransientFailure {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> WriterStats {
        let (dirty, queued) = {
            let state = self.shared.state.lock();
            (state.dirty.len(), state.pending.len())
        };
        let mut stats = self.shared.stats.lock().clone();
        stats.dirty_pending = dirty;
        stats.queued = queued;
        stats
    }
}

impl Drop for BatchedWriter {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.work.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("storage writer thread panicked");
            }
        }
    }
}

fn writer_loop(store: &dyn SpawnerStore, shared: &Shared, config: &WriterConfig) {
    loop {
        let (batch, target, stopping) = {
            let mut state = shared.state.lock();
            let deadline = Instant::now() + config.flush_interval;
            while !state.prompt && !state.shutdown {
                if shared.work.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
            state.prompt = false;
            let batch: Vec<(String, PendingWrite)> = state.pending.drain().collect();
            state.in_flight = batch.iter().cloned().collect();
            (batch, state.enqueued_gen, state.shutdown)
        };

        let (written, failed) = if batch.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            write_cycle(store, shared, config, batch)
        };

        {
            let mut state = shared.state.lock();
            for id in &written {
                state.dirty.remove(id);
            }
            for (id, op) in failed {
                state.dirty.insert(id.clone());
                // A newer save supersedes the failed one.
                state.pending.entry(id).or_insert(op);
            }
            state.in_flight.clear();
            state.processed_gen = target;
            shared.done.notify_all();

            if stopping {
                if !state.pending.is_empty() {
                    tracing::error!(
                        lost = state.pending.len(),
                        "storage writer stopped with unwritten records"
                    );
                }
                return;
            }
        }
    }
}

/// Writes one drained batch. Returns the ids written and the ops that failed.
fn write_cycle(
    store: &dyn SpawnerStore,
    shared: &Shared,
    config: &WriterConfig,
    batch: Vec<(String, PendingWrite)>,
) -> (Vec<String>, Vec<(String, PendingWrite)>) {
    let mut upserts = Vec::new();
    let mut deletes = Vec::new();
    for (id, op) in batch {
        match op {
            PendingWrite::Upsert(record) => upserts.push(record),
            PendingWrite::Delete => deletes.push(id),
        }
    }

    let mut written = Vec::new();
    let mut failed = Vec::new();

    for chunk in upserts.chunks(config.max_batch_size) {
        match with_retry(shared, config, || store.upsert(chunk)) {
            Ok(()) => {
                record_success(shared, chunk.len(), 0);
                written.extend(chunk.iter().map(|r| r.id.clone()));
            }
            Err(e) => {
                tracing::warn!(size = chunk.len(), error = %e, "batch upsert failed, writing records individually");
                for record in chunk {
                    match store.upsert(std::slice::from_ref(record)) {
                        Ok(()) => {
                            record_success(shared, 1, 0);
                            written.push(record.id.clone());
                        }
                        Err(e) => {
                            record_failure(shared, &e);
                            tracing::warn!(id = %record.id, error = %e, "record left dirty");
                            failed.push((record.id.clone(), PendingWrite::Upsert(record.clone())));
                        }
                    }
                }
            }
        }
    }

    for chunk in deletes.chunks(config.max_batch_size) {
        match with_retry(shared, config, || store.delete(chunk)) {
            Ok(()) => {
                record_success(shared, 0, chunk.len());
                written.extend(chunk.iter().cloned());
            }
            Err(e) => {
                tracing::warn!(size = chunk.len(), error = %e, "batch delete failed, deletes stay queued");
                failed.extend(chunk.iter().map(|id| (id.clone(), PendingWrite::Delete)));
            }
        }
    }

    tracing::debug!(written = written.len(), failed = failed.len(), "write cycle complete");
    (written, failed)
}

fn with_retry<F>(shared: &Shared, config: &WriterConfig, mut op: F) -> StorageResult<()>
where
    F: FnMut() -> StorageResult<()>,
{
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) => {
                record_failure(shared, &e);
                if attempt >= config.max_retries {
                    return Err(e);
                }
                let delay = config.retry_base_delay.saturating_mul(1 << attempt.min(16));
                tracing::debug!(attempt, ?delay, error = %e, "store write failed, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

fn record_success(shared: &Shared, upserts: usize, deletes: usize) {
    let mut stats = shared.stats.lock();
    stats.records_written += upserts as u64;
    stats.deletes += deletes as u64;
    stats.batches += 1;
}

fn record_failure(shared: &Shared, error: &StorageError) {
    let mut stats = shared.stats.lock();
    stats.failed_attempts += 1;
    stats.last_error = Some(error.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use spawnvault_core::{CreatureType, ItemKind, LogicalSpawner, Position, SpawnerLimits};

    fn create_test_record(x: i32, bones: u64) -> PersistedRecord {
        let mut spawner = LogicalSpawner::new(
            CreatureType::new("skeleton"),
            Position::new("world", x, 64, 0),
            SpawnerLimits::default(),
            0,
        );
        spawner.stored_items.insert(ItemKind::new("bone"), bones);
        PersistedRecord::from_spawner(&spawner).unwrap()
    }

    fn fast_config() -> WriterConfig {
        WriterConfig {
            flush_interval: Duration::from_millis(20),
            max_batch_size: 8,
            queue_capacity: 1_000,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn idle_config() -> WriterConfig {
        WriterConfig {
            flush_interval: Duration::from_secs(3_600),
            ..fast_config()
        }
    }

    #[test]
    fn test_saves_coalesce() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();

        for bones in 0..100 {
            writer
                .save(create_test_record(1, bones), WritePriority::Deferred)
                .unwrap();
        }
        writer.flush().unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.write_calls(), 1);
        let id = create_test_record(1, 0).id;
        assert_eq!(store.fetch(&id).unwrap(), Some(create_test_record(1, 99)));
    }

    #[test]
    fn test_deferred_save_lands_without_flush() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), fast_config()).unwrap();
        writer
            .save(create_test_record(1, 3), WritePriority::Deferred)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.count().unwrap() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_batches_split_by_size() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        for x in 0..20 {
            writer
                .save(create_test_record(x, 1), WritePriority::Deferred)
                .unwrap();
        }
        writer.flush().unwrap();
        assert_eq!(store.count().unwrap(), 20);
        assert_eq!(writer.stats().batches, 3);
        assert_eq!(writer.stats().records_written, 20);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        store.fail_next_writes(2);
        writer
            .save(create_test_record(1, 1), WritePriority::Prompt)
            .unwrap();
        writer.flush().unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let stats = writer.stats();
        assert_eq!(stats.failed_attempts, 2);
        assert_eq!(stats.dirty_pending, 0);
    }

    #[test]
    fn test_exhausted_retries_leave_record_dirty() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        store.set_offline(true);
        writer
            .save(create_test_record(1, 5), WritePriority::Deferred)
            .unwrap();

        let err = writer.flush().unwrap_err();
        assert!(matches!(
            err,
            StorageError::PersistenceTransientFailure { attempts: 4, .. }
        ));
        assert_eq!(writer.stats().dirty_pending, 1);
        assert!(writer.pending(&create_test_record(1, 5).id).is_some());

        store.set_offline(false);
        writer.flush().unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(writer.stats().dirty_pending, 0);
    }

    #[test]
    fn test_one_bad_record_does_not_block_batch() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        let bad = create_test_record(2, 1);
        store.reject(bad.id.clone());
        writer
            .save(create_test_record(1, 1), WritePriority::Deferred)
            .unwrap();
        writer.save(bad.clone(), WritePriority::Deferred).unwrap();
        writer
            .save(create_test_record(3, 1), WritePriority::Deferred)
            .unwrap();

        assert!(writer.flush().is_err());
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(writer.stats().dirty_pending, 1);

        store.accept(&bad.id);
        writer.flush().unwrap();
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_newer_save_replaces_failed_one() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        store.set_offline(true);
        writer
            .save(create_test_record(1, 1), WritePriority::Deferred)
            .unwrap();
        assert!(writer.flush().is_err());

        writer
            .save(create_test_record(1, 9), WritePriority::Deferred)
            .unwrap();
        store.set_offline(false);
        writer.flush().unwrap();

        let id = create_test_record(1, 0).id;
        assert_eq!(store.fetch(&id).unwrap(), Some(create_test_record(1, 9)));
    }

    #[test]
    fn test_queue_full_backpressure() {
        let store = Arc::new(MemoryStore::new());
        let config = WriterConfig {
            queue_capacity: 2,
            ..idle_config()
        };
        let writer = BatchedWriter::start(store, config).unwrap();
        writer
            .save(create_test_record(1, 1), WritePriority::Deferred)
            .unwrap();
        writer
            .save(create_test_record(2, 1), WritePriority::Deferred)
            .unwrap();

        let err = writer
            .save(create_test_record(3, 1), WritePriority::Deferred)
            .unwrap_err();
        assert!(matches!(err, StorageError::QueueFull { capacity: 2 }));

        // Replacing an id already queued is always accepted.
        writer
            .save(create_test_record(1, 7), WritePriority::Deferred)
            .unwrap();
    }

    #[test]
    fn test_full_queue_accepts_deletes_and_prompt_saves() {
        let store = Arc::new(MemoryStore::new());
        let stale = create_test_record(5, 3);
        store.upsert(&[stale.clone()]).unwrap();
        store.set_offline(true);
        let config = WriterConfig {
            queue_capacity: 1,
            ..idle_config()
        };
        let writer = BatchedWriter::start(store.clone(), config).unwrap();
        writer
            .save(create_test_record(1, 1), WritePriority::Deferred)
            .unwrap();

        writer.delete(stale.id.clone(), WritePriority::Prompt).unwrap();
        writer
            .save(create_test_record(2, 1), WritePriority::Prompt)
            .unwrap();
        assert!(matches!(
            writer.save(create_test_record(3, 1), WritePriority::Deferred),
            Err(StorageError::QueueFull { capacity: 1 })
        ));

        store.set_offline(false);
        writer.flush().unwrap();
        assert_eq!(store.fetch(&stale.id).unwrap(), None);
        assert!(store.fetch(&create_test_record(2, 1).id).unwrap().is_some());
    }

    #[test]
    fn test_delete_supersedes_pending_upsert() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        let record = create_test_record(1, 1);
        writer.save(record.clone(), WritePriority::Prompt).unwrap();
        writer.flush().unwrap();

        writer
            .save(create_test_record(1, 2), WritePriority::Deferred)
            .unwrap();
        writer.delete(record.id.clone(), WritePriority::Prompt).unwrap();
        assert_eq!(writer.pending(&record.id), Some(PendingWrite::Delete));
        writer.flush().unwrap();

        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(writer.stats().deletes, 1);
    }

    #[test]
    fn test_drop_drains_queue() {
        let store = Arc::new(MemoryStore::new());
        let writer = BatchedWriter::start(store.clone(), idle_config()).unwrap();
        for x in 0..5 {
            writer
                .save(create_test_record(x, 1), WritePriority::Deferred)
                .unwrap();
        }
        drop(writer);
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn test_concurrent_producers() {
        let store = Arc::new(MemoryStore::new());
        let writer = Arc::new(BatchedWriter::start(store.clone(), fast_config()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for i in 0..50 {
                        writer
                            .save(create_test_record(t * 100 + i, 1), WritePriority::Deferred)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        writer.flush().unwrap();
        assert_eq!(store.count().unwrap(), 200);
    }
}
