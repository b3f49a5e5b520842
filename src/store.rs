//! Record persistence
//!
//! `StepStore` is the storage backend contract (one step record per local day
//! plus the gait history). The pipeline never writes to a store directly: it
//! hands records to a `RecordSink`, normally a `PersistenceQueue` that applies
//! them in order on a single worker thread.

use crate::error::{MotionError, StoreError};
use crate::types::{GaitResult, StepRecord};
use chrono::NaiveDate;
use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Record families for bulk deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Steps,
    Gait,
}

/// Storage backend for step records and gait results.
///
/// Range queries are inclusive and return newest first.
pub trait StepStore: Send {
    /// Insert or replace the record for `day`
    fn upsert_step_record(&mut self, day: NaiveDate, record: StepRecord) -> Result<(), StoreError>;

    /// Insert a gait result, replacing one with the same timestamp
    fn insert_gait_result(&mut self, result: GaitResult) -> Result<(), StoreError>;

    fn latest_step_record(&self) -> Result<Option<StepRecord>, StoreError>;

    fn step_record_for_day(&self, day: NaiveDate) -> Result<Option<StepRecord>, StoreError>;

    fn records_between(&self, start_ms: i64, end_ms: i64) -> Result<Vec<StepRecord>, StoreError>;

    fn gait_results_between(&self, start_ms: i64, end_ms: i64)
        -> Result<Vec<GaitResult>, StoreError>;

    fn latest_gait_result(&self) -> Result<Option<GaitResult>, StoreError>;

    fn recent_gait_results(&self, limit: usize) -> Result<Vec<GaitResult>, StoreError>;

    fn delete_all(&mut self, kind: RecordKind) -> Result<(), StoreError>;
}

/// In-memory store with JSON snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    steps: BTreeMap<NaiveDate, StepRecord>,
    gait: BTreeMap<i64, GaitResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step_days(&self) -> usize {
        self.steps.len()
    }

    pub fn gait_count(&self) -> usize {
        self.gait.len()
    }

    /// Restore a store from a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Snapshot(e.to_string()))
    }

    /// Serialize the store to a JSON snapshot
    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Snapshot(e.to_string()))
    }
}

impl StepStore for MemoryStore {
    fn upsert_step_record(&mut self, day: NaiveDate, record: StepRecord) -> Result<(), StoreError> {
        self.steps.insert(day, record);
        Ok(())
    }

    fn insert_gait_result(&mut self, result: GaitResult) -> Result<(), StoreError> {
        self.gait.insert(result.timestamp, result);
        Ok(())
    }

    fn latest_step_record(&self) -> Result<Option<StepRecord>, StoreError> {
        Ok(self.steps.values().max_by_key(|r| r.timestamp).copied())
    }

    fn step_record_for_day(&self, day: NaiveDate) -> Result<Option<StepRecord>, StoreError> {
        Ok(self.steps.get(&day).copied())
    }

    fn records_between(&self, start_ms: i64, end_ms: i64) -> Result<Vec<StepRecord>, StoreError> {
        let mut records: Vec<StepRecord> = self
            .steps
            .values()
            .filter(|r| (start_ms..=end_ms).contains(&r.timestamp))
            .copied()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    fn gait_results_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<GaitResult>, StoreError> {
        Ok(self
            .gait
            .range(start_ms..=end_ms)
            .rev()
            .map(|(_, r)| *r)
            .collect())
    }

    fn latest_gait_result(&self) -> Result<Option<GaitResult>, StoreError> {
        Ok(self.gait.values().next_back().copied())
    }

    fn recent_gait_results(&self, limit: usize) -> Result<Vec<GaitResult>, StoreError> {
        Ok(self.gait.values().rev().take(limit).copied().collect())
    }

    fn delete_all(&mut self, kind: RecordKind) -> Result<(), StoreError> {
        match kind {
            RecordKind::Steps => self.steps.clear(),
            RecordKind::Gait => self.gait.clear(),
        }
        Ok(())
    }
}

/// Fire-and-forget write seam used by the pipeline
pub trait RecordSink: Send {
    fn upsert_step_record(&self, day: NaiveDate, record: StepRecord);
    fn insert_gait_result(&self, result: GaitResult);
    fn delete_all(&self, kind: RecordKind);
}

impl<T: RecordSink + Sync + ?Sized> RecordSink for Arc<T> {
    fn upsert_step_record(&self, day: NaiveDate, record: StepRecord) {
        (**self).upsert_step_record(day, record);
    }

    fn insert_gait_result(&self, result: GaitResult) {
        (**self).insert_gait_result(result);
    }

    fn delete_all(&self, kind: RecordKind) {
        (**self).delete_all(kind);
    }
}

/// Sink that discards every write
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn upsert_step_record(&self, _day: NaiveDate, _record: StepRecord) {}
    fn insert_gait_result(&self, _result: GaitResult) {}
    fn delete_all(&self, _kind: RecordKind) {}
}

enum Command {
    UpsertStep { day: NaiveDate, record: StepRecord },
    InsertGait(GaitResult),
    DeleteAll(RecordKind),
    Flush(Sender<()>),
    Shutdown,
}

/// Ordered single-worker write queue in front of a `StepStore`.
///
/// Commands are applied strictly in submission order with one write in flight.
/// Failed writes are kept and retried before the next command; a pending day
/// record is dropped when a newer upsert for that day arrives.
pub struct PersistenceQueue<S: StepStore + 'static> {
    store: Arc<Mutex<S>>,
    sender: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl<S: StepStore + 'static> PersistenceQueue<S> {
    pub fn new(store: S) -> Result<Self, MotionError> {
        let store = Arc::new(Mutex::new(store));
        let (sender, receiver) = channel::unbounded();
        let worker_store = Arc::clone(&store);
        let worker = thread::Builder::new()
            .name("mobigait-persistence".to_string())
            .spawn(move || Worker::new(worker_store).run(receiver))
            .map_err(|e| MotionError::Store(StoreError::WriteFailed(e.to_string())))?;

        Ok(Self {
            store,
            sender,
            worker: Some(worker),
        })
    }

    /// Shared handle to the underlying store
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Run a read against the most recently committed state
    pub fn read<R>(&self, f: impl FnOnce(&S) -> Result<R, StoreError>) -> Result<R, MotionError> {
        let store = self
            .store
            .lock()
            .map_err(|e| MotionError::LockPoisoned(e.to_string()))?;
        Ok(f(&*store)?)
    }

    /// Block until every command submitted so far has been applied
    pub fn flush(&self) -> Result<(), MotionError> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.submit(Command::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| MotionError::QueueClosed)
    }

    fn submit(&self, command: Command) -> Result<(), MotionError> {
        self.sender.send(command).map_err(|_| MotionError::QueueClosed)
    }

    fn submit_or_warn(&self, command: Command) {
        if let Err(e) = self.submit(command) {
            warn!("Dropping persistence write: {e}");
        }
    }
}

impl<S: StepStore + 'static> RecordSink for PersistenceQueue<S> {
    fn upsert_step_record(&self, day: NaiveDate, record: StepRecord) {
        self.submit_or_warn(Command::UpsertStep { day, record });
    }

    fn insert_gait_result(&self, result: GaitResult) {
        self.submit_or_warn(Command::InsertGait(result));
    }

    fn delete_all(&self, kind: RecordKind) {
        self.submit_or_warn(Command::DeleteAll(kind));
    }
}

impl<S: StepStore + 'static> Drop for PersistenceQueue<S> {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Persistence worker panicked");
            }
        }
    }
}

struct Worker<S: StepStore> {
    store: Arc<Mutex<S>>,
    pending_steps: BTreeMap<NaiveDate, StepRecord>,
    pending_gait: Vec<GaitResult>,
}

impl<S: StepStore> Worker<S> {
    fn new(store: Arc<Mutex<S>>) -> Self {
        Self {
            store,
            pending_steps: BTreeMap::new(),
            pending_gait: Vec::new(),
        }
    }

    fn run(mut self, receiver: Receiver<Command>) {
        while let Ok(command) = receiver.recv() {
            if let Command::UpsertStep { day, .. } = &command {
                if self.pending_steps.remove(day).is_some() {
                    debug!("Pending record for {day} superseded");
                }
            }
            self.retry_pending();

            match command {
                Command::UpsertStep { day, record } => {
                    if let Err(e) = self.write(|s| s.upsert_step_record(day, record)) {
                        warn!("Step record write for {day} failed, will retry: {e}");
                        self.pending_steps.insert(day, record);
                    }
                }
                Command::InsertGait(result) => {
                    if let Err(e) = self.write(|s| s.insert_gait_result(result)) {
                        warn!("Gait result write failed, will retry: {e}");
                        self.pending_gait.push(result);
                    }
                }
                Command::DeleteAll(kind) => {
                    match kind {
                        RecordKind::Steps => self.pending_steps.clear(),
                        RecordKind::Gait => self.pending_gait.clear(),
                    }
                    if let Err(e) = self.write(|s| s.delete_all(kind)) {
                        warn!("Delete of {kind:?} records failed: {e}");
                    }
                }
                Command::Flush(ack) => {
                    let _ = ack.send(());
                }
                Command::Shutdown => break,
            }
        }

        let unsaved = self.pending_steps.len() + self.pending_gait.len();
        if unsaved > 0 {
            warn!("Persistence worker exiting with {unsaved} unsaved records");
        }
    }

    fn retry_pending(&mut self) {
        let steps = std::mem::take(&mut self.pending_steps);
        for (day, record) in steps {
            if self.write(|s| s.upsert_step_record(day, record)).is_err() {
                self.pending_steps.insert(day, record);
            }
        }

        let gait = std::mem::take(&mut self.pending_gait);
        for result in gait {
            if self.write(|s| s.insert_gait_result(result)).is_err() {
                self.pending_gait.push(result);
            }
        }
    }

    fn write(&self, f: impl FnOnce(&mut S) -> Result<(), StoreError>) -> Result<(), StoreError> {
        let mut store = self
            .store
            .lock()
            .map_err(|e| StoreError::WriteFailed(format!("store lock poisoned: {e}")))?;
        f(&mut *store)
    }
}
