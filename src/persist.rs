//! Background persistence of container snapshots.
//!
//! Every scheduled write becomes one job on an unbounded channel, executed
//! in order by a dedicated worker thread. Jobs are never merged or dropped;
//! the storage layer sees each one and the last write wins.

use crate::clock::Clock;
use crate::error::{GatewayError, Result, StateError};
use crate::storage::PersistenceGateway;
use crate::types::{RestorableState, StateSnapshot};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Work items for the persist worker.
enum PersistJob {
    /// Stamp and write this state.
    Write(RestorableState),
    /// Acknowledge once every earlier job has run.
    Flush(Sender<()>),
}

/// Counters describing persist activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Jobs handed to the worker.
    pub scheduled: u64,
    /// Writes the gateway accepted.
    pub written: u64,
    /// Persist requests dropped because the container was not loaded.
    pub skipped: u64,
    /// Writes that failed to serialize or store.
    pub failed: u64,
}

/// State shared between the container side and the worker thread.
#[derive(Default)]
struct Shared {
    loaded: AtomicBool,
    last_save_time: Mutex<Option<DateTime<Utc>>>,
    scheduled: AtomicU64,
    written: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the persist worker thread.
///
/// The job queue has no bound. Every field write adds one job, so if the
/// gateway is slower than the rate of writes the queue (and the cloned
/// states it holds) keeps growing until the gateway catches up.
pub struct PersistWorker {
    sender: Option<Sender<PersistJob>>,
    handle: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl PersistWorker {
    /// Start a worker writing to `gateway` under `key`.
    pub fn spawn(
        name: impl Into<String>,
        key: impl Into<String>,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared::default());

        let runner = Runner {
            key: key.into(),
            gateway,
            clock,
            shared: Arc::clone(&shared),
        };
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || runner.run(receiver))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            shared,
        })
    }

    /// Allow writes from now on.
    pub fn mark_loaded(&self) {
        self.shared.loaded.store(true, Ordering::SeqCst);
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::SeqCst)
    }

    /// Queue a write of `state`.
    ///
    /// Returns `false` without queueing anything while not loaded, so
    /// startup defaults never overwrite a snapshot that has yet to be
    /// restored.
    pub fn schedule(&self, state: RestorableState) -> bool {
        if !self.is_loaded() {
            self.shared.skipped.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("Persist skipped: state not loaded yet");
            return false;
        }

        let Some(sender) = self.sender.as_ref() else {
            return false;
        };
        if sender.send(PersistJob::Write(state)).is_err() {
            tracing::warn!("Persist worker is gone; write dropped");
            return false;
        }

        self.shared.scheduled.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Block until every job queued before this call has completed.
    pub fn flush(&self) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(StateError::WorkerStopped)?;
        let (ack, done) = bounded(1);
        sender
            .send(PersistJob::Flush(ack))
            .map_err(|_| StateError::WorkerStopped)?;
        done.recv().map_err(|_| StateError::WorkerStopped)
    }

    /// Stamp of the most recent successful write.
    pub fn last_save_time(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_save_time.lock()
    }

    pub fn stats(&self) -> PersistStats {
        PersistStats {
            scheduled: self.shared.scheduled.load(Ordering::SeqCst),
            written: self.shared.written.load(Ordering::SeqCst),
            skipped: self.shared.skipped.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
        }
    }
}

impl Drop for PersistWorker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Persist worker panicked");
            }
        }
    }
}

/// The worker thread's side.
struct Runner {
    key: String,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl Runner {
    fn run(self, receiver: Receiver<PersistJob>) {
        for job in receiver {
            match job {
                PersistJob::Write(state) => self.write(state),
                PersistJob::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        tracing::debug!(key = %self.key, "Persist worker stopped");
    }

    fn write(&self, state: RestorableState) {
        // Checked again here; the flag is only ever raised, never lowered.
        if !self.shared.loaded.load(Ordering::SeqCst) {
            self.shared.skipped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let saved_at = self.clock.now();
        let snapshot = StateSnapshot::stamped(state, saved_at);

        let result = serde_json::to_value(&snapshot)
            .map_err(GatewayError::from)
            .and_then(|value| self.gateway.set_value(&self.key, &value));

        match result {
            Ok(()) => {
                *self.shared.last_save_time.lock() = Some(saved_at);
                self.shared.written.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(key = %self.key, saved_at = %saved_at, "State persisted");
            }
            Err(e) => {
                self.shared.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(key = %self.key, error = %e, "Failed to persist state");
            }
        }
    }
}
