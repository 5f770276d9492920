// src/analysis/queue.rs
//
// Single-worker analysis queue.
// Lines are handled strictly in submission order on one dedicated thread, so a
// slow analysis step never blocks the thread that delivers serial data.

use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::{AnalysisError, QueueError};
use crate::io::serial::CompletedLine;

// ============================================================================
// Types
// ============================================================================

/// How many submitted-but-unstarted lines the queue holds.
///
/// `Unbounded` never rejects; memory grows if analysis stays slower than the
/// line rate. `Bounded(n)` rejects with `QueueError::Full` once `n` lines are
/// waiting. Neither policy ever blocks the submitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCapacity {
    #[default]
    Unbounded,
    Bounded(usize),
}

/// Counters describing what the queue has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed: u64,
    /// Handler returned an error or panicked
    pub failed: u64,
    /// Dropped unstarted by `shutdown(false)`
    pub discarded: u64,
    /// Refused by `submit` because the queue was full
    pub rejected: u64,
}

/// Per-line analysis step run on the worker thread
pub type AnalysisHandler = Box<dyn FnMut(CompletedLine) -> Result<(), AnalysisError> + Send>;

enum TaskSender {
    Unbounded(mpsc::Sender<CompletedLine>),
    Bounded(mpsc::SyncSender<CompletedLine>, usize),
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
    rejected: AtomicU64,
}

struct Shared {
    counters: Counters,
    /// Set by `shutdown(false)`: the worker skips whatever is still queued
    discard: AtomicBool,
}

// ============================================================================
// AnalysisQueue
// ============================================================================

/// Strictly ordered, single-worker task queue for completed lines.
pub struct AnalysisQueue {
    name: String,
    sender: Mutex<Option<TaskSender>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl AnalysisQueue {
    /// Start the worker thread.
    pub fn new<F>(name: &str, capacity: QueueCapacity, handler: F) -> std::io::Result<Self>
    where
        F: FnMut(CompletedLine) -> Result<(), AnalysisError> + Send + 'static,
    {
        let (sender, receiver) = match capacity {
            QueueCapacity::Unbounded => {
                let (tx, rx) = mpsc::channel();
                (TaskSender::Unbounded(tx), rx)
            }
            QueueCapacity::Bounded(n) => {
                // A zero-capacity channel is a rendezvous and would reject almost everything
                let n = n.max(1);
                let (tx, rx) = mpsc::sync_channel(n);
                (TaskSender::Bounded(tx, n), rx)
            }
        };

        let shared = Arc::new(Shared {
            counters: Counters::default(),
            discard: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let worker_name = name.to_string();
        let handler: AnalysisHandler = Box::new(handler);
        let handle = std::thread::Builder::new()
            .name(format!("{}-worker", name))
            .spawn(move || run_worker(&worker_name, receiver, handler, &worker_shared))?;

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            shared,
        })
    }

    /// Enqueue a line for analysis. Never blocks.
    pub fn submit(&self, line: CompletedLine) -> Result<(), QueueError> {
        let guard = self.sender.lock().unwrap_or_else(|p| p.into_inner());
        let result = match guard.as_ref() {
            None => Err(QueueError::Closed),
            Some(TaskSender::Unbounded(tx)) => tx.send(line).map_err(|_| QueueError::Closed),
            Some(TaskSender::Bounded(tx, capacity)) => tx.try_send(line).map_err(|e| match e {
                mpsc::TrySendError::Full(_) => QueueError::Full {
                    capacity: *capacity,
                },
                mpsc::TrySendError::Disconnected(_) => QueueError::Closed,
            }),
        };

        let counters = &self.shared.counters;
        match result {
            Ok(()) => {
                counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(QueueError::Full { .. }) => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(QueueError::Closed) => {}
        }
        result
    }

    /// Stop accepting lines and stop the worker.
    ///
    /// With `drain` every queued line is analyzed before this returns; without
    /// it queued lines are discarded and only the in-flight one finishes.
    /// Idempotent. From the worker thread itself it returns without joining.
    pub fn shutdown(&self, drain: bool) {
        if !drain {
            self.shared.discard.store(true, Ordering::SeqCst);
        }

        // Dropping the last sender lets the worker fall out of its receive loop
        let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        if sender.is_some() {
            tlog!(
                "[{}] Shutting down ({})",
                self.name,
                if drain { "drain" } else { "discard" }
            );
        }
        drop(sender);

        let handle = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tlog!("[{}] Worker thread panicked", self.name);
            }
            let stats = self.stats();
            tlog!(
                "[{}] Stopped: {} completed, {} failed, {} discarded, {} rejected",
                self.name,
                stats.completed,
                stats.failed,
                stats.discarded,
                stats.rejected
            );
        }
    }

    /// Whether `submit` still accepts lines
    pub fn is_accepting(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.shared.counters;
        QueueStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AnalysisQueue {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

// ============================================================================
// Worker
// ============================================================================

fn run_worker(
    name: &str,
    receiver: mpsc::Receiver<CompletedLine>,
    mut handler: AnalysisHandler,
    shared: &Shared,
) {
    let counters = &shared.counters;

    while let Ok(line) = receiver.recv() {
        if shared.discard.load(Ordering::SeqCst) {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let sequence = line.sequence;
        match panic::catch_unwind(AssertUnwindSafe(|| handler(line))) {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tlog!("[{}] Line {} failed: {}", name, sequence, e);
            }
            Err(payload) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tlog!(
                    "[{}] Line {} panicked: {}",
                    name,
                    sequence,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
