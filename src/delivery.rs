//! Cross-boundary delivery: moves a listener snapshot plus payload onto each
//! listener's owning execution context.
//!
//! Snapshot and payload are reference-counted; every posted task owns one
//! clone of each and releases it after invocation, so unregistration or
//! registry teardown during delivery cannot invalidate an in-flight callback.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::debug;

use crate::registry::ListenerEntry;
use crate::types::EventPayload;

/// A unit of work queued to a listener's owning execution context.
pub type Task = Box<dyn FnOnce() + Send>;

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("target execution context is gone")]
    Gone,
}

/// Handle to the execution context that owns a listener. Passed explicitly at
/// registration time; delivery always targets this handle rather than
/// re-deriving thread identity.
pub trait TaskExecutor: Send + Sync {
    fn post(&self, task: Task) -> Result<(), PostError>;
}

/// Dedicated serial event queue backed by one named thread.
///
/// After [`shutdown`](SerialEventQueue::shutdown), already-queued tasks still
/// run, further posts fail with [`PostError::Gone`], and the thread exits
/// once the queue drains.
pub struct SerialEventQueue {
    tx: Mutex<Option<mpsc::Sender<Task>>>,
}

impl SerialEventQueue {
    pub fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::channel::<Task>();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
            })
            .expect("failed to spawn event queue thread");
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    /// Stop accepting new tasks.
    pub fn shutdown(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            *tx = None;
        }
    }
}

impl TaskExecutor for SerialEventQueue {
    fn post(&self, task: Task) -> Result<(), PostError> {
        let Ok(tx) = self.tx.lock() else {
            return Err(PostError::Gone);
        };
        match tx.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| PostError::Gone),
            None => Err(PostError::Gone),
        }
    }
}

/// Fire-and-forget fan-out. Entries whose execution context no longer exists
/// are silently dropped; listener failures are logged and swallowed.
pub fn deliver(snapshot: &Arc<[ListenerEntry]>, payload: &Arc<EventPayload>) {
    for entry in snapshot.iter() {
        let callback = Arc::clone(&entry.callback);
        let payload = Arc::clone(payload);
        let posted = entry.executor.post(Box::new(move || {
            if let Err(err) = callback.on_event(&payload) {
                debug!(%err, "listener failed; event dropped for this listener");
            }
        }));
        if posted.is_err() {
            debug!("listener execution context gone; dropping delivery");
        }
    }
}

/// Fan-out that aggregates per-listener "consumed" booleans with logical OR
/// and reports the aggregate exactly once after every snapshot entry has run.
///
/// Every listener in the snapshot runs once; there is no short-circuit. A
/// failed listener and a dead execution context both count as not consumed.
/// An empty snapshot reports `false` synchronously.
pub fn deliver_with_verdict(
    snapshot: &Arc<[ListenerEntry]>,
    payload: &Arc<EventPayload>,
    report: impl FnOnce(bool) + Send + 'static,
) {
    if snapshot.is_empty() {
        report(false);
        return;
    }
    let aggregator = Arc::new(VerdictAggregator::new(snapshot.len(), report));
    for entry in snapshot.iter() {
        let callback = Arc::clone(&entry.callback);
        let payload = Arc::clone(payload);
        let aggregator_for_task = Arc::clone(&aggregator);
        let posted = entry.executor.post(Box::new(move || {
            let consumed = match callback.on_event(&payload) {
                Ok(consumed) => consumed,
                Err(err) => {
                    debug!(%err, "listener failed; treated as not consumed");
                    false
                }
            };
            aggregator_for_task.record(consumed);
        }));
        if posted.is_err() {
            aggregator.record(false);
        }
    }
}

struct VerdictAggregator {
    state: Mutex<VerdictState>,
}

struct VerdictState {
    remaining: usize,
    consumed: bool,
    report: Option<Box<dyn FnOnce(bool) + Send>>,
}

impl VerdictAggregator {
    fn new(count: usize, report: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            state: Mutex::new(VerdictState {
                remaining: count,
                consumed: false,
                report: Some(Box::new(report)),
            }),
        }
    }

    fn record(&self, consumed: bool) {
        let fire = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.consumed |= consumed;
            state.remaining = state.remaining.saturating_sub(1);
            if state.remaining == 0 {
                state.report.take().map(|report| (report, state.consumed))
            } else {
                None
            }
        };
        if let Some((report, verdict)) = fire {
            report(verdict);
        }
    }
}

/// Runs tasks immediately on the posting thread. Test-only stand-in for a
/// listener that lives on the caller's own context.
#[cfg(test)]
pub(crate) struct InlineExecutor;

#[cfg(test)]
impl TaskExecutor for InlineExecutor {
    fn post(&self, task: Task) -> Result<(), PostError> {
        task();
        Ok(())
    }
}

/// Rejects every post. Test-only stand-in for a torn-down context.
#[cfg(test)]
pub(crate) struct DeadExecutor;

#[cfg(test)]
impl TaskExecutor for DeadExecutor {
    fn post(&self, _task: Task) -> Result<(), PostError> {
        Err(PostError::Gone)
    }
}
