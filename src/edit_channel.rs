//! Ordered admission of editing RPCs into the remote text channel.
//!
//! Every editing operation pushes a timestamped ticket, waits until that
//! ticket reaches the head of the channel, issues its remote call, and pops.
//! The pop is tied to [`Ticket`]'s `Drop` so that every exit path, including
//! early validation failures, releases its slot exactly once.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

/// Wait budget for ordinary editing operations before logging a diagnostic.
pub const EDIT_WAIT_TIMEOUT: Duration = Duration::from_secs(4);

/// Wait budget for private-command delivery. Shorter: private commands are
/// lower priority and must not be starved behind a stuck editing operation.
pub const PRIVATE_COMMAND_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Kind of editing operation a ticket represents. Carried for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    DeleteForward,
    DeleteBackward,
    MoveCursor,
    SelectByRange,
    SelectByMovement,
    GetText,
    GetTextIndex,
    SetPreviewText,
    FinishPreview,
    PrivateCommand,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("edit channel unavailable")]
    Unavailable,
}

struct QueuedTicket {
    id: u64,
    kind: EditKind,
    queued_at: Instant,
}

struct ChannelState {
    entries: VecDeque<QueuedTicket>,
    next_id: u64,
}

struct ChannelInner {
    state: Mutex<ChannelState>,
    head_changed: Condvar,
    wait_timeout: Duration,
}

/// Bounded-latency FIFO gate admitting one editing operation at a time.
pub struct OrderedEditChannel {
    inner: Arc<ChannelInner>,
}

/// Admission ticket for one editing operation. Removes itself from the
/// channel when dropped, unblocking the next waiter.
pub struct Ticket {
    inner: Arc<ChannelInner>,
    id: u64,
    kind: EditKind,
}

impl OrderedEditChannel {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                state: Mutex::new(ChannelState {
                    entries: VecDeque::new(),
                    next_id: 1,
                }),
                head_changed: Condvar::new(),
                wait_timeout,
            }),
        }
    }

    /// Append a ticket. Never blocks the caller issuing the request.
    pub fn push(&self, kind: EditKind) -> Result<Ticket, ChannelError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| ChannelError::Unavailable)?;
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push_back(QueuedTicket {
            id,
            kind,
            queued_at: Instant::now(),
        });
        Ok(Ticket {
            inner: Arc::clone(&self.inner),
            id,
            kind,
        })
    }

    /// Block until `ticket` is at the head of the channel.
    ///
    /// The configured timeout is observational: on expiry the current head
    /// and the waiter are logged to aid diagnosing a stuck operation, and
    /// the wait continues until the head condition is actually met.
    pub fn wait(&self, ticket: &Ticket) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        loop {
            let (head_id, head_kind, head_age) = match state.entries.front() {
                Some(head) => (head.id, head.kind, head.queued_at.elapsed()),
                // A live ticket is always queued; nothing left to order against.
                None => return,
            };
            if head_id == ticket.id {
                return;
            }
            let (next, result) = match self
                .inner
                .head_changed
                .wait_timeout(state, self.inner.wait_timeout)
            {
                Ok(woken) => woken,
                Err(_) => return,
            };
            state = next;
            if result.timed_out() {
                warn!(
                    waiter = ?ticket.kind,
                    head = ?head_kind,
                    head_age_ms = head_age.as_millis() as u64,
                    "editing operation still waiting behind the channel head"
                );
            }
        }
    }

    /// Number of tickets currently admitted.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Ticket {
    pub fn kind(&self) -> EditKind {
        self.kind
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(pos) = state.entries.iter().position(|t| t.id == self.id) {
                state.entries.remove(pos);
            }
        }
        self.inner.head_changed.notify_all();
    }
}
