//! Dual-source key-event consumption.
//!
//! One physical key press is delivered along two independent listener paths:
//! the raw key-event listeners and the key-down/key-up listeners selected by
//! action. Each path answers "was this key consumed" on its own schedule; the
//! merger reports the logical OR to the waiting remote caller exactly once,
//! after both paths have reported.

use std::sync::{Arc, Mutex};

use crate::delivery;
use crate::registry::CallbackRegistry;
use crate::types::{EventPayload, EventType, KeyAction, KeyEvent};

/// Reply channel for one key dispatch; invoked exactly once per request.
pub type KeyReply = Box<dyn FnOnce(bool) + Send>;

#[derive(Clone, Copy)]
enum Path {
    Raw,
    KeyCode,
}

struct CaseState {
    raw: Option<bool>,
    keycode: Option<bool>,
    reply: Option<KeyReply>,
}

/// Result slots for the two notification paths of one dispatched key press.
///
/// Lifecycle: created with both slots unset, resolves when the second slot
/// fills, and the verdict fires once. A path that never existed is filled
/// with `false` at creation time. If the case is torn down with a slot still
/// unset (a posted task was discarded before running), the unset slot
/// defaults to `false`.
struct KeyConsumptionCase {
    state: Mutex<CaseState>,
}

impl KeyConsumptionCase {
    fn new(reply: KeyReply) -> Self {
        Self {
            state: Mutex::new(CaseState {
                raw: None,
                keycode: None,
                reply: Some(reply),
            }),
        }
    }

    fn report(&self, path: Path, consumed: bool) {
        let fire = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let slot = match path {
                Path::Raw => &mut state.raw,
                Path::KeyCode => &mut state.keycode,
            };
            if slot.is_none() {
                *slot = Some(consumed);
            }
            match (state.raw, state.keycode) {
                (Some(raw), Some(keycode)) => {
                    state.reply.take().map(|reply| (reply, raw || keycode))
                }
                _ => None,
            }
        };
        if let Some((reply, verdict)) = fire {
            reply(verdict);
        }
    }
}

impl Drop for KeyConsumptionCase {
    fn drop(&mut self) {
        let fire = match self.state.lock() {
            Ok(mut state) => {
                let verdict =
                    state.raw.unwrap_or(false) || state.keycode.unwrap_or(false);
                state.reply.take().map(|reply| (reply, verdict))
            }
            Err(_) => None,
        };
        if let Some((reply, verdict)) = fire {
            reply(verdict);
        }
    }
}

/// Pairs the two listener paths of one key press and merges their answers.
pub struct KeyEventConsumptionMerger;

impl KeyEventConsumptionMerger {
    /// Post both notification paths for `event` and return.
    ///
    /// The call returns once the paths are posted; the verdict reaches
    /// `reply` asynchronously. When neither path has a registered listener
    /// the reply fires with `false` before this call returns and nothing is
    /// posted.
    pub fn dispatch(registry: &CallbackRegistry, event: KeyEvent, reply: KeyReply) {
        let raw_snapshot = registry.snapshot(EventType::KeyEvent);
        let keycode_event = match event.action {
            KeyAction::Down => EventType::KeyDown,
            KeyAction::Up => EventType::KeyUp,
        };
        let keycode_snapshot = registry.snapshot(keycode_event);

        if raw_snapshot.is_empty() && keycode_snapshot.is_empty() {
            reply(false);
            return;
        }

        let case = Arc::new(KeyConsumptionCase::new(reply));

        // A path with no listeners reports false up front rather than hanging.
        if raw_snapshot.is_empty() {
            case.report(Path::Raw, false);
        }
        if keycode_snapshot.is_empty() {
            case.report(Path::KeyCode, false);
        }

        let payload = Arc::new(EventPayload::Key(event));
        if !raw_snapshot.is_empty() {
            let case = Arc::clone(&case);
            delivery::deliver_with_verdict(&raw_snapshot, &payload, move |consumed| {
                case.report(Path::Raw, consumed);
            });
        }
        if !keycode_snapshot.is_empty() {
            let case = Arc::clone(&case);
            delivery::deliver_with_verdict(&keycode_snapshot, &payload, move |consumed| {
                case.report(Path::KeyCode, consumed);
            });
        }
    }
}
