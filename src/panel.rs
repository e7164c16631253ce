//! Panel lifecycle with stale-command rejection.
//!
//! One record exists per panel kind. Every show/hide entry point increments a
//! single monotonic command counter and captures its value; a command whose
//! captured value is no longer the latest issued for its panel has been
//! superseded by a newer request and degrades to a successful no-op, so a
//! stale "hide" can never undo a more recent "show" (and vice versa).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::delivery;
use crate::registry::CallbackRegistry;
use crate::types::{EventPayload, EventType, PanelFlag, PanelInfo, PanelKind, Trigger};

#[derive(Debug, thiserror::Error)]
#[error("window operation failed: {0}")]
pub struct WindowError(pub String);

/// Window-manager seam. Implemented by the embedding layer; the controller
/// only needs show/hide and a vertical move for text-field avoidance.
pub trait WindowBackend: Send + Sync {
    fn show(&self, window_id: u32) -> Result<(), WindowError>;
    fn hide(&self, window_id: u32) -> Result<(), WindowError>;
    fn move_to(&self, window_id: u32, y_offset: i32) -> Result<(), WindowError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("panel not found: {0:?}")]
    NotFound(PanelKind),
    #[error("panel already created: {0:?}")]
    AlreadyCreated(PanelKind),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("panel registry unavailable")]
    Unavailable,
}

/// Bookkeeping for one created panel.
#[derive(Debug, Clone)]
pub struct PanelRecord {
    pub info: PanelInfo,
    pub shown: bool,
    pub window_id: u32,
    pub last_seq: u64,
}

/// A staged show/hide request carrying the command sequence number that was
/// current when the request was issued.
#[derive(Debug, Clone, Copy)]
pub struct PanelCommand {
    pub kind: PanelKind,
    pub show: bool,
    pub trigger: Trigger,
    seq: u64,
}

pub struct PanelLifecycleController {
    window: Arc<dyn WindowBackend>,
    records: Mutex<HashMap<PanelKind, PanelRecord>>,
    command_seq: AtomicU64,
    /// Most recently issued sequence number per panel kind; a command whose
    /// number is no longer the latest for its panel is stale.
    latest_staged: Mutex<HashMap<PanelKind, u64>>,
    /// Pending text-field avoidance offset, consumed by the next show of a
    /// fixed panel.
    avoidance_offset: Mutex<Option<i32>>,
}

impl PanelLifecycleController {
    pub fn new(window: Arc<dyn WindowBackend>) -> Self {
        Self {
            window,
            records: Mutex::new(HashMap::new()),
            command_seq: AtomicU64::new(0),
            latest_staged: Mutex::new(HashMap::new()),
            avoidance_offset: Mutex::new(None),
        }
    }

    /// Create a panel record in the hidden state.
    pub fn create_panel(&self, info: PanelInfo, window_id: u32) -> Result<(), PanelError> {
        let mut records = self.records.lock().map_err(|_| PanelError::Unavailable)?;
        if records.contains_key(&info.kind) {
            return Err(PanelError::AlreadyCreated(info.kind));
        }
        records.insert(
            info.kind,
            PanelRecord {
                info,
                shown: false,
                window_id,
                last_seq: 0,
            },
        );
        Ok(())
    }

    pub fn destroy_panel(&self, kind: PanelKind) -> Result<(), PanelError> {
        let mut records = self.records.lock().map_err(|_| PanelError::Unavailable)?;
        records.remove(&kind).ok_or(PanelError::NotFound(kind))?;
        drop(records);
        // Commands staged against the destroyed panel must not touch a
        // later incarnation of the same kind.
        if let Ok(mut latest) = self.latest_staged.lock() {
            latest.remove(&kind);
        }
        Ok(())
    }

    /// True only for a created panel matching both kind and flag that is
    /// currently shown.
    pub fn is_panel_shown(&self, info: &PanelInfo) -> bool {
        self.records
            .lock()
            .ok()
            .and_then(|records| {
                records
                    .get(&info.kind)
                    .map(|r| r.info.flag == info.flag && r.shown)
            })
            .unwrap_or(false)
    }

    /// Logical visibility of a panel kind, if created.
    pub fn visibility(&self, kind: PanelKind) -> Option<bool> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(&kind).map(|r| r.shown))
    }

    /// Record the offset the next fixed-panel show must apply before the
    /// window-level show call.
    pub fn set_avoidance_offset(&self, y_offset: i32) {
        if let Ok(mut offset) = self.avoidance_offset.lock() {
            *offset = Some(y_offset);
        }
    }

    /// Stage a show/hide request, capturing the next sequence number. The
    /// command is not applied yet; concurrent staging decides precedence.
    pub fn stage(&self, kind: PanelKind, show: bool, trigger: Trigger) -> PanelCommand {
        let seq = self.command_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut latest) = self.latest_staged.lock() {
            latest.insert(kind, seq);
        }
        PanelCommand {
            kind,
            show,
            trigger,
            seq,
        }
    }

    /// Apply a staged command. A command superseded by a newer one is a
    /// successful no-op. Window-layer failures are surfaced, and the record's
    /// visibility tracks the outcome actually observed from the window layer.
    pub fn apply(&self, cmd: PanelCommand, registry: &CallbackRegistry) -> Result<(), PanelError> {
        let latest = self
            .latest_staged
            .lock()
            .map_err(|_| PanelError::Unavailable)?
            .get(&cmd.kind)
            .copied();
        if latest != Some(cmd.seq) {
            debug!(kind = ?cmd.kind, show = cmd.show, seq = cmd.seq, "panel command superseded; ignoring");
            return Ok(());
        }
        // Record mutation and the read-then-act window call stay under one
        // lock so the flag cannot change between the check and the action.
        let mut records = self.records.lock().map_err(|_| PanelError::Unavailable)?;
        let record = records.get_mut(&cmd.kind).ok_or(PanelError::NotFound(cmd.kind))?;
        record.last_seq = cmd.seq;

        let window_result = if record.info.flag == PanelFlag::CandidateColumn {
            // Candidate panels are driven by the selection signal; the
            // window-level operation is suppressed, bookkeeping still moves.
            Ok(())
        } else if cmd.show {
            let offset = if record.info.flag == PanelFlag::Fixed {
                self.avoidance_offset
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.take())
            } else {
                None
            };
            match offset {
                Some(y) => self
                    .window
                    .move_to(record.window_id, y)
                    .and_then(|_| self.window.show(record.window_id)),
                None => self.window.show(record.window_id),
            }
        } else {
            self.window.hide(record.window_id)
        };

        // Visibility tracks what the window layer actually did; on failure
        // the record keeps its previous state.
        if window_result.is_ok() {
            record.shown = cmd.show;
        }
        let shown = record.shown;
        drop(records);

        if window_result.is_ok() {
            let event = if cmd.show {
                EventType::ImeShow
            } else {
                EventType::ImeHide
            };
            let snapshot = registry.snapshot(event);
            if !snapshot.is_empty() {
                let payload = Arc::new(EventPayload::PanelStatus {
                    kind: cmd.kind,
                    shown,
                });
                delivery::deliver(&snapshot, &payload);
            }
        }

        window_result.map_err(PanelError::from)
    }

    /// Stage and immediately apply a show request.
    pub fn show_panel(
        &self,
        kind: PanelKind,
        trigger: Trigger,
        registry: &CallbackRegistry,
    ) -> Result<(), PanelError> {
        let cmd = self.stage(kind, true, trigger);
        self.apply(cmd, registry)
    }

    /// Stage and immediately apply a hide request.
    pub fn hide_panel(
        &self,
        kind: PanelKind,
        trigger: Trigger,
        registry: &CallbackRegistry,
    ) -> Result<(), PanelError> {
        let cmd = self.stage(kind, false, trigger);
        self.apply(cmd, registry)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use super::*;

    #[derive(Default)]
    struct FakeWindow {
        shows: AtomicUsize,
        hides: AtomicUsize,
        moves: Mutex<Vec<i32>>,
        fail_next: AtomicBool,
    }

    impl FakeWindow {
        fn arc() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn check_fail(&self) -> Result<(), WindowError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                Err(WindowError("display disconnected".into()))
            } else {
                Ok(())
            }
        }
    }

    impl WindowBackend for FakeWindow {
        fn show(&self, _window_id: u32) -> Result<(), WindowError> {
            self.check_fail()?;
            self.shows.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn hide(&self, _window_id: u32) -> Result<(), WindowError> {
            self.check_fail()?;
            self.hides.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn move_to(&self, _window_id: u32, y_offset: i32) -> Result<(), WindowError> {
            self.check_fail()?;
            self.moves.lock().unwrap().push(y_offset);
            Ok(())
        }
    }

    const KEYBOARD: PanelInfo = PanelInfo {
        kind: PanelKind::SoftKeyboard,
        flag: PanelFlag::Fixed,
    };

    fn controller(window: Arc<FakeWindow>) -> PanelLifecycleController {
        PanelLifecycleController::new(window)
    }

    // --- Lifecycle basics ---

    #[test]
    fn test_create_show_hide_destroy() {
        let window = FakeWindow::arc();
        let ctl = controller(Arc::clone(&window));
        let registry = CallbackRegistry::new();

        ctl.create_panel(KEYBOARD, 11).unwrap();
        assert!(!ctl.is_panel_shown(&KEYBOARD));

        ctl.show_panel(PanelKind::SoftKeyboard, Trigger::ImeApp, &registry)
            .unwrap();
        assert!(ctl.is_panel_shown(&KEYBOARD));
        assert_eq!(window.shows.load(Ordering::SeqCst), 1);

        ctl.hide_panel(PanelKind::SoftKeyboard, Trigger::ImeApp, &registry)
            .unwrap();
        assert!(!ctl.is_panel_shown(&KEYBOARD));

        ctl.destroy_panel(PanelKind::SoftKeyboard).unwrap();
        assert!(matches!(
            ctl.show_panel(PanelKind::SoftKeyboard, Trigger::ImeApp, &registry),
            Err(PanelError::NotFound(PanelKind::SoftKeyboard))
        ));
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let ctl = controller(FakeWindow::arc());
        ctl.create_panel(KEYBOARD, 1).unwrap();
        assert!(matches!(
            ctl.create_panel(KEYBOARD, 2),
            Err(PanelError::AlreadyCreated(PanelKind::SoftKeyboard))
        ));
    }

    #[test]
    fn test_absent_panel_operations_have_no_side_effects() {
        let window = FakeWindow::arc();
        let ctl = controller(Arc::clone(&window));
        let registry = CallbackRegistry::new();

        assert!(ctl
            .hide_panel(PanelKind::StatusBar, Trigger::Imf, &registry)
            .is_err());
        assert_eq!(window.hides.load(Ordering::SeqCst), 0);
        assert!(ctl.destroy_panel(PanelKind::StatusBar).is_err());
    }

    // --- Stale-command rejection ---

    #[test]
    fn test_out_of_order_apply_higher_seq_wins() {
        let ctl = controller(FakeWindow::arc());
        let registry = CallbackRegistry::new();
        ctl.create_panel(KEYBOARD, 1).unwrap();

        let show = ctl.stage(PanelKind::SoftKeyboard, true, Trigger::ImeApp);
        let hide = ctl.stage(PanelKind::SoftKeyboard, false, Trigger::ImeApp);

        // Deliver out of order: the newer hide executes first, the stale
        // show must then be a no-op.
        ctl.apply(hide, &registry).unwrap();
        ctl.apply(show, &registry).unwrap();
        assert_eq!(ctl.visibility(PanelKind::SoftKeyboard), Some(false));
    }

    #[test]
    fn test_concurrent_hide_then_show_resolves_shown() {
        let ctl = controller(FakeWindow::arc());
        let registry = CallbackRegistry::new();
        ctl.create_panel(KEYBOARD, 1).unwrap();

        let hide = ctl.stage(PanelKind::SoftKeyboard, false, Trigger::Imf);
        let show = ctl.stage(PanelKind::SoftKeyboard, true, Trigger::ImeApp);

        ctl.apply(hide, &registry).unwrap(); // stale: seq superseded by show
        ctl.apply(show, &registry).unwrap();
        assert_eq!(ctl.visibility(PanelKind::SoftKeyboard), Some(true));

        // Same outcome when the applies land in the other order.
        let ctl = controller(FakeWindow::arc());
        ctl.create_panel(KEYBOARD, 1).unwrap();
        let hide = ctl.stage(PanelKind::SoftKeyboard, false, Trigger::Imf);
        let show = ctl.stage(PanelKind::SoftKeyboard, true, Trigger::ImeApp);
        ctl.apply(show, &registry).unwrap();
        ctl.apply(hide, &registry).unwrap();
        assert_eq!(ctl.visibility(PanelKind::SoftKeyboard), Some(true));
    }

    #[test]
    fn test_commands_for_other_panels_do_not_supersede() {
        let ctl = controller(FakeWindow::arc());
        let registry = CallbackRegistry::new();
        ctl.create_panel(KEYBOARD, 1).unwrap();
        ctl.create_panel(
            PanelInfo {
                kind: PanelKind::StatusBar,
                flag: PanelFlag::SingleLine,
            },
            2,
        )
        .unwrap();

        let show_keyboard = ctl.stage(PanelKind::SoftKeyboard, true, Trigger::ImeApp);
        // A later command for a different panel must not invalidate it.
        let show_bar = ctl.stage(PanelKind::StatusBar, true, Trigger::ImeApp);

        ctl.apply(show_bar, &registry).unwrap();
        ctl.apply(show_keyboard, &registry).unwrap();
        assert_eq!(ctl.visibility(PanelKind::SoftKeyboard), Some(true));
        assert_eq!(ctl.visibility(PanelKind::StatusBar), Some(true));
    }

    #[test]
    fn test_destroy_invalidates_staged_commands() {
        let ctl = controller(FakeWindow::arc());
        let registry = CallbackRegistry::new();
        ctl.create_panel(KEYBOARD, 1).unwrap();

        let show = ctl.stage(PanelKind::SoftKeyboard, true, Trigger::ImeApp);
        ctl.destroy_panel(PanelKind::SoftKeyboard).unwrap();
        ctl.create_panel(KEYBOARD, 1).unwrap();

        // The pre-destroy command is stale for the new incarnation.
        ctl.apply(show, &registry).unwrap();
        assert_eq!(ctl.visibility(PanelKind::SoftKeyboard), Some(false));
    }

    // --- Flag behavior ---

    #[test]
    fn test_candidate_column_suppresses_window_ops() {
        let window = FakeWindow::arc();
        let ctl = controller(Arc::clone(&window));
        let registry = CallbackRegistry::new();
        let info = PanelInfo {
            kind: PanelKind::StatusBar,
            flag: PanelFlag::CandidateColumn,
        };
        ctl.create_panel(info, 3).unwrap();

        ctl.show_panel(PanelKind::StatusBar, Trigger::ImeApp, &registry)
            .unwrap();
        // Logical visibility moved, the window layer was never touched.
        assert!(ctl.is_panel_shown(&info));
        assert_eq!(window.shows.load(Ordering::SeqCst), 0);

        ctl.hide_panel(PanelKind::StatusBar, Trigger::ImeApp, &registry)
            .unwrap();
        assert!(!ctl.is_panel_shown(&info));
        assert_eq!(window.hides.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fixed_panel_applies_pending_offset_before_show() {
        let window = FakeWindow::arc();
        let ctl = controller(Arc::clone(&window));
        let registry = CallbackRegistry::new();
        ctl.create_panel(KEYBOARD, 1).unwrap();

        ctl.set_avoidance_offset(-120);
        ctl.show_panel(PanelKind::SoftKeyboard, Trigger::Imf, &registry)
            .unwrap();
        assert_eq!(*window.moves.lock().unwrap(), vec![-120]);

        // The offset is consumed; the next show moves nothing.
        ctl.hide_panel(PanelKind::SoftKeyboard, Trigger::Imf, &registry)
            .unwrap();
        ctl.show_panel(PanelKind::SoftKeyboard, Trigger::Imf, &registry)
            .unwrap();
        assert_eq!(window.moves.lock().unwrap().len(), 1);
    }

    // --- Window failure ---

    #[test]
    fn test_window_failure_surfaces_and_state_tracks_observed_outcome() {
        let window = FakeWindow::arc();
        let ctl = controller(Arc::clone(&window));
        let registry = CallbackRegistry::new();
        let info = PanelInfo {
            kind: PanelKind::SoftKeyboard,
            flag: PanelFlag::SingleLine,
        };
        ctl.create_panel(info, 1).unwrap();

        window.fail_next.store(true, Ordering::SeqCst);
        let result = ctl.show_panel(PanelKind::SoftKeyboard, Trigger::ImeApp, &registry);
        assert!(matches!(result, Err(PanelError::Window(_))));
        // The window never showed, so the record must still say hidden.
        assert_eq!(ctl.visibility(PanelKind::SoftKeyboard), Some(false));
    }
}
