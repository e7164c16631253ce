//! Session binding and coordination.
//!
//! One [`SessionCoordinator`] value owns the whole core: the binding to the
//! current editor client, the two ordered edit channels, the listener
//! registry, and the panel controller. Construct one per IME instance and
//! pass it by reference to every entry point; tests construct independent
//! instances.

pub mod remote;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex};

use tracing::{debug, debug_span};

use crate::delivery::{self, TaskExecutor};
use crate::edit_channel::{
    ChannelError, EditKind, OrderedEditChannel, Ticket, EDIT_WAIT_TIMEOUT,
    PRIVATE_COMMAND_WAIT_TIMEOUT,
};
use crate::key_merge::{KeyEventConsumptionMerger, KeyReply};
use crate::panel::{PanelLifecycleController, WindowBackend};
use crate::registry::{CallbackRegistry, EventListener};
use crate::types::{
    CursorInfo, Direction, EventPayload, EventType, InputAttribute, KeyEvent, PanelInfo,
    PanelKind, PrivateCommand, Range, SelectionInfo, Trigger,
};

use remote::{RemoteControlChannel, RemoteError, RemoteTextChannel};

/// Upper bound on entries in one private command.
pub const MAX_PRIVATE_COMMAND_ENTRIES: usize = 32;

/// Error taxonomy for session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Most editing calls when no client is bound.
    #[error("no active session")]
    NoActiveSession,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// The bound client's RPC failed; propagated verbatim.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The operation could not be admitted into the edit channel.
    #[error("operation could not be ordered")]
    ChannelUnavailable,
    #[error(transparent)]
    Panel(#[from] crate::panel::PanelError),
}

impl From<ChannelError> for SessionError {
    fn from(_: ChannelError) -> Self {
        SessionError::ChannelUnavailable
    }
}

/// The live binding between one editor client and the IME.
struct SessionBinding {
    data: Arc<dyn RemoteTextChannel>,
    control: Arc<dyn RemoteControlChannel>,
    attribute: InputAttribute,
    window_id: Option<u32>,
    display_id: u64,
    /// A preview-text session is open and has not been finished.
    preview_active: bool,
}

/// The coordination core of one IME instance.
pub struct SessionCoordinator {
    binding: Mutex<Option<SessionBinding>>,
    edits: OrderedEditChannel,
    private_commands: OrderedEditChannel,
    registry: CallbackRegistry,
    panels: PanelLifecycleController,
}

impl SessionCoordinator {
    pub fn new(window: Arc<dyn WindowBackend>) -> Self {
        Self {
            binding: Mutex::new(None),
            edits: OrderedEditChannel::new(EDIT_WAIT_TIMEOUT),
            private_commands: OrderedEditChannel::new(PRIVATE_COMMAND_WAIT_TIMEOUT),
            registry: CallbackRegistry::new(),
            panels: PanelLifecycleController::new(window),
        }
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Bind a client, replacing any existing session atomically.
    pub fn bind(
        &self,
        data: Arc<dyn RemoteTextChannel>,
        control: Arc<dyn RemoteControlChannel>,
        attribute: InputAttribute,
        window_id: Option<u32>,
        display_id: u64,
    ) -> Result<(), SessionError> {
        let mut binding = self
            .binding
            .lock()
            .map_err(|_| SessionError::ChannelUnavailable)?;
        debug!(?window_id, display_id, rebinding = binding.is_some(), "binding session");
        *binding = Some(SessionBinding {
            data,
            control,
            attribute,
            window_id,
            display_id,
            preview_active: false,
        });
        Ok(())
    }

    /// Drop the current binding and clean up panel bookkeeping.
    pub fn unbind(&self) {
        if let Ok(mut binding) = self.binding.lock() {
            *binding = None;
        }
        // The keyboard must not stay marked shown for a client that is gone.
        let _ = self
            .panels
            .hide_panel(PanelKind::SoftKeyboard, Trigger::Imf, &self.registry);
    }

    /// Forced teardown on the remote-death notification; equivalent to an
    /// explicit unbind.
    pub fn on_client_died(&self) {
        debug!("remote client died; forcing session teardown");
        self.unbind();
    }

    pub fn is_bound(&self) -> bool {
        self.binding.lock().map(|b| b.is_some()).unwrap_or(false)
    }

    /// Attributes of the focused field, if a session is bound.
    pub fn input_attribute(&self) -> Option<InputAttribute> {
        self.binding
            .lock()
            .ok()
            .and_then(|b| b.as_ref().map(|b| b.attribute.clone()))
    }

    /// Window the bound client claims focus in, if any.
    pub fn bound_window_id(&self) -> Option<u32> {
        self.binding
            .lock()
            .ok()
            .and_then(|b| b.as_ref().and_then(|b| b.window_id))
    }

    pub fn display_id(&self) -> Option<u64> {
        self.binding
            .lock()
            .ok()
            .and_then(|b| b.as_ref().map(|b| b.display_id))
    }

    fn data_channel(&self) -> Result<Arc<dyn RemoteTextChannel>, SessionError> {
        let binding = self
            .binding
            .lock()
            .map_err(|_| SessionError::ChannelUnavailable)?;
        binding
            .as_ref()
            .map(|b| Arc::clone(&b.data))
            .ok_or(SessionError::NoActiveSession)
    }

    fn preview_active(&self) -> bool {
        self.binding
            .lock()
            .map(|b| b.as_ref().is_some_and(|b| b.preview_active))
            .unwrap_or(false)
    }

    fn set_preview_active(&self, active: bool) {
        if let Ok(mut binding) = self.binding.lock() {
            if let Some(b) = binding.as_mut() {
                b.preview_active = active;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Editing operations
    // -----------------------------------------------------------------------
    //
    // Each operation pushes its ticket first, validates, reads the remote
    // handle under the binding lock, waits for the head of its channel, and
    // issues the remote call outside every lock. The ticket pops on drop
    // along every exit path.

    fn issue<T>(
        &self,
        channel: &OrderedEditChannel,
        ticket: &Ticket,
        call: impl FnOnce(&dyn RemoteTextChannel) -> Result<T, RemoteError>,
    ) -> Result<T, SessionError> {
        let chan = self.data_channel()?;
        channel.wait(ticket);
        Ok(call(chan.as_ref())?)
    }

    pub fn insert_text(&self, text: &str) -> Result<(), SessionError> {
        let _span = debug_span!("insert_text", len = text.len()).entered();
        let ticket = self.edits.push(EditKind::Insert)?;
        self.issue(&self.edits, &ticket, |c| c.insert_text(text))
    }

    pub fn delete_forward(&self, len: i32) -> Result<(), SessionError> {
        let ticket = self.edits.push(EditKind::DeleteForward)?;
        let len = non_negative(len, "delete length")?;
        self.issue(&self.edits, &ticket, |c| c.delete_forward(len))
    }

    pub fn delete_backward(&self, len: i32) -> Result<(), SessionError> {
        let ticket = self.edits.push(EditKind::DeleteBackward)?;
        let len = non_negative(len, "delete length")?;
        self.issue(&self.edits, &ticket, |c| c.delete_backward(len))
    }

    pub fn move_cursor(&self, direction: Direction) -> Result<(), SessionError> {
        let ticket = self.edits.push(EditKind::MoveCursor)?;
        self.issue(&self.edits, &ticket, |c| c.move_cursor(direction))
    }

    pub fn select_by_range(&self, start: i32, end: i32) -> Result<(), SessionError> {
        let ticket = self.edits.push(EditKind::SelectByRange)?;
        if start < 0 || end < start {
            return Err(SessionError::InvalidParameter("selection range"));
        }
        self.issue(&self.edits, &ticket, |c| {
            c.select_by_range(start as u32, end as u32)
        })
    }

    pub fn select_by_movement(&self, direction: Direction) -> Result<(), SessionError> {
        let ticket = self.edits.push(EditKind::SelectByMovement)?;
        self.issue(&self.edits, &ticket, |c| c.select_by_movement(direction))
    }

    pub fn get_text_before_cursor(&self, len: i32) -> Result<String, SessionError> {
        let ticket = self.edits.push(EditKind::GetText)?;
        let len = non_negative(len, "text length")?;
        self.issue(&self.edits, &ticket, |c| c.get_text_before_cursor(len))
    }

    pub fn get_text_after_cursor(&self, len: i32) -> Result<String, SessionError> {
        let ticket = self.edits.push(EditKind::GetText)?;
        let len = non_negative(len, "text length")?;
        self.issue(&self.edits, &ticket, |c| c.get_text_after_cursor(len))
    }

    pub fn get_text_index_at_cursor(&self) -> Result<u32, SessionError> {
        let ticket = self.edits.push(EditKind::GetTextIndex)?;
        self.issue(&self.edits, &ticket, |c| c.get_text_index_at_cursor())
    }

    pub fn set_preview_text(&self, text: &str, range: Range) -> Result<(), SessionError> {
        let _span = debug_span!("set_preview_text").entered();
        let ticket = self.edits.push(EditKind::SetPreviewText)?;
        if range.start < 0 || range.end < range.start {
            return Err(SessionError::InvalidParameter("preview range"));
        }
        let (chan, supported) = {
            let binding = self
                .binding
                .lock()
                .map_err(|_| SessionError::ChannelUnavailable)?;
            match binding.as_ref() {
                Some(b) => (Arc::clone(&b.data), b.attribute.preview_supported),
                None => return Err(SessionError::NoActiveSession),
            }
        };
        if !supported {
            return Err(SessionError::InvalidParameter("text preview unsupported"));
        }
        self.edits.wait(&ticket);
        chan.set_preview_text(text, range)?;
        self.set_preview_active(true);
        Ok(())
    }

    pub fn finish_text_preview(&self) -> Result<(), SessionError> {
        let ticket = self.edits.push(EditKind::FinishPreview)?;
        let result = self.issue(&self.edits, &ticket, |c| c.finish_text_preview());
        // Terminal either way; a failed remote call must not leave the core
        // believing a preview is still open.
        self.set_preview_active(false);
        result
    }

    /// Deliver a private command through its own ordered channel. Private
    /// commands are ordered only against each other and intentionally
    /// interleave with concurrent editing operations.
    pub fn send_private_command(&self, command: &PrivateCommand) -> Result<(), SessionError> {
        let ticket = self.private_commands.push(EditKind::PrivateCommand)?;
        if command.is_empty() || command.len() > MAX_PRIVATE_COMMAND_ENTRIES {
            return Err(SessionError::InvalidParameter("private command size"));
        }
        self.issue(&self.private_commands, &ticket, |c| {
            c.send_private_command(command)
        })
    }

    /// Tickets currently admitted to the ordinary edit channel.
    pub fn pending_edit_ops(&self) -> usize {
        self.edits.len()
    }

    pub fn pending_private_commands(&self) -> usize {
        self.private_commands.len()
    }

    // -----------------------------------------------------------------------
    // Key dispatch
    // -----------------------------------------------------------------------

    /// Dispatch one key event to both listener paths. Returns once the paths
    /// are posted; `reply` receives the merged consumption verdict exactly
    /// once, asynchronously.
    pub fn dispatch_key(&self, event: KeyEvent, reply: KeyReply) {
        let _span = debug_span!("dispatch_key", key_code = event.key_code).entered();
        KeyEventConsumptionMerger::dispatch(&self.registry, event, reply);
    }

    // -----------------------------------------------------------------------
    // Listener registration and framework notifications
    // -----------------------------------------------------------------------

    pub fn subscribe(
        &self,
        event: EventType,
        executor: Arc<dyn TaskExecutor>,
        listener: Arc<dyn EventListener>,
    ) {
        self.registry.subscribe(event, executor, listener);
    }

    pub fn unsubscribe(&self, event: EventType, listener: Option<&Arc<dyn EventListener>>) {
        self.registry.unsubscribe(event, listener);
    }

    /// The focused field's attributes changed: update the binding, then fan
    /// out to `EditorAttributeChanged` listeners.
    pub fn on_attribute_changed(&self, attribute: InputAttribute) {
        if let Ok(mut binding) = self.binding.lock() {
            if let Some(b) = binding.as_mut() {
                b.attribute = attribute.clone();
            }
        }
        self.fan_out(
            EventType::EditorAttributeChanged,
            EventPayload::EditorAttribute(attribute),
        );
    }

    pub fn on_selection_change(&self, info: SelectionInfo) {
        self.fan_out(EventType::SelectionChange, EventPayload::Selection(info));
    }

    pub fn on_text_change(&self, text: String) {
        self.fan_out(EventType::TextChange, EventPayload::Text(text));
    }

    pub fn on_cursor_context_change(&self, info: CursorInfo) {
        self.fan_out(
            EventType::CursorContextChange,
            EventPayload::CursorContext(info),
        );
    }

    fn fan_out(&self, event: EventType, payload: EventPayload) {
        let snapshot = self.registry.snapshot(event);
        if snapshot.is_empty() {
            return;
        }
        delivery::deliver(&snapshot, &Arc::new(payload));
    }

    // -----------------------------------------------------------------------
    // Panels
    // -----------------------------------------------------------------------

    pub fn create_panel(&self, info: PanelInfo, window_id: u32) -> Result<(), SessionError> {
        Ok(self.panels.create_panel(info, window_id)?)
    }

    pub fn destroy_panel(&self, kind: PanelKind) -> Result<(), SessionError> {
        Ok(self.panels.destroy_panel(kind)?)
    }

    pub fn show_panel(&self, kind: PanelKind, trigger: Trigger) -> Result<(), SessionError> {
        self.panels.show_panel(kind, trigger, &self.registry)?;
        self.notify_panel_status(kind);
        Ok(())
    }

    /// Hide a panel. A framework-initiated hide of the soft keyboard first
    /// finishes any open preview-text session, so the editor is not left
    /// half-composed when the keyboard disappears without the IME's own
    /// initiative.
    pub fn hide_panel(&self, kind: PanelKind, trigger: Trigger) -> Result<(), SessionError> {
        if kind == PanelKind::SoftKeyboard && trigger == Trigger::Imf && self.preview_active() {
            if let Err(err) = self.finish_text_preview() {
                debug!(%err, "preview cleanup before framework hide failed");
            }
        }
        self.panels.hide_panel(kind, trigger, &self.registry)?;
        self.notify_panel_status(kind);
        Ok(())
    }

    pub fn is_panel_shown(&self, info: &PanelInfo) -> bool {
        self.panels.is_panel_shown(info)
    }

    pub fn set_avoidance_offset(&self, y_offset: i32) {
        self.panels.set_avoidance_offset(y_offset);
    }

    /// Direct access for staging/applying panel commands.
    pub fn panels(&self) -> &PanelLifecycleController {
        &self.panels
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    fn notify_panel_status(&self, kind: PanelKind) {
        let control = self
            .binding
            .lock()
            .ok()
            .and_then(|b| b.as_ref().map(|b| Arc::clone(&b.control)));
        let Some(control) = control else {
            return;
        };
        let Some(shown) = self.panels.visibility(kind) else {
            return;
        };
        if let Err(err) = control.notify_panel_status(kind, shown) {
            debug!(%err, "panel status notification to the client failed");
        }
    }
}

fn non_negative(value: i32, what: &'static str) -> Result<u32, SessionError> {
    u32::try_from(value).map_err(|_| SessionError::InvalidParameter(what))
}
