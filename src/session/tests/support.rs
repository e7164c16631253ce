//! Shared fakes for the session tests: an in-memory editor standing in for
//! the remote client, a recording control channel, and a window layer double.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::panel::{WindowBackend, WindowError};
use crate::registry::{EventListener, ListenerError};
use crate::session::remote::{RemoteControlChannel, RemoteError, RemoteTextChannel};
use crate::session::SessionCoordinator;
use crate::types::{
    Direction, EventPayload, InputAttribute, PanelKind, PrivateCommand, Range,
};

// --- Editor fake ---

#[derive(Default)]
pub struct EditorState {
    pub text: Vec<char>,
    pub cursor: usize,
    pub selection: Option<(u32, u32)>,
    pub preview: Option<String>,
    pub private_commands: Vec<PrivateCommand>,
    /// Names of remote calls in arrival order.
    pub calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct FakeEditor {
    pub state: Mutex<EditorState>,
    pub fail_next: AtomicBool,
}

impl FakeEditor {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn buffer(&self) -> String {
        self.state.lock().unwrap().text.iter().collect()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    fn enter(&self, call: &'static str) -> Result<std::sync::MutexGuard<'_, EditorState>, RemoteError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RemoteError::Code(-1));
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        Ok(state)
    }
}

impl RemoteTextChannel for FakeEditor {
    fn insert_text(&self, text: &str) -> Result<(), RemoteError> {
        let mut s = self.enter("insert_text")?;
        let at = s.cursor;
        for (i, ch) in text.chars().enumerate() {
            s.text.insert(at + i, ch);
        }
        s.cursor += text.chars().count();
        Ok(())
    }

    fn delete_forward(&self, len: u32) -> Result<(), RemoteError> {
        let mut s = self.enter("delete_forward")?;
        let end = (s.cursor + len as usize).min(s.text.len());
        let at = s.cursor;
        s.text.drain(at..end);
        Ok(())
    }

    fn delete_backward(&self, len: u32) -> Result<(), RemoteError> {
        let mut s = self.enter("delete_backward")?;
        let start = s.cursor.saturating_sub(len as usize);
        let at = s.cursor;
        s.text.drain(start..at);
        s.cursor = start;
        Ok(())
    }

    fn move_cursor(&self, direction: Direction) -> Result<(), RemoteError> {
        let mut s = self.enter("move_cursor")?;
        match direction {
            Direction::Left => s.cursor = s.cursor.saturating_sub(1),
            Direction::Right => s.cursor = (s.cursor + 1).min(s.text.len()),
            Direction::Up | Direction::Down => {}
        }
        Ok(())
    }

    fn select_by_range(&self, start: u32, end: u32) -> Result<(), RemoteError> {
        let mut s = self.enter("select_by_range")?;
        s.selection = Some((start, end));
        Ok(())
    }

    fn select_by_movement(&self, _direction: Direction) -> Result<(), RemoteError> {
        self.enter("select_by_movement")?;
        Ok(())
    }

    fn get_text_before_cursor(&self, len: u32) -> Result<String, RemoteError> {
        let s = self.enter("get_text_before_cursor")?;
        let start = s.cursor.saturating_sub(len as usize);
        Ok(s.text[start..s.cursor].iter().collect())
    }

    fn get_text_after_cursor(&self, len: u32) -> Result<String, RemoteError> {
        let s = self.enter("get_text_after_cursor")?;
        let end = (s.cursor + len as usize).min(s.text.len());
        Ok(s.text[s.cursor..end].iter().collect())
    }

    fn get_text_index_at_cursor(&self) -> Result<u32, RemoteError> {
        let s = self.enter("get_text_index_at_cursor")?;
        Ok(s.cursor as u32)
    }

    fn set_preview_text(&self, text: &str, _range: Range) -> Result<(), RemoteError> {
        let mut s = self.enter("set_preview_text")?;
        s.preview = Some(text.to_string());
        Ok(())
    }

    fn finish_text_preview(&self) -> Result<(), RemoteError> {
        let mut s = self.enter("finish_text_preview")?;
        s.preview = None;
        Ok(())
    }

    fn send_private_command(&self, command: &PrivateCommand) -> Result<(), RemoteError> {
        let mut s = self.enter("send_private_command")?;
        s.private_commands.push(command.clone());
        Ok(())
    }
}

// --- Control channel fake ---

#[derive(Default)]
pub struct FakeControl {
    pub statuses: Mutex<Vec<(PanelKind, bool)>>,
}

impl FakeControl {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl RemoteControlChannel for FakeControl {
    fn notify_panel_status(&self, kind: PanelKind, shown: bool) -> Result<(), RemoteError> {
        self.statuses.lock().unwrap().push((kind, shown));
        Ok(())
    }
}

// --- Window fake ---

#[derive(Default)]
pub struct FakeWindow {
    pub ops: Mutex<Vec<String>>,
}

impl FakeWindow {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl WindowBackend for FakeWindow {
    fn show(&self, window_id: u32) -> Result<(), WindowError> {
        self.ops.lock().unwrap().push(format!("show {window_id}"));
        Ok(())
    }

    fn hide(&self, window_id: u32) -> Result<(), WindowError> {
        self.ops.lock().unwrap().push(format!("hide {window_id}"));
        Ok(())
    }

    fn move_to(&self, window_id: u32, y_offset: i32) -> Result<(), WindowError> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("move {window_id} {y_offset}"));
        Ok(())
    }
}

// --- Listener fake ---

#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<EventPayload>>,
}

impl RecordingListener {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, payload: &EventPayload) -> Result<bool, ListenerError> {
        self.events.lock().unwrap().push(payload.clone());
        Ok(false)
    }
}

// --- Setup helpers ---

pub fn attribute_with_preview(preview_supported: bool) -> InputAttribute {
    InputAttribute {
        preview_supported,
        ..InputAttribute::default()
    }
}

/// A coordinator bound to a fresh fake editor (preview supported).
pub fn bound_coordinator() -> (SessionCoordinator, Arc<FakeEditor>, Arc<FakeControl>) {
    let coordinator = SessionCoordinator::new(FakeWindow::arc());
    let editor = FakeEditor::arc();
    let control = FakeControl::arc();
    coordinator
        .bind(
            Arc::clone(&editor) as Arc<dyn RemoteTextChannel>,
            Arc::clone(&control) as Arc<dyn RemoteControlChannel>,
            attribute_with_preview(true),
            Some(7),
            0,
        )
        .unwrap();
    (coordinator, editor, control)
}
