//! Shared data model for the session core: key events, editor attributes,
//! panel descriptors, event categories, and private commands.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Key events
// ---------------------------------------------------------------------------

/// Key transition of a physical or virtual key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// A key event as delivered by the framework's hardware feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: u32,
    pub action: KeyAction,
}

impl KeyEvent {
    pub fn down(key_code: u32) -> Self {
        Self {
            key_code,
            action: KeyAction::Down,
        }
    }

    pub fn up(key_code: u32) -> Self {
        Self {
            key_code,
            action: KeyAction::Up,
        }
    }
}

// ---------------------------------------------------------------------------
// Editor attributes
// ---------------------------------------------------------------------------

/// Text-pattern hint of the focused editor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextPattern {
    #[default]
    Text,
    Number,
    Phone,
    Email,
    Url,
    Password,
}

/// Enter-key behavior requested by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnterKeyKind {
    #[default]
    Unspecified,
    Go,
    Search,
    Send,
    Next,
    Done,
    Previous,
    Newline,
}

/// Attributes of the currently focused editor field, updated by
/// attribute-change notifications while a session is bound.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputAttribute {
    pub pattern: TextPattern,
    pub enter_key: EnterKeyKind,
    pub preview_supported: bool,
}

// ---------------------------------------------------------------------------
// Cursor / selection / ranges
// ---------------------------------------------------------------------------

/// Direction for cursor movement and movement-based selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Half-open character range in the editor's text, as sent on the wire.
/// Validated by the session core before use; negative values are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i32,
    pub end: i32,
}

impl Range {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }
}

/// On-screen cursor geometry reported by the editor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorInfo {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Old and new selection bounds of one selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionInfo {
    pub old_begin: i32,
    pub old_end: i32,
    pub new_begin: i32,
    pub new_end: i32,
}

// ---------------------------------------------------------------------------
// Panels
// ---------------------------------------------------------------------------

/// On-screen input-method surface kinds. One record exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    SoftKeyboard,
    StatusBar,
}

/// Behavioral flag of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFlag {
    /// Docked keyboard; honors a pending text-field avoidance offset on show.
    Fixed,
    /// Candidate column; window-level show/hide is driven by the selection
    /// signal, not by plain show/hide requests.
    CandidateColumn,
    SingleLine,
    Selecting,
}

/// Identity of a panel as seen by the embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelInfo {
    pub kind: PanelKind,
    pub flag: PanelFlag,
}

/// Who initiated a panel show/hide request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The framework took the panel away or brought it up.
    Imf,
    /// The IME itself requested the change.
    ImeApp,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Listener registration categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    KeyDown,
    KeyUp,
    /// Raw key-event listeners; receive the full event regardless of action.
    KeyEvent,
    CursorContextChange,
    SelectionChange,
    TextChange,
    EditorAttributeChanged,
    ImeShow,
    ImeHide,
}

/// Payload handed to listeners, tagged by what happened.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Key(KeyEvent),
    CursorContext(CursorInfo),
    Selection(SelectionInfo),
    Text(String),
    EditorAttribute(InputAttribute),
    PanelStatus { kind: PanelKind, shown: bool },
}

// ---------------------------------------------------------------------------
// Private commands
// ---------------------------------------------------------------------------

/// One value of a private-command entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Text(String),
    Bool(bool),
    Number(i32),
}

/// Opaque key/value payload delivered to the editor out of band.
pub type PrivateCommand = HashMap<String, CommandValue>;
