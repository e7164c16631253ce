//! Remote endpoints of the bound client, as consumed by the session core.
//!
//! Both handles are thread-safe references to a remote process; they are read
//! out of the binding under its lock and invoked outside it.

use crate::types::{Direction, PanelKind, PrivateCommand, Range};

/// Closed failure taxonomy of the bound client's RPC surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("client is busy")]
    ClientBusy,
    #[error("client died")]
    ClientDied,
    #[error("client rejected parameters: {0}")]
    Rejected(String),
    #[error("remote call failed with code {0}")]
    Code(i32),
}

/// The remote text-editing channel of the bound editor client.
pub trait RemoteTextChannel: Send + Sync {
    fn insert_text(&self, text: &str) -> Result<(), RemoteError>;
    fn delete_forward(&self, len: u32) -> Result<(), RemoteError>;
    fn delete_backward(&self, len: u32) -> Result<(), RemoteError>;
    fn move_cursor(&self, direction: Direction) -> Result<(), RemoteError>;
    fn select_by_range(&self, start: u32, end: u32) -> Result<(), RemoteError>;
    fn select_by_movement(&self, direction: Direction) -> Result<(), RemoteError>;
    fn get_text_before_cursor(&self, len: u32) -> Result<String, RemoteError>;
    fn get_text_after_cursor(&self, len: u32) -> Result<String, RemoteError>;
    fn get_text_index_at_cursor(&self) -> Result<u32, RemoteError>;
    fn set_preview_text(&self, text: &str, range: Range) -> Result<(), RemoteError>;
    fn finish_text_preview(&self) -> Result<(), RemoteError>;
    fn send_private_command(&self, command: &PrivateCommand) -> Result<(), RemoteError>;
}

/// The remote control channel back to the framework side of the client.
pub trait RemoteControlChannel: Send + Sync {
    fn notify_panel_status(&self, kind: PanelKind, shown: bool) -> Result<(), RemoteError>;
}
