//! Session coordination core for an input-method framework.
//!
//! Coordinates a remote text-editor client and the IME across process
//! boundaries: ordered admission of editing RPCs ([`edit_channel`]), merged
//! dual-source key-event consumption ([`key_merge`]), panel lifecycle with
//! stale-command rejection ([`panel`]), and snapshot-based fan-out of events
//! to listeners on their owning execution contexts ([`registry`],
//! [`delivery`]). One [`SessionCoordinator`] value ties the pieces together.

pub mod delivery;
pub mod edit_channel;
pub mod key_merge;
pub mod panel;
pub mod registry;
pub mod session;
pub mod settings;
pub mod trace_init;
pub mod types;

pub use delivery::{PostError, SerialEventQueue, Task, TaskExecutor};
pub use edit_channel::{ChannelError, EditKind, OrderedEditChannel, Ticket};
pub use key_merge::{KeyEventConsumptionMerger, KeyReply};
pub use panel::{
    PanelCommand, PanelError, PanelLifecycleController, PanelRecord, WindowBackend, WindowError,
};
pub use registry::{CallbackRegistry, EventListener, ListenerEntry, ListenerError};
pub use session::remote::{RemoteControlChannel, RemoteError, RemoteTextChannel};
pub use session::{SessionCoordinator, SessionError};
pub use settings::{SecurityMode, SettingsError, SettingsRepo};
pub use types::{
    CommandValue, CursorInfo, Direction, EnterKeyKind, EventPayload, EventType, InputAttribute,
    KeyAction, KeyEvent, PanelFlag, PanelInfo, PanelKind, PrivateCommand, Range, SelectionInfo,
    TextPattern, Trigger,
};
