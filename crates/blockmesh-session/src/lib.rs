//! Collaborative session state for blockmesh: rooms, the player directory,
//! the connection registry, message dispatch, and the world mirror.
//!
//! A [`Session`] is owned by one task. Transport events, local actions and
//! timer ticks all go through `&mut Session`, so there is no shared state to
//! lock. [`SessionDriver`] is the async loop that does the feeding.

pub mod chat;
pub mod collab;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod players;
pub mod registry;
pub mod room;
pub mod session;
pub mod world;

pub use chat::{ChatEntry, ChatLog, ChatRejection, validate_chat_message};
pub use collab::{
    AvatarRenderer, AvatarSource, AvatarTransform, FixedAvatar, HeadlessRenderer, IdleAvatar,
    LogNotifier, Notifier, Speaker,
};
pub use context::{SessionContext, SessionSettings};
pub use dispatch::{Dispatch, Dispatcher, HostFanout};
pub use driver::{CommandReceiver, CommandSender, LocalCommand, SessionDriver, command_channel};
pub use error::SessionError;
pub use players::{ColorTag, PlayerDirectory, PlayerRecord, PlayerSummary, VisualHandle};
pub use registry::{ConnectionRegistry, DeliveryError};
pub use room::{
    DirectoryError, FileRoomDirectory, MemoryRoomDirectory, ROOM_CODE_LEN, RoomCode, RoomDirectory,
    RoomRecord,
};
pub use session::{LocalProfile, Role, Session, round_to};
pub use world::{BlockWorld, WorldMirror, apply_remote_edit};
