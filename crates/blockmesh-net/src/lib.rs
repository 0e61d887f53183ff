//! Peer-to-peer transport for blockmesh: identities, the JSON wire protocol,
//! length-prefixed framing, and the signaling layer that brokers direct
//! connections between peers.
//!
//! Transports never touch session state. They push [`PeerEvent`]s into an
//! unbounded channel that a single session task drains.

pub mod address_book;
pub mod connection;
pub mod framing;
pub mod identity;
pub mod loopback;
pub mod messages;
pub mod signaling;
pub mod tcp;

pub use address_book::{AddressBookError, PeerAddressBook};
pub use connection::{
    Connection, ConnectionState, ConnectionStateWatch, Direction, EventReceiver, EventSender,
    PeerEvent, SendError, event_channel,
};
pub use framing::{
    FrameConfig, FrameError, Handshake, read_frame, read_handshake, write_frame, write_handshake,
};
pub use identity::{ConnectionId, IdGenerator, PlayerId};
pub use loopback::{LoopbackConnection, LoopbackSignaling, Switchboard};
pub use messages::{
    BlockEdit, BlockType, MESSAGE_TYPES, MessageError, Orientation, Point3, WireMessage,
};
pub use signaling::{Signaling, SignalingError};
pub use tcp::{TcpConnection, TcpSignaling};
