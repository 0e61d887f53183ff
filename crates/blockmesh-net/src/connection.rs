//! The transport-neutral connection contract and the events transports emit.

use std::fmt;

use tokio::sync::{mpsc, watch};

use crate::identity::{ConnectionId, PlayerId};
use crate::messages::WireMessage;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Link requested, not yet usable.
    Connecting,
    /// Messages can be sent.
    Open,
    /// Closed by either side or failed.
    Closed,
}

/// Which side initiated the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The remote peer dialed us.
    Inbound,
    /// We dialed the remote peer.
    Outbound,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Shared between the handle the session holds and the transport tasks.
#[derive(Debug)]
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateWatch {
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Set the current state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
    }

    /// Move to `next` unless already closed. Returns whether it changed.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ConnectionState::Closed || *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Errors returned by [`Connection::send`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection has not opened yet, or has already closed.
    #[error("connection {id} is {state:?}, not open")]
    NotOpen {
        id: ConnectionId,
        state: ConnectionState,
    },

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bidirectional ordered channel bound to one remote identity.
///
/// Sends never block: transports queue outbound payloads for a writer task.
/// Everything that arrives is reported as a [`PeerEvent`].
pub trait Connection: Send + fmt::Debug {
    fn id(&self) -> ConnectionId;

    /// Identity of the peer at the other end.
    fn remote(&self) -> &PlayerId;

    fn direction(&self) -> Direction;

    fn state(&self) -> ConnectionState;

    /// Queue a message. Fails with [`SendError::NotOpen`] unless open.
    fn send(&self, msg: &WireMessage) -> Result<(), SendError>;

    /// Close the link. Queued messages are flushed best effort.
    fn close(&self);

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

/// Everything a transport reports to the session task.
#[derive(Debug)]
pub enum PeerEvent {
    /// A remote peer dialed us.
    Incoming(Box<dyn Connection>),
    /// An outbound connection finished opening.
    Opened {
        connection: ConnectionId,
        peer: PlayerId,
    },
    /// A raw payload arrived.
    Message {
        connection: ConnectionId,
        peer: PlayerId,
        payload: Vec<u8>,
    },
    /// The remote side closed the link.
    Closed {
        connection: ConnectionId,
        peer: PlayerId,
    },
    /// The link broke or could not be established.
    Failed {
        connection: ConnectionId,
        peer: PlayerId,
        reason: String,
    },
}

impl PeerEvent {
    /// Remote identity the event concerns.
    pub fn peer(&self) -> &PlayerId {
        match self {
            PeerEvent::Incoming(conn) => conn.remote(),
            PeerEvent::Opened { peer, .. }
            | PeerEvent::Message { peer, .. }
            | PeerEvent::Closed { peer, .. }
            | PeerEvent::Failed { peer, .. } => peer,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<PeerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

/// Create the channel transports use to report [`PeerEvent`]s.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
