//! In-process signaling for tests and single-process demos.
//!
//! A [`Switchboard`] maps identities to their event channels. Messages are
//! still JSON-encoded so the receiving session decodes exactly what a TCP
//! peer would see.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::{
    Connection, ConnectionState, ConnectionStateWatch, Direction, EventSender, PeerEvent, SendError,
};
use crate::identity::{ConnectionId, IdGenerator, PlayerId};
use crate::messages::WireMessage;
use crate::signaling::{Signaling, SignalingError};

#[derive(Debug, Default)]
struct Board {
    peers: HashMap<PlayerId, EventSender>,
    /// Links waiting for [`Switchboard::open_pending`].
    pending: Vec<PendingLink>,
}

#[derive(Debug)]
struct PendingLink {
    dialer: Arc<LinkEnd>,
    listener: Arc<LinkEnd>,
}

/// One side of an in-process link.
#[derive(Debug)]
struct LinkEnd {
    id: ConnectionId,
    owner: PlayerId,
    owner_events: EventSender,
    state: ConnectionStateWatch,
}

/// Shared in-process registry of attached peers.
#[derive(Debug, Clone, Default)]
pub struct Switchboard {
    board: Arc<Mutex<Board>>,
    ids: Arc<IdGenerator>,
    manual_open: bool,
}

impl Switchboard {
    /// Links open as soon as they are requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Links stay [`Connecting`](ConnectionState::Connecting) until
    /// [`open_pending`](Self::open_pending) is called.
    pub fn with_manual_open() -> Self {
        Self {
            manual_open: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` and return a signaling handle for it.
    pub fn attach(&self, id: PlayerId, events: EventSender) -> LoopbackSignaling {
        self.lock().peers.insert(id.clone(), events.clone());
        LoopbackSignaling {
            board: self.clone(),
            local: id,
            events,
        }
    }

    /// Remove `id`; later dials to it fail.
    pub fn detach(&self, id: &PlayerId) {
        self.lock().peers.remove(id);
    }

    /// Open every link requested so far. Returns how many opened.
    pub fn open_pending(&self) -> usize {
        let pending = std::mem::take(&mut self.lock().pending);
        let mut opened = 0;
        for link in pending {
            if Self::open_link(&link.dialer, &link.listener) {
                opened += 1;
            }
        }
        opened
    }

    /// Deliver the listener end to its owner and tell the dialer it is open.
    fn open_link(dialer: &Arc<LinkEnd>, listener: &Arc<LinkEnd>) -> bool {
        if !dialer.state.advance(ConnectionState::Open) {
            return false;
        }
        listener.state.set(ConnectionState::Open);

        let incoming = LoopbackConnection {
            local: Arc::clone(listener),
            remote: Arc::clone(dialer),
            direction: Direction::Inbound,
        };
        if listener
            .owner_events
            .send(PeerEvent::Incoming(Box::new(incoming)))
            .is_err()
        {
            dialer.state.set(ConnectionState::Closed);
            let _ = dialer.owner_events.send(PeerEvent::Failed {
                connection: dialer.id,
                peer: listener.owner.clone(),
                reason: "peer went away".to_string(),
            });
            return false;
        }
        let _ = dialer.owner_events.send(PeerEvent::Opened {
            connection: dialer.id,
            peer: listener.owner.clone(),
        });
        true
    }
}

/// Signaling handle for one attached identity.
#[derive(Debug)]
pub struct LoopbackSignaling {
    board: Switchboard,
    local: PlayerId,
    events: EventSender,
}

impl Signaling for LoopbackSignaling {
    fn local_id(&self) -> &PlayerId {
        &self.local
    }

    fn connect(&self, remote: &PlayerId) -> Result<Box<dyn Connection>, SignalingError> {
        if remote == &self.local {
            return Err(SignalingError::SelfConnect);
        }
        let remote_events = self
            .board
            .lock()
            .peers
            .get(remote)
            .cloned()
            .ok_or_else(|| SignalingError::UnknownPeer(remote.clone()))?;

        let dialer = Arc::new(LinkEnd {
            id: self.board.ids.next_id(),
            owner: self.local.clone(),
            owner_events: self.events.clone(),
            state: ConnectionStateWatch::new(ConnectionState::Connecting),
        });
        let listener = Arc::new(LinkEnd {
            id: self.board.ids.next_id(),
            owner: remote.clone(),
            owner_events: remote_events,
            state: ConnectionStateWatch::new(ConnectionState::Connecting),
        });

        if self.board.manual_open {
            self.board.lock().pending.push(PendingLink {
                dialer: Arc::clone(&dialer),
                listener: Arc::clone(&listener),
            });
        } else {
            Switchboard::open_link(&dialer, &listener);
        }

        Ok(Box::new(LoopbackConnection {
            local: dialer,
            remote: listener,
            direction: Direction::Outbound,
        }))
    }
}

/// Handle to one end of an in-process link.
#[derive(Debug)]
pub struct LoopbackConnection {
    local: Arc<LinkEnd>,
    remote: Arc<LinkEnd>,
    direction: Direction,
}

impl Connection for LoopbackConnection {
    fn id(&self) -> ConnectionId {
        self.local.id
    }

    fn remote(&self) -> &PlayerId {
        &self.remote.owner
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn state(&self) -> ConnectionState {
        self.local.state.current()
    }

    fn send(&self, msg: &WireMessage) -> Result<(), SendError> {
        let state = self.local.state.current();
        if state != ConnectionState::Open {
            return Err(SendError::NotOpen {
                id: self.local.id,
                state,
            });
        }
        let payload = msg.encode()?;
        self.remote
            .owner_events
            .send(PeerEvent::Message {
                connection: self.remote.id,
                peer: self.local.owner.clone(),
                payload,
            })
            .map_err(|_| SendError::NotOpen {
                id: self.local.id,
                state: ConnectionState::Closed,
            })
    }

    fn close(&self) {
        self.local.state.set(ConnectionState::Closed);
        let remote_was_open = self.remote.state.current() == ConnectionState::Open;
        if self.remote.state.advance(ConnectionState::Closed) && remote_was_open {
            let _ = self.remote.owner_events.send(PeerEvent::Closed {
                connection: self.remote.id,
                peer: self.local.owner.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{EventReceiver, event_channel};

    fn attach(board: &Switchboard, name: &str) -> (LoopbackSignaling, EventReceiver) {
        let (tx, rx) = event_channel();
        (board.attach(PlayerId::new(name), tx), rx)
    }

    fn leave(name: &str) -> WireMessage {
        WireMessage::Leave {
            player_id: PlayerId::new(name),
        }
    }

    #[test]
    fn test_connect_opens_immediately() {
        let board = Switchboard::new();
        let (a, mut a_rx) = attach(&board, "a");
        let (_b, mut b_rx) = attach(&board, "b");

        let conn = a.connect(&PlayerId::new("b")).unwrap();
        assert!(conn.is_open());
        assert!(matches!(a_rx.try_recv(), Ok(PeerEvent::Opened { connection, .. }) if connection == conn.id()));
        match b_rx.try_recv() {
            Ok(PeerEvent::Incoming(inbound)) => {
                assert_eq!(inbound.remote().as_str(), "a");
                assert_eq!(inbound.direction(), Direction::Inbound);
                assert_ne!(inbound.id(), conn.id());
            }
            other => panic!("expected Incoming, got {other:?}"),
        }
    }

    #[test]
    fn test_message_reaches_other_end() {
        let board = Switchboard::new();
        let (a, _a_rx) = attach(&board, "a");
        let (_b, mut b_rx) = attach(&board, "b");

        let conn = a.connect(&PlayerId::new("b")).unwrap();
        let Ok(PeerEvent::Incoming(inbound)) = b_rx.try_recv() else {
            panic!("expected Incoming");
        };

        conn.send(&leave("a")).unwrap();
        match b_rx.try_recv() {
            Ok(PeerEvent::Message { connection, peer, payload }) => {
                assert_eq!(connection, inbound.id());
                assert_eq!(peer.as_str(), "a");
                assert_eq!(WireMessage::decode(&payload).unwrap(), leave("a"));
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_peer() {
        let board = Switchboard::new();
        let (a, _rx) = attach(&board, "a");
        assert!(matches!(
            a.connect(&PlayerId::new("zz")),
            Err(SignalingError::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_manual_open_holds_link() {
        let board = Switchboard::with_manual_open();
        let (a, mut a_rx) = attach(&board, "a");
        let (_b, mut b_rx) = attach(&board, "b");

        let conn = a.connect(&PlayerId::new("b")).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(matches!(
            conn.send(&leave("a")),
            Err(SendError::NotOpen { state: ConnectionState::Connecting, .. })
        ));
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());

        assert_eq!(board.open_pending(), 1);
        assert!(conn.is_open());
        assert!(matches!(a_rx.try_recv(), Ok(PeerEvent::Opened { .. })));
        assert!(matches!(b_rx.try_recv(), Ok(PeerEvent::Incoming(_))));
    }

    #[test]
    fn test_close_notifies_other_end_once() {
        let board = Switchboard::new();
        let (a, _a_rx) = attach(&board, "a");
        let (_b, mut b_rx) = attach(&board, "b");

        let conn = a.connect(&PlayerId::new("b")).unwrap();
        let Ok(PeerEvent::Incoming(inbound)) = b_rx.try_recv() else {
            panic!("expected Incoming");
        };

        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(inbound.state(), ConnectionState::Closed);
        assert!(matches!(b_rx.try_recv(), Ok(PeerEvent::Closed { .. })));
        assert!(b_rx.try_recv().is_err());
        assert!(conn.send(&leave("a")).is_err());
    }

    #[test]
    fn test_closed_before_open_never_opens() {
        let board = Switchboard::with_manual_open();
        let (a, _a_rx) = attach(&board, "a");
        let (_b, mut b_rx) = attach(&board, "b");

        let conn = a.connect(&PlayerId::new("b")).unwrap();
        conn.close();
        assert_eq!(board.open_pending(), 0);
        assert!(b_rx.try_recv().is_err());
    }
}
