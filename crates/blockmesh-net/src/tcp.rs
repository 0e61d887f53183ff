//! TCP signaling: a listener per peer, dialing by identity through the shared
//! address book.
//!
//! Each link runs two tasks. The writer drains an unbounded queue of encoded
//! messages into length-prefixed frames; the reader turns frames into
//! [`PeerEvent::Message`]s. The dialer opens with a handshake frame naming its
//! identity so the listener knows who connected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::address_book::PeerAddressBook;
use crate::connection::{
    Connection, ConnectionState, ConnectionStateWatch, Direction, EventSender, PeerEvent, SendError,
};
use crate::framing::{FrameConfig, FrameError, read_frame, read_handshake, write_frame, write_handshake};
use crate::identity::{ConnectionId, IdGenerator, PlayerId};
use crate::messages::WireMessage;
use crate::signaling::{Signaling, SignalingError};

/// How long an accepted socket may take to send its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Connection handle
// ---------------------------------------------------------------------------

/// Session-side handle to one TCP link.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    remote: PlayerId,
    direction: Direction,
    state: Arc<ConnectionStateWatch>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Task-side halves of a [`TcpConnection`].
struct LinkTasks {
    id: ConnectionId,
    remote: PlayerId,
    state: Arc<ConnectionStateWatch>,
    outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TcpConnection {
    fn new(
        id: ConnectionId,
        remote: PlayerId,
        direction: Direction,
        initial: ConnectionState,
    ) -> (Self, LinkTasks) {
        let state = Arc::new(ConnectionStateWatch::new(initial));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let conn = Self {
            id,
            remote: remote.clone(),
            direction,
            state: Arc::clone(&state),
            outbound,
            shutdown_tx,
        };
        let tasks = LinkTasks {
            id,
            remote,
            state,
            outbound_rx,
            shutdown_rx,
        };
        (conn, tasks)
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote(&self) -> &PlayerId {
        &self.remote
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn state(&self) -> ConnectionState {
        self.state.current()
    }

    fn send(&self, msg: &WireMessage) -> Result<(), SendError> {
        let state = self.state.current();
        if state != ConnectionState::Open {
            return Err(SendError::NotOpen { id: self.id, state });
        }
        let payload = msg.encode()?;
        self.outbound.send(payload).map_err(|_| SendError::NotOpen {
            id: self.id,
            state: ConnectionState::Closed,
        })
    }

    fn close(&self) {
        self.state.set(ConnectionState::Closed);
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Link tasks
// ---------------------------------------------------------------------------

impl LinkTasks {
    /// Spawn the reader and writer for an established stream.
    fn spawn(self, reader: OwnedReadHalf, writer: OwnedWriteHalf, events: EventSender, config: FrameConfig) {
        let LinkTasks {
            id,
            remote,
            state,
            outbound_rx,
            shutdown_rx,
        } = self;

        let write_config = config.clone();
        let write_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = write_loop(writer, outbound_rx, write_shutdown, &write_config).await {
                tracing::debug!("Writer for {id} ended: {e}");
            }
        });

        tokio::spawn(async move {
            read_loop(reader, id, remote, &state, &events, shutdown_rx, &config).await;
        });
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
    config: &FrameConfig,
) -> Result<(), FrameError> {
    loop {
        tokio::select! {
            biased;
            payload = outbound_rx.recv() => match payload {
                Some(payload) => write_frame(&mut writer, &payload, config).await?,
                None => break,
            },
            _ = shutdown_rx.changed() => {
                // Flush what was queued before the close.
                while let Ok(payload) = outbound_rx.try_recv() {
                    write_frame(&mut writer, &payload, config).await?;
                }
                break;
            }
        }
    }
    writer.shutdown().await?;
    Ok(())
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    id: ConnectionId,
    peer: PlayerId,
    state: &ConnectionStateWatch,
    events: &EventSender,
    mut shutdown_rx: watch::Receiver<bool>,
    config: &FrameConfig,
) {
    loop {
        tokio::select! {
            frame = read_frame(&mut reader, config) => match frame {
                Ok(payload) => {
                    let event = PeerEvent::Message {
                        connection: id,
                        peer: peer.clone(),
                        payload,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    if state.advance(ConnectionState::Closed) {
                        tracing::info!("Connection {id} to {peer} closed by remote");
                        let _ = events.send(PeerEvent::Closed { connection: id, peer });
                    }
                    break;
                }
                Err(e) => {
                    if state.advance(ConnectionState::Closed) {
                        tracing::warn!("Connection {id} to {peer} failed: {e}");
                        let _ = events.send(PeerEvent::Failed {
                            connection: id,
                            peer,
                            reason: e.to_string(),
                        });
                    }
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }
}

fn report_failure(tasks: &LinkTasks, events: &EventSender, reason: String) {
    if tasks.state.advance(ConnectionState::Closed) {
        tracing::warn!("Connection {} to {} failed: {reason}", tasks.id, tasks.remote);
        let _ = events.send(PeerEvent::Failed {
            connection: tasks.id,
            peer: tasks.remote.clone(),
            reason,
        });
    }
}

async fn dial(
    addr: SocketAddr,
    local: PlayerId,
    tasks: LinkTasks,
    events: EventSender,
    config: FrameConfig,
) {
    let stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => return report_failure(&tasks, &events, e.to_string()),
    };
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay failed for {addr}: {e}");
    }

    let (reader, mut writer) = stream.into_split();
    if let Err(e) = write_handshake(&mut writer, &local, &config).await {
        return report_failure(&tasks, &events, e.to_string());
    }

    if !tasks.state.advance(ConnectionState::Open) {
        // Closed locally while dialing.
        return;
    }
    tracing::info!("Connection {} to {} open ({addr})", tasks.id, tasks.remote);
    let _ = events.send(PeerEvent::Opened {
        connection: tasks.id,
        peer: tasks.remote.clone(),
    });
    tasks.spawn(reader, writer, events, config);
}

async fn accept_handshake(
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: ConnectionId,
    events: EventSender,
    config: FrameConfig,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("set_nodelay failed for {peer_addr}: {e}");
    }
    let (mut reader, writer) = stream.into_split();

    let remote = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_handshake(&mut reader, &config)).await {
        Ok(Ok(remote)) => remote,
        Ok(Err(e)) => {
            tracing::warn!("Rejecting {peer_addr}: {e}");
            return;
        }
        Err(_) => {
            tracing::warn!("Rejecting {peer_addr}: no handshake within {HANDSHAKE_TIMEOUT:?}");
            return;
        }
    };

    tracing::info!("Accepted connection {id} from {remote} ({peer_addr})");
    let (conn, tasks) = TcpConnection::new(id, remote, Direction::Inbound, ConnectionState::Open);
    if events.send(PeerEvent::Incoming(Box::new(conn))).is_err() {
        return;
    }
    tasks.spawn(reader, writer, events, config);
}

async fn accept_loop(
    listener: TcpListener,
    ids: Arc<IdGenerator>,
    events: EventSender,
    config: FrameConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer_addr)) => {
                    let id = ids.next_id();
                    tokio::spawn(accept_handshake(stream, peer_addr, id, events.clone(), config.clone()));
                }
                Err(e) => tracing::warn!("Accept failed: {e}"),
            },
            _ = shutdown_rx.changed() => {
                tracing::info!("Listener shutting down");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// TCP signaling provider: listens for peers and dials them by identity.
#[derive(Debug)]
pub struct TcpSignaling {
    local: PlayerId,
    local_addr: SocketAddr,
    book: PeerAddressBook,
    events: EventSender,
    ids: Arc<IdGenerator>,
    config: FrameConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl TcpSignaling {
    /// Bind a listener, publish its address under `local`, and start accepting.
    pub async fn open(
        local: PlayerId,
        bind_addr: SocketAddr,
        book: PeerAddressBook,
        events: EventSender,
        config: FrameConfig,
    ) -> Result<Self, SignalingError> {
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        book.publish(&local, local_addr)?;
        tracing::info!("Peer {local} listening on {local_addr}");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ids = Arc::new(IdGenerator::new());
        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&ids),
            events.clone(),
            config.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            local,
            local_addr,
            book,
            events,
            ids,
            config,
            shutdown_tx,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and withdraw our address book entry.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.book.remove(&self.local) {
            tracing::warn!("Failed to withdraw address for {}: {e}", self.local);
        }
    }
}

impl Drop for TcpSignaling {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Signaling for TcpSignaling {
    fn local_id(&self) -> &PlayerId {
        &self.local
    }

    fn connect(&self, remote: &PlayerId) -> Result<Box<dyn Connection>, SignalingError> {
        if remote == &self.local {
            return Err(SignalingError::SelfConnect);
        }
        let addr = self
            .book
            .lookup(remote)?
            .ok_or_else(|| SignalingError::UnknownPeer(remote.clone()))?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SignalingError::NoRuntime)?;

        let id = self.ids.next_id();
        let (conn, tasks) =
            TcpConnection::new(id, remote.clone(), Direction::Outbound, ConnectionState::Connecting);
        tracing::debug!("Dialing {remote} at {addr} as {id}");
        runtime.spawn(dial(
            addr,
            self.local.clone(),
            tasks,
            self.events.clone(),
            self.config.clone(),
        ));
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{EventReceiver, event_channel};
    use crate::messages::BlockEdit;

    const WAIT: Duration = Duration::from_secs(5);

    async fn next_event(rx: &mut EventReceiver) -> PeerEvent {
        tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn open_peer(dir: &std::path::Path, name: &str) -> (TcpSignaling, EventReceiver) {
        let (tx, rx) = event_channel();
        let signaling = TcpSignaling::open(
            PlayerId::new(name),
            "127.0.0.1:0".parse().unwrap(),
            PeerAddressBook::new(dir),
            tx,
            FrameConfig::default(),
        )
        .await
        .unwrap();
        (signaling, rx)
    }

    #[tokio::test]
    async fn test_open_publishes_address() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _rx) = open_peer(dir.path(), "alpha").await;
        let book = PeerAddressBook::new(dir.path());
        assert_eq!(book.lookup(&PlayerId::new("alpha")).unwrap(), Some(a.local_addr()));
        assert_ne!(a.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_withdraws_address() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _rx) = open_peer(dir.path(), "alpha").await;
        a.shutdown();
        let book = PeerAddressBook::new(dir.path());
        assert_eq!(book.lookup(&PlayerId::new("alpha")).unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_unknown_peer_fails_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _rx) = open_peer(dir.path(), "alpha").await;
        let result = a.connect(&PlayerId::new("ghost"));
        assert!(matches!(result, Err(SignalingError::UnknownPeer(_))));
    }

    #[tokio::test]
    async fn test_connect_self_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _rx) = open_peer(dir.path(), "alpha").await;
        assert!(matches!(
            a.connect(&PlayerId::new("alpha")),
            Err(SignalingError::SelfConnect)
        ));
    }

    #[tokio::test]
    async fn test_link_opens_and_delivers_messages() {
        let dir = tempfile::tempdir().unwrap();
        let (a, mut a_rx) = open_peer(dir.path(), "alpha").await;
        let (_b, mut b_rx) = open_peer(dir.path(), "bravo").await;

        let conn = a.connect(&PlayerId::new("bravo")).unwrap();
        assert_eq!(conn.direction(), Direction::Outbound);

        match next_event(&mut a_rx).await {
            PeerEvent::Opened { connection, peer } => {
                assert_eq!(connection, conn.id());
                assert_eq!(peer.as_str(), "bravo");
            }
            other => panic!("expected Opened, got {other:?}"),
        }
        assert!(conn.is_open());

        let inbound = match next_event(&mut b_rx).await {
            PeerEvent::Incoming(inbound) => inbound,
            other => panic!("expected Incoming, got {other:?}"),
        };
        assert_eq!(inbound.remote().as_str(), "alpha");
        assert_eq!(inbound.direction(), Direction::Inbound);
        assert!(inbound.is_open());

        let edit = WireMessage::BlockUpdate(BlockEdit::Remove { x: 1, y: 2, z: 3 });
        conn.send(&edit).unwrap();
        match next_event(&mut b_rx).await {
            PeerEvent::Message { peer, payload, connection } => {
                assert_eq!(peer.as_str(), "alpha");
                assert_eq!(connection, inbound.id());
                assert_eq!(WireMessage::decode(&payload).unwrap(), edit);
            }
            other => panic!("expected Message, got {other:?}"),
        }

        // Reply on the inbound side.
        let leave = WireMessage::Leave {
            player_id: PlayerId::new("bravo"),
        };
        inbound.send(&leave).unwrap();
        match next_event(&mut a_rx).await {
            PeerEvent::Message { payload, .. } => {
                assert_eq!(WireMessage::decode(&payload).unwrap(), leave);
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_flushes_and_notifies_remote() {
        let dir = tempfile::tempdir().unwrap();
        let (a, mut a_rx) = open_peer(dir.path(), "alpha").await;
        let (_b, mut b_rx) = open_peer(dir.path(), "bravo").await;

        let conn = a.connect(&PlayerId::new("bravo")).unwrap();
        assert!(matches!(next_event(&mut a_rx).await, PeerEvent::Opened { .. }));
        let inbound = match next_event(&mut b_rx).await {
            PeerEvent::Incoming(inbound) => inbound,
            other => panic!("expected Incoming, got {other:?}"),
        };

        let leave = WireMessage::Leave {
            player_id: PlayerId::new("alpha"),
        };
        conn.send(&leave).unwrap();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);

        match next_event(&mut b_rx).await {
            PeerEvent::Message { payload, .. } => {
                assert_eq!(WireMessage::decode(&payload).unwrap(), leave);
            }
            other => panic!("expected Message, got {other:?}"),
        }
        match next_event(&mut b_rx).await {
            PeerEvent::Closed { connection, peer } => {
                assert_eq!(connection, inbound.id());
                assert_eq!(peer.as_str(), "alpha");
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_before_open_is_refused() {
        let (conn, _tasks) = TcpConnection::new(
            ConnectionId(1),
            PlayerId::new("bravo"),
            Direction::Outbound,
            ConnectionState::Connecting,
        );
        let result = conn.send(&WireMessage::Leave {
            player_id: PlayerId::new("alpha"),
        });
        assert!(matches!(
            result,
            Err(SendError::NotOpen {
                state: ConnectionState::Connecting,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_dial_to_dead_listener_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (a, mut a_rx) = open_peer(dir.path(), "alpha").await;

        // Publish an address nobody is listening on.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);
        PeerAddressBook::new(dir.path())
            .publish(&PlayerId::new("ghost"), dead_addr)
            .unwrap();

        let conn = a.connect(&PlayerId::new("ghost")).unwrap();
        match next_event(&mut a_rx).await {
            PeerEvent::Failed { connection, peer, .. } => {
                assert_eq!(connection, conn.id());
                assert_eq!(peer.as_str(), "ghost");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
