//! Connection registry: at most one live connection per remote identity.

use std::collections::HashMap;

use blockmesh_net::{Connection, ConnectionId, PlayerId, SendError, WireMessage};

/// Why a message could not be handed to a peer.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no connection to {0}")]
    NotConnected(PlayerId),

    #[error(transparent)]
    Send(#[from] SendError),
}

/// Live connections keyed by remote identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    links: HashMap<PlayerId, Box<dyn Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its remote identity.
    ///
    /// A prior connection for the same identity is closed and its id
    /// returned; events it still produces no longer match.
    pub fn register(&mut self, conn: Box<dyn Connection>) -> Option<ConnectionId> {
        let peer = conn.remote().clone();
        let new_id = conn.id();
        let replaced = self.links.insert(peer.clone(), conn)?;
        tracing::info!(
            "Connection {new_id} replaces {} for {peer}",
            replaced.id()
        );
        replaced.close();
        Some(replaced.id())
    }

    pub fn get(&self, peer: &PlayerId) -> Option<&dyn Connection> {
        self.links.get(peer).map(|c| c.as_ref())
    }

    pub fn contains(&self, peer: &PlayerId) -> bool {
        self.links.contains_key(peer)
    }

    /// Whether `connection` is the one currently registered for `peer`.
    pub fn is_current(&self, peer: &PlayerId, connection: ConnectionId) -> bool {
        self.links.get(peer).is_some_and(|c| c.id() == connection)
    }

    /// Remove `peer`'s entry only if it is still `connection`.
    pub fn remove_current(
        &mut self,
        peer: &PlayerId,
        connection: ConnectionId,
    ) -> Option<Box<dyn Connection>> {
        if !self.is_current(peer, connection) {
            return None;
        }
        let conn = self.links.remove(peer)?;
        conn.close();
        Some(conn)
    }

    /// Remove and close whatever connection `peer` has.
    pub fn remove(&mut self, peer: &PlayerId) -> Option<Box<dyn Connection>> {
        let conn = self.links.remove(peer)?;
        conn.close();
        Some(conn)
    }

    /// Send to one peer.
    pub fn send_to(&self, peer: &PlayerId, msg: &WireMessage) -> Result<(), DeliveryError> {
        let conn = self
            .links
            .get(peer)
            .ok_or_else(|| DeliveryError::NotConnected(peer.clone()))?;
        conn.send(msg)?;
        Ok(())
    }

    /// Send to every open connection except `except`. Returns how many
    /// connections accepted the message.
    pub fn broadcast(&self, msg: &WireMessage, except: Option<&PlayerId>) -> usize {
        let mut delivered = 0;
        for (peer, conn) in &self.links {
            if except == Some(peer) || !conn.is_open() {
                continue;
            }
            match conn.send(msg) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!("Dropping {} for {peer}: {e}", msg.type_name()),
            }
        }
        delivered
    }

    pub fn peers(&self) -> impl Iterator<Item = &PlayerId> {
        self.links.keys()
    }

    /// Number of connections that are open right now.
    pub fn open_count(&self) -> usize {
        self.links.values().filter(|c| c.is_open()).count()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Close and forget every connection.
    pub fn close_all(&mut self) {
        for (peer, conn) in self.links.drain() {
            tracing::debug!("Closing connection {} to {peer}", conn.id());
            conn.close();
        }
    }
}
