//! Signaling: the service that knows how to reach a peer by identity.

use crate::address_book::AddressBookError;
use crate::connection::Connection;
use crate::identity::PlayerId;

/// Errors a signaling provider reports synchronously from [`Signaling::connect`].
///
/// Failures after the link was requested arrive later as
/// [`PeerEvent::Failed`](crate::PeerEvent::Failed).
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// No route to the identity is known.
    #[error("unknown peer: {0}")]
    UnknownPeer(PlayerId),

    /// Refused to dial our own identity.
    #[error("cannot connect to self")]
    SelfConnect,

    /// Called outside a tokio runtime.
    #[error("no async runtime available")]
    NoRuntime,

    /// The shared address book could not be read.
    #[error(transparent)]
    AddressBook(#[from] AddressBookError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Assigns this process an identity and brokers direct connections.
///
/// Incoming links are not returned from here; the provider reports them as
/// [`PeerEvent::Incoming`](crate::PeerEvent::Incoming) on its event channel.
pub trait Signaling: Send {
    /// Identity other peers use to reach this process.
    fn local_id(&self) -> &PlayerId;

    /// Request a link to `remote`. The returned connection starts out
    /// [`Connecting`](crate::ConnectionState::Connecting) and reports
    /// [`PeerEvent::Opened`](crate::PeerEvent::Opened) once usable.
    fn connect(&self, remote: &PlayerId) -> Result<Box<dyn Connection>, SignalingError>;
}
