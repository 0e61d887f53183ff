//! Session error types.

use blockmesh_net::{PlayerId, SignalingError};

use crate::room::{DirectoryError, RoomCode};

/// Errors from room bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The code is malformed, unknown, or names this peer.
    #[error("room {0} not found")]
    RoomNotFound(String),

    /// Signaling could not start a link to the host.
    #[error("could not connect to {peer}: {source}")]
    ConnectionFailure {
        peer: PlayerId,
        #[source]
        source: SignalingError,
    },

    #[error("already in room {0}")]
    AlreadyInRoom(RoomCode),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
