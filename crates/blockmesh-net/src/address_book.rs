//! Shared address book: where each live peer is listening.
//!
//! One RON file per identity under `<shared dir>/peers/`. Every process on the
//! same machine and profile sees the same entries.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::identity::PlayerId;

/// Errors from reading or writing the address book.
#[derive(Debug, thiserror::Error)]
pub enum AddressBookError {
    #[error("address book I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt address entry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize address entry: {0}")]
    Serialize(#[from] ron::Error),

    #[error("identity {0} cannot be used as a file name")]
    InvalidIdentity(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PeerAddress {
    identity: PlayerId,
    addr: SocketAddr,
}

/// File-backed map from [`PlayerId`] to listening address.
#[derive(Debug, Clone)]
pub struct PeerAddressBook {
    dir: PathBuf,
}

impl PeerAddressBook {
    /// Address book rooted at `<shared_dir>/peers`.
    pub fn new(shared_dir: &Path) -> Self {
        Self {
            dir: shared_dir.join("peers"),
        }
    }

    fn entry_path(&self, id: &PlayerId) -> Result<PathBuf, AddressBookError> {
        if !id.is_path_safe() {
            return Err(AddressBookError::InvalidIdentity(id.clone()));
        }
        Ok(self.dir.join(format!("{id}.ron")))
    }

    /// Record where `id` is listening, replacing any earlier entry.
    pub fn publish(&self, id: &PlayerId, addr: SocketAddr) -> Result<(), AddressBookError> {
        let path = self.entry_path(id)?;
        std::fs::create_dir_all(&self.dir).map_err(|source| AddressBookError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let entry = PeerAddress {
            identity: id.clone(),
            addr,
        };
        let serialized = ron::ser::to_string_pretty(&entry, ron::ser::PrettyConfig::new())?;
        std::fs::write(&path, serialized).map_err(|source| AddressBookError::Io { path, source })
    }

    /// Where `id` is listening, if it published an address.
    pub fn lookup(&self, id: &PlayerId) -> Result<Option<SocketAddr>, AddressBookError> {
        let path = self.entry_path(id)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(AddressBookError::Io { path, source }),
        };
        let entry: PeerAddress = ron::from_str(&contents)
            .map_err(|source| AddressBookError::Parse { path, source })?;
        Ok(Some(entry.addr))
    }

    /// Drop the entry for `id`. Missing entries are fine.
    pub fn remove(&self, id: &PlayerId) -> Result<(), AddressBookError> {
        let path = self.entry_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AddressBookError::Io { path, source }),
        }
    }
}
