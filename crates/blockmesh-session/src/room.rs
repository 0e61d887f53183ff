//! Room codes and the directory that maps them to host identities.
//!
//! A host publishes `{code, host, created_at}`; a joiner looks the code up and
//! dials the host. There is no uniqueness check and no expiry: publishing an
//! existing code overwrites it (last writer wins).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use blockmesh_net::PlayerId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// Six characters from `A-Z0-9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw each character independently and uniformly from `A-Z0-9`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalize user input (trim, uppercase) and check its shape.
    pub fn parse(input: &str) -> Option<Self> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == ROOM_CODE_LEN
            && code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        valid.then_some(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A published room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub code: RoomCode,
    pub host: PlayerId,
    /// Unix milliseconds.
    pub created_at: u64,
}

impl RoomRecord {
    /// Record for `host`, stamped with the current time.
    pub fn new(code: RoomCode, host: PlayerId) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            code,
            host,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Errors from a room directory backend.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("room directory I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt room entry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize room entry: {0}")]
    Serialize(#[from] ron::Error),
}

/// Lookup shared by every participant that can reach the same backend.
pub trait RoomDirectory {
    /// Publish a room, overwriting any entry with the same code.
    fn publish(&self, record: &RoomRecord) -> Result<(), DirectoryError>;

    fn lookup(&self, code: &RoomCode) -> Result<Option<RoomRecord>, DirectoryError>;
}

/// In-process directory. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoomDirectory {
    rooms: Arc<Mutex<HashMap<RoomCode, RoomRecord>>>,
}

impl MemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoomDirectory for MemoryRoomDirectory {
    fn publish(&self, record: &RoomRecord) -> Result<(), DirectoryError> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.code.clone(), record.clone());
        Ok(())
    }

    fn lookup(&self, code: &RoomCode) -> Result<Option<RoomRecord>, DirectoryError> {
        Ok(self
            .rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned())
    }
}

/// One RON file per room under `<shared dir>/rooms/`.
#[derive(Debug, Clone)]
pub struct FileRoomDirectory {
    dir: PathBuf,
}

impl FileRoomDirectory {
    pub fn new(shared_dir: &Path) -> Self {
        Self {
            dir: shared_dir.join("rooms"),
        }
    }

    fn entry_path(&self, code: &RoomCode) -> PathBuf {
        self.dir.join(format!("{code}.ron"))
    }
}

impl RoomDirectory for FileRoomDirectory {
    fn publish(&self, record: &RoomRecord) -> Result<(), DirectoryError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| DirectoryError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.entry_path(&record.code);
        let serialized = ron::ser::to_string_pretty(record, ron::ser::PrettyConfig::new())?;
        std::fs::write(&path, serialized).map_err(|source| DirectoryError::Io { path, source })?;
        tracing::debug!("Published room {} for {}", record.code, record.host);
        Ok(())
    }

    fn lookup(&self, code: &RoomCode) -> Result<Option<RoomRecord>, DirectoryError> {
        let path = self.entry_path(code);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(DirectoryError::Io { path, source }),
        };
        let record = ron::from_str(&contents).map_err(|source| DirectoryError::Parse { path, source })?;
        Ok(Some(record))
    }
}
