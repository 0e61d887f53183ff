//! Length-prefixed framing for peer TCP streams.
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   JSON payload     |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length excludes the prefix itself. The first frame a dialer writes is a
//! [`Handshake`] naming its identity; every later frame is one wire message.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::identity::PlayerId;

/// Frame size limit shared by both directions of a link.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload accepted or sent, in bytes. Default: 1 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576,
        }
    }
}

impl FrameConfig {
    fn check(&self, size: u64) -> Result<(), FrameError> {
        if size > u64::from(self.max_payload_size) {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds limit of {max}")]
    PayloadTooLarge { size: u64, max: u32 },

    /// The peer closed the stream before a complete frame arrived.
    #[error("peer closed the stream")]
    ConnectionClosed,

    /// The handshake frame was not `{"identity": ...}`.
    #[error("bad handshake: {0}")]
    BadHandshake(#[source] serde_json::Error),

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),
}

/// First frame on every TCP link, sent by the dialing side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub identity: PlayerId,
}

fn closed_on_eof(e: std::io::Error) -> FrameError {
    if e.kind() == ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame. An oversized length is refused before the body is read.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let len = reader.read_u32_le().await.map_err(closed_on_eof)?;
    config.check(u64::from(len))?;

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(closed_on_eof)?;
    Ok(payload)
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    config.check(payload.len() as u64)?;
    writer.write_u32_le(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Write the dialer's handshake frame.
pub async fn write_handshake<W: AsyncWrite + Unpin>(
    writer: &mut W,
    identity: &PlayerId,
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let payload = serde_json::to_vec(&Handshake {
        identity: identity.clone(),
    })
    .map_err(FrameError::BadHandshake)?;
    write_frame(writer, &payload, config).await
}

/// Read the handshake frame and return the dialer's identity.
pub async fn read_handshake<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<PlayerId, FrameError> {
    let payload = read_frame(reader, config).await?;
    let handshake: Handshake =
        serde_json::from_slice(&payload).map_err(FrameError::BadHandshake)?;
    Ok(handshake.identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::WireMessage;
    use tokio::io::duplex;

    fn limit(max_payload_size: u32) -> FrameConfig {
        FrameConfig { max_payload_size }
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (mut a, mut b) = duplex(8192);
        let config = FrameConfig::default();
        let sent = [
            WireMessage::Leave {
                player_id: PlayerId::new("a"),
            },
            WireMessage::Chat {
                player_id: PlayerId::new("a"),
                name: "A".to_string(),
                text: "bye".to_string(),
            },
        ];

        for msg in &sent {
            write_frame(&mut a, &msg.encode().unwrap(), &config).await.unwrap();
        }
        for expected in &sent {
            let payload = read_frame(&mut b, &config).await.unwrap();
            assert_eq!(&WireMessage::decode(&payload).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_wire_layout() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, b"{}", &FrameConfig::default()).await.unwrap();
        drop(a);

        let mut raw = Vec::new();
        b.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw, [2, 0, 0, 0, b'{', b'}']);
    }

    #[tokio::test]
    async fn test_frame_larger_than_pipe_buffer() {
        // An 8-byte pipe forces the reader to assemble the frame piecewise.
        let (mut a, mut b) = duplex(8);
        let body = br#"{"type":"leave","playerId":"player_1_abcdefghi"}"#;

        let writer = tokio::spawn(async move {
            write_frame(&mut a, body, &FrameConfig::default()).await.unwrap();
        });
        let received = read_frame(&mut b, &FrameConfig::default()).await.unwrap();
        writer.await.unwrap();
        assert_eq!(received, body);
    }

    #[tokio::test]
    async fn test_oversize_length_refused_before_body() {
        let (mut a, mut b) = duplex(64);
        a.write_u32_le(1 << 20).await.unwrap();

        let err = read_frame(&mut b, &limit(64)).await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size, max: 64 } if size == 1 << 20));
    }

    #[tokio::test]
    async fn test_oversize_payload_not_sent() {
        let (mut a, _b) = duplex(256);
        let err = write_frame(&mut a, &[7u8; 65], &limit(64)).await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 65, max: 64 }));
        assert!(write_frame(&mut a, &[7u8; 64], &limit(64)).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, &[], &FrameConfig::default()).await.unwrap();
        assert!(read_frame(&mut b, &FrameConfig::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (a, mut b) = duplex(64);
        drop(a);
        let err = read_frame(&mut b, &FrameConfig::default()).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));

        let (mut a, mut b) = duplex(64);
        a.write_u32_le(10).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        let err = read_frame(&mut b, &FrameConfig::default()).await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_handshake_names_dialer() {
        let (mut a, mut b) = duplex(8192);
        let config = FrameConfig::default();
        let me = PlayerId::new("player_7_zzzzzzzzz");

        write_handshake(&mut a, &me, &config).await.unwrap();
        let raw = read_frame(&mut b, &config).await.unwrap();
        assert_eq!(raw, br#"{"identity":"player_7_zzzzzzzzz"}"#);

        write_handshake(&mut a, &me, &config).await.unwrap();
        assert_eq!(read_handshake(&mut b, &config).await.unwrap(), me);
    }

    #[tokio::test]
    async fn test_message_in_place_of_handshake_rejected() {
        let (mut a, mut b) = duplex(8192);
        let config = FrameConfig::default();

        write_frame(&mut a, br#"{"type":"join"}"#, &config).await.unwrap();
        let err = read_handshake(&mut b, &config).await.unwrap_err();
        assert!(matches!(err, FrameError::BadHandshake(_)));
    }
}
