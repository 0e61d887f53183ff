//! Wire messages exchanged between peers.
//!
//! Every message is a JSON object with camelCase fields and a `type`
//! discriminator:
//!
//! ```json
//! {"type":"position","playerId":"player_1_abc","position":{"x":1.0,"y":5.0,"z":2.5},"orientation":{"yaw":0.5,"pitch":-0.1}}
//! ```
//!
//! Use [`WireMessage::encode`] and [`WireMessage::decode`]. Decoding tells a
//! missing discriminator apart from an unknown one and from a payload that
//! does not fit its declared type.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::identity::PlayerId;

/// Every `type` value this protocol understands.
pub const MESSAGE_TYPES: [&str; 6] = [
    "join",
    "playerInfo",
    "position",
    "blockUpdate",
    "chat",
    "leave",
];

// ---------------------------------------------------------------------------
// Payload pieces
// ---------------------------------------------------------------------------

/// A position as it appears on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

/// Avatar look direction in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Kinds of block a peer can place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Grass,
    Dirt,
    Stone,
    Wood,
    Sand,
    Water,
}

impl BlockType {
    /// All block types, in palette order.
    pub const ALL: [BlockType; 6] = [
        BlockType::Grass,
        BlockType::Dirt,
        BlockType::Stone,
        BlockType::Wood,
        BlockType::Sand,
        BlockType::Water,
    ];

    /// Wire name of the block type.
    pub fn name(self) -> &'static str {
        match self {
            BlockType::Grass => "grass",
            BlockType::Dirt => "dirt",
            BlockType::Stone => "stone",
            BlockType::Wood => "wood",
            BlockType::Sand => "sand",
            BlockType::Water => "water",
        }
    }

    /// Parse a wire name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(name))
    }
}

/// One block edit. `blockType` is present exactly when placing.
///
/// `add` is accepted as an alias of `place` on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum BlockEdit {
    #[serde(alias = "add")]
    Place {
        x: i32,
        y: i32,
        z: i32,
        block_type: BlockType,
    },
    Remove { x: i32, y: i32, z: i32 },
}

impl BlockEdit {
    /// Coordinates targeted by the edit.
    pub fn coords(&self) -> (i32, i32, i32) {
        match *self {
            BlockEdit::Place { x, y, z, .. } | BlockEdit::Remove { x, y, z } => (x, y, z),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// A protocol message. The variant is the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WireMessage {
    /// First message on every outbound connection once it opens.
    Join {
        player_id: PlayerId,
        name: String,
        color: u32,
    },
    /// Introduces a player the receiver may not know yet.
    PlayerInfo {
        player_id: PlayerId,
        name: String,
        color: u32,
        position: Point3,
        orientation: Orientation,
    },
    /// Periodic avatar transform.
    Position {
        player_id: PlayerId,
        position: Point3,
        orientation: Orientation,
    },
    /// A block placed or removed by the sender.
    BlockUpdate(BlockEdit),
    /// A chat line.
    Chat {
        player_id: PlayerId,
        name: String,
        text: String,
    },
    /// Sent on orderly shutdown.
    Leave { player_id: PlayerId },
}

impl WireMessage {
    /// The `type` tag this message carries on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            WireMessage::Join { .. } => "join",
            WireMessage::PlayerInfo { .. } => "playerInfo",
            WireMessage::Position { .. } => "position",
            WireMessage::BlockUpdate(_) => "blockUpdate",
            WireMessage::Chat { .. } => "chat",
            WireMessage::Leave { .. } => "leave",
        }
    }

    /// Serialize to JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse JSON bytes, classifying the failure when it does not decode.
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        let value: serde_json::Value =
            serde_json::from_slice(data).map_err(MessageError::Malformed)?;

        let Some(tag) = value.get("type") else {
            return Err(MessageError::MissingType);
        };
        let Some(tag) = tag.as_str() else {
            return Err(MessageError::MissingType);
        };
        if !MESSAGE_TYPES.contains(&tag) {
            return Err(MessageError::UnknownType(tag.to_string()));
        }

        serde_json::from_value(value).map_err(MessageError::Malformed)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an inbound payload could not be turned into a [`WireMessage`].
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload has no string `type` field.
    #[error("message has no type")]
    MissingType,

    /// The `type` field names no known message.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Not JSON, or fields missing or mistyped for the declared type.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
}
