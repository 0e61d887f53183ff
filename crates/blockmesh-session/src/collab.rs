//! Seams to the systems around the session: the renderer, the UI, and the
//! local avatar controller. Headless implementations are provided for the
//! node binary and tests.

use std::collections::HashMap;

use blockmesh_net::{Orientation, PlayerId};
use glam::Vec3;

use crate::players::{ColorTag, PlayerSummary, VisualHandle};

/// Local avatar transform as reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvatarTransform {
    pub position: Vec3,
    pub orientation: Orientation,
}

/// The local avatar controller.
pub trait AvatarSource: Send {
    /// Current transform, or `None` when the player is not actively
    /// controlling the avatar (menus open, pointer unlocked).
    fn transform(&mut self) -> Option<AvatarTransform>;
}

/// An avatar that never moves and is always under control.
#[derive(Debug, Clone, Copy)]
pub struct FixedAvatar(pub AvatarTransform);

impl AvatarSource for FixedAvatar {
    fn transform(&mut self) -> Option<AvatarTransform> {
        Some(self.0)
    }
}

/// An avatar nobody is controlling.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleAvatar;

impl AvatarSource for IdleAvatar {
    fn transform(&mut self) -> Option<AvatarTransform> {
        None
    }
}

/// Draws remote players.
pub trait AvatarRenderer: Send {
    fn spawn_avatar(&mut self, id: &PlayerId, name: &str, color: ColorTag, position: Vec3) -> VisualHandle;

    fn move_avatar(&mut self, handle: VisualHandle, position: Vec3, orientation: Orientation);

    fn despawn_avatar(&mut self, handle: VisualHandle);
}

/// Who a notification is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speaker {
    System,
    Player(String),
}

/// The UI surface: chat/notification feed and the player list.
pub trait Notifier: Send {
    fn notify(&mut self, speaker: &Speaker, text: &str);

    fn players_changed(&mut self, players: &[PlayerSummary]);
}

// ---------------------------------------------------------------------------
// Headless implementations
// ---------------------------------------------------------------------------

/// Renderer that only tracks where avatars would be drawn.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_handle: u64,
    avatars: HashMap<VisualHandle, Vec3>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.avatars.len()
    }

    pub fn position_of(&self, handle: VisualHandle) -> Option<Vec3> {
        self.avatars.get(&handle).copied()
    }
}

impl AvatarRenderer for HeadlessRenderer {
    fn spawn_avatar(&mut self, id: &PlayerId, name: &str, color: ColorTag, position: Vec3) -> VisualHandle {
        self.next_handle += 1;
        let handle = VisualHandle(self.next_handle);
        self.avatars.insert(handle, position);
        tracing::debug!("Spawned avatar {handle:?} for {name} ({id}, {color})");
        handle
    }

    fn move_avatar(&mut self, handle: VisualHandle, position: Vec3, _orientation: Orientation) {
        if let Some(slot) = self.avatars.get_mut(&handle) {
            *slot = position;
        }
    }

    fn despawn_avatar(&mut self, handle: VisualHandle) {
        self.avatars.remove(&handle);
        tracing::debug!("Despawned avatar {handle:?}");
    }
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, speaker: &Speaker, text: &str) {
        match speaker {
            Speaker::System => tracing::info!(target: "blockmesh::chat", "* {text}"),
            Speaker::Player(name) => tracing::info!(target: "blockmesh::chat", "<{name}> {text}"),
        }
    }

    fn players_changed(&mut self, players: &[PlayerSummary]) {
        let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
        tracing::info!(target: "blockmesh::players", "{} online: {}", players.len(), names.join(", "));
    }
}
