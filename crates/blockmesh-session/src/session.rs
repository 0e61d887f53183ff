//! The session: one owned value holding every piece of peer state.
//!
//! All inputs (transport events, local actions, timer ticks) are applied one
//! at a time through `&mut self`. Nothing here blocks or spawns; the
//! [`SessionDriver`](crate::driver::SessionDriver) feeds it from async land.
//!
//! # Topology
//!
//! The host is only special while someone joins: it answers a `join` with the
//! room roster and introduces the joiner to everyone else. After that, state
//! flows peer-to-peer over a full mesh. When a `playerInfo` names a peer we
//! have no link to, the side whose identity sorts lower dials, so each pair
//! ends up with exactly one link. Only the link to the host sends `join`; a mesh
//! link opens with the dialer's own `playerInfo`.

use blockmesh_config::PlayerConfig;
use blockmesh_net::{
    BlockType, ConnectionId, Direction, Orientation, PeerEvent, PlayerId, Signaling, WireMessage,
};
use glam::{IVec3, Vec3};

use crate::chat::{ChatLog, ChatRejection, validate_chat_message};
use crate::collab::{AvatarRenderer, AvatarSource, HeadlessRenderer, LogNotifier, Notifier};
use crate::context::{SessionContext, SessionSettings};
use crate::dispatch::{Dispatch, Dispatcher, HostFanout};
use crate::error::SessionError;
use crate::players::{ColorTag, PlayerDirectory, PlayerRecord};
use crate::registry::ConnectionRegistry;
use crate::room::{RoomCode, RoomDirectory, RoomRecord};
use crate::world::{BlockWorld, WorldMirror};

/// Whether and how this peer is in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Solo,
    Host(RoomCode),
    Member(RoomCode),
}

/// Who the local player is.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalProfile {
    pub name: String,
    pub color: ColorTag,
}

impl LocalProfile {
    /// Profile from config; an unset color is drawn from the palette.
    pub fn from_config(config: &PlayerConfig) -> Self {
        let name = match config.name.trim() {
            "" => "Player".to_string(),
            name => name.to_string(),
        };
        Self {
            name,
            color: config.color.map(ColorTag::from_rgb).unwrap_or_else(ColorTag::random),
        }
    }
}

/// Round to `places` decimal places, half away from zero.
pub fn round_to(value: f32, places: i32) -> f32 {
    let scale = 10f32.powi(places);
    (value * scale).round() / scale
}

/// One peer's view of the shared session.
pub struct Session {
    ctx: SessionContext,
    dispatcher: Box<dyn Dispatch>,
    signaling: Box<dyn Signaling>,
    role: Role,
    /// Outbound link to the host whose `join` has not been sent yet.
    pending_join: Option<ConnectionId>,
}

impl Session {
    /// A solo session with an empty in-memory world and headless collaborators.
    pub fn new(signaling: Box<dyn Signaling>, profile: LocalProfile, settings: SessionSettings) -> Self {
        let local_id = signaling.local_id().clone();
        let me = PlayerRecord::local(local_id, profile.name, profile.color, settings.spawn_position);

        let ctx = SessionContext {
            players: PlayerDirectory::new(me),
            registry: ConnectionRegistry::new(),
            world: Box::new(BlockWorld::new()),
            renderer: Box::new(HeadlessRenderer::new()),
            notifier: Box::new(LogNotifier),
            chat: ChatLog::new(settings.chat_history),
            settings,
            introduced: Vec::new(),
        };
        Self {
            ctx,
            dispatcher: Box::new(Dispatcher),
            signaling,
            role: Role::Solo,
            pending_join: None,
        }
    }

    pub fn with_world(mut self, world: Box<dyn WorldMirror>) -> Self {
        self.ctx.world = world;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn AvatarRenderer>) -> Self {
        self.ctx.renderer = renderer;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.ctx.notifier = notifier;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn local_id(&self) -> &PlayerId {
        self.ctx.local_id()
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn players(&self) -> &PlayerDirectory {
        &self.ctx.players
    }

    pub fn world(&self) -> &dyn WorldMirror {
        self.ctx.world.as_ref()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.ctx.chat
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.ctx.registry
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.ctx.settings
    }

    /// Whether we are waiting for the link to the host to open.
    pub fn is_join_pending(&self) -> bool {
        self.pending_join.is_some()
    }

    // -----------------------------------------------------------------------
    // Room bootstrap
    // -----------------------------------------------------------------------

    /// Publish a new room hosted by this peer and return its code.
    pub fn create_room(&mut self, directory: &dyn RoomDirectory) -> Result<RoomCode, SessionError> {
        if let Role::Host(code) | Role::Member(code) = &self.role {
            return Err(SessionError::AlreadyInRoom(code.clone()));
        }
        let code = RoomCode::generate();
        directory.publish(&RoomRecord::new(code.clone(), self.local_id().clone()))?;

        self.dispatcher = Box::new(HostFanout::new(Dispatcher));
        self.role = Role::Host(code.clone());
        tracing::info!("Hosting room {code}");
        self.ctx.system_notice(format!("Room created: {code}"));
        Ok(code)
    }

    /// Join the room published under `code`.
    ///
    /// Returns `false` (after notifying) when the room is unknown or the host
    /// cannot be dialed. On `true` the link is registered but `join` is only
    /// sent once it reports open.
    pub fn join_room(&mut self, code: &str, directory: &dyn RoomDirectory) -> bool {
        match self.try_join_room(code, directory) {
            Ok(code) => {
                self.ctx.system_notice(format!("Joining room {code}..."));
                true
            }
            Err(e @ SessionError::ConnectionFailure { .. }) => {
                tracing::warn!("Join failed: {e}");
                self.ctx.system_notice(format!("Could not reach the host: {e}"));
                false
            }
            Err(e) => {
                tracing::info!("Join failed: {e}");
                self.ctx.system_notice(format!("Could not join: {e}"));
                false
            }
        }
    }

    fn try_join_room(&mut self, input: &str, directory: &dyn RoomDirectory) -> Result<RoomCode, SessionError> {
        if let Role::Host(code) | Role::Member(code) = &self.role {
            return Err(SessionError::AlreadyInRoom(code.clone()));
        }
        let code = RoomCode::parse(input).ok_or_else(|| SessionError::RoomNotFound(input.trim().to_string()))?;
        let record = directory
            .lookup(&code)?
            .ok_or_else(|| SessionError::RoomNotFound(code.to_string()))?;
        if record.host == *self.local_id() {
            return Err(SessionError::RoomNotFound(code.to_string()));
        }

        let conn = self
            .signaling
            .connect(&record.host)
            .map_err(|source| SessionError::ConnectionFailure {
                peer: record.host.clone(),
                source,
            })?;
        tracing::info!("Dialing host {} for room {code}", record.host);
        self.pending_join = Some(conn.id());
        self.ctx.registry.register(conn);
        self.role = Role::Member(code.clone());
        Ok(code)
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Incoming(conn) => {
                tracing::info!("Incoming connection {} from {}", conn.id(), conn.remote());
                self.ctx.registry.register(conn);
            }
            PeerEvent::Opened { connection, peer } => self.on_opened(connection, &peer),
            PeerEvent::Message {
                connection,
                peer,
                payload,
            } => self.on_message(connection, &peer, &payload),
            PeerEvent::Closed { connection, peer } => {
                if self.ctx.registry.remove_current(&peer, connection).is_none() {
                    tracing::debug!("Ignoring close of stale connection {connection} to {peer}");
                    return;
                }
                self.clear_pending_join(connection);
                self.ctx.player_left(&peer);
            }
            PeerEvent::Failed {
                connection,
                peer,
                reason,
            } => {
                if self.ctx.registry.remove_current(&peer, connection).is_none() {
                    tracing::debug!("Ignoring failure of stale connection {connection} to {peer}");
                    return;
                }
                let name = self.ctx.display_name(&peer);
                tracing::warn!("Connection {connection} to {name} failed: {reason}");
                self.ctx
                    .system_notice(format!("Connection to {name} failed: {reason}"));
                if self.clear_pending_join(connection) {
                    self.role = Role::Solo;
                }
                self.ctx.player_left(&peer);
            }
        }
    }

    fn clear_pending_join(&mut self, connection: ConnectionId) -> bool {
        if self.pending_join == Some(connection) {
            self.pending_join = None;
            true
        } else {
            false
        }
    }

    fn on_opened(&mut self, connection: ConnectionId, peer: &PlayerId) {
        let Some(conn) = self.ctx.registry.get(peer) else {
            tracing::debug!("Opened event for unregistered peer {peer}");
            return;
        };
        if conn.id() != connection {
            tracing::debug!("Ignoring open of stale connection {connection} to {peer}");
            return;
        }
        if conn.direction() != Direction::Outbound {
            return;
        }

        if self.clear_pending_join(connection) {
            let join = {
                let me = self.ctx.players.local();
                WireMessage::Join {
                    player_id: self.local_id().clone(),
                    name: me.map(|r| r.name.clone()).unwrap_or_default(),
                    color: me.map(|r| r.color.0).unwrap_or_default(),
                }
            };
            match self.ctx.registry.send_to(peer, &join) {
                Ok(()) => tracing::info!("Sent join to {peer}"),
                Err(e) => tracing::warn!("Could not send join to {peer}: {e}"),
            }
            self.ctx.system_notice("Connected to host");
            return;
        }

        // Mesh link: the peer already knows us from the host, so only
        // refresh our record instead of joining a second time.
        let Some(intro) = self.ctx.players.local().map(PlayerRecord::info_message) else {
            return;
        };
        match self.ctx.registry.send_to(peer, &intro) {
            Ok(()) => tracing::debug!("Introduced ourselves to {peer}"),
            Err(e) => tracing::warn!("Could not introduce ourselves to {peer}: {e}"),
        }
    }

    fn on_message(&mut self, connection: ConnectionId, peer: &PlayerId, payload: &[u8]) {
        if !self.ctx.registry.is_current(peer, connection) {
            tracing::debug!("Dropping message on stale connection {connection} from {peer}");
            return;
        }
        let msg = match WireMessage::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Ignoring message from {peer}: {e}");
                return;
            }
        };
        self.dispatcher.dispatch(&mut self.ctx, peer, msg);
        self.connect_introduced();
    }

    /// Dial peers we learned about and are responsible for dialing.
    fn connect_introduced(&mut self) {
        for peer in std::mem::take(&mut self.ctx.introduced) {
            if self.ctx.registry.contains(&peer) || !self.ctx.players.contains(&peer) {
                continue;
            }
            if *self.local_id() > peer {
                tracing::debug!("Waiting for {peer} to dial us");
                continue;
            }
            match self.signaling.connect(&peer) {
                Ok(conn) => {
                    tracing::info!("Dialing mesh peer {peer}");
                    self.ctx.registry.register(conn);
                }
                Err(e) => tracing::warn!("Could not dial mesh peer {peer}: {e}"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Local actions
    // -----------------------------------------------------------------------

    /// Send a chat line to everyone. Returns whether it was sent.
    pub fn send_chat(&mut self, text: &str) -> bool {
        let text = match validate_chat_message(text, self.ctx.settings.max_chat_length) {
            Ok(text) => text.to_string(),
            Err(ChatRejection::Empty) => return false,
            Err(ChatRejection::TooLong { len, max }) => {
                self.ctx
                    .system_notice(format!("Message too long ({len} characters, limit {max})"));
                return false;
            }
        };
        let name = self
            .ctx
            .players
            .local()
            .map(|r| r.name.clone())
            .unwrap_or_default();
        let msg = WireMessage::Chat {
            player_id: self.local_id().clone(),
            name: name.clone(),
            text: text.clone(),
        };
        self.ctx.registry.broadcast(&msg, None);
        self.ctx.player_chat(name, text);
        true
    }

    /// Place a block locally and publish the edit.
    pub fn place_block(&mut self, pos: IVec3, block: BlockType) {
        if let Some(edit) = self.ctx.world.place_block_at(pos, block, true) {
            self.ctx.registry.broadcast(&WireMessage::BlockUpdate(edit), None);
        }
    }

    /// Remove a block locally and publish the edit if there was one.
    pub fn remove_block(&mut self, pos: IVec3) {
        if let Some(edit) = self.ctx.world.remove_block_at(pos, true) {
            self.ctx.registry.broadcast(&WireMessage::BlockUpdate(edit), None);
        }
    }

    /// Post the current player list as a system notice.
    pub fn announce_players(&mut self) {
        let names: Vec<String> = self
            .ctx
            .players
            .summaries()
            .into_iter()
            .map(|p| if p.is_local { format!("{} (you)", p.name) } else { p.name })
            .collect();
        self.ctx
            .system_notice(format!("{} online: {}", names.len(), names.join(", ")));
        self.ctx.refresh_player_list();
    }

    // -----------------------------------------------------------------------
    // Ticks
    // -----------------------------------------------------------------------

    /// Publish the local avatar's transform. Returns whether anything was sent.
    ///
    /// Position is rounded to one decimal and orientation to two.
    pub fn sync_tick(&mut self, avatar: &mut dyn AvatarSource) -> bool {
        let Some(transform) = avatar.transform() else {
            return false;
        };
        let position = Vec3::new(
            round_to(transform.position.x, 1),
            round_to(transform.position.y, 1),
            round_to(transform.position.z, 1),
        );
        let orientation = Orientation {
            yaw: round_to(transform.orientation.yaw, 2),
            pitch: round_to(transform.orientation.pitch, 2),
        };
        if let Some(me) = self.ctx.players.local_mut() {
            me.position = position;
            me.displayed_position = position;
            me.orientation = orientation;
        }
        let msg = WireMessage::Position {
            player_id: self.local_id().clone(),
            position: position.into(),
            orientation,
        };
        self.ctx.registry.broadcast(&msg, None);
        true
    }

    /// Move every remote avatar a step toward its last reported position.
    pub fn render_tick(&mut self) {
        let factor = self.ctx.settings.interpolation_factor;
        let SessionContext {
            players, renderer, ..
        } = &mut self.ctx;
        for record in players.remotes_mut() {
            record.displayed_position = record.displayed_position.lerp(record.position, factor);
            if let Some(handle) = record.visual {
                renderer.move_avatar(handle, record.displayed_position, record.orientation);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Say goodbye, close every link, and forget remote players.
    pub fn shutdown(&mut self) {
        let leave = WireMessage::Leave {
            player_id: self.local_id().clone(),
        };
        let sent = self.ctx.registry.broadcast(&leave, None);
        self.ctx.registry.close_all();
        for record in self.ctx.players.drain_remotes() {
            if let Some(handle) = record.visual {
                self.ctx.renderer.despawn_avatar(handle);
            }
        }
        self.ctx.refresh_player_list();
        tracing::info!("Session closed, said goodbye to {sent} peer(s)");

        self.role = Role::Solo;
        self.pending_join = None;
        self.dispatcher = Box::new(Dispatcher);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local", self.local_id())
            .field("role", &self.role)
            .field("pending_join", &self.pending_join)
            .field("ctx", &self.ctx)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
