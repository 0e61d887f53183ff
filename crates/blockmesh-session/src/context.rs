//! State shared by the dispatcher and the session operations.

use blockmesh_config::SessionConfig;
use blockmesh_net::PlayerId;
use glam::Vec3;

use crate::chat::ChatLog;
use crate::collab::{AvatarRenderer, Notifier, Speaker};
use crate::players::PlayerDirectory;
use crate::registry::ConnectionRegistry;
use crate::world::WorldMirror;

/// Session tunables, resolved from [`SessionConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Where joiners (and the local player) start.
    pub spawn_position: Vec3,
    /// Fraction of the remaining distance covered per render tick.
    pub interpolation_factor: f32,
    pub max_chat_length: usize,
    pub chat_history: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            spawn_position: Vec3::from_array(config.spawn_position),
            interpolation_factor: config.interpolation_factor.clamp(0.0, 1.0),
            max_chat_length: config.max_chat_length,
            chat_history: config.chat_history,
        }
    }
}

/// Everything a message handler may touch.
pub struct SessionContext {
    pub players: PlayerDirectory,
    pub registry: ConnectionRegistry,
    pub world: Box<dyn WorldMirror>,
    pub renderer: Box<dyn AvatarRenderer>,
    pub notifier: Box<dyn Notifier>,
    pub chat: ChatLog,
    pub settings: SessionSettings,
    /// Players learned about via `playerInfo` that we have no link to yet.
    pub introduced: Vec<PlayerId>,
}

impl SessionContext {
    pub fn local_id(&self) -> &PlayerId {
        self.players.local_id()
    }

    /// Display name for `id`, falling back to the id itself.
    pub fn display_name(&self, id: &PlayerId) -> String {
        self.players
            .get(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Post a system line to the UI and chat history.
    pub fn system_notice(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.notifier.notify(&Speaker::System, &text);
        self.chat.push(Speaker::System, text);
    }

    /// Post a player's chat line to the UI and chat history.
    pub fn player_chat(&mut self, name: String, text: String) {
        let speaker = Speaker::Player(name);
        self.notifier.notify(&speaker, &text);
        self.chat.push(speaker, text);
    }

    pub fn refresh_player_list(&mut self) {
        let summaries = self.players.summaries();
        self.notifier.players_changed(&summaries);
    }

    /// Ask the renderer for a visual if `id` is remote and has none.
    pub fn ensure_visual(&mut self, id: &PlayerId) {
        let Some(record) = self.players.get_mut(id) else {
            return;
        };
        if record.is_local || record.visual.is_some() {
            return;
        }
        let handle = self.renderer.spawn_avatar(
            &record.id,
            &record.name,
            record.color,
            record.displayed_position,
        );
        record.visual = Some(handle);
    }

    /// Forget `id`: drop its record, visual and connection.
    ///
    /// Notifies "`<name>` left" only when a record existed, so a `leave`
    /// followed by the link closing announces the departure once.
    pub fn player_left(&mut self, id: &PlayerId) {
        self.registry.remove(id);
        let Some(record) = self.players.remove(id) else {
            tracing::debug!("Leave for unknown player {id}");
            return;
        };
        if let Some(handle) = record.visual {
            self.renderer.despawn_avatar(handle);
        }
        tracing::info!("{} ({id}) left", record.name);
        self.system_notice(format!("{} left the game", record.name));
        self.refresh_player_list();
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("players", &self.players.len())
            .field("connections", &self.registry.len())
            .field("blocks", &self.world.block_count())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Context for a lone local player with headless collaborators.
#[cfg(test)]
pub(crate) fn test_context(local: &str) -> SessionContext {
    use crate::collab::{HeadlessRenderer, LogNotifier};
    use crate::players::{ColorTag, PlayerRecord};
    use crate::world::BlockWorld;

    let settings = SessionSettings::default();
    let me = PlayerRecord::local(
        PlayerId::new(local),
        "Me".to_string(),
        ColorTag(0xff0000),
        settings.spawn_position,
    );
    SessionContext {
        players: PlayerDirectory::new(me),
        registry: ConnectionRegistry::new(),
        world: Box::new(BlockWorld::new()),
        renderer: Box::new(HeadlessRenderer::new()),
        notifier: Box::new(LogNotifier),
        chat: ChatLog::new(settings.chat_history),
        settings,
        introduced: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = SessionConfig::default();
        config.spawn_position = [1.0, 2.0, 3.0];
        config.interpolation_factor = 4.0;
        let settings = SessionSettings::from(&config);
        assert_eq!(settings.spawn_position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(settings.interpolation_factor, 1.0);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let ctx = test_context("me");
        assert_eq!(ctx.display_name(&PlayerId::new("me")), "Me");
        assert_eq!(ctx.display_name(&PlayerId::new("stranger")), "stranger");
    }

    #[test]
    fn test_player_left_for_unknown_is_silent() {
        let mut ctx = test_context("me");
        ctx.player_left(&PlayerId::new("nobody"));
        assert!(ctx.chat.is_empty());
    }

    #[test]
    fn test_system_notice_recorded() {
        let mut ctx = test_context("me");
        ctx.system_notice("Room created: ABC123");
        assert_eq!(ctx.chat.latest().unwrap().speaker, Speaker::System);
    }
}
