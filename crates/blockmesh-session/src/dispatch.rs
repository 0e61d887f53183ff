//! Message dispatch: what each inbound message does to local state.
//!
//! [`Dispatcher`] holds the behavior every peer shares. The host wraps it in
//! [`HostFanout`], which additionally introduces a joiner to everyone already
//! in the room. Nothing here orders messages: whatever arrives last wins.

use blockmesh_net::{PlayerId, WireMessage};
use glam::Vec3;

use crate::context::SessionContext;
use crate::players::{ColorTag, PlayerRecord};
use crate::world::apply_remote_edit;

/// Applies one decoded message from `from` to the session.
pub trait Dispatch: Send {
    fn dispatch(&self, ctx: &mut SessionContext, from: &PlayerId, msg: WireMessage);
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Handlers shared by host and members.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

impl Dispatcher {
    fn on_join(ctx: &mut SessionContext, player_id: PlayerId, name: String, color: u32) {
        if player_id == *ctx.local_id() {
            tracing::warn!("Ignoring join that claims the local identity");
            return;
        }
        let spawn = ctx.settings.spawn_position;
        let mut record = PlayerRecord::remote(player_id.clone(), name, ColorTag::from_rgb(color), spawn);
        if let Some(previous) = ctx.players.get(&player_id) {
            // Duplicate join: overwrite, but keep the avatar we already drew.
            record.visual = previous.visual;
            record.displayed_position = previous.displayed_position;
        }
        tracing::info!("{} ({player_id}) joined", record.name);
        let joined = format!("{} joined the game", record.name);
        ctx.players.upsert(record);
        ctx.ensure_visual(&player_id);
        ctx.system_notice(joined);
        ctx.refresh_player_list();
    }

    fn on_player_info(
        ctx: &mut SessionContext,
        player_id: PlayerId,
        name: String,
        color: u32,
        position: Vec3,
        orientation: blockmesh_net::Orientation,
    ) {
        if ctx.players.contains(&player_id) {
            return;
        }
        let mut record = PlayerRecord::remote(player_id.clone(), name, ColorTag::from_rgb(color), position);
        record.orientation = orientation;
        tracing::debug!("Learned about {} ({player_id})", record.name);
        ctx.players.upsert(record);
        ctx.ensure_visual(&player_id);
        ctx.refresh_player_list();

        if !ctx.registry.contains(&player_id) {
            ctx.introduced.push(player_id);
        }
    }

    fn on_position(
        ctx: &mut SessionContext,
        player_id: &PlayerId,
        position: Vec3,
        orientation: blockmesh_net::Orientation,
    ) {
        match ctx.players.get_mut(player_id) {
            Some(record) if !record.is_local => {
                record.position = position;
                record.orientation = orientation;
            }
            Some(_) => tracing::debug!("Ignoring position that claims the local identity"),
            None => tracing::trace!("Position for unknown player {player_id}"),
        }
    }

    fn on_chat(ctx: &mut SessionContext, player_id: &PlayerId, name: String, text: String) {
        let speaker = ctx
            .players
            .get(player_id)
            .map(|r| r.name.clone())
            .unwrap_or(name);
        ctx.player_chat(speaker, text);
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&self, ctx: &mut SessionContext, from: &PlayerId, msg: WireMessage) {
        tracing::trace!("{} from {from}", msg.type_name());
        match msg {
            WireMessage::Join {
                player_id,
                name,
                color,
            } => Self::on_join(ctx, player_id, name, color),
            WireMessage::PlayerInfo {
                player_id,
                name,
                color,
                position,
                orientation,
            } => Self::on_player_info(ctx, player_id, name, color, position.into(), orientation),
            WireMessage::Position {
                player_id,
                position,
                orientation,
            } => Self::on_position(ctx, &player_id, position.into(), orientation),
            WireMessage::BlockUpdate(edit) => apply_remote_edit(ctx.world.as_mut(), edit),
            WireMessage::Chat {
                player_id,
                name,
                text,
            } => Self::on_chat(ctx, &player_id, name, text),
            WireMessage::Leave { player_id } if player_id != *from => {
                tracing::debug!("Ignoring leave from {from} that names {player_id}");
            }
            WireMessage::Leave { player_id } => ctx.player_left(&player_id),
        }
    }
}

// ---------------------------------------------------------------------------
// HostFanout
// ---------------------------------------------------------------------------

/// Host decorator: on `join`, introduce the joiner to the room and the room
/// to the joiner.
///
/// The joiner gets one `playerInfo` per known player (host included, joiner
/// excluded); every other open connection gets `playerInfo` for the joiner.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFanout<D> {
    inner: D,
}

impl<D: Dispatch> HostFanout<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    fn fan_out_join(ctx: &mut SessionContext, from: &PlayerId, joiner: &PlayerId) {
        if joiner == ctx.local_id() {
            return;
        }
        let roster: Vec<WireMessage> = ctx
            .players
            .iter()
            .filter(|r| r.id != *joiner && r.id != *from)
            .map(PlayerRecord::info_message)
            .collect();
        for info in &roster {
            if let Err(e) = ctx.registry.send_to(from, info) {
                tracing::warn!("Could not introduce room to {from}: {e}");
                break;
            }
        }

        let Some(joiner_info) = ctx.players.get(joiner).map(PlayerRecord::info_message) else {
            return;
        };
        let sent = ctx.registry.broadcast(&joiner_info, Some(from));
        tracing::debug!(
            "Introduced {joiner} to {sent} peer(s) and {} player(s) to {joiner}",
            roster.len()
        );
    }
}

impl<D: Dispatch> Dispatch for HostFanout<D> {
    fn dispatch(&self, ctx: &mut SessionContext, from: &PlayerId, msg: WireMessage) {
        let joiner = match &msg {
            WireMessage::Join { player_id, .. } => Some(player_id.clone()),
            _ => None,
        };
        self.inner.dispatch(ctx, from, msg);

        if let Some(joiner) = joiner {
            if joiner != *from {
                tracing::warn!("Join from connection {from} names {joiner}");
            }
            Self::fan_out_join(ctx, from, &joiner);
        }
    }
}
