//! Async loop feeding a [`Session`] from the transport, local input and timers.

use std::time::Duration;

use blockmesh_config::SessionConfig;
use blockmesh_net::{BlockType, EventReceiver};
use glam::IVec3;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

use crate::collab::AvatarSource;
use crate::session::Session;

/// Something the local player asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalCommand {
    Chat(String),
    Place { pos: IVec3, block: BlockType },
    Remove { pos: IVec3 },
    ListPlayers,
}

pub type CommandSender = mpsc::UnboundedSender<LocalCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<LocalCommand>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

/// Period for a rate in Hz; zero is treated as 1 Hz.
fn period(rate_hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(rate_hz.max(1)))
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Owns a session and everything that drives it.
pub struct SessionDriver {
    session: Session,
    events: EventReceiver,
    commands: CommandReceiver,
    avatar: Box<dyn AvatarSource>,
    sync_period: Duration,
    render_period: Duration,
}

impl SessionDriver {
    pub fn new(
        session: Session,
        events: EventReceiver,
        commands: CommandReceiver,
        avatar: Box<dyn AvatarSource>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            session,
            events,
            commands,
            avatar,
            sync_period: period(config.sync_rate_hz),
            render_period: period(config.render_rate_hz),
        }
    }

    /// Run until `shutdown` flips to `true` or the event source goes away,
    /// then say goodbye to every peer and hand the session back.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Session {
        let Self {
            mut session,
            mut events,
            mut commands,
            mut avatar,
            sync_period,
            render_period,
        } = self;

        let mut sync = ticker(sync_period);
        let mut render = ticker(render_period);
        let mut commands_open = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => session.handle_event(event),
                    None => {
                        tracing::warn!("Transport event channel closed");
                        break;
                    }
                },
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => apply_command(&mut session, cmd),
                    None => commands_open = false,
                },
                _ = sync.tick() => {
                    session.sync_tick(avatar.as_mut());
                }
                _ = render.tick() => session.render_tick(),
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        session.shutdown();
        session
    }
}

fn apply_command(session: &mut Session, cmd: LocalCommand) {
    match cmd {
        LocalCommand::Chat(text) => {
            session.send_chat(&text);
        }
        LocalCommand::Place { pos, block } => session.place_block(pos, block),
        LocalCommand::Remove { pos } => session.remove_block(pos),
        LocalCommand::ListPlayers => session.announce_players(),
    }
}
