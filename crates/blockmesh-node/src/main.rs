//! Headless blockmesh peer.
//!
//! Hosts or joins a room over TCP and relays console input into the session:
//! plain lines are chat, `/place` and `/remove` edit the shared world, and
//! `/reload` reports edits to `config.ron` made while the node runs.
//!
//! Run with: `cargo run -p blockmesh-node -- --create`

mod commands;
mod reload;
mod wander;

use std::io::BufRead;
use std::net::{IpAddr, SocketAddr};

use blockmesh_config::{CliArgs, Config};
use blockmesh_net::{FrameConfig, Orientation, PeerAddressBook, PlayerId, TcpSignaling, event_channel};
use blockmesh_session::{
    AvatarSource, AvatarTransform, CommandSender, FileRoomDirectory, FixedAvatar, LocalProfile,
    Session, SessionDriver, SessionSettings, command_channel,
};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::commands::{ConsoleInput, HELP, parse_line};
use crate::reload::ConfigWatch;
use crate::wander::RandomWalk;

/// CLI arguments for the node binary.
#[derive(Parser, Debug)]
#[command(name = "blockmesh-node", about = "Headless blockmesh peer")]
struct NodeArgs {
    #[command(flatten)]
    common: CliArgs,

    /// Host a new room and print its code.
    #[arg(long, conflicts_with = "join")]
    create: bool,

    /// Join the room with this code.
    #[arg(long, value_name = "CODE")]
    join: Option<String>,

    /// Walk the avatar around instead of standing at spawn.
    #[arg(long)]
    wander: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = NodeArgs::parse();

    let config_dir = match &args.common.config {
        Some(dir) => dir.clone(),
        None => Config::default_dir()?,
    };
    let mut config = Config::load_or_create(&config_dir)?;
    let config_watch = ConfigWatch::new(config_dir.clone(), config.clone());
    config.apply_cli_overrides(&args.common);

    blockmesh_log::init_logging(
        config.debug.log_dir.as_deref(),
        cfg!(debug_assertions),
        Some(&config),
    );

    let shared_dir = config.network.resolved_shared_dir();
    let local_id = PlayerId::generate();
    let ip: IpAddr = config.network.listen_address.parse()?;
    let bind_addr = SocketAddr::new(ip, config.network.listen_port);
    info!("blockmesh node {local_id}");
    info!("Shared directory: {}", shared_dir.display());

    let (events_tx, events_rx) = event_channel();
    let signaling = TcpSignaling::open(
        local_id,
        bind_addr,
        PeerAddressBook::new(&shared_dir),
        events_tx,
        FrameConfig {
            max_payload_size: config.network.max_frame_bytes,
        },
    )
    .await?;

    let settings = SessionSettings::from(&config.session);
    let spawn = settings.spawn_position;
    let mut session = Session::new(
        Box::new(signaling),
        LocalProfile::from_config(&config.player),
        settings,
    );

    let rooms = FileRoomDirectory::new(&shared_dir);
    if args.create {
        let code = session.create_room(&rooms)?;
        println!("Room code: {code}");
    } else if let Some(code) = &args.join {
        if !session.join_room(code, &rooms) {
            return Err(format!("could not join room {code}").into());
        }
    }

    let avatar: Box<dyn AvatarSource> = if args.wander {
        Box::new(RandomWalk::new(spawn))
    } else {
        Box::new(FixedAvatar(AvatarTransform {
            position: spawn,
            orientation: Orientation::default(),
        }))
    };

    let (cmd_tx, cmd_rx) = command_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_console(cmd_tx, config_watch, shutdown_tx.clone());

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            let _ = signal_tx.send(true);
        }
    });

    let driver = SessionDriver::new(session, events_rx, cmd_rx, avatar, &config.session);
    let session = driver.run(shutdown_rx).await;
    drop(shutdown_tx);

    info!(
        "Left with {} block(s) in the world",
        session.world().block_count()
    );
    Ok(())
}

/// Read console lines on a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_console(commands: CommandSender, mut config: ConfigWatch, shutdown: watch::Sender<bool>) {
    let reader = move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Console read failed: {e}");
                    return;
                }
            };
            match parse_line(&line) {
                Some(ConsoleInput::Command(cmd)) => {
                    if commands.send(cmd).is_err() {
                        return;
                    }
                }
                Some(ConsoleInput::Help) => println!("{HELP}"),
                Some(ConsoleInput::Reload) => match config.check() {
                    Ok(changed) if changed.is_empty() => println!("config.ron unchanged"),
                    Ok(changed) => {
                        info!("config.ron changed: {}", changed.join(", "));
                        println!("Changed sections: {}; restart to apply", changed.join(", "));
                    }
                    Err(e) => warn!("Reload failed: {e}"),
                },
                Some(ConsoleInput::Invalid(message)) => eprintln!("{message}"),
                Some(ConsoleInput::Quit) => {
                    let _ = shutdown.send(true);
                    return;
                }
                None => {}
            }
        }
    };
    if let Err(e) = std::thread::Builder::new()
        .name("console".to_string())
        .spawn(reader)
    {
        warn!("Console input unavailable: {e}");
    }
}
