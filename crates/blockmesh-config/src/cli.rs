//! Command-line argument parsing for blockmesh peers.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Shared blockmesh command-line arguments.
///
/// CLI values override settings loaded from `config.ron`. Binaries embed this
/// with `#[command(flatten)]`.
#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    /// Display name.
    #[arg(long)]
    pub name: Option<String>,

    /// Listener port (0 for ephemeral).
    #[arg(long)]
    pub port: Option<u16>,

    /// Listener bind address.
    #[arg(long)]
    pub listen: Option<String>,

    /// Shared directory for rooms and peer addresses.
    #[arg(long)]
    pub shared_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref name) = args.name {
            self.player.name = name.clone();
        }
        if let Some(port) = args.port {
            self.network.listen_port = port;
        }
        if let Some(ref addr) = args.listen {
            self.network.listen_address = addr.clone();
        }
        if let Some(ref dir) = args.shared_dir {
            self.network.shared_dir = Some(dir.clone());
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            name: Some("Steve".to_string()),
            port: Some(9100),
            shared_dir: Some(PathBuf::from("/tmp/mesh")),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.player.name, "Steve");
        assert_eq!(config.network.listen_port, 9100);
        assert_eq!(config.network.shared_dir, Some(PathBuf::from("/tmp/mesh")));
        // Non-overridden fields retain defaults
        assert_eq!(config.network.listen_address, "127.0.0.1");
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }
}
