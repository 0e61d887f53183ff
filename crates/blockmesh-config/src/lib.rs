//! Configuration system for blockmesh peers.
//!
//! Settings persist to disk as `config.ron`. CLI flags (via clap) override
//! loaded values, and [`Config::reload`] reports on-disk changes.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    COLOR_PALETTE, Config, DebugConfig, NetworkConfig, PlayerConfig, SessionConfig,
};
pub use error::ConfigError;
