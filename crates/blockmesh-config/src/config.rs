//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Avatar colors a player is assigned from when none is configured.
pub const COLOR_PALETTE: [u32; 6] = [0xff0000, 0x00ff00, 0x0000ff, 0xffff00, 0xff00ff, 0x00ffff];

/// Top-level peer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Local player settings.
    pub player: PlayerConfig,
    /// Transport and discovery settings.
    pub network: NetworkConfig,
    /// Session timing and protocol settings.
    pub session: SessionConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Local player configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Display name shown to other players.
    pub name: String,
    /// Avatar color as `0xRRGGBB`. `None` picks one from [`COLOR_PALETTE`].
    pub color: Option<u32>,
}

/// Transport and discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the peer listener binds to.
    pub listen_address: String,
    /// Listener port. 0 picks an ephemeral port.
    pub listen_port: u16,
    /// Directory holding the room directory and peer address book.
    /// `None` uses the platform data directory.
    pub shared_dir: Option<PathBuf>,
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: u32,
}

/// Session protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Where newly joined players are placed.
    pub spawn_position: [f32; 3],
    /// Position broadcasts per second.
    pub sync_rate_hz: u32,
    /// Remote avatar smoothing steps per second.
    pub render_rate_hz: u32,
    /// Fraction of the remaining distance covered per smoothing step.
    pub interpolation_factor: f32,
    /// Longest chat message accepted for sending, in characters.
    pub max_chat_length: usize,
    /// Number of chat entries kept in history.
    pub chat_history: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            color: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 0,
            shared_dir: None,
            max_frame_bytes: 1_048_576,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            spawn_position: [0.0, 5.0, 10.0],
            sync_rate_hz: 20,
            render_rate_hz: 60,
            interpolation_factor: 0.1,
            max_chat_length: 500,
            chat_history: 100,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl NetworkConfig {
    /// Resolve the shared directory, falling back to `<data dir>/blockmesh`
    /// and finally to the system temp directory.
    pub fn resolved_shared_dir(&self) -> PathBuf {
        if let Some(dir) = &self.shared_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("blockmesh")
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for blockmesh (`<config dir>/blockmesh`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("blockmesh"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join("config.ron");
        let write_err = |source| ConfigError::Write {
            path: config_path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(write_err)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join("config.ron"))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
