//! `/reload`: re-read `config.ron` and report which sections changed on disk.
//!
//! Nothing is applied to the running session; the node logs what a restart
//! would pick up.

use std::path::PathBuf;

use blockmesh_config::{Config, ConfigError};

/// The last `config.ron` contents seen on disk, before CLI overrides.
#[derive(Debug, Clone)]
pub struct ConfigWatch {
    dir: PathBuf,
    on_disk: Config,
}

impl ConfigWatch {
    pub fn new(dir: PathBuf, on_disk: Config) -> Self {
        Self { dir, on_disk }
    }

    /// Re-read the file and return the names of the sections that differ from
    /// the last read. An empty list means nothing changed.
    pub fn check(&mut self) -> Result<Vec<&'static str>, ConfigError> {
        let Some(new) = self.on_disk.reload(&self.dir)? else {
            return Ok(Vec::new());
        };
        let changed = changed_sections(&self.on_disk, &new);
        self.on_disk = new;
        Ok(changed)
    }
}

fn changed_sections(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.player != new.player {
        changed.push("player");
    }
    if old.network != new.network {
        changed.push("network");
    }
    if old.session != new.session {
        changed.push("session");
    }
    if old.debug != new.debug {
        changed.push("debug");
    }
    changed
}
