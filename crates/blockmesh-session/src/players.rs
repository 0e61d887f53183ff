//! Player directory: last-known state of every participant, local included.

use std::collections::HashMap;
use std::fmt;

use blockmesh_config::COLOR_PALETTE;
use blockmesh_net::{Orientation, PlayerId, WireMessage};
use glam::Vec3;
use rand::Rng;

/// Opaque handle to an avatar owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualHandle(pub u64);

/// 24-bit RGB avatar color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTag(pub u32);

impl ColorTag {
    /// Pick a palette color uniformly at random.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self(COLOR_PALETTE[rng.random_range(0..COLOR_PALETTE.len())])
    }

    /// Keep only the low 24 bits.
    pub fn from_rgb(rgb: u32) -> Self {
        Self(rgb & 0x00ff_ffff)
    }
}

impl fmt::Display for ColorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

/// Everything known about one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    /// Last reported position (the interpolation target for remotes).
    pub position: Vec3,
    /// Where the avatar is currently drawn.
    pub displayed_position: Vec3,
    pub orientation: Orientation,
    pub color: ColorTag,
    pub is_local: bool,
    pub visual: Option<VisualHandle>,
}

impl PlayerRecord {
    /// A remote player standing at `position`.
    pub fn remote(id: PlayerId, name: String, color: ColorTag, position: Vec3) -> Self {
        Self {
            id,
            name,
            position,
            displayed_position: position,
            orientation: Orientation::default(),
            color,
            is_local: false,
            visual: None,
        }
    }

    /// The player this process controls, standing at `position`.
    pub fn local(id: PlayerId, name: String, color: ColorTag, position: Vec3) -> Self {
        Self {
            is_local: true,
            ..Self::remote(id, name, color, position)
        }
    }

    /// `playerInfo` message describing this player.
    pub fn info_message(&self) -> WireMessage {
        WireMessage::PlayerInfo {
            player_id: self.id.clone(),
            name: self.name.clone(),
            color: self.color.0,
            position: self.position.into(),
            orientation: self.orientation,
        }
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            color: self.color,
            is_local: self.is_local,
        }
    }
}

/// What the player list UI shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub color: ColorTag,
    pub is_local: bool,
}

/// One record per known identity. Exactly one record is local.
#[derive(Debug, Clone)]
pub struct PlayerDirectory {
    records: HashMap<PlayerId, PlayerRecord>,
    local: PlayerId,
}

impl PlayerDirectory {
    /// Directory holding only the local player.
    pub fn new(mut local: PlayerRecord) -> Self {
        local.is_local = true;
        let id = local.id.clone();
        let mut records = HashMap::new();
        records.insert(id.clone(), local);
        Self { records, local: id }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local
    }

    pub fn local(&self) -> Option<&PlayerRecord> {
        self.records.get(&self.local)
    }

    pub fn local_mut(&mut self) -> Option<&mut PlayerRecord> {
        self.records.get_mut(&self.local)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut PlayerRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.records.contains_key(id)
    }

    /// Insert or replace a record, returning the previous one.
    ///
    /// `is_local` is derived from the id so a remote payload can never claim
    /// to be the local player.
    pub fn upsert(&mut self, mut record: PlayerRecord) -> Option<PlayerRecord> {
        record.is_local = record.id == self.local;
        self.records.insert(record.id.clone(), record)
    }

    /// Remove a remote record. The local record is never removed.
    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerRecord> {
        if *id == self.local {
            return None;
        }
        self.records.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.records.values()
    }

    pub fn remotes_mut(&mut self) -> impl Iterator<Item = &mut PlayerRecord> {
        self.records.values_mut().filter(|r| !r.is_local)
    }

    /// Drop every remote record and return them.
    pub fn drain_remotes(&mut self) -> Vec<PlayerRecord> {
        let remote_ids: Vec<PlayerId> = self
            .records
            .keys()
            .filter(|id| **id != self.local)
            .cloned()
            .collect();
        remote_ids
            .iter()
            .filter_map(|id| self.records.remove(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Local player first, then remotes by name.
    pub fn summaries(&self) -> Vec<PlayerSummary> {
        let mut list: Vec<PlayerSummary> = self.records.values().map(PlayerRecord::summary).collect();
        list.sort_by(|a, b| {
            b.is_local
                .cmp(&a.is_local)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_record() -> PlayerRecord {
        PlayerRecord::local(
            PlayerId::new("me"),
            "Me".to_string(),
            ColorTag(0xff0000),
            Vec3::new(0.0, 5.0, 10.0),
        )
    }

    fn remote(id: &str, name: &str) -> PlayerRecord {
        PlayerRecord::remote(PlayerId::new(id), name.to_string(), ColorTag(0x00ff00), Vec3::ZERO)
    }

    #[test]
    fn test_local_record_differs_from_remote_only_in_flag() {
        let local = local_record();
        assert!(local.is_local);
        assert_eq!(local.displayed_position, local.position);
        assert!(local.visual.is_none());

        let mut as_remote = local.clone();
        as_remote.is_local = false;
        assert_eq!(
            as_remote,
            PlayerRecord::remote(
                PlayerId::new("me"),
                "Me".to_string(),
                ColorTag(0xff0000),
                Vec3::new(0.0, 5.0, 10.0),
            )
        );
    }

    #[test]
    fn test_new_directory_has_only_local() {
        let dir = PlayerDirectory::new(local_record());
        assert_eq!(dir.len(), 1);
        assert!(dir.local().unwrap().is_local);
        assert_eq!(dir.local_id().as_str(), "me");
    }

    #[test]
    fn test_remote_cannot_claim_local() {
        let mut dir = PlayerDirectory::new(local_record());
        let mut sneaky = remote("other", "Other");
        sneaky.is_local = true;
        dir.upsert(sneaky);
        assert!(!dir.get(&PlayerId::new("other")).unwrap().is_local);
        assert_eq!(dir.iter().filter(|r| r.is_local).count(), 1);
    }

    #[test]
    fn test_upsert_replaces() {
        let mut dir = PlayerDirectory::new(local_record());
        assert!(dir.upsert(remote("a", "Ann")).is_none());
        let previous = dir.upsert(remote("a", "Anna"));
        assert_eq!(previous.unwrap().name, "Ann");
        assert_eq!(dir.get(&PlayerId::new("a")).unwrap().name, "Anna");
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_local_record_is_not_removable() {
        let mut dir = PlayerDirectory::new(local_record());
        assert!(dir.remove(&PlayerId::new("me")).is_none());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_drain_remotes_keeps_local() {
        let mut dir = PlayerDirectory::new(local_record());
        dir.upsert(remote("a", "Ann"));
        dir.upsert(remote("b", "Bob"));
        let drained = dir.drain_remotes();
        assert_eq!(drained.len(), 2);
        assert_eq!(dir.len(), 1);
        assert!(dir.local().is_some());
    }

    #[test]
    fn test_summaries_local_first_then_by_name() {
        let mut dir = PlayerDirectory::new(local_record());
        dir.upsert(remote("z", "Zed"));
        dir.upsert(remote("a", "Amy"));
        let names: Vec<String> = dir.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["Me", "Amy", "Zed"]);
    }

    #[test]
    fn test_info_message_carries_state() {
        let record = local_record();
        match record.info_message() {
            WireMessage::PlayerInfo {
                player_id,
                name,
                color,
                position,
                ..
            } => {
                assert_eq!(player_id.as_str(), "me");
                assert_eq!(name, "Me");
                assert_eq!(color, 0xff0000);
                assert_eq!(position.y, 5.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_random_color_from_palette() {
        for _ in 0..50 {
            assert!(COLOR_PALETTE.contains(&ColorTag::random().0));
        }
    }

    #[test]
    fn test_color_display_and_mask() {
        assert_eq!(ColorTag(0x00ff00).to_string(), "#00ff00");
        assert_eq!(ColorTag::from_rgb(0xff123456), ColorTag(0x123456));
    }
}
