//! The world mirror: each peer's copy of the shared block world.
//!
//! Edits made locally are applied with `sync = true` and hand back the
//! [`BlockEdit`] to publish. Edits received from peers are applied with
//! `sync = false` and hand back nothing, so a received edit can never be
//! echoed back onto the network.

use std::collections::HashMap;

use blockmesh_net::{BlockEdit, BlockType};
use glam::IVec3;

/// Add/remove primitives over integer block coordinates.
pub trait WorldMirror: Send {
    /// Put `block` at `pos`, replacing whatever is there.
    fn place_block_at(&mut self, pos: IVec3, block: BlockType, sync: bool) -> Option<BlockEdit>;

    /// Clear `pos`. A no-op (returning `None`) when nothing is there.
    fn remove_block_at(&mut self, pos: IVec3, sync: bool) -> Option<BlockEdit>;

    fn block_at(&self, pos: IVec3) -> Option<BlockType>;

    fn block_count(&self) -> usize;
}

/// Apply an edit received from a peer.
pub fn apply_remote_edit(world: &mut dyn WorldMirror, edit: BlockEdit) {
    let (x, y, z) = edit.coords();
    let pos = IVec3::new(x, y, z);
    match edit {
        BlockEdit::Place { block_type, .. } => {
            world.place_block_at(pos, block_type, false);
        }
        BlockEdit::Remove { .. } => {
            world.remove_block_at(pos, false);
        }
    }
}

/// In-memory world: at most one block per coordinate.
#[derive(Debug, Clone, Default)]
pub struct BlockWorld {
    blocks: HashMap<IVec3, BlockType>,
}

impl BlockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over every block.
    pub fn blocks(&self) -> impl Iterator<Item = (IVec3, BlockType)> + '_ {
        self.blocks.iter().map(|(pos, ty)| (*pos, *ty))
    }
}

impl WorldMirror for BlockWorld {
    fn place_block_at(&mut self, pos: IVec3, block: BlockType, sync: bool) -> Option<BlockEdit> {
        let previous = self.blocks.insert(pos, block);
        tracing::trace!("Placed {} at {pos} (was {previous:?})", block.name());
        sync.then_some(BlockEdit::Place {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            block_type: block,
        })
    }

    fn remove_block_at(&mut self, pos: IVec3, sync: bool) -> Option<BlockEdit> {
        let removed = self.blocks.remove(&pos)?;
        tracing::trace!("Removed {} at {pos}", removed.name());
        sync.then_some(BlockEdit::Remove {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        })
    }

    fn block_at(&self, pos: IVec3) -> Option<BlockType> {
        self.blocks.get(&pos).copied()
    }

    fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_place_returns_edit() {
        let mut world = BlockWorld::new();
        let edit = world.place_block_at(IVec3::new(1, 2, 3), BlockType::Stone, true);
        assert_eq!(
            edit,
            Some(BlockEdit::Place {
                x: 1,
                y: 2,
                z: 3,
                block_type: BlockType::Stone
            })
        );
        assert_eq!(world.block_at(IVec3::new(1, 2, 3)), Some(BlockType::Stone));
    }

    #[test]
    fn test_remote_place_returns_nothing() {
        let mut world = BlockWorld::new();
        assert!(world.place_block_at(IVec3::ZERO, BlockType::Sand, false).is_none());
        assert_eq!(world.block_count(), 1);
    }

    #[test]
    fn test_place_replaces_existing() {
        let mut world = BlockWorld::new();
        world.place_block_at(IVec3::ZERO, BlockType::Dirt, false);
        world.place_block_at(IVec3::ZERO, BlockType::Wood, false);
        assert_eq!(world.block_count(), 1);
        assert_eq!(world.block_at(IVec3::ZERO), Some(BlockType::Wood));
    }

    #[test]
    fn test_remove_present_and_absent() {
        let mut world = BlockWorld::new();
        world.place_block_at(IVec3::new(0, 1, 0), BlockType::Grass, false);

        let edit = world.remove_block_at(IVec3::new(0, 1, 0), true);
        assert_eq!(edit, Some(BlockEdit::Remove { x: 0, y: 1, z: 0 }));
        assert_eq!(world.block_count(), 0);

        assert!(world.remove_block_at(IVec3::new(0, 1, 0), true).is_none());
        assert_eq!(world.block_count(), 0);
    }

    #[test]
    fn test_apply_remote_edit() {
        let mut world = BlockWorld::new();
        apply_remote_edit(
            &mut world,
            BlockEdit::Place {
                x: -4,
                y: 0,
                z: 9,
                block_type: BlockType::Water,
            },
        );
        assert_eq!(world.block_at(IVec3::new(-4, 0, 9)), Some(BlockType::Water));

        apply_remote_edit(&mut world, BlockEdit::Remove { x: -4, y: 0, z: 9 });
        assert_eq!(world.block_count(), 0);
        assert_eq!(world.blocks().count(), 0);
    }
}
