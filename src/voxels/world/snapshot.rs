//! Immutable views of a world.

use cgmath::Point3;

use crate::{
    core::MtResource,
    error::WorldError,
    voxels::{
        block::Block,
        node::NodeRef,
        region::{BlockBuffer, BlockRegion},
    },
};

use super::{read_block, read_blocks};

/// A read-only view of a world at one point in time.
///
/// A snapshot is a counted handle to the root that was current when it was taken. It
/// never changes, may be sent to other threads, and keeps every node it can reach alive
/// until it is dropped.
#[derive(Clone, Debug)]
pub struct Snapshot {
    root: NodeRef,
}

impl Snapshot {
    pub(crate) fn new(root: NodeRef) -> Self {
        Snapshot { root }
    }

    /// The captured root.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Returns the block at `position`, or air outside the captured bounds.
    pub fn get(&self, position: Point3<i32>) -> Block {
        read_block(&self.root, position)
    }

    /// Copies the blocks of `region` into `buffer`.
    pub fn get_blocks(&self, region: &BlockRegion, buffer: &mut BlockBuffer) -> Result<(), WorldError> {
        read_blocks(&self.root, region, buffer)
    }

    /// Smallest position inside the captured root.
    ///
    /// # Returns
    /// `(-h, -h, -h)` for a root of half size `h`.
    pub fn min_position(&self) -> Point3<i32> {
        let half = self.root.half_size();
        Point3::new(-half, -half, -half)
    }

    /// Largest position inside the captured root.
    pub fn max_position(&self) -> Point3<i32> {
        let half = self.root.half_size();
        Point3::new(half - 1, half - 1, half - 1)
    }

    /// One past [`Snapshot::max_position`] on each axis.
    pub fn end_position(&self) -> Point3<i32> {
        let half = self.root.half_size();
        Point3::new(half, half, half)
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for Snapshot {}

/// The latest root of a world, readable from any thread.
///
/// The world publishes its root here after every write and step; [`SharedRoot::load`]
/// always returns a complete tree.
#[derive(Clone)]
pub struct SharedRoot {
    latest: MtResource<NodeRef>,
}

impl SharedRoot {
    pub(crate) fn new(latest: MtResource<NodeRef>) -> Self {
        SharedRoot { latest }
    }

    /// Takes a snapshot of the most recently published root.
    pub fn load(&self) -> Snapshot {
        Snapshot::new(NodeRef::clone(&self.latest.get()))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use cgmath::Vector3;

    use super::*;
    use crate::voxels::{block::block_kind::BlockKind, world::World};

    #[test]
    fn snapshots_are_unaffected_by_later_writes() {
        crate::init_logger();
        let mut world = World::default();
        let stone = Block::of_kind(BlockKind::STONE);
        world.set_block(Point3::new(2, 2, 2), stone).unwrap();
        let snapshot = world.make_snapshot();
        assert!(world.is_same(&snapshot));

        world.set_block(Point3::new(2, 2, 2), Block::default()).unwrap();
        world.set_block(Point3::new(500, 0, 0), stone).unwrap();

        assert!(!world.is_same(&snapshot));
        assert_eq!(snapshot.get(Point3::new(2, 2, 2)), stone);
        assert_eq!(snapshot.get(Point3::new(500, 0, 0)), Block::default());
        assert_eq!(snapshot.end_position(), Point3::new(16, 16, 16));
        assert!(world.end_position().x > 500);
    }

    #[test]
    fn snapshots_survive_garbage_collection() {
        crate::init_logger();
        let mut world = World::default();
        let stone = Block::of_kind(BlockKind::STONE);
        let region = BlockRegion::new(Point3::new(-4, -4, -4), Point3::new(4, 4, 4)).unwrap();
        world
            .set_blocks(&region, &BlockBuffer::filled(region.extent(), stone))
            .unwrap();
        let snapshot = world.make_snapshot();
        world
            .set_blocks(&region, &BlockBuffer::for_region(&region))
            .unwrap();
        world.collect_garbage(0, 0);

        let mut read = BlockBuffer::for_region(&region);
        snapshot.get_blocks(&region, &mut read).unwrap();
        assert!(read.blocks().iter().all(|block| *block == stone));
        assert_eq!(read.extent(), Vector3::new(8, 8, 8));
    }

    #[test]
    fn shared_root_follows_the_world_across_threads() {
        crate::init_logger();
        let mut world = World::default();
        let shared = world.shared_root();
        let stone = Block::of_kind(BlockKind::STONE);
        world.set_block(Point3::new(-1, 0, 3), stone).unwrap();

        let reader = shared.clone();
        let seen = thread::spawn(move || reader.load().get(Point3::new(-1, 0, 3)))
            .join()
            .unwrap();
        assert_eq!(seen, stone);
        assert!(world.is_same(&shared.load()));
    }
}
