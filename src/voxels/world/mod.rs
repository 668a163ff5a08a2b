//! # World Module
//!
//! This module provides the `World` struct, the owner of one hash-consed voxel tree.
//!
//! ## Architecture
//!
//! The world holds a single root handle into its [`NodeTable`]. The tree below the root
//! is never modified: every write rebuilds only the nodes on the paths to the changed
//! blocks (sharing everything else with the previous root) and then swaps the root.
//! Stepping does the same with the root's memoized future. Because old roots stay
//! valid, a [`Snapshot`] is nothing more than a counted handle to a past root.
//!
//! ## Coordinates
//!
//! The root is always centered on the origin. A root at level `L` addresses
//! `[-2^L, 2^L)` on each axis; the root grows by doubling whenever a write or a step
//! needs more room. Reads outside the root return air and never grow it.
//!
//! ## Thread Safety
//!
//! `World` has a single owner. Snapshots, render buffers and the [`SharedRoot`] may be
//! sent to other threads and read concurrently with the owner writing and stepping.

use std::sync::Arc;

use cgmath::{EuclideanSpace, Point3, Vector3};

use crate::{
    config::{WorldConfig, MAX_LEVEL, MAX_WRITE_LEVEL},
    core::MtResource,
    error::WorldError,
    voxels::{
        block::{block_kind::BlockKindRegistry, Block},
        node::{
            node_table::{GcStats, NodeTable},
            octant_center, NodeKind, NodeRef, OCTANTS,
        },
        region::{BlockBuffer, BlockRegion},
    },
};

pub mod render_cache;
pub mod snapshot;
mod step;

use render_cache::RenderCache;
pub use render_cache::{PendingRenderCacheEntry, RenderBuffer, RenderCacheLookup};
pub use snapshot::{SharedRoot, Snapshot};

/// A voxel world stored as a hash-consed octree.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use hashlife_voxels::{Block, BlockKind, World};
///
/// let mut world = World::default();
/// let stone = Block::of_kind(BlockKind::STONE);
/// world.set_block(Point3::new(0, 0, 0), stone).unwrap();
///
/// let snapshot = world.make_snapshot();
/// world.set_block(Point3::new(0, 0, 0), Block::default()).unwrap();
///
/// assert_eq!(snapshot.get(Point3::new(0, 0, 0)), stone);
/// assert_eq!(world.get(Point3::new(0, 0, 0)), Block::default());
/// ```
pub struct World {
    config: WorldConfig,
    table: NodeTable,
    root: NodeRef,
    published_root: MtResource<NodeRef>,
    render_cache: RenderCache,
}

impl World {
    /// Creates an all-air world using the default configuration.
    pub fn new(registry: Arc<BlockKindRegistry>) -> Self {
        World::with_config(registry, WorldConfig::default())
    }

    /// Creates an all-air world.
    ///
    /// # Panics
    /// Panics if the configuration asks for levels the tree can't represent.
    pub fn with_config(registry: Arc<BlockKindRegistry>, config: WorldConfig) -> Self {
        assert!(
            config.render_chunk_level < MAX_LEVEL && config.initial_root_level <= MAX_LEVEL,
            "invalid world config {:?}",
            config
        );
        assert!(
            config.max_log2_step_size + 4 <= MAX_LEVEL,
            "max_log2_step_size {} too large",
            config.max_log2_step_size
        );
        let mut table = NodeTable::new(registry);
        let level = config
            .initial_root_level
            .max(config.render_chunk_level + 1)
            .max(1);
        let root = table.empty_node(level);
        log::debug!("created world with root level {}", level);
        World {
            config,
            table,
            published_root: MtResource::new(root.clone()),
            root,
            render_cache: RenderCache::new(),
        }
    }

    /// The configuration the world was created with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The block kind registry used by this world.
    pub fn registry(&self) -> &Arc<BlockKindRegistry> {
        self.table.registry()
    }

    /// The node table backing this world.
    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// The current root.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Number of nodes the world's table currently owns.
    pub fn live_node_count(&self) -> usize {
        self.table.live_count()
    }

    /// Number of render cache entries.
    pub fn render_cache_len(&self) -> usize {
        self.render_cache.len()
    }

    /// Smallest addressable position.
    pub fn min_position(&self) -> Point3<i32> {
        let half = self.root.half_size();
        Point3::new(-half, -half, -half)
    }

    /// Largest addressable position.
    pub fn max_position(&self) -> Point3<i32> {
        let half = self.root.half_size();
        Point3::new(half - 1, half - 1, half - 1)
    }

    /// One past the largest addressable position on each axis.
    pub fn end_position(&self) -> Point3<i32> {
        let half = self.root.half_size();
        Point3::new(half, half, half)
    }

    fn set_root(&mut self, root: NodeRef) {
        self.published_root.set(Arc::new(root.clone()));
        self.root = root;
    }

    /// Doubles the world in every direction without changing any block.
    ///
    /// Each octant of the old root becomes the inward-facing grandchild of the matching
    /// octant of the new root; everything else is canonical empty padding.
    ///
    /// # Panics
    /// Panics if the root is already at the deepest level.
    pub fn expand_root(&mut self) {
        let level = self.root.level();
        if level >= MAX_LEVEL {
            log::error!("cannot expand world root beyond level {}", MAX_LEVEL);
            panic!("cannot expand world root beyond level {}", MAX_LEVEL);
        }
        let empty = self.table.empty_node(level - 1);
        let old_children = self.root.children().clone();
        let children = std::array::from_fn(|index| {
            let mut grandchildren = std::array::from_fn(|_| empty.clone());
            grandchildren[index ^ (OCTANTS - 1)] = old_children[index].clone();
            self.table.nonleaf(grandchildren)
        });
        let root = self.table.nonleaf(children);
        log::trace!("expanded world root to level {}", root.level());
        self.set_root(root);
    }

    fn contains(&self, position: Point3<i32>) -> bool {
        self.root.contains(position.to_vec())
    }

    fn region_within_root(&self, region: &BlockRegion) -> bool {
        let min = self.min_position();
        let end = self.end_position();
        region.min.x >= min.x
            && region.min.y >= min.y
            && region.min.z >= min.z
            && region.end.x <= end.x
            && region.end.y <= end.y
            && region.end.z <= end.z
    }

    fn expand_to_contain(&mut self, region: &BlockRegion) -> Result<(), WorldError> {
        let limit = 1i64 << MAX_WRITE_LEVEL;
        let fits = |value: i32| (-limit..=limit).contains(&(value as i64));
        let corners = [region.min, region.end];
        if !corners
            .iter()
            .all(|corner| fits(corner.x) && fits(corner.y) && fits(corner.z))
        {
            return Err(WorldError::RegionOutOfRange {
                min: region.min,
                end: region.end,
            });
        }
        while !self.region_within_root(region) {
            self.expand_root();
        }
        Ok(())
    }

    /// Returns the block at `position`, or air outside the world's current bounds.
    pub fn get(&self, position: Point3<i32>) -> Block {
        read_block(&self.root, position)
    }

    /// Copies the blocks of `region` into `buffer`. Positions outside the world read as air.
    pub fn get_blocks(&self, region: &BlockRegion, buffer: &mut BlockBuffer) -> Result<(), WorldError> {
        read_blocks(&self.root, region, buffer)
    }

    /// Replaces the block at `position`.
    pub fn set_block(&mut self, position: Point3<i32>, block: Block) -> Result<(), WorldError> {
        let region = BlockRegion::single(position)?;
        let buffer = BlockBuffer::filled(region.extent(), block);
        self.set_blocks(&region, &buffer)
    }

    /// Replaces every block of `region` with the matching block of `buffer`.
    ///
    /// Only the nodes overlapping `region` are rebuilt; all other subtrees are shared with
    /// the previous root and with any snapshot of it.
    pub fn set_blocks(&mut self, region: &BlockRegion, buffer: &BlockBuffer) -> Result<(), WorldError> {
        buffer.check_fits(region)?;
        if region.is_empty() {
            return Ok(());
        }
        self.expand_to_contain(region)?;
        let root = self.root.clone();
        let root = self.write_node(&root, Vector3::new(0, 0, 0), region, buffer);
        self.set_root(root);
        Ok(())
    }

    fn write_node(
        &mut self,
        node: &NodeRef,
        center: Vector3<i32>,
        region: &BlockRegion,
        buffer: &BlockBuffer,
    ) -> NodeRef {
        if !intersects_node(region, node, center) {
            return node.clone();
        }
        match node.kind() {
            NodeKind::Leaf(blocks) => {
                let mut blocks = *blocks;
                for (index, block) in blocks.iter_mut().enumerate() {
                    let position = Point3::from_vec(center + leaf_offset(index));
                    if region.contains(position) {
                        *block = buffer.get(position - region.min);
                    }
                }
                self.table.leaf(blocks)
            }
            NodeKind::Nonleaf(children) => {
                let child_half_size = node.half_size() / 2;
                let children = std::array::from_fn(|index| {
                    let child_center = center + octant_center(index, child_half_size);
                    self.write_node(&children[index], child_center, region, buffer)
                });
                self.table.nonleaf(children)
            }
        }
    }

    /// Captures the current root as an immutable, shareable view.
    pub fn make_snapshot(&self) -> Snapshot {
        Snapshot::new(self.root.clone())
    }

    /// True if the world's root is the one `snapshot` captured.
    pub fn is_same(&self, snapshot: &Snapshot) -> bool {
        self.root == *snapshot.root()
    }

    /// A handle other threads can use to take snapshots of the latest root.
    pub fn shared_root(&self) -> SharedRoot {
        SharedRoot::new(self.published_root.clone())
    }

    /// Evicts render cache entries down to `cache_target` and collects nodes down to
    /// `node_target`.
    pub fn collect_garbage(&mut self, node_target: usize, cache_target: usize) -> GcStats {
        let evicted = self.render_cache.evict_to(cache_target);
        if evicted > 0 {
            log::debug!("evicted {} render cache entries", evicted);
        }
        self.table.garbage_collect([&self.root], node_target)
    }
}

impl Default for World {
    fn default() -> Self {
        World::new(Arc::new(BlockKindRegistry::new()))
    }
}

/// Position of leaf block `index` relative to the leaf's center.
#[inline]
pub(crate) fn leaf_offset(index: usize) -> Vector3<i32> {
    let axis = |bit: usize| if index & bit != 0 { 0 } else { -1 };
    Vector3::new(axis(1), axis(2), axis(4))
}

fn intersects_node(region: &BlockRegion, node: &NodeRef, center: Vector3<i32>) -> bool {
    let half = node.half_size();
    let min = Point3::new(center.x - half, center.y - half, center.z - half);
    let end = Point3::new(center.x + half, center.y + half, center.z + half);
    region.intersects(min, end)
}

pub(crate) fn read_block(root: &NodeRef, position: Point3<i32>) -> Block {
    if root.contains(position.to_vec()) {
        root.get(position.to_vec())
    } else {
        Block::default()
    }
}

pub(crate) fn read_blocks(
    root: &NodeRef,
    region: &BlockRegion,
    buffer: &mut BlockBuffer,
) -> Result<(), WorldError> {
    buffer.check_fits(region)?;
    buffer.fill(Block::default());
    read_node(root, Vector3::new(0, 0, 0), region, buffer);
    Ok(())
}

fn read_node(node: &NodeRef, center: Vector3<i32>, region: &BlockRegion, buffer: &mut BlockBuffer) {
    if !intersects_node(region, node, center) {
        return;
    }
    match node.kind() {
        NodeKind::Leaf(blocks) => {
            for (index, block) in blocks.iter().enumerate() {
                let position = Point3::from_vec(center + leaf_offset(index));
                if region.contains(position) {
                    buffer.set(position - region.min, *block);
                }
            }
        }
        NodeKind::Nonleaf(children) => {
            let child_half_size = node.half_size() / 2;
            for (index, child) in children.iter().enumerate() {
                read_node(child, center + octant_center(index, child_half_size), region, buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::block::block_kind::BlockKind;

    fn world() -> World {
        crate::init_logger();
        World::default()
    }

    fn stone() -> Block {
        Block::of_kind(BlockKind::STONE)
    }

    #[test]
    fn new_world_is_air() {
        let world = world();
        assert_eq!(world.root().level(), 4);
        assert!(world.table().is_empty_node(world.root()));
        assert_eq!(world.get(Point3::new(0, 0, 0)), Block::default());
        assert_eq!(world.get(Point3::new(i32::MIN, 5, i32::MAX)), Block::default());
        assert_eq!(world.min_position(), Point3::new(-16, -16, -16));
        assert_eq!(world.max_position(), Point3::new(15, 15, 15));
        assert_eq!(world.end_position(), Point3::new(16, 16, 16));
    }

    #[test]
    fn leaf_offsets_cover_the_leaf() {
        let offsets: Vec<_> = (0..OCTANTS).map(leaf_offset).collect();
        assert_eq!(offsets[0], Vector3::new(-1, -1, -1));
        assert_eq!(offsets[7], Vector3::new(0, 0, 0));
        assert_eq!(offsets[1], Vector3::new(0, -1, -1));
    }

    #[test]
    fn set_then_get_single_blocks() {
        let mut world = world();
        let positions = [
            Point3::new(0, 0, 0),
            Point3::new(-1, -1, -1),
            Point3::new(15, -16, 3),
            Point3::new(-7, 2, 11),
        ];
        for (i, position) in positions.iter().enumerate() {
            let block = Block::new(BlockKind::STONE, crate::Lighting::new(i as u8, 0, 0));
            world.set_block(*position, block).unwrap();
        }
        for (i, position) in positions.iter().enumerate() {
            assert_eq!(world.get(*position).lighting().direct_skylight, i as u8);
        }
        assert_eq!(world.get(Point3::new(1, 0, 0)), Block::default());
    }

    #[test]
    fn writes_outside_bounds_expand_the_root() {
        let mut world = world();
        let far = Point3::new(100, -300, 7);
        world.set_block(far, stone()).unwrap();
        assert!(world.root().level() >= 9);
        assert_eq!(world.get(far), stone());
        assert!(world.min_position().y <= -300);
    }

    #[test]
    fn writes_beyond_the_largest_world_are_rejected() {
        let mut world = world();
        for position in [
            Point3::new(i32::MAX, 0, 0),
            Point3::new(i32::MAX - 1, 0, 0),
            Point3::new(0, i32::MIN, 0),
            Point3::new(0, 0, 1 << MAX_WRITE_LEVEL),
            Point3::new(0, -(1 << MAX_WRITE_LEVEL) - 1, 0),
        ] {
            let result = world.set_block(position, stone());
            assert!(
                matches!(result, Err(WorldError::RegionOutOfRange { .. })),
                "{:?} accepted",
                position
            );
        }
        let everything = BlockRegion {
            min: Point3::new(i32::MIN, 0, 0),
            end: Point3::new(i32::MAX, 1, 1),
        };
        let buffer = BlockBuffer::filled(Vector3::new(1, 1, 1), stone());
        assert!(matches!(
            world.set_blocks(&everything, &buffer),
            Err(WorldError::RegionOutOfRange { .. })
        ));
        assert_eq!(world.root().level(), 4);
    }

    #[test]
    fn writes_at_the_edge_can_still_be_stepped() {
        let mut world = world();
        let edge = (1 << MAX_WRITE_LEVEL) - 1;
        let corners = [
            Point3::new(edge, 0, 0),
            Point3::new(0, -edge - 1, 0),
            Point3::new(-edge - 1, edge, -edge - 1),
        ];
        for corner in corners {
            world.set_block(corner, stone()).unwrap();
        }
        assert_eq!(world.root().level(), MAX_WRITE_LEVEL);

        world.step(crate::BlockStepGlobalState::new(0));
        world.step(crate::BlockStepGlobalState::new(2));
        for corner in corners {
            assert_eq!(world.get(corner), stone());
        }
    }

    #[test]
    fn reads_reuse_the_callers_buffer() {
        let mut world = world();
        world.set_block(Point3::new(0, 0, 0), stone()).unwrap();
        let region = BlockRegion::new(Point3::new(-1, 0, 0), Point3::new(2, 1, 1)).unwrap();
        let mut buffer = BlockBuffer::filled(region.extent(), stone());
        let storage = buffer.blocks().as_ptr();
        world.get_blocks(&region, &mut buffer).unwrap();
        assert_eq!(buffer.blocks().as_ptr(), storage);
        assert_eq!(
            buffer.blocks(),
            &[Block::default(), stone(), Block::default()][..]
        );
    }

    #[test]
    fn expand_root_preserves_contents() {
        let mut world = world();
        let mut rng = fastrand::Rng::with_seed(7);
        let mut written = Vec::new();
        for _ in 0..64 {
            let position = Point3::new(rng.i32(-16..16), rng.i32(-16..16), rng.i32(-16..16));
            let block = Block::new(BlockKind::STONE, crate::Lighting::new(rng.u8(0..16), 0, 0));
            world.set_block(position, block).unwrap();
            written.push(position);
        }
        let region = BlockRegion::new(world.min_position(), world.end_position()).unwrap();
        let mut before = BlockBuffer::for_region(&region);
        world.get_blocks(&region, &mut before).unwrap();
        let (old_min, old_max) = (world.min_position(), world.max_position());

        world.expand_root();

        assert!(world.min_position().x < old_min.x);
        assert!(world.max_position().x > old_max.x);
        let mut after = BlockBuffer::for_region(&region);
        world.get_blocks(&region, &mut after).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn bulk_write_and_read_round_trip() {
        let mut world = world();
        let region = BlockRegion::new(Point3::new(-3, -2, -5), Point3::new(4, 3, 2)).unwrap();
        let mut rng = fastrand::Rng::with_seed(42);
        let mut source = BlockBuffer::for_region(&region);
        for position in region.positions() {
            if rng.bool() {
                source.set(position - region.min, stone());
            }
        }
        world.set_blocks(&region, &source).unwrap();

        let mut read = BlockBuffer::for_region(&region);
        world.get_blocks(&region, &mut read).unwrap();
        assert_eq!(read, source);

        // a wider read sees air around the written box
        let wide = BlockRegion::new(Point3::new(-4, -3, -6), Point3::new(5, 4, 3)).unwrap();
        let mut wide_read = BlockBuffer::for_region(&wide);
        world.get_blocks(&wide, &mut wide_read).unwrap();
        assert_eq!(wide_read.get(Vector3::new(0, 0, 0)), Block::default());
        assert_eq!(
            wide_read.get(Vector3::new(1, 1, 1)),
            source.get(Vector3::new(0, 0, 0))
        );
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut world = world();
        let region = BlockRegion::new(Point3::new(0, 0, 0), Point3::new(2, 2, 2)).unwrap();
        let buffer = BlockBuffer::filled(Vector3::new(2, 2, 1), stone());
        assert!(matches!(
            world.set_blocks(&region, &buffer),
            Err(WorldError::BufferSizeMismatch { .. })
        ));
        let mut output = BlockBuffer::filled(Vector3::new(1, 1, 1), stone());
        assert!(world.get_blocks(&region, &mut output).is_err());
    }

    #[test]
    fn untouched_subtrees_are_shared() {
        let mut world = world();
        world.set_block(Point3::new(-5, -5, -5), stone()).unwrap();
        let before = world.root().clone();
        world.set_block(Point3::new(5, 5, 5), stone()).unwrap();
        let after = world.root().clone();
        assert_ne!(before, after);
        // octant 0 holds only the first write and is reused as-is
        assert_eq!(before.child(0), after.child(0));
        assert_ne!(before.child(7), after.child(7));
    }

    #[test]
    fn writing_air_back_restores_canonical_empty() {
        let mut world = world();
        let empty_root = world.root().clone();
        world.set_block(Point3::new(3, 1, 4), stone()).unwrap();
        world.set_block(Point3::new(3, 1, 4), Block::default()).unwrap();
        assert_eq!(*world.root(), empty_root);
    }

    #[test]
    fn garbage_collection_keeps_the_world() {
        let mut world = world();
        for x in -8..8 {
            world.set_block(Point3::new(x, 0, 0), stone()).unwrap();
        }
        let live_before = world.live_node_count();
        let stats = world.collect_garbage(0, 0);
        assert!(stats.freed > 0);
        assert!(world.live_node_count() < live_before);
        for x in -8..8 {
            assert_eq!(world.get(Point3::new(x, 0, 0)), stone());
        }
        world.set_block(Point3::new(0, 1, 0), stone()).unwrap();
        assert_eq!(world.get(Point3::new(0, 1, 0)), stone());
    }
}
