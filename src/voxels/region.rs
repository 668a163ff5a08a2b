//! # Region Module
//!
//! Axis-aligned block regions and the dense buffers used to move blocks in and out of
//! the world in bulk.
//!
//! Buffers are laid out x-fastest, then y, then z, the same order chunks are scanned in.

use cgmath::{Point3, Vector3};

use crate::{error::WorldError, voxels::block::Block};

/// A half-open box of block positions: `min` is inclusive, `end` is exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockRegion {
    /// Smallest contained position.
    pub min: Point3<i32>,
    /// One past the largest contained position on every axis.
    pub end: Point3<i32>,
}

impl BlockRegion {
    /// Creates a region.
    ///
    /// # Errors
    /// - `InvalidRegion` if `end` is below `min` on any axis
    /// - `RegionOutOfRange` if the region is too wide for its extent to fit an `i32`
    pub fn new(min: Point3<i32>, end: Point3<i32>) -> Result<Self, WorldError> {
        if end.x < min.x || end.y < min.y || end.z < min.z {
            return Err(WorldError::InvalidRegion { min, end });
        }
        let region = BlockRegion { min, end };
        match region.checked_extent() {
            Some(_) => Ok(region),
            None => Err(WorldError::RegionOutOfRange { min, end }),
        }
    }

    /// The region covering a single position.
    ///
    /// # Errors
    /// `RegionOutOfRange` if `position` is `i32::MAX` on some axis, since the region's
    /// exclusive end can't be represented.
    pub fn single(position: Point3<i32>) -> Result<Self, WorldError> {
        let end = position
            .x
            .checked_add(1)
            .zip(position.y.checked_add(1))
            .zip(position.z.checked_add(1));
        match end {
            Some(((x, y), z)) => Ok(BlockRegion {
                min: position,
                end: Point3::new(x, y, z),
            }),
            None => Err(WorldError::RegionOutOfRange {
                min: position,
                end: position,
            }),
        }
    }

    /// The size of the region along each axis.
    ///
    /// # Panics
    /// Panics if the fields were set by hand to a box wider than `i32::MAX`; regions
    /// from [`BlockRegion::new`] and [`BlockRegion::single`] never are.
    pub fn extent(&self) -> Vector3<i32> {
        match self.checked_extent() {
            Some(extent) => extent,
            None => panic!("region {:?}..{:?} is too wide", self.min, self.end),
        }
    }

    /// The size of the region along each axis, or `None` if it overflows.
    pub fn checked_extent(&self) -> Option<Vector3<i32>> {
        Some(Vector3::new(
            self.end.x.checked_sub(self.min.x)?,
            self.end.y.checked_sub(self.min.y)?,
            self.end.z.checked_sub(self.min.z)?,
        ))
    }

    /// Number of positions in the region.
    pub fn volume(&self) -> usize {
        let extent = self.extent();
        extent.x as usize * extent.y as usize * extent.z as usize
    }

    /// True if the region contains no positions.
    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// True if `position` lies inside the region.
    pub fn contains(&self, position: Point3<i32>) -> bool {
        (self.min.x..self.end.x).contains(&position.x)
            && (self.min.y..self.end.y).contains(&position.y)
            && (self.min.z..self.end.z).contains(&position.z)
    }

    /// True if the region and the box `[min, end)` share at least one position.
    pub fn intersects(&self, min: Point3<i32>, end: Point3<i32>) -> bool {
        !self.is_empty()
            && self.min.x < end.x
            && min.x < self.end.x
            && self.min.y < end.y
            && min.y < self.end.y
            && self.min.z < end.z
            && min.z < self.end.z
    }

    /// Iterates over every position, x-fastest.
    pub fn positions(&self) -> impl Iterator<Item = Point3<i32>> {
        let region = *self;
        (region.min.z..region.end.z).flat_map(move |z| {
            (region.min.y..region.end.y).flat_map(move |y| {
                (region.min.x..region.end.x).map(move |x| Point3::new(x, y, z))
            })
        })
    }
}

/// A dense 3D array of blocks with its own extent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockBuffer {
    extent: Vector3<i32>,
    blocks: Vec<Block>,
}

impl BlockBuffer {
    /// A buffer of the given extent filled with `block`.
    ///
    /// # Panics
    /// Panics if any extent component is negative.
    pub fn filled(extent: Vector3<i32>, block: Block) -> Self {
        assert!(
            extent.x >= 0 && extent.y >= 0 && extent.z >= 0,
            "negative buffer extent {:?}",
            extent
        );
        let len = extent.x as usize * extent.y as usize * extent.z as usize;
        BlockBuffer {
            extent,
            blocks: vec![block; len],
        }
    }

    /// A buffer of air sized to fit `region`.
    pub fn for_region(region: &BlockRegion) -> Self {
        BlockBuffer::filled(region.extent(), Block::default())
    }

    /// Wraps existing blocks, checking the length against the extent.
    pub fn from_blocks(extent: Vector3<i32>, blocks: Vec<Block>) -> Result<Self, WorldError> {
        let expected = extent.x.max(0) as usize * extent.y.max(0) as usize * extent.z.max(0) as usize;
        if extent.x < 0 || extent.y < 0 || extent.z < 0 || blocks.len() != expected {
            return Err(WorldError::BufferSizeMismatch {
                expected: extent,
                actual: blocks.len(),
            });
        }
        Ok(BlockBuffer { extent, blocks })
    }

    /// The size along each axis.
    pub fn extent(&self) -> Vector3<i32> {
        self.extent
    }

    /// The blocks in x-fastest order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The packed block values, without copying.
    pub fn as_raw(&self) -> &[u32] {
        bytemuck::cast_slice(&self.blocks)
    }

    #[inline]
    fn index(&self, offset: Vector3<i32>) -> usize {
        debug_assert!(
            (0..self.extent.x).contains(&offset.x)
                && (0..self.extent.y).contains(&offset.y)
                && (0..self.extent.z).contains(&offset.z),
            "offset {:?} outside buffer extent {:?}",
            offset,
            self.extent
        );
        offset.x as usize
            + self.extent.x as usize * (offset.y as usize + self.extent.y as usize * offset.z as usize)
    }

    /// The block at `offset` from the buffer origin.
    pub fn get(&self, offset: Vector3<i32>) -> Block {
        self.blocks[self.index(offset)]
    }

    /// Replaces the block at `offset` from the buffer origin.
    pub fn set(&mut self, offset: Vector3<i32>, block: Block) {
        let index = self.index(offset);
        self.blocks[index] = block;
    }

    /// Replaces every block with `block`, keeping the extent.
    pub fn fill(&mut self, block: Block) {
        self.blocks.fill(block);
    }

    pub(crate) fn check_fits(&self, region: &BlockRegion) -> Result<(), WorldError> {
        let expected = region
            .checked_extent()
            .ok_or(WorldError::RegionOutOfRange {
                min: region.min,
                end: region.end,
            })?;
        if self.extent != expected {
            return Err(WorldError::BufferSizeMismatch {
                expected,
                actual: self.blocks.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::block::block_kind::BlockKind;

    #[test]
    fn inverted_region_is_rejected() {
        let result = BlockRegion::new(Point3::new(0, 0, 0), Point3::new(1, -1, 1));
        assert!(matches!(result, Err(WorldError::InvalidRegion { .. })));
    }

    #[test]
    fn regions_wider_than_i32_are_rejected() {
        let result = BlockRegion::new(Point3::new(i32::MIN, 0, 0), Point3::new(i32::MAX, 1, 1));
        assert!(matches!(result, Err(WorldError::RegionOutOfRange { .. })));
        let widest = BlockRegion::new(Point3::new(-1, 0, 0), Point3::new(i32::MAX - 1, 1, 1));
        assert_eq!(widest.unwrap().extent().x, i32::MAX);
    }

    #[test]
    fn single_at_the_edge_of_i32() {
        let result = BlockRegion::single(Point3::new(0, i32::MAX, 0));
        assert!(matches!(result, Err(WorldError::RegionOutOfRange { .. })));
        let region = BlockRegion::single(Point3::new(i32::MIN, 0, i32::MAX - 1)).unwrap();
        assert_eq!(region.volume(), 1);
        assert!(region.contains(Point3::new(i32::MIN, 0, i32::MAX - 1)));
    }

    #[test]
    fn hand_built_oversized_regions_fail_the_fit_check() {
        let region = BlockRegion {
            min: Point3::new(i32::MIN, 0, 0),
            end: Point3::new(i32::MAX, 1, 1),
        };
        assert_eq!(region.checked_extent(), None);
        let buffer = BlockBuffer::filled(Vector3::new(1, 1, 1), Block::default());
        assert!(matches!(
            buffer.check_fits(&region),
            Err(WorldError::RegionOutOfRange { .. })
        ));
    }

    #[test]
    fn fill_keeps_the_extent() {
        let mut buffer = BlockBuffer::filled(Vector3::new(3, 1, 2), Block::of_kind(BlockKind::STONE));
        buffer.fill(Block::default());
        assert_eq!(buffer.extent(), Vector3::new(3, 1, 2));
        assert!(buffer.blocks().iter().all(|block| *block == Block::default()));
    }

    #[test]
    fn positions_visit_x_fastest() {
        let region = BlockRegion::new(Point3::new(0, 0, 0), Point3::new(2, 2, 1)).unwrap();
        let positions: Vec<_> = region.positions().collect();
        assert_eq!(
            positions,
            vec![
                Point3::new(0, 0, 0),
                Point3::new(1, 0, 0),
                Point3::new(0, 1, 0),
                Point3::new(1, 1, 0),
            ]
        );
        assert_eq!(region.volume(), 4);
    }

    #[test]
    fn intersects_is_half_open() {
        let region = BlockRegion::new(Point3::new(0, 0, 0), Point3::new(4, 4, 4)).unwrap();
        assert!(region.intersects(Point3::new(3, 3, 3), Point3::new(8, 8, 8)));
        assert!(!region.intersects(Point3::new(4, 0, 0), Point3::new(8, 4, 4)));
        let empty = BlockRegion::new(Point3::new(1, 1, 1), Point3::new(1, 1, 1)).unwrap();
        assert!(empty.is_empty());
        assert!(!empty.intersects(Point3::new(-8, -8, -8), Point3::new(8, 8, 8)));
    }

    #[test]
    fn buffer_indexing_and_raw_view() {
        let mut buffer = BlockBuffer::filled(Vector3::new(2, 3, 4), Block::default());
        let stone = Block::of_kind(BlockKind::STONE);
        buffer.set(Vector3::new(1, 2, 3), stone);
        assert_eq!(buffer.get(Vector3::new(1, 2, 3)), stone);
        assert_eq!(buffer.blocks().len(), 24);
        assert_eq!(buffer.as_raw()[23], stone.to_raw());
    }

    #[test]
    fn from_blocks_checks_length() {
        let result = BlockBuffer::from_blocks(Vector3::new(2, 2, 2), vec![Block::default(); 7]);
        assert!(matches!(result, Err(WorldError::BufferSizeMismatch { .. })));
    }
}
