//! # Block Module
//!
//! This module provides the packed voxel value stored in every leaf of the world tree,
//! along with the aggregable rendering summary that lets whole subtrees be skipped
//! without descending into them.
//!
//! ## Memory Layout
//!
//! A [`Block`] is a single `u32`:
//!
//! | bits    | field                      |
//! |---------|----------------------------|
//! | 0..16   | block kind id              |
//! | 16..20  | direct skylight            |
//! | 20..24  | indirect skylight          |
//! | 24..28  | indirect artificial light  |
//!
//! The all-zero value is air with no light, which is also `Block::default()`.

pub mod block_kind;
pub mod block_step;

use block_kind::BlockKind;

/// The underlying integer type used to represent block kinds in memory.
pub type BlockKindSize = u16;

/// The largest value a single lighting channel can hold.
pub const MAX_LIGHT: u8 = 0xF;

const KIND_MASK: u32 = 0xFFFF;
const LIGHT_MASK: u32 = 0xF;
const DIRECT_SKYLIGHT_SHIFT: u32 = 16;
const INDIRECT_SKYLIGHT_SHIFT: u32 = 20;
const INDIRECT_ARTIFICIAL_LIGHT_SHIFT: u32 = 24;

/// The three lighting channels carried by every block.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Lighting {
    /// Light arriving straight down from the sky, `0..=MAX_LIGHT`.
    pub direct_skylight: u8,
    /// Skylight that has bounced or spread sideways, `0..=MAX_LIGHT`.
    pub indirect_skylight: u8,
    /// Light emitted by blocks, `0..=MAX_LIGHT`.
    pub indirect_artificial_light: u8,
}

impl Lighting {
    /// Fully lit in every channel.
    pub const FULL: Lighting = Lighting {
        direct_skylight: MAX_LIGHT,
        indirect_skylight: MAX_LIGHT,
        indirect_artificial_light: MAX_LIGHT,
    };

    /// Creates a lighting value, clamping each channel to `MAX_LIGHT`.
    pub fn new(direct_skylight: u8, indirect_skylight: u8, indirect_artificial_light: u8) -> Self {
        Lighting {
            direct_skylight: direct_skylight.min(MAX_LIGHT),
            indirect_skylight: indirect_skylight.min(MAX_LIGHT),
            indirect_artificial_light: indirect_artificial_light.min(MAX_LIGHT),
        }
    }
}

/// Represents a single voxel in the world.
///
/// Blocks are immutable values; changing a block means storing a different `Block`.
/// Equality and hashing operate on the packed representation, which makes leaf
/// nodes cheap to hash-cons.
///
/// # Memory Layout
/// The `#[repr(C)]` attribute and `Pod` derive allow block buffers to be viewed as raw
/// `u32` data without copying.
#[repr(C)]
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Block {
    value: u32,
}

impl Block {
    /// Creates a new block of the specified kind with the given lighting.
    pub fn new(kind: BlockKind, lighting: Lighting) -> Self {
        let lighting = Lighting::new(
            lighting.direct_skylight,
            lighting.indirect_skylight,
            lighting.indirect_artificial_light,
        );
        Block {
            value: kind.id() as u32
                | (lighting.direct_skylight as u32) << DIRECT_SKYLIGHT_SHIFT
                | (lighting.indirect_skylight as u32) << INDIRECT_SKYLIGHT_SHIFT
                | (lighting.indirect_artificial_light as u32) << INDIRECT_ARTIFICIAL_LIGHT_SHIFT,
        }
    }

    /// Creates an unlit block of the specified kind.
    pub fn of_kind(kind: BlockKind) -> Self {
        Block::new(kind, Lighting::default())
    }

    /// Returns the kind of this block.
    pub fn kind(&self) -> BlockKind {
        BlockKind::from_id((self.value & KIND_MASK) as BlockKindSize)
    }

    /// Returns the lighting of this block.
    pub fn lighting(&self) -> Lighting {
        Lighting {
            direct_skylight: ((self.value >> DIRECT_SKYLIGHT_SHIFT) & LIGHT_MASK) as u8,
            indirect_skylight: ((self.value >> INDIRECT_SKYLIGHT_SHIFT) & LIGHT_MASK) as u8,
            indirect_artificial_light: ((self.value >> INDIRECT_ARTIFICIAL_LIGHT_SHIFT)
                & LIGHT_MASK) as u8,
        }
    }

    /// Returns a copy of this block with the lighting replaced.
    pub fn with_lighting(self, lighting: Lighting) -> Self {
        Block::new(self.kind(), lighting)
    }

    /// Returns a copy of this block with the kind replaced, keeping its lighting.
    pub fn with_kind(self, kind: BlockKind) -> Self {
        Block::new(kind, self.lighting())
    }

    /// The packed representation.
    pub fn to_raw(self) -> u32 {
        self.value
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lighting = self.lighting();
        write!(
            f,
            "Block({:?}, light: {}/{}/{})",
            self.kind(),
            lighting.direct_skylight,
            lighting.indirect_skylight,
            lighting.indirect_artificial_light
        )
    }
}

/// A cheap per-subtree rendering summary.
///
/// Summaries combine with a logical AND per field, so the summary of a subtree answers
/// "does every block in here render like air" and "does every block in here render like
/// bedrock" without visiting the blocks. The identity element has both fields set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockSummary {
    /// Every block covered renders like air (nothing to draw).
    pub renders_like_air: bool,
    /// Every block covered renders like bedrock (opaque, never exposed).
    pub renders_like_bedrock: bool,
}

impl BlockSummary {
    /// The identity of [`BlockSummary::combine`].
    pub const IDENTITY: BlockSummary = BlockSummary {
        renders_like_air: true,
        renders_like_bedrock: true,
    };

    /// Summary of a block that neither renders like air nor like bedrock.
    pub const ORDINARY: BlockSummary = BlockSummary {
        renders_like_air: false,
        renders_like_bedrock: false,
    };

    /// Combines two summaries. Associative and commutative.
    pub fn combine(self, other: BlockSummary) -> BlockSummary {
        BlockSummary {
            renders_like_air: self.renders_like_air && other.renders_like_air,
            renders_like_bedrock: self.renders_like_bedrock && other.renders_like_bedrock,
        }
    }
}

impl Default for BlockSummary {
    fn default() -> Self {
        BlockSummary::IDENTITY
    }
}

impl std::iter::FromIterator<BlockSummary> for BlockSummary {
    fn from_iter<I: IntoIterator<Item = BlockSummary>>(iter: I) -> Self {
        iter.into_iter().fold(BlockSummary::IDENTITY, BlockSummary::combine)
    }
}
