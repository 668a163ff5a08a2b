//! # World Configuration
//!
//! Tunables for a [`World`](crate::World). Defaults match what the engine ships with.

/// Default cap on `BlockStepGlobalState::log2_step_size`.
pub const DEFAULT_MAX_LOG2_STEP_SIZE: u32 = 4;

/// Default level of the subtrees render cache entries are built from (16 blocks wide).
pub const DEFAULT_RENDER_CHUNK_LEVEL: u32 = 3;

/// Default level of a freshly created world's root (16 blocks wide).
pub const DEFAULT_INITIAL_ROOT_LEVEL: u32 = 3;

/// The deepest node level. A root at this level spans `[-2^30, 2^30)` on each axis.
pub const MAX_LEVEL: u32 = 30;

/// Writes must land in `[-2^MAX_WRITE_LEVEL, 2^MAX_WRITE_LEVEL)` on each axis.
///
/// Stepping needs the content inside the middle half of a root that can still be
/// doubled once, which a root at `MAX_LEVEL - 1` offers exactly up to this bound.
pub const MAX_WRITE_LEVEL: u32 = MAX_LEVEL - 2;

/// Tunables for a world.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Upper bound on the step size requested through a global state.
    pub max_log2_step_size: u32,
    /// Level of the canonical subtrees forming render cache keys.
    pub render_chunk_level: u32,
    /// Level of the root when the world is created.
    pub initial_root_level: u32,
}

impl WorldConfig {
    /// Width in blocks of one render chunk.
    pub fn render_chunk_size(&self) -> i32 {
        1 << (self.render_chunk_level + 1)
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            max_log2_step_size: DEFAULT_MAX_LOG2_STEP_SIZE,
            render_chunk_level: DEFAULT_RENDER_CHUNK_LEVEL,
            initial_root_level: DEFAULT_INITIAL_ROOT_LEVEL,
        }
    }
}
