#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Hashlife Voxels
//!
//! A voxel world store built on a hash-consed octree, with Hashlife-style stepping.
//!
//! Every subtree of the world is canonical: two structurally equal subtrees are the same
//! node. That makes copies free, lets writes share everything they don't touch, and lets
//! the simulation memoize the future of any subtree and reuse it wherever that subtree
//! shows up again.
//!
//! ## Key Modules
//!
//! * `core` - Concurrency primitives shared across the crate
//! * `config` - World tunables
//! * `error` - Errors returned by fallible world operations
//! * `voxels` - Blocks, nodes, the node table and the world
//!
//! ## Usage
//!
//! ```rust
//! use cgmath::Point3;
//! use hashlife_voxels::{Block, BlockKind, BlockStepGlobalState, World};
//!
//! hashlife_voxels::init_logger();
//!
//! let mut world = World::default();
//! world.set_block(Point3::new(0, 5, 0), Block::of_kind(BlockKind::SAND)).unwrap();
//!
//! // one generation: the sand falls one block
//! world.step(BlockStepGlobalState::new(0));
//! assert_eq!(world.get(Point3::new(0, 4, 0)).kind(), BlockKind::SAND);
//! ```
//!
//! ## Threading
//!
//! A [`World`] has one owner. [`Snapshot`]s and the [`SharedRoot`] are cheap, immutable
//! and `Send + Sync`, so readers on other threads never wait on the owner.

pub mod config;
pub mod core;
pub mod error;
pub mod voxels;

pub use config::WorldConfig;
pub use error::WorldError;
pub use voxels::{
    block::{
        block_kind::{BlockBehavior, BlockKind, BlockKindRegistry},
        block_step::{
            BlockNeighborhood, BlockStepExtraAction, BlockStepExtraActions, BlockStepGlobalState,
            BlockStepOutput,
        },
        Block, BlockSummary, Lighting,
    },
    node::{node_table::GcStats, NodeRef},
    region::{BlockBuffer, BlockRegion},
    world::{
        PendingRenderCacheEntry, RenderBuffer, RenderCacheLookup, SharedRoot, Snapshot, World,
    },
};

/// Sets up `env_logger` on stdout, filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init_logger() {
    let mut log_builder = env_logger::Builder::new();
    if log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init()
        .is_ok()
    {
        log::info!("Logger initialized");
    }
}
