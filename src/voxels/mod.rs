//! # Voxels Module
//!
//! Voxel data storage and simulation.
//!
//! ## Components
//!
//! - `block`: the packed [`Block`](block::Block) value, block kinds and their step rules
//! - `node`: hash-consed octree nodes and the table that owns them
//! - `region`: axis-aligned block regions and the buffers used for bulk reads and writes
//! - `world`: the [`World`](world::World), its snapshots, stepping and render cache
//!
//! ## Storage
//!
//! Blocks are stored in an octree whose nodes are shared wherever subtrees are equal.
//! An all-air region of any size costs one node per level, and a repeated structure is
//! stored once however many times it appears.

pub mod block;
pub mod node;
pub mod region;
pub mod world;
