//! # Render Cache Module
//!
//! Caches whatever a renderer builds for one chunk (a mesh, a packed buffer, anything)
//! keyed by the exact subtrees that chunk and its 26 neighbors were built from.
//!
//! ## Keys
//!
//! Chunks are the nodes at the world's render chunk level. Since nodes are hash-consed,
//! two chunks whose 3x3x3 neighborhoods are the same nodes are guaranteed to have the
//! same blocks, so an entry stays valid for as long as none of those 27 subtrees change,
//! even if the chunk moves or is repeated elsewhere in the world. Keys hold their nodes,
//! so a cached neighborhood is never collected out from under its entry.
//!
//! ## Eviction
//!
//! Entries are kept in least-recently-used order and trimmed when the world collects
//! garbage.

use std::{any::Any, fmt, sync::Arc};

use cgmath::{Point3, Vector3};
use lru::LruCache;

use crate::voxels::{
    block::{block_step::BlockStepGlobalState, Block},
    node::NodeRef,
};

use super::World;

/// A type-erased, shareable render artifact.
///
/// The world never looks inside a buffer; renderers downcast it back to whatever they
/// stored.
#[derive(Clone)]
pub struct RenderBuffer(Arc<dyn Any + Send + Sync>);

impl RenderBuffer {
    /// Wraps `value` for storage in the render cache.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        RenderBuffer(Arc::new(value))
    }

    /// Returns the stored value if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// True if both handles share one allocation.
    pub fn ptr_eq(&self, other: &RenderBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RenderBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RenderBuffer").finish_non_exhaustive()
    }
}

/// The 27 chunk subtrees around a chunk, x fastest, plus the state they are rendered for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderCacheKey {
    neighborhood: [NodeRef; 27],
    global_state: BlockStepGlobalState,
}

impl RenderCacheKey {
    /// The chunk subtrees, x fastest, the center chunk at index 13.
    pub fn neighborhood(&self) -> &[NodeRef; 27] {
        &self.neighborhood
    }

    /// The global state the entry was built for.
    pub fn global_state(&self) -> BlockStepGlobalState {
        self.global_state
    }
}

/// A cache miss, carrying what the caller needs to build the missing buffer.
#[derive(Clone, Debug)]
pub struct PendingRenderCacheEntry {
    key: RenderCacheKey,
    position: Point3<i32>,
    chunk_size: i32,
}

impl PendingRenderCacheEntry {
    /// The key the buffer will be stored under.
    pub fn key(&self) -> &RenderCacheKey {
        &self.key
    }

    /// World position of the chunk's minimum corner.
    pub fn position(&self) -> Point3<i32> {
        self.position
    }

    /// Side length of the chunk in blocks.
    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// The chunk at `(dx, dy, dz)` chunks from the center, each in `-1..=1`.
    pub fn chunk(&self, dx: i32, dy: i32, dz: i32) -> &NodeRef {
        assert!(
            [dx, dy, dz].iter().all(|d| (-1..=1).contains(d)),
            "chunk offset ({}, {}, {}) outside the neighborhood",
            dx,
            dy,
            dz
        );
        &self.key.neighborhood[((dx + 1) + 3 * (dy + 1) + 9 * (dz + 1)) as usize]
    }

    /// Reads a block relative to the center chunk's minimum corner.
    ///
    /// Each component of `offset` must be in `-chunk_size..2 * chunk_size`.
    pub fn get_block(&self, offset: Vector3<i32>) -> Block {
        let size = self.chunk_size;
        let split = |value: i32| (value.div_euclid(size), value.rem_euclid(size) - size / 2);
        let (cx, lx) = split(offset.x);
        let (cy, ly) = split(offset.y);
        let (cz, lz) = split(offset.z);
        self.chunk(cx, cy, cz).get(Vector3::new(lx, ly, lz))
    }
}

/// The result of [`World::get_render_cache_entry`].
#[derive(Clone, Debug)]
pub enum RenderCacheLookup {
    /// A buffer built earlier for the same neighborhood and global state.
    Hit(RenderBuffer),
    /// Nothing cached; build a buffer and hand it to [`World::set_render_cache_entry`].
    Miss(PendingRenderCacheEntry),
}

pub(crate) struct RenderCache {
    entries: LruCache<RenderCacheKey, RenderBuffer>,
}

impl RenderCache {
    pub(crate) fn new() -> Self {
        RenderCache {
            entries: LruCache::unbounded(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&mut self, key: &RenderCacheKey) -> Option<RenderBuffer> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: RenderCacheKey, buffer: RenderBuffer) {
        self.entries.put(key, buffer);
    }

    /// Drops least recently used entries until at most `target` remain.
    pub(crate) fn evict_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > target {
            if self.entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        evicted
    }
}

impl World {
    /// Looks up the render buffer for the chunk whose minimum corner is `position`.
    ///
    /// # Panics
    /// Panics if `position` is not a multiple of the render chunk size.
    pub fn get_render_cache_entry(
        &mut self,
        position: Point3<i32>,
        global_state: BlockStepGlobalState,
    ) -> RenderCacheLookup {
        let size = self.config.render_chunk_size();
        assert!(
            position.x % size == 0 && position.y % size == 0 && position.z % size == 0,
            "render chunk position {:?} not aligned to {}",
            position,
            size
        );
        let level = self.config.render_chunk_level;
        let neighborhood = std::array::from_fn(|index| {
            let index = index as i32;
            let offset = Vector3::new(index % 3 - 1, (index / 3) % 3 - 1, index / 9 - 1);
            // neighbors past the edge of i32 are outside any world
            let corner = position
                .x
                .checked_add(offset.x * size)
                .zip(position.y.checked_add(offset.y * size))
                .zip(position.z.checked_add(offset.z * size))
                .map(|((x, y), z)| Point3::new(x, y, z));
            self.chunk_at(corner, level)
        });
        let key = RenderCacheKey {
            neighborhood,
            global_state,
        };
        match self.render_cache.get(&key) {
            Some(buffer) => RenderCacheLookup::Hit(buffer),
            None => RenderCacheLookup::Miss(PendingRenderCacheEntry {
                key,
                position,
                chunk_size: size,
            }),
        }
    }

    /// Stores the buffer built for a missed lookup.
    pub fn set_render_cache_entry(&mut self, pending: PendingRenderCacheEntry, buffer: RenderBuffer) {
        self.render_cache.insert(pending.key, buffer);
    }

    fn chunk_at(&mut self, corner: Option<Point3<i32>>, level: u32) -> NodeRef {
        let half = self.root.half_size() as i64;
        match corner {
            Some(corner)
                if [corner.x, corner.y, corner.z]
                    .iter()
                    .all(|value| (-half..half).contains(&(*value as i64))) =>
            {
                self.root
                    .get_at_level(Vector3::new(corner.x, corner.y, corner.z), level)
            }
            _ => self.table.empty_node(level),
        }
    }
}
