//! Hashlife stepping.
//!
//! The future of a level `L` node is its centered level `L - 1` cube advanced by
//! `min(2^(L - 1), step size)` generations. It is computed from 27 overlapping
//! intermediate cubes advanced half way, recombined into eight cubes advanced the rest
//! of the way, and memoized in the node table so identical subtrees are only ever
//! stepped once per global state.
//!
//! Extra action positions are relative to the center of the node that produced them.

use cgmath::Vector3;

use crate::{
    config::MAX_LEVEL,
    voxels::{
        block::{
            block_step::{BlockNeighborhood, BlockStepExtraActions, BlockStepGlobalState},
            Block,
        },
        node::{
            node_table::{FutureState, NodeTable},
            NodeRef, OCTANTS,
        },
    },
};

use super::{leaf_offset, World};

impl World {
    /// Advances the whole world by `2^log2_step_size` generations and returns the extra
    /// actions the block rules emitted, in world coordinates.
    ///
    /// Step sizes above the configured maximum are clamped to it.
    pub fn step(&mut self, global_state: BlockStepGlobalState) -> BlockStepExtraActions {
        let global_state = if global_state.log2_step_size > self.config.max_log2_step_size {
            log::warn!(
                "clamping log2 step size {} to {}",
                global_state.log2_step_size,
                self.config.max_log2_step_size
            );
            BlockStepGlobalState::new(self.config.max_log2_step_size)
        } else {
            global_state
        };
        let log2_step_size = global_state.log2_step_size;

        loop {
            let deep_enough = self.root.level() >= log2_step_size + 2;
            if deep_enough && self.content_within_inner_half() {
                break;
            }
            if self.root.level() + 1 < MAX_LEVEL {
                self.expand_root();
            } else {
                self.drop_outer_shell();
                break;
            }
        }
        // one more doubling so the content can't reach the edge of the future
        self.expand_root();

        let root = self.root.clone();
        let mut stepper = Stepper {
            table: &mut self.table,
            global_state,
        };
        let (future, extra_actions) = stepper.future(&root);
        log::trace!(
            "stepped {} generations, root level {} -> {}, {} extra actions",
            global_state.step_size_in_generations(),
            root.level(),
            future.level(),
            extra_actions.len()
        );
        self.set_root(future);
        while self.root.level() <= self.config.render_chunk_level {
            self.expand_root();
        }
        extra_actions
    }

    /// [`World::step`] followed by [`World::collect_garbage`].
    pub fn step_and_collect_garbage(
        &mut self,
        global_state: BlockStepGlobalState,
        node_target: usize,
        cache_target: usize,
    ) -> BlockStepExtraActions {
        let extra_actions = self.step(global_state);
        self.collect_garbage(node_target, cache_target);
        extra_actions
    }

    /// Clears everything outside the middle half of the root.
    ///
    /// Only reachable once blocks have moved past the write bounds and the root can't
    /// grow any further.
    fn drop_outer_shell(&mut self) {
        log::warn!(
            "blocks moved beyond the largest steppable world, clearing the outside of the level {} root",
            self.root.level()
        );
        let empty = self.table.empty_node(self.root.level() - 2);
        let old_children = self.root.children().clone();
        let children = std::array::from_fn(|index| {
            let mut grandchildren = std::array::from_fn(|_| empty.clone());
            let inner = index ^ (OCTANTS - 1);
            grandchildren[inner] = old_children[index].child(inner).clone();
            self.table.nonleaf(grandchildren)
        });
        let root = self.table.nonleaf(children);
        self.set_root(root);
    }

    /// True if everything outside the middle half of the root is canonical empty.
    fn content_within_inner_half(&self) -> bool {
        self.root.children().iter().enumerate().all(|(index, child)| {
            child
                .children()
                .iter()
                .enumerate()
                .all(|(inner, grandchild)| {
                    inner == index ^ (OCTANTS - 1) || self.table.is_empty_node(grandchild)
                })
        })
    }
}

struct Stepper<'a> {
    table: &'a mut NodeTable,
    global_state: BlockStepGlobalState,
}

impl Stepper<'_> {
    fn future(&mut self, node: &NodeRef) -> (NodeRef, BlockStepExtraActions) {
        debug_assert!(node.level() >= 1);
        if self.table.is_empty_node(node) {
            return (
                self.table.empty_node(node.level() - 1),
                BlockStepExtraActions::new(),
            );
        }
        if let Some(memo) = self.table.future(node) {
            if memo.global_state == self.global_state {
                return (memo.result.clone(), memo.extra_actions.clone());
            }
        }

        let (result, extra_actions) = if node.level() == 1 {
            self.step_blocks(node)
        } else {
            self.step_subtrees(node)
        };
        self.table.set_future(
            node,
            FutureState {
                result: result.clone(),
                global_state: self.global_state,
                extra_actions: extra_actions.clone(),
            },
        );
        (result, extra_actions)
    }

    /// Runs the block rules once over the center 2x2x2 of a level 1 node.
    fn step_blocks(&mut self, node: &NodeRef) -> (NodeRef, BlockStepExtraActions) {
        let registry = self.table.registry().clone();
        let mut blocks = [[[Block::default(); 4]; 4]; 4];
        for (x, plane) in blocks.iter_mut().enumerate() {
            for (y, row) in plane.iter_mut().enumerate() {
                for (z, block) in row.iter_mut().enumerate() {
                    *block = node.get(Vector3::new(x as i32 - 2, y as i32 - 2, z as i32 - 2));
                }
            }
        }

        let mut extra_actions = BlockStepExtraActions::new();
        let stepped = std::array::from_fn(|index| {
            let offset = leaf_offset(index);
            let mut neighborhood = BlockNeighborhood::filled(Block::default());
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let x = (offset.x + 2 + dx) as usize;
                        let y = (offset.y + 2 + dy) as usize;
                        let z = (offset.z + 2 + dz) as usize;
                        neighborhood.set(dx, dy, dz, blocks[x][y][z]);
                    }
                }
            }
            let output = registry.step(&neighborhood, &self.global_state);
            extra_actions.combine_translated(&output.extra_actions, offset, |_| true);
            output.block
        });
        (self.table.leaf(stepped), extra_actions)
    }

    fn step_subtrees(&mut self, node: &NodeRef) -> (NodeRef, BlockStepExtraActions) {
        let level = node.level();
        // each of the 27 partial results is advanced this far before recombining
        let full_speed = self.global_state.log2_step_size >= level - 1;
        let grandchild_half_size = 1i32 << (level - 2);
        let intermediate_spacing = grandchild_half_size * 2;
        let result_half_size = intermediate_spacing;

        let grandchild = |x: usize, y: usize, z: usize| {
            let child = (x / 2) | (y / 2) << 1 | (z / 2) << 2;
            let inner = (x % 2) | (y % 2) << 1 | (z % 2) << 2;
            node.child(child).child(inner).clone()
        };

        let mut extra_actions = BlockStepExtraActions::new();
        let in_result = |position: Vector3<i32>| {
            let inside = |value: i32| (-result_half_size..result_half_size).contains(&value);
            inside(position.x) && inside(position.y) && inside(position.z)
        };

        let mut partials: Vec<NodeRef> = Vec::with_capacity(27);
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    let intermediate = self.table.nonleaf(std::array::from_fn(|index| {
                        grandchild(i + (index & 1), j + ((index >> 1) & 1), k + (index >> 2))
                    }));
                    let partial = if full_speed {
                        let (partial, actions) = self.future(&intermediate);
                        let offset = Vector3::new(i as i32 - 1, j as i32 - 1, k as i32 - 1)
                            * intermediate_spacing;
                        extra_actions.combine_translated(&actions, offset, in_result);
                        partial
                    } else {
                        self.center(&intermediate)
                    };
                    partials.push(partial);
                }
            }
        }
        let partial = |i: usize, j: usize, k: usize| &partials[i + 3 * j + 9 * k];

        let results = std::array::from_fn(|index| {
            let (a, b, c) = (index & 1, (index >> 1) & 1, index >> 2);
            let combined = self.table.nonleaf(std::array::from_fn(|inner| {
                partial(a + (inner & 1), b + ((inner >> 1) & 1), c + (inner >> 2)).clone()
            }));
            let (result, actions) = self.future(&combined);
            let offset = Vector3::new(2 * a as i32 - 1, 2 * b as i32 - 1, 2 * c as i32 - 1)
                * grandchild_half_size;
            extra_actions.combine_translated(&actions, offset, |_| true);
            result
        });
        (self.table.nonleaf(results), extra_actions)
    }

    /// The centered half-size cube of `node`, not advanced.
    fn center(&mut self, node: &NodeRef) -> NodeRef {
        if node.level() == 1 {
            let blocks = std::array::from_fn(|index| {
                node.child(index).leaf_blocks()[index ^ (OCTANTS - 1)]
            });
            self.table.leaf(blocks)
        } else {
            let children = std::array::from_fn(|index| {
                node.child(index).child(index ^ (OCTANTS - 1)).clone()
            });
            self.table.nonleaf(children)
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::voxels::{
        block::block_kind::BlockKind,
        region::{BlockBuffer, BlockRegion},
    };

    fn world() -> World {
        crate::init_logger();
        World::default()
    }

    fn sand() -> Block {
        Block::of_kind(BlockKind::SAND)
    }

    #[test]
    fn empty_world_stays_empty() {
        let mut world = world();
        let actions = world.step(BlockStepGlobalState::new(3));
        assert!(actions.is_empty());
        assert!(world.table().is_empty_node(world.root()));
    }

    #[test]
    fn sand_falls_one_block_per_generation() {
        let mut world = world();
        world.set_block(Point3::new(0, 5, 0), sand()).unwrap();
        world.step(BlockStepGlobalState::new(0));
        assert_eq!(world.get(Point3::new(0, 5, 0)), Block::default());
        assert_eq!(world.get(Point3::new(0, 4, 0)), sand());
    }

    #[test]
    fn large_steps_match_repeated_small_steps() {
        let mut fast = world();
        let mut slow = world();
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..20 {
            let position = Point3::new(rng.i32(-6..6), rng.i32(-6..6), rng.i32(-6..6));
            let block = if rng.bool() {
                sand()
            } else {
                Block::of_kind(BlockKind::STONE)
            };
            fast.set_block(position, block).unwrap();
            slow.set_block(position, block).unwrap();
        }

        fast.step(BlockStepGlobalState::new(3));
        for _ in 0..8 {
            slow.step(BlockStepGlobalState::new(0));
        }

        let region = BlockRegion::new(Point3::new(-24, -24, -24), Point3::new(24, 24, 24)).unwrap();
        let mut fast_blocks = BlockBuffer::for_region(&region);
        let mut slow_blocks = BlockBuffer::for_region(&region);
        fast.get_blocks(&region, &mut fast_blocks).unwrap();
        slow.get_blocks(&region, &mut slow_blocks).unwrap();
        assert_eq!(fast_blocks, slow_blocks);
    }

    #[test]
    fn beacons_emit_one_action_per_generation() {
        let mut world = world();
        let beacon = Block::of_kind(BlockKind::BEACON);
        let position = Point3::new(-3, 2, 7);
        world.set_block(position, beacon).unwrap();

        let actions = world.step(BlockStepGlobalState::new(2));
        assert_eq!(actions.len(), 4);
        for action in actions.iter() {
            assert_eq!(action.position, Vector3::new(-3, 2, 7));
            assert_eq!(action.block, beacon);
        }
        assert_eq!(world.get(position), beacon);
    }

    #[test]
    fn repeated_steps_reuse_memoized_futures() {
        let mut world = world();
        world
            .set_block(Point3::new(1, 1, 1), Block::of_kind(BlockKind::STONE))
            .unwrap();
        let global_state = BlockStepGlobalState::new(1);
        world.step(global_state);
        let root = world.root().clone();
        let live = world.live_node_count();
        world.step(global_state);
        // stone is static, so the second step builds nothing new
        assert_eq!(world.root(), &root);
        assert_eq!(world.live_node_count(), live);
    }

    #[test]
    fn blocks_falling_off_the_world_are_dropped() {
        let mut world = world();
        let bottom = -(1 << crate::config::MAX_WRITE_LEVEL);
        world.set_block(Point3::new(0, bottom, 0), sand()).unwrap();
        world.set_block(Point3::new(0, 0, 0), Block::of_kind(BlockKind::STONE)).unwrap();

        world.step(BlockStepGlobalState::new(4));
        assert_eq!(world.get(Point3::new(0, bottom - 16, 0)), sand());

        // the sand now sits below anything a root can step; it is cleared, not a panic
        world.step(BlockStepGlobalState::new(4));
        assert_eq!(world.get(Point3::new(0, bottom - 16, 0)), Block::default());
        assert_eq!(world.get(Point3::new(0, bottom - 32, 0)), Block::default());
        assert_eq!(world.get(Point3::new(0, 0, 0)), Block::of_kind(BlockKind::STONE));
        assert!(world.root().level() < MAX_LEVEL);
    }

    #[test]
    fn oversized_steps_are_clamped() {
        let mut world = world();
        world.set_block(Point3::new(0, 100, 0), sand()).unwrap();
        let max = world.config().max_log2_step_size;
        world.step(BlockStepGlobalState::new(max + 3));
        let fallen = 100 - (1 << max);
        assert_eq!(world.get(Point3::new(0, fallen, 0)), sand());
    }
}
