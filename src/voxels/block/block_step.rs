//! # Block Step Module
//!
//! Types passed between the world stepping algorithm and block behaviors: the global
//! step configuration, the 3x3x3 input neighborhood, and the extra actions a behavior
//! may request alongside the next block value.

use cgmath::Vector3;

use super::Block;

/// Configuration shared by every block during one call to `World::step`.
///
/// Compared by value: a memoized future is only reused when the global state it was
/// computed for equals the current one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlockStepGlobalState {
    /// Log2 of the number of generations one step advances the world by.
    pub log2_step_size: u32,
}

impl BlockStepGlobalState {
    /// Creates a global state stepping `2^log2_step_size` generations at a time.
    pub fn new(log2_step_size: u32) -> Self {
        BlockStepGlobalState { log2_step_size }
    }

    /// The number of generations one step advances the world by.
    pub fn step_size_in_generations(&self) -> u64 {
        1 << self.log2_step_size
    }
}

/// A notification requested by a block while stepping.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockStepExtraAction {
    /// Where the action happened. Relative to whatever produced the action list.
    pub position: Vector3<i32>,
    /// The block that requested the action.
    pub block: Block,
}

/// An ordered collection of [`BlockStepExtraAction`]s.
///
/// Combining is concatenation, so it is associative with the empty list as identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockStepExtraActions {
    actions: Vec<BlockStepExtraAction>,
}

impl BlockStepExtraActions {
    /// The empty action list.
    pub fn new() -> Self {
        BlockStepExtraActions::default()
    }

    /// A list holding one action.
    pub fn single(action: BlockStepExtraAction) -> Self {
        BlockStepExtraActions {
            actions: vec![action],
        }
    }

    /// True if no actions were requested.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Iterates over the actions in the order they were combined.
    pub fn iter(&self) -> impl Iterator<Item = &BlockStepExtraAction> {
        self.actions.iter()
    }

    /// Appends all of `other` to `self`.
    pub fn combine(&mut self, other: BlockStepExtraActions) {
        if self.actions.is_empty() {
            self.actions = other.actions;
        } else {
            self.actions.extend(other.actions);
        }
    }

    /// Appends copies of the actions of `other` that satisfy `keep`, shifted by `offset`.
    pub(crate) fn combine_translated(
        &mut self,
        other: &BlockStepExtraActions,
        offset: Vector3<i32>,
        mut keep: impl FnMut(Vector3<i32>) -> bool,
    ) {
        self.actions.extend(
            other
                .actions
                .iter()
                .map(|action| BlockStepExtraAction {
                    position: action.position + offset,
                    block: action.block,
                })
                .filter(|action| keep(action.position)),
        );
    }
}

impl IntoIterator for BlockStepExtraActions {
    type Item = BlockStepExtraAction;
    type IntoIter = std::vec::IntoIter<BlockStepExtraAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

impl FromIterator<BlockStepExtraAction> for BlockStepExtraActions {
    fn from_iter<I: IntoIterator<Item = BlockStepExtraAction>>(iter: I) -> Self {
        BlockStepExtraActions {
            actions: iter.into_iter().collect(),
        }
    }
}

/// The 3x3x3 blocks surrounding (and including) the block being stepped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockNeighborhood {
    blocks: [Block; 27],
}

impl BlockNeighborhood {
    /// A neighborhood where every block is `block`.
    pub fn filled(block: Block) -> Self {
        BlockNeighborhood { blocks: [block; 27] }
    }

    #[inline]
    fn index(dx: i32, dy: i32, dz: i32) -> usize {
        debug_assert!((-1..=1).contains(&dx) && (-1..=1).contains(&dy) && (-1..=1).contains(&dz));
        ((dx + 1) + 3 * (dy + 1) + 9 * (dz + 1)) as usize
    }

    /// The block at offset `(dx, dy, dz)` from the center, each in `-1..=1`.
    #[inline]
    pub fn get(&self, dx: i32, dy: i32, dz: i32) -> Block {
        self.blocks[Self::index(dx, dy, dz)]
    }

    /// Replaces the block at offset `(dx, dy, dz)` from the center.
    #[inline]
    pub fn set(&mut self, dx: i32, dy: i32, dz: i32, block: Block) {
        self.blocks[Self::index(dx, dy, dz)] = block;
    }

    /// The block being stepped.
    #[inline]
    pub fn center(&self) -> Block {
        self.get(0, 0, 0)
    }
}

/// What a behavior returns for one block and one generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockStepOutput {
    /// The block's value in the next generation.
    pub block: Block,
    /// Actions requested this generation, positioned relative to the block.
    pub extra_actions: BlockStepExtraActions,
}

impl BlockStepOutput {
    /// An output with no extra actions.
    pub fn unchanged(block: Block) -> Self {
        BlockStepOutput {
            block,
            extra_actions: BlockStepExtraActions::new(),
        }
    }
}
