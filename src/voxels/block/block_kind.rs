//! # Block Kind Module
//!
//! Block kinds are small opaque ids. What a kind *does* lives in a [`BlockBehavior`]
//! registered with a [`BlockKindRegistry`]; the world tree only ever consults the
//! registry for two things: the rendering summary of a kind (when a leaf is built)
//! and the per-generation step rule (when the world is advanced).

use std::{fmt, sync::Arc};

use cgmath::Vector3;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use super::{
    block_step::{
        BlockNeighborhood, BlockStepExtraAction, BlockStepExtraActions, BlockStepGlobalState,
        BlockStepOutput,
    },
    Block, BlockKindSize, BlockSummary,
};

/// An opaque block kind id.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKind(BlockKindSize);

impl BlockKind {
    /// Empty space. Always id 0 so that the all-zero [`Block`] is air.
    pub const AIR: BlockKind = BlockKind(BuiltinBlockKind::Air as BlockKindSize);
    /// An inert solid.
    pub const STONE: BlockKind = BlockKind(BuiltinBlockKind::Stone as BlockKindSize);
    /// An inert solid that renders like the bottom of the world.
    pub const BEDROCK: BlockKind = BlockKind(BuiltinBlockKind::Bedrock as BlockKindSize);
    /// Falls one block per generation while there is air below it.
    pub const SAND: BlockKind = BlockKind(BuiltinBlockKind::Sand as BlockKindSize);
    /// An inert solid that emits a notification every generation.
    pub const BEACON: BlockKind = BlockKind(BuiltinBlockKind::Beacon as BlockKindSize);

    /// Wraps a raw id.
    pub const fn from_id(id: BlockKindSize) -> Self {
        BlockKind(id)
    }

    /// The raw id.
    pub const fn id(self) -> BlockKindSize {
        self.0
    }

    /// Returns the built-in kind this id refers to, if any.
    pub fn builtin(self) -> Option<BuiltinBlockKind> {
        BuiltinBlockKind::from_u16(self.0)
    }
}

impl fmt::Debug for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.builtin() {
            Some(builtin) => write!(f, "{:?}", builtin),
            None => write!(f, "BlockKind({})", self.0),
        }
    }
}

/// The kinds every registry starts with, in id order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BuiltinBlockKind {
    /// See [`BlockKind::AIR`].
    Air,
    /// See [`BlockKind::STONE`].
    Stone,
    /// See [`BlockKind::BEDROCK`].
    Bedrock,
    /// See [`BlockKind::SAND`].
    Sand,
    /// See [`BlockKind::BEACON`].
    Beacon,
}

/// Per-kind behavior consulted by rendering summaries and by world stepping.
///
/// # Contract
///
/// Air surrounded entirely by air must step to the same air block and emit no extra
/// actions. Stepping relies on this to treat empty space as a fixed point.
pub trait BlockBehavior: Send + Sync {
    /// A human readable name, used in logs.
    fn name(&self) -> &str;

    /// The rendering summary of a single block of this kind.
    fn summary(&self) -> BlockSummary {
        BlockSummary::ORDINARY
    }

    /// Computes the next generation of the center block of `neighborhood`.
    ///
    /// Extra action positions are relative to the center block.
    fn step(
        &self,
        neighborhood: &BlockNeighborhood,
        _global_state: &BlockStepGlobalState,
    ) -> BlockStepOutput {
        BlockStepOutput::unchanged(neighborhood.center())
    }
}

/// Behavior of blocks that never change.
pub struct InertBehavior {
    name: String,
    summary: BlockSummary,
}

impl InertBehavior {
    /// Creates an inert behavior with the given summary.
    pub fn new(name: impl Into<String>, summary: BlockSummary) -> Self {
        InertBehavior {
            name: name.into(),
            summary,
        }
    }
}

impl BlockBehavior for InertBehavior {
    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) -> BlockSummary {
        self.summary
    }
}

struct AirBehavior;

impl BlockBehavior for AirBehavior {
    fn name(&self) -> &str {
        "air"
    }

    fn summary(&self) -> BlockSummary {
        BlockSummary {
            renders_like_air: true,
            renders_like_bedrock: false,
        }
    }

    fn step(
        &self,
        neighborhood: &BlockNeighborhood,
        _global_state: &BlockStepGlobalState,
    ) -> BlockStepOutput {
        let above = neighborhood.get(0, 1, 0);
        if above.kind() == BlockKind::SAND {
            BlockStepOutput::unchanged(above)
        } else {
            BlockStepOutput::unchanged(neighborhood.center())
        }
    }
}

struct SandBehavior;

impl BlockBehavior for SandBehavior {
    fn name(&self) -> &str {
        "sand"
    }

    fn step(
        &self,
        neighborhood: &BlockNeighborhood,
        _global_state: &BlockStepGlobalState,
    ) -> BlockStepOutput {
        let below = neighborhood.get(0, -1, 0);
        if below.kind() == BlockKind::AIR {
            BlockStepOutput::unchanged(below)
        } else {
            BlockStepOutput::unchanged(neighborhood.center())
        }
    }
}

struct BeaconBehavior;

impl BlockBehavior for BeaconBehavior {
    fn name(&self) -> &str {
        "beacon"
    }

    fn step(
        &self,
        neighborhood: &BlockNeighborhood,
        _global_state: &BlockStepGlobalState,
    ) -> BlockStepOutput {
        let center = neighborhood.center();
        BlockStepOutput {
            block: center,
            extra_actions: BlockStepExtraActions::single(BlockStepExtraAction {
                position: Vector3::new(0, 0, 0),
                block: center,
            }),
        }
    }
}

/// Maps block kinds to their behaviors.
///
/// Kind ids are handed out densely starting after the built-in kinds. Running out of
/// ids is unrecoverable: the registry logs the failure and panics.
pub struct BlockKindRegistry {
    behaviors: Vec<Arc<dyn BlockBehavior>>,
    fallback: Arc<dyn BlockBehavior>,
}

impl BlockKindRegistry {
    /// Creates a registry containing the built-in kinds.
    pub fn new() -> Self {
        let mut registry = BlockKindRegistry {
            behaviors: Vec::new(),
            fallback: Arc::new(InertBehavior::new("unknown", BlockSummary::ORDINARY)),
        };
        let air = registry.register(Arc::new(AirBehavior));
        let stone = registry.register(Arc::new(InertBehavior::new(
            "stone",
            BlockSummary::ORDINARY,
        )));
        let bedrock = registry.register(Arc::new(InertBehavior::new(
            "bedrock",
            BlockSummary {
                renders_like_air: false,
                renders_like_bedrock: true,
            },
        )));
        let sand = registry.register(Arc::new(SandBehavior));
        let beacon = registry.register(Arc::new(BeaconBehavior));
        debug_assert_eq!(
            [air, stone, bedrock, sand, beacon],
            [
                BlockKind::AIR,
                BlockKind::STONE,
                BlockKind::BEDROCK,
                BlockKind::SAND,
                BlockKind::BEACON
            ]
        );
        registry
    }

    /// Registers a new kind and returns its id.
    ///
    /// # Panics
    /// Panics if the id space is exhausted.
    pub fn register(&mut self, behavior: Arc<dyn BlockBehavior>) -> BlockKind {
        let id = self.behaviors.len();
        if id > BlockKindSize::MAX as usize {
            log::error!(
                "block kind id space exhausted while registering {:?}",
                behavior.name()
            );
            panic!("block kind id space exhausted");
        }
        log::debug!("registered block kind {} as {}", behavior.name(), id);
        self.behaviors.push(behavior);
        BlockKind(id as BlockKindSize)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Always false; the built-in kinds are registered on construction.
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Returns the behavior of `kind`. Unregistered kinds behave as inert ordinary blocks.
    pub fn behavior(&self, kind: BlockKind) -> &dyn BlockBehavior {
        match self.behaviors.get(kind.id() as usize) {
            Some(behavior) => behavior.as_ref(),
            None => self.fallback.as_ref(),
        }
    }

    /// Shorthand for the rendering summary of a single block.
    pub fn summary(&self, block: Block) -> BlockSummary {
        self.behavior(block.kind()).summary()
    }

    /// Runs the step rule for the center block of `neighborhood`.
    pub fn step(
        &self,
        neighborhood: &BlockNeighborhood,
        global_state: &BlockStepGlobalState,
    ) -> BlockStepOutput {
        self.behavior(neighborhood.center().kind())
            .step(neighborhood, global_state)
    }
}

impl Default for BlockKindRegistry {
    fn default() -> Self {
        BlockKindRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighborhood_with(center: Block, above: Block, below: Block) -> BlockNeighborhood {
        let mut neighborhood = BlockNeighborhood::filled(Block::default());
        neighborhood.set(0, 0, 0, center);
        neighborhood.set(0, 1, 0, above);
        neighborhood.set(0, -1, 0, below);
        neighborhood
    }

    #[test]
    fn builtin_ids_are_stable() {
        let registry = BlockKindRegistry::new();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.behavior(BlockKind::AIR).name(), "air");
        assert_eq!(registry.behavior(BlockKind::BEACON).name(), "beacon");
        assert_eq!(BlockKind::SAND.builtin(), Some(BuiltinBlockKind::Sand));
        assert_eq!(BlockKind::from_id(999).builtin(), None);
    }

    #[test]
    fn register_hands_out_next_id() {
        let mut registry = BlockKindRegistry::new();
        let glass = registry.register(Arc::new(InertBehavior::new(
            "glass",
            BlockSummary::ORDINARY,
        )));
        assert_eq!(glass.id(), 5);
        assert_eq!(registry.behavior(glass).name(), "glass");
    }

    #[test]
    fn unknown_kind_is_inert() {
        let registry = BlockKindRegistry::new();
        let block = Block::of_kind(BlockKind::from_id(1234));
        let neighborhood = neighborhood_with(block, Block::default(), Block::default());
        let output = registry.step(&neighborhood, &BlockStepGlobalState::default());
        assert_eq!(output.block, block);
        assert!(output.extra_actions.is_empty());
        assert_eq!(registry.summary(block), BlockSummary::ORDINARY);
    }

    #[test]
    fn air_in_air_is_a_fixed_point() {
        let registry = BlockKindRegistry::new();
        let neighborhood = BlockNeighborhood::filled(Block::default());
        let output = registry.step(&neighborhood, &BlockStepGlobalState::default());
        assert_eq!(output.block, Block::default());
        assert!(output.extra_actions.is_empty());
    }

    #[test]
    fn sand_swaps_with_air_below() {
        let registry = BlockKindRegistry::new();
        let sand = Block::of_kind(BlockKind::SAND);
        let air = Block::default();
        let global_state = BlockStepGlobalState::default();

        let falling = neighborhood_with(sand, air, air);
        assert_eq!(registry.step(&falling, &global_state).block, air);

        let filling = neighborhood_with(air, sand, air);
        assert_eq!(registry.step(&filling, &global_state).block, sand);

        let resting = neighborhood_with(sand, air, Block::of_kind(BlockKind::STONE));
        assert_eq!(registry.step(&resting, &global_state).block, sand);
    }

    #[test]
    fn beacon_emits_at_its_own_position() {
        let registry = BlockKindRegistry::new();
        let beacon = Block::of_kind(BlockKind::BEACON);
        let neighborhood = neighborhood_with(beacon, Block::default(), Block::default());
        let output = registry.step(&neighborhood, &BlockStepGlobalState::default());
        assert_eq!(output.block, beacon);
        assert_eq!(output.extra_actions.len(), 1);
        assert_eq!(
            output.extra_actions.iter().next().map(|action| action.position),
            Some(Vector3::new(0, 0, 0))
        );
    }
}
