//! # Node Module
//!
//! Nodes are the immutable building blocks of the world tree. A node at `level` covers a
//! cube `2^(level+1)` blocks wide and is split into eight octants:
//!
//! * a **leaf** (level 0) stores its eight blocks directly;
//! * a **nonleaf** (level > 0) stores eight handles to canonical children one level down.
//!
//! Nodes are only ever created by the [`NodeTable`](node_table::NodeTable), which
//! guarantees that structurally equal nodes are the same allocation. That makes handle
//! identity a valid (and cheap) equality test for whole subtrees.
//!
//! ## Coordinates
//!
//! Node-local coordinates are centered: a node with half size `h = 2^level` addresses
//! `[-h, h)` on every axis. The octant index packs one bit per axis, `x | y << 1 | z << 2`,
//! where a bit is set for the non-negative half.

pub mod node_table;

use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::Arc,
};

use cgmath::Vector3;

use super::block::{Block, BlockSummary};

/// Number of octants in a node.
pub const OCTANTS: usize = 8;

/// Returns the octant index holding `position`.
#[inline]
pub fn octant_index(position: Vector3<i32>) -> usize {
    (position.x >= 0) as usize | ((position.y >= 0) as usize) << 1 | ((position.z >= 0) as usize) << 2
}

/// Center of octant `index` relative to its parent's center, for a parent whose children
/// have half size `child_half_size`.
#[inline]
pub fn octant_center(index: usize, child_half_size: i32) -> Vector3<i32> {
    let axis = |bit: usize| {
        if index & bit != 0 {
            child_half_size
        } else {
            -child_half_size
        }
    };
    Vector3::new(axis(1), axis(2), axis(4))
}

/// Maps a parent-local position into the child octant that contains it.
#[inline]
fn child_position(position: Vector3<i32>, child_half_size: i32) -> Vector3<i32> {
    position - octant_center(octant_index(position), child_half_size)
}

/// The payload of a node.
pub enum NodeKind {
    /// Level 0: eight blocks, indexed by octant.
    Leaf([Block; OCTANTS]),
    /// Level > 0: eight canonical children, indexed by octant.
    Nonleaf([NodeRef; OCTANTS]),
}

/// An immutable node of the world tree.
///
/// The summary is computed once when the node is built. The serial number is unique per
/// allocation, so it distinguishes a node that was collected and rebuilt from the
/// original.
pub struct Node {
    level: u32,
    summary: BlockSummary,
    serial: u64,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn new_leaf(blocks: [Block; OCTANTS], summary: BlockSummary, serial: u64) -> Self {
        Node {
            level: 0,
            summary,
            serial,
            kind: NodeKind::Leaf(blocks),
        }
    }

    pub(crate) fn new_nonleaf(children: [NodeRef; OCTANTS], serial: u64) -> Self {
        let level = children[0].level + 1;
        debug_assert!(children.iter().all(|child| child.level + 1 == level));
        let summary = children.iter().map(|child| child.summary).collect();
        Node {
            level,
            summary,
            serial,
            kind: NodeKind::Nonleaf(children),
        }
    }

    /// The node's level; leaves are level 0.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Half the width of the cube this node covers, `2^level`.
    #[inline]
    pub fn half_size(&self) -> i32 {
        1 << self.level
    }

    /// The width of the cube this node covers, `2^(level+1)`.
    #[inline]
    pub fn size(&self) -> i64 {
        1 << (self.level + 1)
    }

    /// Combined rendering summary of every block below this node.
    #[inline]
    pub fn summary(&self) -> BlockSummary {
        self.summary
    }

    /// Allocation serial number.
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// The node's payload.
    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// True for level 0 nodes.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// The blocks of a leaf.
    ///
    /// # Panics
    /// Panics if called on a nonleaf.
    pub fn leaf_blocks(&self) -> &[Block; OCTANTS] {
        match &self.kind {
            NodeKind::Leaf(blocks) => blocks,
            NodeKind::Nonleaf(_) => panic!("leaf_blocks called on a level {} node", self.level),
        }
    }

    /// The children of a nonleaf.
    ///
    /// # Panics
    /// Panics if called on a leaf.
    pub fn children(&self) -> &[NodeRef; OCTANTS] {
        match &self.kind {
            NodeKind::Nonleaf(children) => children,
            NodeKind::Leaf(_) => panic!("children called on a leaf"),
        }
    }

    /// True if `position` is addressable in node-local coordinates.
    pub fn contains(&self, position: Vector3<i32>) -> bool {
        let half = self.half_size();
        (-half..half).contains(&position.x)
            && (-half..half).contains(&position.y)
            && (-half..half).contains(&position.z)
    }

    /// Returns the block at the node-local `position`.
    ///
    /// # Panics
    /// Panics if `position` is outside `[-half_size, half_size)`.
    pub fn get(&self, position: Vector3<i32>) -> Block {
        assert!(
            self.contains(position),
            "position {:?} outside level {} node",
            position,
            self.level
        );
        let mut node = self;
        let mut position = position;
        loop {
            match &node.kind {
                NodeKind::Leaf(blocks) => return blocks[octant_index(position)],
                NodeKind::Nonleaf(children) => {
                    let child_half_size = 1 << (node.level - 1);
                    let index = octant_index(position);
                    position = child_position(position, child_half_size);
                    node = &children[index];
                }
            }
        }
    }

    pub(crate) fn key(&self) -> NodeKey {
        match &self.kind {
            NodeKind::Leaf(blocks) => NodeKey::Leaf(*blocks),
            NodeKind::Nonleaf(children) => {
                NodeKey::Nonleaf(std::array::from_fn(|index| children[index].address()))
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("level", &self.level)
            .field("serial", &self.serial)
            .field("summary", &self.summary)
            .finish()
    }
}

/// Structural identity of a node: the blocks of a leaf, or the addresses of a nonleaf's
/// canonical children. Never includes memo or collector state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum NodeKey {
    Leaf([Block; OCTANTS]),
    Nonleaf([usize; OCTANTS]),
}

/// A counted handle to a canonical node.
///
/// Equality and hashing are by identity. Since the node table hash-conses every node,
/// identity equality is structural equality for canonical nodes.
///
/// Handles are `Send + Sync`; every count is atomic. Handing a `NodeRef` to another
/// thread is always safe because nodes are never mutated.
#[derive(Clone)]
pub struct NodeRef(Arc<Node>);

impl NodeRef {
    pub(crate) fn new(node: Node) -> Self {
        NodeRef(Arc::new(node))
    }

    #[inline]
    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Number of handles to this node, including the node table's own.
    pub(crate) fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// A weak handle, mainly useful to observe when a node is freed.
    pub fn downgrade(&self) -> std::sync::Weak<Node> {
        Arc::downgrade(&self.0)
    }

    /// Returns the subtree at `target_level` containing the node-local `position`.
    ///
    /// # Panics
    /// Panics if `position` is outside the node or `target_level` is above the node.
    pub fn get_at_level(&self, position: Vector3<i32>, target_level: u32) -> NodeRef {
        assert!(
            self.contains(position),
            "position {:?} outside level {} node",
            position,
            self.level
        );
        assert!(
            target_level <= self.level,
            "target level {} above node level {}",
            target_level,
            self.level
        );
        let mut node = self;
        let mut position = position;
        while node.level > target_level {
            let child_half_size = 1 << (node.level - 1);
            let index = octant_index(position);
            position = child_position(position, child_half_size);
            node = &node.children()[index];
        }
        node.clone()
    }

    /// Returns the child in octant `index`.
    ///
    /// # Panics
    /// Panics if this is a leaf.
    pub fn child(&self, index: usize) -> &NodeRef {
        &self.children()[index]
    }
}

impl Deref for NodeRef {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef(level {}, #{})", self.level, self.serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octant_index_uses_sign_bits() {
        assert_eq!(octant_index(Vector3::new(-1, -1, -1)), 0);
        assert_eq!(octant_index(Vector3::new(0, -1, -1)), 1);
        assert_eq!(octant_index(Vector3::new(-3, 2, -1)), 2);
        assert_eq!(octant_index(Vector3::new(0, 0, 0)), 7);
    }

    #[test]
    fn octant_center_round_trips_through_child_position() {
        for index in 0..OCTANTS {
            let center = octant_center(index, 4);
            assert_eq!(octant_index(center), index);
            assert_eq!(child_position(center, 4), Vector3::new(0, 0, 0));
        }
    }

    #[test]
    fn child_position_keeps_relative_offset() {
        // A level 2 node spans [-4, 4); its children have half size 2.
        assert_eq!(child_position(Vector3::new(-4, 3, 0), 2), Vector3::new(-2, 1, -2));
        assert_eq!(child_position(Vector3::new(-1, -1, -1), 2), Vector3::new(1, 1, 1));
    }
}
