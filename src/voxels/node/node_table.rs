//! # Node Table Module
//!
//! The [`NodeTable`] is the only place nodes are created. It hash-conses every node so
//! structurally equal subtrees share one allocation, keeps the memoized futures computed
//! by world stepping, and bounds memory with a mark-sweep collector.
//!
//! ## Collection
//!
//! Collection is two-phase. A node found unreachable is first put on a pending queue;
//! it is only freed when a later drain pops it. Until then a lookup with an equal key
//! pulls it back off the queue, which keeps working sets that overlap between steps
//! from being thrown away and rebuilt.
//!
//! A pending node is only freed once nothing outside the table holds it: not a parent,
//! not a snapshot, not a render cache key, not a caller. Held nodes are put back on the
//! queue and looked at again in a later round.
//!
//! ## Threading
//!
//! The table has a single owner. Lookups, memo writes and collection all take
//! `&mut self`; the handles it returns may be sent anywhere.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use lru::LruCache;

use crate::{
    config::MAX_LEVEL,
    voxels::block::{
        block_kind::BlockKindRegistry,
        block_step::{BlockStepExtraActions, BlockStepGlobalState},
        Block,
    },
};

use super::{Node, NodeKey, NodeKind, NodeRef, OCTANTS};

/// A node that is not yet canonical.
pub enum NodeCandidate {
    /// A level 0 node.
    Leaf([Block; OCTANTS]),
    /// A node one level above its (canonical, same level) children.
    Nonleaf([NodeRef; OCTANTS]),
}

impl NodeCandidate {
    fn key(&self) -> NodeKey {
        match self {
            NodeCandidate::Leaf(blocks) => NodeKey::Leaf(*blocks),
            NodeCandidate::Nonleaf(children) => {
                NodeKey::Nonleaf(std::array::from_fn(|index| children[index].address()))
            }
        }
    }
}

/// A memoized "this node, some generations later" result.
#[derive(Clone, Debug)]
pub struct FutureState {
    /// The node's center advanced by the step the global state asks for.
    pub result: NodeRef,
    /// The configuration the result was computed for.
    pub global_state: BlockStepGlobalState,
    /// Actions requested inside the result's cube, relative to the node's center.
    pub extra_actions: BlockStepExtraActions,
}

struct Slot {
    node: NodeRef,
    marked: bool,
    future: Option<FutureState>,
}

/// Counters describing one call to [`NodeTable::garbage_collect`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Live nodes when collection started.
    pub live_before: usize,
    /// Live nodes when collection finished.
    pub live_after: usize,
    /// Nodes freed by this call.
    pub freed: usize,
    /// Nodes newly queued for collection by the sweep.
    pub queued: usize,
    /// True if the mark and sweep phases ran.
    pub marked: bool,
}

/// The canonicalizing, garbage collected node store.
pub struct NodeTable {
    registry: Arc<BlockKindRegistry>,
    slots: HashMap<NodeKey, Slot>,
    pending: LruCache<NodeKey, ()>,
    empty_nodes: Vec<NodeRef>,
    next_serial: u64,
}

impl NodeTable {
    /// Creates an empty table whose leaves take their summaries from `registry`.
    pub fn new(registry: Arc<BlockKindRegistry>) -> Self {
        NodeTable {
            registry,
            slots: HashMap::new(),
            pending: LruCache::unbounded(),
            empty_nodes: Vec::new(),
            next_serial: 0,
        }
    }

    /// The registry used for block summaries.
    pub fn registry(&self) -> &Arc<BlockKindRegistry> {
        &self.registry
    }

    /// Number of nodes currently owned by the table, pending ones included.
    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of nodes waiting on the pending queue.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the canonical node equal to `candidate`, adding it if there is none.
    pub fn find_or_add(&mut self, candidate: NodeCandidate) -> NodeRef {
        let key = candidate.key();
        if let Some(slot) = self.slots.get(&key) {
            if self.pending.pop(&key).is_some() {
                log::trace!("resurrected pending node {:?}", slot.node);
            }
            return slot.node.clone();
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        let node = match candidate {
            NodeCandidate::Leaf(blocks) => {
                let summary = blocks
                    .iter()
                    .map(|block| self.registry.summary(*block))
                    .collect();
                Node::new_leaf(blocks, summary, serial)
            }
            NodeCandidate::Nonleaf(children) => {
                debug_assert!(
                    children.iter().all(|child| self.is_canonical(child)),
                    "nonleaf candidate built from non-canonical children"
                );
                if children[0].level() >= MAX_LEVEL {
                    log::error!("node level would exceed {}", MAX_LEVEL);
                    panic!("node level would exceed {}", MAX_LEVEL);
                }
                Node::new_nonleaf(children, serial)
            }
        };
        let node = NodeRef::new(node);
        self.slots.insert(
            key,
            Slot {
                node: node.clone(),
                marked: false,
                future: None,
            },
        );
        node
    }

    /// Shorthand for [`NodeTable::find_or_add`] with a leaf candidate.
    pub fn leaf(&mut self, blocks: [Block; OCTANTS]) -> NodeRef {
        self.find_or_add(NodeCandidate::Leaf(blocks))
    }

    /// Shorthand for [`NodeTable::find_or_add`] with a nonleaf candidate.
    pub fn nonleaf(&mut self, children: [NodeRef; OCTANTS]) -> NodeRef {
        self.find_or_add(NodeCandidate::Nonleaf(children))
    }

    /// The canonical all-air node at `level`.
    pub fn empty_node(&mut self, level: u32) -> NodeRef {
        while self.empty_nodes.len() <= level as usize {
            let node = match self.empty_nodes.last() {
                None => self.leaf([Block::default(); OCTANTS]),
                Some(below) => {
                    let below = below.clone();
                    self.nonleaf(std::array::from_fn(|_| below.clone()))
                }
            };
            self.empty_nodes.push(node);
        }
        self.empty_nodes[level as usize].clone()
    }

    /// True if `node` is the canonical all-air node of its level.
    pub fn is_empty_node(&self, node: &NodeRef) -> bool {
        self.empty_nodes
            .get(node.level() as usize)
            .is_some_and(|empty| empty == node)
    }

    /// True if `node` is the handle the table hands out for its key.
    pub fn is_canonical(&self, node: &NodeRef) -> bool {
        self.slots
            .get(&node.key())
            .is_some_and(|slot| slot.node == *node)
    }

    /// The memoized future of `node`, if one is stored.
    pub fn future(&self, node: &NodeRef) -> Option<&FutureState> {
        self.slots
            .get(&node.key())
            .filter(|slot| slot.node == *node)
            .and_then(|slot| slot.future.as_ref())
    }

    /// Stores the memoized future of `node`, replacing any previous one.
    pub fn set_future(&mut self, node: &NodeRef, future: FutureState) {
        debug_assert_eq!(future.result.level() + 1, node.level());
        match self.slots.get_mut(&node.key()) {
            Some(slot) if slot.node == *node => slot.future = Some(future),
            _ => log::trace!("dropping future of non-canonical node {:?}", node),
        }
    }

    /// Frees nodes until at most `target_live_count` remain or nothing else can go.
    ///
    /// Everything reachable from `roots` (through children and memoized futures) and
    /// every canonical empty node survives with its identity intact.
    pub fn garbage_collect<'a>(
        &mut self,
        roots: impl IntoIterator<Item = &'a NodeRef>,
        target_live_count: usize,
    ) -> GcStats {
        let mut stats = GcStats {
            live_before: self.live_count(),
            ..GcStats::default()
        };
        if self.live_count() <= target_live_count {
            stats.live_after = self.live_count();
            return stats;
        }

        stats.freed += self.drain_pending(target_live_count);
        log::trace!(
            "gc drained {} previously pending nodes, {} live",
            stats.freed,
            self.live_count()
        );

        if self.live_count() > target_live_count {
            self.mark(roots);
            stats.queued = self.sweep();
            stats.marked = true;
            stats.freed += self.drain_pending(target_live_count);
        }

        stats.live_after = self.live_count();
        log::debug!(
            "gc: {} -> {} live nodes ({} freed, {} queued, {} pending)",
            stats.live_before,
            stats.live_after,
            stats.freed,
            stats.queued,
            self.pending.len()
        );
        stats
    }

    fn mark<'a>(&mut self, roots: impl IntoIterator<Item = &'a NodeRef>) {
        let mut worklist = Vec::new();
        let slots = &mut self.slots;
        let pending = &mut self.pending;

        for root in roots {
            mark_node(slots, pending, &mut worklist, root);
        }
        for empty in &self.empty_nodes {
            mark_node(slots, pending, &mut worklist, empty);
        }

        while let Some(node) = worklist.pop() {
            if let NodeKind::Nonleaf(children) = node.kind() {
                for child in children {
                    mark_node(slots, pending, &mut worklist, child);
                }
            }
            let future_result = slots
                .get(&node.key())
                .and_then(|slot| slot.future.as_ref())
                .map(|future| future.result.clone());
            if let Some(result) = future_result {
                mark_node(slots, pending, &mut worklist, &result);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let mut queued = 0;
        for (key, slot) in self.slots.iter_mut() {
            if slot.marked {
                slot.marked = false;
            } else if !self.pending.contains(key) {
                self.pending.put(*key, ());
                queued += 1;
            }
        }
        queued
    }

    /// Frees pending nodes, least recently queued first, until the live count reaches
    /// `target_live_count` or every remaining pending node is held.
    ///
    /// Each pending node is popped once. Freeing a node only re-examines the handles it
    /// owned (children and memo result), so a held tree costs one visit per pending node
    /// rather than one per round.
    fn drain_pending(&mut self, target_live_count: usize) -> usize {
        let mut freed = 0;
        let mut held_order = Vec::new();
        let mut held = HashSet::new();
        let mut released = Vec::new();

        while self.slots.len() > target_live_count {
            let key = match released.pop() {
                Some(key) => key,
                None => match self.pending.pop_lru() {
                    Some((key, ())) => key,
                    None => break,
                },
            };
            let Some(slot) = self.slots.get(&key) else {
                continue;
            };
            if slot.node.holders() > 1 {
                if held.insert(key) {
                    held_order.push(key);
                }
                continue;
            }
            held.remove(&key);

            let Some(slot) = self.slots.remove(&key) else {
                continue;
            };
            let mut owned: Vec<NodeKey> = match slot.node.kind() {
                NodeKind::Nonleaf(children) => children.iter().map(|child| child.key()).collect(),
                NodeKind::Leaf(_) => Vec::new(),
            };
            if let Some(future) = &slot.future {
                owned.push(future.result.key());
            }
            drop(slot);
            freed += 1;

            for key in owned {
                let waiting = held.contains(&key) || self.pending.contains(&key);
                let unheld = self
                    .slots
                    .get(&key)
                    .is_some_and(|slot| slot.node.holders() == 1);
                if waiting && unheld {
                    self.pending.pop(&key);
                    held.remove(&key);
                    released.push(key);
                }
            }
        }

        for key in released.into_iter().chain(held_order) {
            if self.slots.contains_key(&key) && !self.pending.contains(&key) {
                self.pending.put(key, ());
            }
        }
        freed
    }
}

fn mark_node(
    slots: &mut HashMap<NodeKey, Slot>,
    pending: &mut LruCache<NodeKey, ()>,
    worklist: &mut Vec<NodeRef>,
    node: &NodeRef,
) {
    let key = node.key();
    if let Some(slot) = slots.get_mut(&key) {
        if slot.node == *node && !slot.marked {
            slot.marked = true;
            pending.pop(&key);
            worklist.push(node.clone());
        }
    }
}
