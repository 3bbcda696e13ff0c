// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree nodes and the arena/pool that owns them.

use alloc::vec::Vec;
use core::ops::{Index, IndexMut};

use hashbrown::HashMap;

use crate::actor_node::LinkId;
use crate::index::RegionKey;
use crate::types::{Axis, Rect, Side};

/// Handle of a node slot in the [`NodeCache`] arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Node slots are 32-bit; a tree with more than u32::MAX nodes is unsupported."
    )]
    const fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One node of the BSP tree.
///
/// A node owns a rectangular `area`, split at `split_pos` along `split_axis`.
/// Children (if any) cover exactly the two halves of the area. Regions that
/// are attributed to this node directly live in `actors`.
#[derive(Clone, Debug, Default)]
pub(crate) struct BspNode {
    pub(crate) area: Rect,
    pub(crate) split_axis: Axis,
    pub(crate) split_pos: i32,
    children: [Option<NodeId>; 2],
    pub(crate) parent: Option<NodeId>,
    pub(crate) actors: HashMap<RegionKey, LinkId>,
    // Children's areas must be recomputed before they are next read.
    pub(crate) area_dirty: bool,
}

impl BspNode {
    /// Replace the area; the children are resized lazily on next access.
    pub(crate) fn set_area(&mut self, area: Rect) {
        self.area = area;
        self.area_dirty = true;
    }

    /// Choose split axis and position from the current area.
    pub(crate) fn split_evenly(&mut self) {
        self.split_axis = Axis::longer_of(&self.area);
        self.split_pos = match self.split_axis {
            Axis::X => self.area.middle_x(),
            Axis::Y => self.area.middle_y(),
        };
    }

    /// The half of `area` on `side` of the split.
    pub(crate) fn child_area(&self, side: Side) -> Rect {
        split_area(&self.area, self.split_axis, self.split_pos, side)
    }

    /// The child on `side`, without applying any pending area ripple.
    ///
    /// Use [`NodeCache::child`] when the child's stored area will be read.
    pub(crate) fn raw_child(&self, side: Side) -> Option<NodeId> {
        self.children[side.idx()]
    }

    pub(crate) fn children(&self) -> impl Iterator<Item = (Side, NodeId)> + '_ {
        Side::BOTH
            .into_iter()
            .filter_map(|side| self.children[side.idx()].map(|c| (side, c)))
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.iter().flatten().count()
    }

    /// Which side `child` hangs from, if it is a child of this node.
    pub(crate) fn side_of(&self, child: NodeId) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.children[side.idx()] == Some(child))
    }

    pub(crate) fn contains_actor(&self, key: RegionKey) -> Option<LinkId> {
        self.actors.get(&key).copied()
    }

    /// No regions attributed directly (children are not considered).
    pub(crate) fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Reset to the unattached state, keeping the region map's allocation.
    fn blank(&mut self) {
        self.area = Rect::default();
        self.split_axis = Axis::X;
        self.split_pos = 0;
        self.children = [None, None];
        self.parent = None;
        self.actors.clear();
        self.area_dirty = false;
    }
}

/// The half of `area` on `side` of a split at `pos` along `axis`.
pub(crate) fn split_area(area: &Rect, axis: Axis, pos: i32, side: Side) -> Rect {
    match (axis, side) {
        (Axis::X, Side::Left) => Rect::new(area.x, area.y, pos - area.x, area.height),
        (Axis::X, Side::Right) => Rect::new(pos, area.y, area.right() - pos, area.height),
        (Axis::Y, Side::Left) => Rect::new(area.x, area.y, area.width, pos - area.y),
        (Axis::Y, Side::Right) => Rect::new(area.x, pos, area.width, area.top() - pos),
    }
}

/// Arena of tree nodes that recycles released slots.
///
/// Released nodes are blanked and pushed on a free list; the next
/// [`NodeCache::get_node`] hands them out again with their region map
/// allocation intact. Each index owns its own cache.
#[derive(Debug, Default)]
pub(crate) struct NodeCache {
    nodes: Vec<BspNode>,
    free: Vec<NodeId>,
}

impl NodeCache {
    /// A blank node, recycled if possible.
    pub(crate) fn get_node(&mut self) -> NodeId {
        if let Some(id) = self.free.pop() {
            log::trace!("reusing cached node {}", id.idx());
            return id;
        }
        self.nodes.push(BspNode::default());
        NodeId::new(self.nodes.len() - 1)
    }

    /// A fresh node covering `area`, split evenly along its longer side.
    pub(crate) fn create_node(&mut self, area: Rect) -> NodeId {
        let id = self.get_node();
        let node = &mut self[id];
        node.area.copy_from(&area);
        node.split_evenly();
        id
    }

    /// Blank `id` and put it back in the pool.
    ///
    /// The node must no longer be reachable from the tree.
    pub(crate) fn return_node(&mut self, id: NodeId) {
        debug_assert!(
            !self.free.contains(&id),
            "node {} returned to the cache twice",
            id.idx()
        );
        self[id].blank();
        self.free.push(id);
    }

    /// Attach `child` on `side` of `parent`, fixing the back-reference.
    pub(crate) fn set_child(&mut self, parent: NodeId, side: Side, child: Option<NodeId>) {
        self[parent].children[side.idx()] = child;
        if let Some(c) = child {
            self[c].parent = Some(parent);
        }
    }

    /// Push a pending area change of `id` down to its direct children.
    pub(crate) fn settle(&mut self, id: NodeId) {
        if !self[id].area_dirty {
            return;
        }
        self[id].area_dirty = false;
        for side in Side::BOTH {
            if let Some(c) = self[id].raw_child(side) {
                let area = self[id].child_area(side);
                self[c].set_area(area);
            }
        }
    }

    /// The child on `side`, with its stored area brought up to date.
    pub(crate) fn child(&mut self, id: NodeId, side: Side) -> Option<NodeId> {
        self.settle(id);
        self[id].raw_child(side)
    }

    /// Make the stored area of `id` exact by settling every ancestor from the root down.
    pub(crate) fn settle_path(&mut self, id: NodeId) {
        let mut path: smallvec::SmallVec<[NodeId; 32]> = smallvec::SmallVec::new();
        let mut cur = self[id].parent;
        while let Some(p) = cur {
            path.push(p);
            cur = self[p].parent;
        }
        for &p in path.iter().rev() {
            self.settle(p);
        }
    }

    /// Number of slots ever allocated, live or pooled.
    pub(crate) fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of pooled (unattached) slots.
    pub(crate) fn pooled(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
    }
}

impl Index<NodeId> for NodeCache {
    type Output = BspNode;

    fn index(&self, id: NodeId) -> &BspNode {
        &self.nodes[id.idx()]
    }
}

impl IndexMut<NodeId> for NodeCache {
    fn index_mut(&mut self, id: NodeId) -> &mut BspNode {
        &mut self.nodes[id.idx()]
    }
}
