// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Links between regions and the tree nodes they occupy.
//!
//! A region that straddles split boundaries is attributed to several nodes.
//! Each attribution is one [`ActorNode`]; the links for one region form an
//! intrusive doubly-linked chain whose head is kept in the region table.

use alloc::vec::Vec;
use core::ops::Index;

use smallvec::SmallVec;

use crate::index::RegionKey;
use crate::node::NodeId;

/// Handle of a link slot in [`ActorNodes`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(u32);

impl LinkId {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Link slots are 32-bit, matching node and region handles."
    )]
    const fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// "This region occupies (part of) this node."
#[derive(Clone, Debug)]
pub(crate) struct ActorNode {
    pub(crate) region: RegionKey,
    pub(crate) node: NodeId,
    mark: bool,
    prev: Option<LinkId>,
    pub(crate) next: Option<LinkId>,
}

/// Slab of [`ActorNode`] links with chain maintenance.
#[derive(Debug, Default)]
pub(crate) struct ActorNodes {
    slots: Vec<Option<ActorNode>>,
    free: Vec<LinkId>,
}

/// Chains are short; most regions sit in one to four nodes.
pub(crate) type Chain = SmallVec<[LinkId; 4]>;

impl ActorNodes {
    /// Create a marked link for `region` in `node` and push it on the front of the chain at `head`.
    pub(crate) fn attach(
        &mut self,
        region: RegionKey,
        node: NodeId,
        head: &mut Option<LinkId>,
    ) -> LinkId {
        let link = ActorNode {
            region,
            node,
            mark: true,
            prev: None,
            next: *head,
        };
        let id = if let Some(id) = self.free.pop() {
            self.slots[id.idx()] = Some(link);
            id
        } else {
            self.slots.push(Some(link));
            LinkId::new(self.slots.len() - 1)
        };
        if let Some(old) = *head {
            self.get_mut(old).prev = Some(id);
        }
        *head = Some(id);
        id
    }

    /// Splice `id` out of the chain at `head` and free its slot.
    ///
    /// Returns the removed link so the caller can drop the owning node's entry.
    pub(crate) fn detach(&mut self, id: LinkId, head: &mut Option<LinkId>) -> ActorNode {
        let link = self.slots[id.idx()]
            .take()
            .expect("detached an actor node that is not live");
        match link.prev {
            Some(prev) => self.get_mut(prev).next = link.next,
            None => *head = link.next,
        }
        if let Some(next) = link.next {
            self.get_mut(next).prev = link.prev;
        }
        self.free.push(id);
        link
    }

    pub(crate) fn mark(&mut self, id: LinkId) {
        self.get_mut(id).mark = true;
    }

    pub(crate) fn clear_mark(&mut self, id: LinkId) {
        self.get_mut(id).mark = false;
    }

    /// Read the mark and reset it.
    pub(crate) fn check_mark(&mut self, id: LinkId) -> bool {
        core::mem::take(&mut self.get_mut(id).mark)
    }

    /// Snapshot of the chain starting at `head`, front to back.
    pub(crate) fn chain(&self, head: Option<LinkId>) -> Chain {
        let mut out = Chain::new();
        let mut cur = head;
        while let Some(id) = cur {
            out.push(id);
            cur = self[id].next;
        }
        out
    }

    pub(crate) fn get(&self, id: LinkId) -> Option<&ActorNode> {
        self.slots.get(id.idx())?.as_ref()
    }

    pub(crate) fn prev(&self, id: LinkId) -> Option<LinkId> {
        self[id].prev
    }

    /// Number of live links.
    pub(crate) fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    fn get_mut(&mut self, id: LinkId) -> &mut ActorNode {
        self.slots[id.idx()]
            .as_mut()
            .expect("actor node chain references a freed link")
    }
}

impl Index<LinkId> for ActorNodes {
    type Output = ActorNode;

    fn index(&self, id: LinkId) -> &ActorNode {
        self.slots[id.idx()]
            .as_ref()
            .expect("actor node chain references a freed link")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeCache;

    fn setup() -> (ActorNodes, RegionKey, [NodeId; 3]) {
        let mut cache = NodeCache::default();
        let nodes = [cache.get_node(), cache.get_node(), cache.get_node()];
        (ActorNodes::default(), RegionKey::new(0, 1), nodes)
    }

    #[test]
    fn attach_pushes_to_front_and_marks() {
        let (mut links, key, [a, b, c]) = setup();
        let mut head = None;
        let la = links.attach(key, a, &mut head);
        let lb = links.attach(key, b, &mut head);
        let lc = links.attach(key, c, &mut head);
        assert_eq!(head, Some(lc));
        assert_eq!(links.chain(head).as_slice(), &[lc, lb, la]);
        assert_eq!(links.prev(lb), Some(lc));
        assert!(links.check_mark(la));
        assert!(!links.check_mark(la));
    }

    #[test]
    fn detach_splices_middle_and_head() {
        let (mut links, key, [a, b, c]) = setup();
        let mut head = None;
        let la = links.attach(key, a, &mut head);
        let lb = links.attach(key, b, &mut head);
        let lc = links.attach(key, c, &mut head);

        let removed = links.detach(lb, &mut head);
        assert_eq!(removed.node, b);
        assert_eq!(links.chain(head).as_slice(), &[lc, la]);
        assert_eq!(links.prev(la), Some(lc));

        links.detach(lc, &mut head);
        assert_eq!(head, Some(la));
        assert_eq!(links.prev(la), None);

        links.detach(la, &mut head);
        assert_eq!(head, None);
        assert_eq!(links.live(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let (mut links, key, [a, b, _]) = setup();
        let mut head = None;
        let la = links.attach(key, a, &mut head);
        links.detach(la, &mut head);
        let lb = links.attach(key, b, &mut head);
        assert_eq!(la, lb);
        assert_eq!(links[lb].node, b);
        assert!(links.get(lb).is_some());
    }

    #[test]
    fn marks_can_be_cleared_and_set() {
        let (mut links, key, [a, _, _]) = setup();
        let mut head = None;
        let la = links.attach(key, a, &mut head);
        links.clear_mark(la);
        assert!(!links.check_mark(la));
        links.mark(la);
        assert!(links.check_mark(la));
    }
}
