// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structural consistency checks over the whole index.

use core::fmt::Debug;

use hashbrown::HashSet;
use smallvec::{SmallVec, smallvec};

use crate::error::ConsistencyError;
use crate::index::SpatialIndex;
use crate::node::{NodeId, split_area};
use crate::types::Rect;

impl<P: Copy + Debug> SpatialIndex<P> {
    /// Walk the tree and the region table, verifying every structural invariant.
    ///
    /// This is linear in the size of the index. It is intended for tests and
    /// debugging; enable the `consistency_checks` feature to run it after
    /// every mutation.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        let mut visited = 0_usize;
        let mut attributions = 0_usize;

        if let Some(root) = self.root {
            if self.nodes[root].parent.is_some() {
                return Err(ConsistencyError::RootHasParent);
            }
            // (node, exact area, below a node with a pending area change)
            let mut stack: SmallVec<[(NodeId, Rect, bool); 32]> =
                smallvec![(root, self.nodes[root].area, false)];
            while let Some((id, expected, stale)) = stack.pop() {
                visited += 1;
                let node = &self.nodes[id];
                let area_ok = if stale {
                    expected.contains(&node.area)
                } else {
                    node.area == expected
                };
                if !area_ok {
                    return Err(ConsistencyError::AreaMismatch {
                        stored: node.area,
                        expected,
                    });
                }
                let axis = node.split_axis;
                if node.split_pos < expected.start(axis) || node.split_pos > expected.end(axis) {
                    return Err(ConsistencyError::SplitOutsideArea {
                        area: expected,
                        split_pos: node.split_pos,
                    });
                }

                for (&key, &link) in &node.actors {
                    let Some(entry) = self.regions.get(key.idx()).and_then(Option::as_ref) else {
                        return Err(ConsistencyError::BrokenChain);
                    };
                    let footprint = entry.bounds.footprint();
                    if !footprint.intersects(&expected) {
                        return Err(ConsistencyError::RegionOutsideNode {
                            footprint,
                            area: expected,
                        });
                    }
                    match self.links.get(link) {
                        Some(l) if l.region == key && l.node == id => {}
                        _ => return Err(ConsistencyError::BrokenChain),
                    }
                    attributions += 1;
                }

                for (side, child) in node.children() {
                    if self.nodes[child].parent != Some(id) {
                        return Err(ConsistencyError::BrokenParentLink { area: expected });
                    }
                    let child_area = split_area(&expected, axis, node.split_pos, side);
                    stack.push((child, child_area, stale || node.area_dirty));
                }
            }
        }

        let mut chained = 0_usize;
        for (idx, entry) in self.regions.iter().enumerate() {
            let Some(entry) = entry else {
                continue;
            };
            if entry.chain.is_none() {
                // Only a region beyond the largest tree area may stay untracked.
                let parked = self.parked.iter().any(|&(k, _)| k.idx() == idx);
                let outside = self
                    .root_area()
                    .is_some_and(|area| !area.intersects(&entry.bounds.footprint()));
                if !parked || !outside {
                    return Err(ConsistencyError::UntrackedRegion);
                }
                continue;
            }
            let mut seen: HashSet<NodeId> = HashSet::new();
            let mut prev = None;
            let mut cur = entry.chain;
            while let Some(id) = cur {
                let Some(link) = self.links.get(id) else {
                    return Err(ConsistencyError::BrokenChain);
                };
                if link.region.idx() != idx || self.links.prev(id) != prev {
                    return Err(ConsistencyError::BrokenChain);
                }
                if self.nodes[link.node].contains_actor(link.region) != Some(id) {
                    return Err(ConsistencyError::BrokenChain);
                }
                if !seen.insert(link.node) {
                    return Err(ConsistencyError::DuplicateAttribution);
                }
                chained += 1;
                prev = Some(id);
                cur = link.next;
            }
        }
        if chained != attributions || chained != self.links.live() {
            return Err(ConsistencyError::BrokenChain);
        }

        let unpooled = self.nodes.capacity() - self.nodes.pooled();
        if visited != unpooled {
            return Err(ConsistencyError::LeakedNodes(unpooled.abs_diff(visited)));
        }
        Ok(())
    }
}
