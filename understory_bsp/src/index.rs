// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public `SpatialIndex` API: region table, tree maintenance and queries.

use alloc::vec::Vec;
use core::fmt::Debug;

use hashbrown::HashSet;
use smallvec::{SmallVec, smallvec};

use crate::actor_node::{ActorNodes, LinkId};
use crate::config::IndexConfig;
use crate::error::ConfigError;
use crate::node::{NodeCache, NodeId, split_area};
use crate::query::{Candidate, ClassFilter, Predicate, Query, cell_block, cell_centre, cell_of};
use crate::types::{Axis, Rect, Side};

/// Generational handle for regions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegionKey(u32, u32);

impl RegionKey {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "Region keys are intentionally 32-bit; higher bits are truncated by design."
    )]
    pub(crate) const fn new(idx: usize, generation: u32) -> Self {
        Self(idx as u32, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RegionEntry<P> {
    pub(crate) bounds: Rect,
    pub(crate) payload: P,
    /// Head of this region's actor node chain.
    pub(crate) chain: Option<LinkId>,
}

/// Explicit traversal stack of nodes paired with their exact areas.
pub(crate) type NodeStack = SmallVec<[(NodeId, Rect); 32]>;

/// Adaptive BSP index over a changing population of rectangles.
///
/// Each inserted region is attributed to one or more tree nodes whose areas
/// it overlaps. The root grows by doubling whenever a region falls outside
/// the covered area, nodes are split lazily as regions accumulate, and empty
/// nodes are pruned as regions leave. Moving a region only touches the part
/// of the tree around its old and new positions.
///
/// The index is single-threaded: it has no internal synchronization and
/// queries borrow it immutably while mutations borrow it mutably.
///
/// ## Example
///
/// ```rust
/// use understory_bsp::{IndexConfig, Rect, SpatialIndex};
///
/// let mut idx = SpatialIndex::new(IndexConfig::new(1)).unwrap();
/// let a = idx.insert(Rect::new(0, 0, 10, 10), "a");
/// let b = idx.insert(Rect::new(100, 100, 10, 10), "b");
/// assert!(idx.intersecting(a, None).is_empty());
///
/// idx.update_location(b, Rect::new(5, 5, 10, 10));
/// let hits = idx.intersecting(a, None);
/// assert_eq!(hits, vec![(b, "b")]);
/// ```
pub struct SpatialIndex<P> {
    pub(crate) config: IndexConfig,
    pub(crate) regions: Vec<Option<RegionEntry<P>>>,
    /// Last generation per region slot (persists across frees).
    generations: Vec<u32>,
    free_list: Vec<usize>,
    /// Regions lying wholly outside the largest representable tree area,
    /// with the root area they were last tried against.
    pub(crate) parked: Vec<(RegionKey, Rect)>,
    pub(crate) root: Option<NodeId>,
    pub(crate) nodes: NodeCache,
    pub(crate) links: ActorNodes,
}

impl<P> Debug for SpatialIndex<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let live = self.regions.iter().filter(|r| r.is_some()).count();
        f.debug_struct("SpatialIndex")
            .field("config", &self.config)
            .field("regions", &live)
            .field("parked", &self.parked.len())
            .field("root_area", &self.root.map(|r| self.nodes[r].area))
            .field("node_slots", &self.nodes.capacity())
            .field("pooled_nodes", &self.nodes.pooled())
            .field("actor_nodes", &self.links.live())
            .finish_non_exhaustive()
    }
}

impl<P: Copy + Debug> Default for SpatialIndex<P> {
    fn default() -> Self {
        Self::with_config(IndexConfig::default())
    }
}

impl<P: Copy + Debug> SpatialIndex<P> {
    /// Create an empty index, validating the configuration.
    pub fn new(config: IndexConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: IndexConfig) -> Self {
        Self {
            config,
            regions: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            parked: Vec::new(),
            root: None,
            nodes: NodeCache::default(),
            links: ActorNodes::default(),
        }
    }

    /// Replace the configuration.
    ///
    /// The tree lives in pixel space, so existing regions are unaffected;
    /// only later grid queries see the new cell size.
    pub fn initialize(&mut self, config: IndexConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// The active configuration.
    pub fn config(&self) -> IndexConfig {
        self.config
    }

    /// Number of regions currently tracked.
    pub fn len(&self) -> usize {
        self.regions.len() - self.free_list.len()
    }

    /// Whether no regions are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Area covered by the root node, or `None` while the tree is empty.
    pub fn root_area(&self) -> Option<Rect> {
        self.root.map(|r| self.nodes[r].area)
    }

    /// Whether `key` refers to a tracked region.
    pub fn contains(&self, key: RegionKey) -> bool {
        self.entry(key).is_some()
    }

    /// Bounds last supplied for `key`.
    pub fn bounds(&self, key: RegionKey) -> Option<Rect> {
        self.entry(key).map(|e| e.bounds)
    }

    /// Payload stored with `key`.
    pub fn payload(&self, key: RegionKey) -> Option<P> {
        self.entry(key).map(|e| e.payload)
    }

    /// Remove every region and release the tree.
    ///
    /// Slot generations survive, so keys issued before the call stay stale.
    pub fn clear(&mut self) {
        self.regions.fill_with(|| None);
        self.free_list.clear();
        self.free_list.extend((0..self.regions.len()).rev());
        self.parked.clear();
        self.root = None;
        self.nodes.clear();
        self.links.clear();
    }

    /// Insert a region with the given bounds. Returns its handle.
    pub fn insert(&mut self, bounds: Rect, payload: P) -> RegionKey {
        let idx = match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                self.regions.push(None);
                self.generations.push(0);
                self.regions.len() - 1
            }
        };
        let generation = self.generations[idx].wrapping_add(1);
        self.generations[idx] = generation;
        self.regions[idx] = Some(RegionEntry {
            bounds,
            payload,
            chain: None,
        });
        let key = RegionKey::new(idx, generation);
        self.add_object(key);
        self.retry_parked();
        self.debug_check();
        key
    }

    /// Remove a region, returning its payload.
    ///
    /// Removing an unknown or already removed region does nothing.
    pub fn remove(&mut self, key: RegionKey) -> Option<P> {
        self.entry(key)?;
        self.detach_all(key);
        let entry = self.regions[key.idx()].take()?;
        self.free_list.push(key.idx());
        self.parked.retain(|&(k, _)| k != key);
        self.retry_parked();
        self.debug_check();
        Some(entry.payload)
    }

    /// Move and/or resize a region.
    ///
    /// Small moves are handled locally: attributions that still apply are
    /// kept, stale ones are dropped, and only the missing ones are created.
    pub fn update(&mut self, key: RegionKey, bounds: Rect) {
        let Some(entry) = self.entry_mut(key) else {
            return;
        };
        entry.bounds = bounds;
        self.update_object(key);
        self.retry_parked();
        self.debug_check();
    }

    /// A region moved. Same as [`SpatialIndex::update`].
    pub fn update_location(&mut self, key: RegionKey, bounds: Rect) {
        self.update(key, bounds);
    }

    /// A region changed size. Same as [`SpatialIndex::update`].
    pub fn update_size(&mut self, key: RegionKey, bounds: Rect) {
        self.update(key, bounds);
    }

    /// Regions covering the centre pixel of grid cell `(x, y)`.
    pub fn objects_at(&self, x: i32, y: i32, class: ClassFilter<'_, P>) -> Vec<(RegionKey, P)> {
        let (px, py) = cell_centre(x, y, self.config.cell_size);
        let query = Query {
            predicate: Predicate::Point { x: px, y: py },
            class,
            ignore: None,
        };
        self.collect(Some(Rect::new(px, py, 1, 1)), &query)
    }

    /// Regions overlapping region `key`, excluding `key` itself.
    pub fn intersecting(&self, key: RegionKey, class: ClassFilter<'_, P>) -> Vec<(RegionKey, P)> {
        let Some(entry) = self.entry(key) else {
            return Vec::new();
        };
        let bounds = entry.bounds.footprint();
        let query = Query {
            predicate: Predicate::Overlap { bounds },
            class,
            ignore: Some(key),
        };
        self.collect(Some(bounds), &query)
    }

    /// Regions overlapping the pixel rectangle `rect`.
    pub fn intersecting_rect(&self, rect: Rect, class: ClassFilter<'_, P>) -> Vec<(RegionKey, P)> {
        let bounds = rect.footprint();
        let query = Query {
            predicate: Predicate::Overlap { bounds },
            class,
            ignore: None,
        };
        self.collect(Some(bounds), &query)
    }

    /// Regions whose cell lies within `radius` cells (Euclidean) of cell `(x, y)`.
    pub fn in_range(
        &self,
        x: i32,
        y: i32,
        radius: i32,
        class: ClassFilter<'_, P>,
    ) -> Vec<(RegionKey, P)> {
        if radius < 0 {
            return Vec::new();
        }
        let query = Query {
            predicate: Predicate::InRange { x, y, radius },
            class,
            ignore: None,
        };
        self.collect(cell_block(x, y, radius, self.config.cell_size), &query)
    }

    /// Regions in the cells around region `key`.
    ///
    /// With `diagonal`, all cells within `distance` steps in both directions
    /// count; without, only cells within `distance` orthogonal steps do.
    pub fn neighbours(
        &self,
        key: RegionKey,
        distance: i32,
        diagonal: bool,
        class: ClassFilter<'_, P>,
    ) -> Vec<(RegionKey, P)> {
        let Some(entry) = self.entry(key) else {
            return Vec::new();
        };
        let (x, y) = cell_of(&entry.bounds.footprint(), self.config.cell_size);
        self.neighbours_at(x, y, distance, diagonal, class)
    }

    /// Regions in the cells around cell `(x, y)`, excluding that cell.
    pub fn neighbours_at(
        &self,
        x: i32,
        y: i32,
        distance: i32,
        diagonal: bool,
        class: ClassFilter<'_, P>,
    ) -> Vec<(RegionKey, P)> {
        if distance < 0 {
            return Vec::new();
        }
        let query = Query {
            predicate: Predicate::Neighbours {
                x,
                y,
                distance,
                diagonal,
            },
            class,
            ignore: None,
        };
        self.collect(cell_block(x, y, distance, self.config.cell_size), &query)
    }

    /// All regions accepted by `class`.
    pub fn objects(&self, class: ClassFilter<'_, P>) -> Vec<(RegionKey, P)> {
        let query = Query {
            predicate: Predicate::Any,
            class,
            ignore: None,
        };
        self.collect(None, &query)
    }

    /// All regions.
    pub fn objects_list(&self) -> Vec<(RegionKey, P)> {
        self.objects(None)
    }

    /// Some region other than `key` covering the centre pixel of cell `(x, y)`.
    pub fn one_object_at(
        &self,
        key: RegionKey,
        x: i32,
        y: i32,
        class: ClassFilter<'_, P>,
    ) -> Option<(RegionKey, P)> {
        let (px, py) = cell_centre(x, y, self.config.cell_size);
        let query = Query {
            predicate: Predicate::Point { x: px, y: py },
            class,
            ignore: Some(key),
        };
        // A 1x1 rectangle is contained by every node it intersects.
        self.one_containing_down(Rect::new(px, py, 1, 1), &query)
    }

    /// Some region overlapping region `key`.
    ///
    /// Searches the subtrees below the nodes `key` is attributed to, then
    /// their ancestors up to the first one containing the region, and
    /// finally the chain of nodes from the root that contain it.
    pub fn one_intersecting(
        &self,
        key: RegionKey,
        class: ClassFilter<'_, P>,
    ) -> Option<(RegionKey, P)> {
        let entry = self.entry(key)?;
        let bounds = entry.bounds.footprint();
        let query = Query {
            predicate: Predicate::Overlap { bounds },
            class,
            ignore: Some(key),
        };
        for link in self.links.chain(entry.chain) {
            let path = self.area_path(self.links[link].node);
            let &(node, area) = path.last()?;
            if let Some(hit) = self.one_down(bounds, &query, node, area) {
                return Some(hit);
            }
            for &(ancestor, area) in path.iter().rev().skip(1) {
                if area.contains(&bounds) {
                    break;
                }
                if let Some(hit) = self.one_in_node(ancestor, &query) {
                    return Some(hit);
                }
            }
        }
        self.one_containing_down(bounds, &query)
    }

    fn entry(&self, key: RegionKey) -> Option<&RegionEntry<P>> {
        if self.generations.get(key.idx()) != Some(&key.1) {
            return None;
        }
        self.regions.get(key.idx())?.as_ref()
    }

    fn entry_mut(&mut self, key: RegionKey) -> Option<&mut RegionEntry<P>> {
        if self.generations.get(key.idx()) != Some(&key.1) {
            return None;
        }
        self.regions.get_mut(key.idx())?.as_mut()
    }

    /// Entry of a region known to be live (it is referenced from the tree).
    pub(crate) fn live_entry(&self, key: RegionKey) -> &RegionEntry<P> {
        self.regions[key.idx()]
            .as_ref()
            .expect("region table invariant violated: tree references a vacant region")
    }

    fn footprint(&self, key: RegionKey) -> Rect {
        self.live_entry(key).bounds.footprint()
    }

    fn add_object(&mut self, key: RegionKey) {
        let bounds = self.footprint(key);
        let Some(root) = self.root else {
            let root = self.nodes.create_node(bounds);
            log::debug!("created root node covering {bounds}");
            self.root = Some(root);
            self.add_actor(root, key);
            return;
        };
        let root = self.grow_to_contain(root, &bounds);
        let area = self.nodes[root].area;
        if !area.intersects(&bounds) {
            log::warn!("region at {bounds} lies outside the largest tree area {area}; parked");
            self.parked.push((key, area));
            return;
        }
        self.insert_object(key, bounds, root);
    }

    /// Try parked regions again once the root area has changed.
    fn retry_parked(&mut self) {
        if self.parked.is_empty() {
            return;
        }
        for (key, tried) in core::mem::take(&mut self.parked) {
            if self.entry(key).is_none_or(|e| e.chain.is_some()) {
                continue;
            }
            if self.root_area() == Some(tried) {
                self.parked.push((key, tried));
            } else {
                self.add_object(key);
            }
        }
    }

    /// Double the root area towards `bounds` until it is covered.
    ///
    /// Each step is capped so the grown area stays representable and still
    /// covers the old root. Growth stops once no direction can make progress.
    fn grow_to_contain(&mut self, mut root: NodeId, bounds: &Rect) -> NodeId {
        const MIN: i64 = i32::MIN as i64;
        const MAX: i64 = i32::MAX as i64;
        let mut area = self.nodes[root].area;
        while !area.contains(bounds) {
            let before = area;
            if bounds.x < area.x {
                let [x0, y0, x1, y1] = edges(&area);
                let nx = (x0 - i64::from(area.width)).max(x1 - MAX).max(MIN);
                if nx < x0
                    && let Some(grown) = rect_from_edges(nx, y0, x1, y1)
                {
                    root = self.new_root(root, grown, Axis::X, area.x, Side::Right);
                    area = grown;
                }
            }
            if bounds.right() > area.right() {
                let [x0, y0, x1, y1] = edges(&area);
                let nx = (x1 + i64::from(area.width)).min(x0 + MAX).min(MAX);
                if nx > x1
                    && let Some(grown) = rect_from_edges(x0, y0, nx, y1)
                {
                    root = self.new_root(root, grown, Axis::X, area.right(), Side::Left);
                    area = grown;
                }
            }
            if bounds.y < area.y {
                let [x0, y0, x1, y1] = edges(&area);
                let ny = (y0 - i64::from(area.height)).max(y1 - MAX).max(MIN);
                if ny < y0
                    && let Some(grown) = rect_from_edges(x0, ny, x1, y1)
                {
                    root = self.new_root(root, grown, Axis::Y, area.y, Side::Right);
                    area = grown;
                }
            }
            if bounds.top() > area.top() {
                let [x0, y0, x1, y1] = edges(&area);
                let ny = (y1 + i64::from(area.height)).min(y0 + MAX).min(MAX);
                if ny > y1
                    && let Some(grown) = rect_from_edges(x0, y0, x1, ny)
                {
                    root = self.new_root(root, grown, Axis::Y, area.top(), Side::Left);
                    area = grown;
                }
            }
            if area == before {
                log::warn!("tree area {area} cannot grow further to cover {bounds}");
                break;
            }
        }
        self.root = Some(root);
        root
    }

    /// A new root covering `area`, with the old root as its `old_side` child.
    fn new_root(
        &mut self,
        old: NodeId,
        area: Rect,
        axis: Axis,
        split_pos: i32,
        old_side: Side,
    ) -> NodeId {
        let id = self.nodes.get_node();
        let node = &mut self.nodes[id];
        node.area.copy_from(&area);
        node.split_axis = axis;
        node.split_pos = split_pos;
        self.nodes.set_child(id, old_side, Some(old));
        log::debug!("grew tree area to {area}");
        id
    }

    /// Attribute `key` to the subtree at `start`, whose stored area must be exact.
    ///
    /// Every link this touches or creates ends up marked.
    fn insert_object(&mut self, key: RegionKey, bounds: Rect, start: NodeId) {
        let mut stack: SmallVec<[(NodeId, Rect); 8]> = smallvec![(start, bounds)];
        while let Some((id, clipped)) = stack.pop() {
            if self.contains_actor(id, key) {
                continue;
            }
            let area = self.nodes[id].area;
            if self.nodes[id].is_empty()
                || (area.width <= bounds.width && area.height <= bounds.height)
            {
                self.add_actor(id, key);
                continue;
            }
            for side in Side::BOTH {
                let child = self.nodes.child(id, side);
                let child_area = self.nodes[id].child_area(side);
                let Some(part) = child_area.intersection(&clipped) else {
                    continue;
                };
                match child {
                    Some(c) => stack.push((c, part)),
                    None => {
                        let c = self.nodes.create_node(child_area);
                        self.add_actor(c, key);
                        self.nodes.set_child(id, side, Some(c));
                    }
                }
            }
        }
    }

    fn add_actor(&mut self, node: NodeId, key: RegionKey) {
        let head = &mut self.regions[key.idx()]
            .as_mut()
            .expect("region table invariant violated: attributing a vacant region")
            .chain;
        let link = self.links.attach(key, node, head);
        self.nodes[node].actors.insert(key, link);
    }

    /// Whether `key` is attributed to `node`; marks the link if so.
    fn contains_actor(&mut self, node: NodeId, key: RegionKey) -> bool {
        match self.nodes[node].contains_actor(key) {
            Some(link) => {
                self.links.mark(link);
                true
            }
            None => false,
        }
    }

    /// Drop one attribution, then prune its node if it became redundant.
    fn remove_link(&mut self, link: LinkId) {
        let key = self.links[link].region;
        let head = &mut self.regions[key.idx()]
            .as_mut()
            .expect("region table invariant violated: chain of a vacant region")
            .chain;
        let removed = self.links.detach(link, head);
        self.nodes[removed.node].actors.remove(&key);
        self.prune(removed.node);
    }

    fn detach_all(&mut self, key: RegionKey) {
        while let Some(head) = self.live_entry(key).chain {
            self.remove_link(head);
        }
    }

    /// Splice out empty nodes with at most one child, walking up from `node`.
    ///
    /// A surviving child takes over the removed node's area, except at the
    /// root where it simply becomes the new root.
    fn prune(&mut self, node: NodeId) {
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = &self.nodes[id];
            if !n.is_empty() || n.child_count() == 2 {
                break;
            }
            let parent = n.parent;
            self.nodes.settle(id);
            let n = &self.nodes[id];
            let survivor = n.raw_child(Side::Left).or(n.raw_child(Side::Right));
            match parent {
                Some(p) => {
                    let side = self.nodes[p]
                        .side_of(id)
                        .expect("tree invariant violated: node missing from its parent");
                    if let Some(s) = survivor {
                        let area = self.nodes[id].area;
                        self.nodes[s].set_area(area);
                    }
                    self.nodes.set_child(p, side, survivor);
                }
                None => {
                    self.root = survivor;
                    if let Some(s) = survivor {
                        self.nodes[s].parent = None;
                    }
                }
            }
            log::trace!("pruned node {}", id.idx());
            self.nodes.return_node(id);
            cur = parent;
        }
    }

    fn update_object(&mut self, key: RegionKey) {
        let Some(head) = self.live_entry(key).chain else {
            // Parked outside the tree area.
            self.parked.retain(|&(k, _)| k != key);
            self.add_object(key);
            return;
        };
        let bounds = self.footprint(key);
        let root_covers = self
            .root
            .is_some_and(|root| self.nodes[root].area.contains(&bounds));
        if !root_covers {
            log::debug!("region left the tree area {:?}; reinserting", self.root_area());
            self.detach_all(key);
            self.add_object(key);
            return;
        }

        // Cull links that no longer touch the region. A single node that
        // covers it entirely makes every other link redundant.
        for link in self.links.chain(Some(head)) {
            let node = self.links[link].node;
            self.nodes.settle_path(node);
            let area = self.nodes[node].area;
            if area.contains(&bounds) {
                let head = self.live_entry(key).chain;
                for other in self.links.chain(head) {
                    if other != link {
                        self.remove_link(other);
                    }
                }
                return;
            }
            if !area.intersects(&bounds) {
                self.remove_link(link);
                if self.root.is_none() {
                    self.add_object(key);
                    return;
                }
            } else {
                self.links.clear_mark(link);
            }
        }

        // Re-insert from the lowest node covering the new bounds.
        let start = match self.live_entry(key).chain {
            Some(head) => {
                let first = self.links[head].node;
                self.nodes.settle_path(first);
                let mut cur = Some(first);
                while let Some(id) = cur {
                    if self.nodes[id].area.contains(&bounds) {
                        break;
                    }
                    cur = self.nodes[id].parent;
                }
                let Some(id) = cur else {
                    self.detach_all(key);
                    self.add_object(key);
                    return;
                };
                id
            }
            None => match self.root {
                Some(root) => root,
                None => {
                    self.add_object(key);
                    return;
                }
            },
        };
        self.insert_object(key, bounds, start);

        // Whatever the re-insertion did not touch is left over from the old position.
        let head = self.live_entry(key).chain;
        for link in self.links.chain(head) {
            if !self.links.check_mark(link) {
                self.remove_link(link);
            }
        }
    }

    fn candidate(&self, key: RegionKey) -> Candidate<'_, P> {
        let entry = self.live_entry(key);
        Candidate {
            key,
            footprint: entry.bounds.footprint(),
            payload: &entry.payload,
        }
    }

    /// Walk every node intersecting `rect` (all nodes for `None`), collecting accepted regions once.
    fn collect(&self, rect: Option<Rect>, query: &Query<'_, P>) -> Vec<(RegionKey, P)> {
        let mut out = Vec::new();
        let Some(root) = self.root else {
            return out;
        };
        let cell_size = self.config.cell_size;
        let mut seen: HashSet<RegionKey> = HashSet::new();
        let mut stack: NodeStack = smallvec![(root, self.nodes[root].area)];
        while let Some((id, area)) = stack.pop() {
            if rect.is_some_and(|r| !area.intersects(&r)) {
                continue;
            }
            let node = &self.nodes[id];
            for &key in node.actors.keys() {
                if !seen.insert(key) {
                    continue;
                }
                let candidate = self.candidate(key);
                if query.accepts(&candidate, cell_size) {
                    out.push((key, *candidate.payload));
                }
            }
            for (side, child) in node.children() {
                stack.push((child, split_area(&area, node.split_axis, node.split_pos, side)));
            }
        }
        out
    }

    fn one_in_node(&self, id: NodeId, query: &Query<'_, P>) -> Option<(RegionKey, P)> {
        let cell_size = self.config.cell_size;
        self.nodes[id].actors.keys().find_map(|&key| {
            let candidate = self.candidate(key);
            query
                .accepts(&candidate, cell_size)
                .then_some((key, *candidate.payload))
        })
    }

    /// First accepted region in the subtree at `start` among nodes intersecting `rect`.
    fn one_down(
        &self,
        rect: Rect,
        query: &Query<'_, P>,
        start: NodeId,
        start_area: Rect,
    ) -> Option<(RegionKey, P)> {
        let mut stack: NodeStack = smallvec![(start, start_area)];
        while let Some((id, area)) = stack.pop() {
            if !area.intersects(&rect) {
                continue;
            }
            if let Some(hit) = self.one_in_node(id, query) {
                return Some(hit);
            }
            let node = &self.nodes[id];
            for (side, child) in node.children() {
                stack.push((child, split_area(&area, node.split_axis, node.split_pos, side)));
            }
        }
        None
    }

    /// First accepted region among nodes, from the root down, whose area contains `rect`.
    fn one_containing_down(&self, rect: Rect, query: &Query<'_, P>) -> Option<(RegionKey, P)> {
        let root = self.root?;
        let mut stack: NodeStack = smallvec![(root, self.nodes[root].area)];
        while let Some((id, area)) = stack.pop() {
            if !area.contains(&rect) {
                continue;
            }
            if let Some(hit) = self.one_in_node(id, query) {
                return Some(hit);
            }
            let node = &self.nodes[id];
            for (side, child) in node.children() {
                stack.push((child, split_area(&area, node.split_axis, node.split_pos, side)));
            }
        }
        None
    }

    /// `id` and its ancestors, root first, each with its exact area.
    ///
    /// Stored areas below a node with a pending area change can be stale, so
    /// read-only callers derive areas from the root instead.
    pub(crate) fn area_path(&self, id: NodeId) -> NodeStack {
        let mut path = NodeStack::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            path.push((n, Rect::default()));
            cur = self.nodes[n].parent;
        }
        path.reverse();
        let mut area = self.nodes[path[0].0].area;
        path[0].1 = area;
        for i in 1..path.len() {
            let parent = &self.nodes[path[i - 1].0];
            let side = parent
                .side_of(path[i].0)
                .expect("tree invariant violated: node missing from its parent");
            area = split_area(&area, parent.split_axis, parent.split_pos, side);
            path[i].1 = area;
        }
        path
    }

    #[inline]
    fn debug_check(&self) {
        #[cfg(feature = "consistency_checks")]
        if let Err(err) = self.check_consistency() {
            panic!("spatial index corrupted: {err}");
        }
    }
}

/// `[x0, y0, x1, y1]` of `area`, widened so they cannot overflow.
fn edges(area: &Rect) -> [i64; 4] {
    let (x, y) = (i64::from(area.x), i64::from(area.y));
    [x, y, x + i64::from(area.width), y + i64::from(area.height)]
}

/// The rectangle spanning `[x0, x1) x [y0, y1)`, if it fits in `i32`.
fn rect_from_edges(x0: i64, y0: i64, x1: i64, y1: i64) -> Option<Rect> {
    Some(Rect::new(
        i32::try_from(x0).ok()?,
        i32::try_from(y0).ok()?,
        i32::try_from(x1 - x0).ok()?,
        i32::try_from(y1 - y0).ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn index() -> SpatialIndex<u32> {
        SpatialIndex::new(IndexConfig::new(1)).unwrap()
    }

    fn keys(hits: &[(RegionKey, u32)]) -> Vec<RegionKey> {
        let mut out: Vec<_> = hits.iter().map(|h| h.0).collect();
        out.sort_by_key(|k| (k.0, k.1));
        out
    }

    fn chain_nodes(idx: &SpatialIndex<u32>, key: RegionKey) -> Vec<NodeId> {
        idx.links
            .chain(idx.live_entry(key).chain)
            .iter()
            .map(|&l| idx.links[l].node)
            .collect()
    }

    fn is_ancestor(idx: &SpatialIndex<u32>, anc: NodeId, mut node: NodeId) -> bool {
        while let Some(p) = idx.nodes[node].parent {
            if p == anc {
                return true;
            }
            node = p;
        }
        false
    }

    /// Number of attributed nodes reached by walking the footprint of `key`
    /// down from the root, stopping at the first node holding it on each path.
    ///
    /// `None` if some part of the footprint reaches no node holding the region.
    fn reached_attributions(idx: &SpatialIndex<u32>, key: RegionKey) -> Option<usize> {
        let footprint = idx.bounds(key)?.footprint();
        let root = idx.root?;
        let mut count = 0;
        let mut stack = vec![(root, idx.nodes[root].area, footprint)];
        while let Some((id, area, clipped)) = stack.pop() {
            let node = &idx.nodes[id];
            if node.contains_actor(key).is_some() {
                count += 1;
                continue;
            }
            for side in Side::BOTH {
                let child_area = split_area(&area, node.split_axis, node.split_pos, side);
                let Some(part) = child_area.intersection(&clipped) else {
                    continue;
                };
                stack.push((node.raw_child(side)?, child_area, part));
            }
        }
        Some(count)
    }

    #[test]
    fn first_region_defines_root_area() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        assert_eq!(idx.root_area(), Some(Rect::new(0, 0, 10, 10)));
        assert_eq!(idx.objects_at(0, 0, None), vec![(a, 1)]);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn moving_into_overlap_is_found() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        let b = idx.insert(Rect::new(100, 100, 10, 10), 2);
        let root = idx.root_area().unwrap();
        assert!(root.contains(&Rect::new(0, 0, 10, 10)));
        assert!(root.contains(&Rect::new(100, 100, 10, 10)));
        assert!(idx.intersecting(a, None).is_empty());

        idx.update_location(b, Rect::new(5, 5, 10, 10));
        assert_eq!(idx.intersecting(a, None), vec![(b, 2)]);
        assert_eq!(idx.intersecting(b, None), vec![(a, 1)]);
        assert_eq!(idx.one_intersecting(a, None), Some((b, 2)));
        idx.check_consistency().unwrap();
    }

    #[test]
    fn straddling_region_is_split_then_merged_upwards() {
        let mut idx = index();
        let _a = idx.insert(Rect::new(0, 0, 100, 100), 1);
        // Root splits at x = 50.
        let b = idx.insert(Rect::new(40, 10, 20, 10), 2);
        assert_eq!(chain_nodes(&idx, b).len(), 2);
        idx.check_consistency().unwrap();

        idx.update_size(b, Rect::new(0, 0, 100, 100));
        let nodes = chain_nodes(&idx, b);
        assert_eq!(nodes, vec![idx.root.unwrap()]);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn growth_keeps_existing_regions_reachable() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        let b = idx.insert(Rect::new(20, 20, 5, 5), 2);
        let far = Rect::new(-5000, 7000, 30, 30);
        let c = idx.insert(far, 3);
        assert!(idx.root_area().unwrap().contains(&far));
        assert_eq!(keys(&idx.intersecting_rect(Rect::new(0, 0, 10, 10), None)), vec![a]);
        assert_eq!(keys(&idx.intersecting_rect(Rect::new(20, 20, 5, 5), None)), vec![b]);
        assert_eq!(keys(&idx.intersecting_rect(far, None)), vec![c]);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn small_moves_keep_chain_minimal() {
        let mut idx = index();
        let _anchor = idx.insert(Rect::new(0, 0, 200, 200), 0);
        let still = idx.insert(Rect::new(90, 90, 20, 20), 1);
        let mover = idx.insert(Rect::new(60, 60, 40, 40), 2);
        for step in 0..30 {
            idx.update_location(mover, Rect::new(60 + step, 60 + step / 2, 40, 40));
            idx.check_consistency().unwrap();
            assert_eq!(
                idx.one_intersecting(still, Some(&|p: &u32| *p == 2)),
                Some((mover, 2))
            );
            let bounds = idx.bounds(mover).unwrap();
            let nodes = chain_nodes(&idx, mover);
            assert_eq!(
                reached_attributions(&idx, mover),
                Some(nodes.len()),
                "chain is not exactly the lowest nodes the region reaches"
            );
            for &n in &nodes {
                let &(_, area) = idx.area_path(n).last().unwrap();
                assert!(area.intersects(&bounds), "stale attribution");
            }
            for (i, &n) in nodes.iter().enumerate() {
                for &m in &nodes[i + 1..] {
                    assert_ne!(n, m, "duplicate attribution");
                    assert!(!is_ancestor(&idx, n, m) && !is_ancestor(&idx, m, n));
                }
            }
        }
    }

    #[test]
    fn growth_near_the_coordinate_limits_stays_consistent() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        let low = idx.insert(Rect::new(i32::MIN + 5, 0, 10, 10), 2);
        idx.check_consistency().unwrap();
        // The widest area that still ends at the first region.
        assert_eq!(idx.root_area(), Some(Rect::new(i32::MIN + 11, 0, i32::MAX, 10)));
        assert_eq!(keys(&idx.intersecting_rect(Rect::new(0, 0, 10, 10), None)), vec![a]);
        assert_eq!(
            keys(&idx.intersecting_rect(Rect::new(i32::MIN + 12, 2, 1, 1), None)),
            vec![low]
        );

        // No representable root can reach this far right as well.
        let high = idx.insert(Rect::new(i32::MAX - 20, 0, 10, 10), 3);
        idx.check_consistency().unwrap();
        assert!(idx.contains(high));
        assert_eq!(idx.parked.len(), 1);
        assert_eq!(keys(&idx.objects_list()), vec![a, low]);
        idx.update(high, Rect::new(i32::MAX - 30, 0, 10, 10));
        idx.check_consistency().unwrap();
        assert_eq!(idx.parked.len(), 1);

        assert_eq!(idx.remove(low), Some(2));
        idx.check_consistency().unwrap();

        // Once the tree empties the parked region seeds the new root.
        assert_eq!(idx.remove(a), Some(1));
        idx.check_consistency().unwrap();
        assert!(idx.parked.is_empty());
        assert_eq!(keys(&idx.objects_list()), vec![high]);
        let hits = idx.intersecting_rect(Rect::new(i32::MAX - 25, 5, 1, 1), None);
        assert_eq!(keys(&hits), vec![high]);

        // Growing back towards the origin stops exactly one `i32::MAX` away.
        let back = idx.insert(Rect::new(0, 0, 10, 10), 5);
        idx.check_consistency().unwrap();
        assert_eq!(idx.root_area(), Some(Rect::new(-20, 0, i32::MAX, 10)));
        assert_eq!(keys(&idx.intersecting_rect(Rect::new(0, 0, 10, 10), None)), vec![back]);
        assert!(idx.intersecting(high, None).is_empty());

        let top = idx.insert(Rect::new(0, i32::MAX - 3, 4, 100), 4);
        idx.check_consistency().unwrap();
        let hits = idx.intersecting_rect(Rect::new(1, i32::MAX - 1, 1, 1), None);
        assert_eq!(keys(&hits), vec![top]);
    }

    #[test]
    fn leaving_the_tree_area_reinserts() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        let b = idx.insert(Rect::new(2, 2, 4, 4), 2);
        idx.update(b, Rect::new(500, -300, 4, 4));
        assert!(idx.root_area().unwrap().contains(&Rect::new(500, -300, 4, 4)));
        assert!(idx.intersecting(a, None).is_empty());
        assert_eq!(keys(&idx.intersecting_rect(Rect::new(500, -300, 1, 1), None)), vec![b]);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn remove_is_idempotent_and_prunes_everything() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        let b = idx.insert(Rect::new(50, 0, 10, 10), 2);
        assert_eq!(idx.remove(a), Some(1));
        assert_eq!(idx.remove(a), None);
        idx.check_consistency().unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.remove(b), Some(2));
        assert!(idx.is_empty());
        assert_eq!(idx.root_area(), None);
        assert_eq!(idx.links.live(), 0);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn stale_keys_are_ignored() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        idx.remove(a);
        let b = idx.insert(Rect::new(0, 0, 10, 10), 2);
        assert_eq!(a.idx(), b.idx());
        assert_ne!(a, b);
        idx.update(a, Rect::new(100, 100, 1, 1));
        assert_eq!(idx.bounds(b), Some(Rect::new(0, 0, 10, 10)));
        assert!(idx.intersecting(a, None).is_empty());
        assert_eq!(idx.one_intersecting(a, None), None);
        assert_eq!(idx.payload(a), None);
        assert!(!idx.contains(a));
        assert!(idx.contains(b));
    }

    #[test]
    fn enumeration_reports_split_regions_once() {
        let mut idx = index();
        let _a = idx.insert(Rect::new(0, 0, 64, 64), 1);
        let _b = idx.insert(Rect::new(0, 0, 8, 8), 2);
        let wide = idx.insert(Rect::new(1, 20, 62, 30), 3);
        assert!(chain_nodes(&idx, wide).len() > 1);
        let hits = idx.intersecting_rect(Rect::new(0, 0, 64, 64), None);
        assert_eq!(hits.len(), 3);
        assert_eq!(idx.objects_list().len(), 3);
        assert_eq!(idx.objects(Some(&|p: &u32| *p >= 2)).len(), 2);
    }

    #[test]
    fn point_like_regions_are_tracked() {
        let mut idx = index();
        let a = idx.insert(Rect::new(5, 5, 0, 0), 1);
        assert_eq!(idx.root_area(), Some(Rect::new(5, 5, 1, 1)));
        let b = idx.insert(Rect::new(5, 5, 0, 0), 2);
        let c = idx.insert(Rect::new(6, 5, 0, 0), 3);
        assert_eq!(keys(&idx.objects_at(5, 5, None)), vec![a, b]);
        assert_eq!(keys(&idx.objects_at(6, 5, None)), vec![c]);
        idx.update(c, Rect::new(5, 5, 0, 0));
        assert_eq!(keys(&idx.objects_at(5, 5, None)), vec![a, b, c]);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn grid_queries_map_cells_to_pixels() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new(IndexConfig::new(10)).unwrap();
        // Regions centred in cells (0,0), (1,0), (1,1), (3,0).
        let c00 = idx.insert(Rect::new(2, 2, 6, 6), 0);
        let c10 = idx.insert(Rect::new(12, 2, 6, 6), 1);
        let c11 = idx.insert(Rect::new(12, 12, 6, 6), 2);
        let c30 = idx.insert(Rect::new(32, 2, 6, 6), 3);

        assert_eq!(keys(&idx.objects_at(1, 0, None)), vec![c10]);
        assert!(idx.objects_at(2, 0, None).is_empty());

        assert_eq!(keys(&idx.neighbours(c00, 1, true, None)), vec![c10, c11]);
        assert_eq!(keys(&idx.neighbours(c00, 1, false, None)), vec![c10]);
        assert_eq!(keys(&idx.neighbours_at(2, 0, 1, false, None)), vec![c10, c30]);

        assert_eq!(keys(&idx.in_range(0, 0, 1, None)), vec![c00, c10]);
        assert_eq!(keys(&idx.in_range(0, 0, 2, None)), vec![c00, c10, c11]);
        assert_eq!(keys(&idx.in_range(0, 0, 0, None)), vec![c00]);
        assert!(idx.in_range(0, 0, -1, None).is_empty());

        assert_eq!(idx.one_object_at(c00, 1, 1, None), Some((c11, 2)));
        assert_eq!(idx.one_object_at(c11, 1, 1, None), None);
        assert_eq!(idx.one_object_at(c00, 1, 1, Some(&|p: &u32| *p == 7)), None);
    }

    #[test]
    fn huge_radii_and_distances_reach_every_region() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new(IndexConfig::new(10)).unwrap();
        let near = idx.insert(Rect::new(12, 12, 6, 6), 0);
        let mid = idx.insert(Rect::new(-50_000, 70_000, 30, 30), 1);
        let far = idx.insert(Rect::new(1_000_000, -2_000_000, 8, 8), 2);
        let all = vec![near, mid, far];

        assert_eq!(keys(&idx.in_range(0, 0, i32::MAX, None)), all);
        assert_eq!(keys(&idx.in_range(0, 0, 1_500_000_000, None)), all);
        assert_eq!(keys(&idx.neighbours_at(0, 0, i32::MAX, true, None)), all);
        assert_eq!(keys(&idx.neighbours_at(0, 0, i32::MAX, false, None)), all);
        assert_eq!(keys(&idx.neighbours(near, i32::MAX, true, None)), vec![mid, far]);
        assert!(idx.in_range(i32::MAX, i32::MIN, 3, None).is_empty());
    }

    #[test]
    fn initialize_rejects_bad_config_and_keeps_old_one() {
        let mut idx = index();
        assert_eq!(
            idx.initialize(IndexConfig::new(0)),
            Err(ConfigError::NonPositiveCellSize(0))
        );
        assert_eq!(idx.config().cell_size, 1);
        idx.initialize(IndexConfig::new(4).wrap(true)).unwrap();
        assert_eq!(idx.config().cell_size, 4);
        assert!(SpatialIndex::<u32>::new(IndexConfig::new(-1)).is_err());
    }

    #[test]
    fn empty_index_answers_empty() {
        let idx = index();
        assert!(idx.objects_list().is_empty());
        assert!(idx.objects_at(0, 0, None).is_empty());
        assert!(idx.in_range(0, 0, 3, None).is_empty());
        assert!(idx.neighbours_at(0, 0, 3, true, None).is_empty());
        assert!(idx.intersecting_rect(Rect::new(0, 0, 5, 5), None).is_empty());
        assert_eq!(idx.one_object_at(RegionKey::new(0, 1), 0, 0, None), None);
        idx.check_consistency().unwrap();
    }

    #[test]
    fn clear_resets_everything() {
        let mut idx = index();
        let a = idx.insert(Rect::new(0, 0, 10, 10), 1);
        idx.insert(Rect::new(30, 0, 10, 10), 2);
        idx.clear();
        assert!(idx.is_empty());
        assert_eq!(idx.root_area(), None);
        assert!(!idx.contains(a));
        let b = idx.insert(Rect::new(0, 0, 10, 10), 3);
        assert_eq!(a.idx(), b.idx());
        assert_ne!(a, b);
        assert!(!idx.contains(a), "key from before the clear came back to life");
        assert_eq!(idx.payload(a), None);
        assert_eq!(idx.payload(b), Some(3));
        assert_eq!(idx.len(), 1);
        idx.check_consistency().unwrap();
    }
}
