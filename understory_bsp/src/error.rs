// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use crate::types::Rect;

/// An [`IndexConfig`][crate::IndexConfig] that cannot be used.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Grid queries need a strictly positive cell size.
    #[error("cell size must be strictly positive, got {0}")]
    NonPositiveCellSize(i32),
    /// World dimensions cannot be negative.
    #[error("world size must not be negative, got {width}x{height}")]
    NegativeWorldSize {
        /// Requested width.
        width: i32,
        /// Requested height.
        height: i32,
    },
}

/// Corruption found by [`SpatialIndex::check_consistency`][crate::SpatialIndex::check_consistency].
///
/// Any of these indicates a bug in the index, not misuse by the caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    /// The root node has a parent link.
    #[error("root node has a parent")]
    RootHasParent,
    /// A node's stored area disagrees with the area implied by its ancestors.
    #[error("node area {stored} does not match expected area {expected}")]
    AreaMismatch {
        /// Area stored on the node.
        stored: Rect,
        /// Area derived from the root and the splits above the node.
        expected: Rect,
    },
    /// A split position lies outside the node's area.
    #[error("split position {split_pos} lies outside node area {area}")]
    SplitOutsideArea {
        /// The node's area.
        area: Rect,
        /// The offending split position.
        split_pos: i32,
    },
    /// A child does not point back at its parent.
    #[error("child of node with area {area} has a wrong parent link")]
    BrokenParentLink {
        /// Area of the parent node.
        area: Rect,
    },
    /// A region is attributed to a node its footprint does not touch.
    #[error("region with footprint {footprint} attributed to disjoint node area {area}")]
    RegionOutsideNode {
        /// The region's footprint.
        footprint: Rect,
        /// The node's area.
        area: Rect,
    },
    /// A node's region map and the region's link chain disagree.
    #[error("actor node chain is inconsistent with node region maps")]
    BrokenChain,
    /// One region is linked to the same node twice.
    #[error("region is attributed to the same node more than once")]
    DuplicateAttribution,
    /// A live region has no attribution at all and is not parked outside the tree area.
    #[error("a tracked region is not attributed to any node")]
    UntrackedRegion,
    /// Arena slots that are neither reachable nor pooled.
    #[error("{0} node(s) are neither in the tree nor in the cache")]
    LeakedNodes(usize),
}
