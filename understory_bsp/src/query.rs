// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Query predicates applied to regions while walking the tree.

use crate::index::RegionKey;
use crate::types::Rect;

/// Optional category filter for queries.
///
/// `None` accepts every region; `Some(f)` accepts regions whose payload
/// satisfies `f`. This plays the role of a "class" restriction: payloads
/// typically carry a kind tag and the filter compares against it.
///
/// ```rust
/// use understory_bsp::{IndexConfig, Rect, SpatialIndex};
///
/// #[derive(Copy, Clone, Debug, PartialEq)]
/// enum Kind { Rock, Ship }
///
/// let mut idx = SpatialIndex::new(IndexConfig::new(1)).unwrap();
/// idx.insert(Rect::new(0, 0, 10, 10), Kind::Rock);
/// idx.insert(Rect::new(5, 5, 10, 10), Kind::Ship);
///
/// let ships = idx.intersecting_rect(Rect::new(0, 0, 20, 20), Some(&|k: &Kind| *k == Kind::Ship));
/// assert_eq!(ships.len(), 1);
/// ```
pub type ClassFilter<'a, P> = Option<&'a dyn Fn(&P) -> bool>;

/// The geometric test a query applies to each candidate region.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Predicate {
    /// Every region in a visited node.
    Any,
    /// Footprint intersects `bounds`.
    Overlap { bounds: Rect },
    /// Footprint contains the pixel.
    Point { x: i32, y: i32 },
    /// Cell within `radius` cells of cell `(x, y)`, measured between centres.
    InRange { x: i32, y: i32, radius: i32 },
    /// Cell within `distance` cells of `(x, y)`, excluding that cell.
    Neighbours {
        x: i32,
        y: i32,
        distance: i32,
        diagonal: bool,
    },
}

/// A predicate plus the class filter and an optional region to skip.
pub(crate) struct Query<'a, P> {
    pub(crate) predicate: Predicate,
    pub(crate) class: ClassFilter<'a, P>,
    pub(crate) ignore: Option<RegionKey>,
}

/// What a query needs to know about a candidate region.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Candidate<'a, P> {
    pub(crate) key: RegionKey,
    pub(crate) footprint: Rect,
    pub(crate) payload: &'a P,
}

impl<P> Query<'_, P> {
    /// Whether `candidate` passes the filter and the predicate.
    pub(crate) fn accepts(&self, candidate: &Candidate<'_, P>, cell_size: i32) -> bool {
        if self.ignore == Some(candidate.key) {
            return false;
        }
        if let Some(class) = self.class
            && !class(candidate.payload)
        {
            return false;
        }
        let footprint = candidate.footprint;
        match self.predicate {
            Predicate::Any => true,
            Predicate::Overlap { bounds } => footprint.intersects(&bounds),
            Predicate::Point { x, y } => footprint.contains_point(x, y),
            Predicate::InRange { x, y, radius } => {
                let (cx, cy) = cell_of(&footprint, cell_size);
                let dx = i128::from(cx) - i128::from(x);
                let dy = i128::from(cy) - i128::from(y);
                let r = i128::from(radius);
                dx * dx + dy * dy <= r * r
            }
            Predicate::Neighbours {
                x,
                y,
                distance,
                diagonal,
            } => {
                let (cx, cy) = cell_of(&footprint, cell_size);
                if cx == x && cy == y {
                    return false;
                }
                let dx = (i64::from(cx) - i64::from(x)).abs();
                let dy = (i64::from(cy) - i64::from(y)).abs();
                let d = i64::from(distance);
                if diagonal {
                    dx <= d && dy <= d
                } else {
                    dx + dy <= d
                }
            }
        }
    }
}

/// The grid cell containing the middle of `footprint`.
pub(crate) fn cell_of(footprint: &Rect, cell_size: i32) -> (i32, i32) {
    (
        footprint.middle_x().div_euclid(cell_size),
        footprint.middle_y().div_euclid(cell_size),
    )
}

/// Pixel rectangle covering the `(2 * reach + 1)²` block of cells centred on `(x, y)`.
///
/// The block is clipped to the `i32` pixel range. `None` means the clipped
/// block is still too wide for a [`Rect`], so the whole tree has to be visited.
pub(crate) fn cell_block(x: i32, y: i32, reach: i32, cell_size: i32) -> Option<Rect> {
    let reach = i64::from(reach.max(0));
    let cell_size = i64::from(cell_size);
    let clip = |v: i64| v.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
    let span = |c: i32| {
        let c = i64::from(c);
        let start = clip((c - reach) * cell_size);
        let end = clip((c + reach + 1) * cell_size);
        Some((i32::try_from(start).ok()?, i32::try_from(end - start).ok()?))
    };
    let (px, width) = span(x)?;
    let (py, height) = span(y)?;
    Some(Rect::new(px, py, width, height))
}

/// The pixel at the centre of cell `(x, y)`.
pub(crate) fn cell_centre(x: i32, y: i32, cell_size: i32) -> (i32, i32) {
    let half = cell_size / 2;
    (
        x.saturating_mul(cell_size).saturating_add(half),
        y.saturating_mul(cell_size).saturating_add(half),
    )
}
