// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive geometry types: integer rectangles, split axes and child sides.

use core::fmt;

/// Axis-aligned integer rectangle in pixel space.
///
/// The rectangle covers the half-open ranges `[x, x + width)` and
/// `[y, y + height)`. Zero-sized rectangles are legal and describe point-like
/// regions; see [`Rect::footprint`] for how the index treats them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge (smallest y).
    pub y: i32,
    /// Extent along x.
    pub width: i32,
    /// Extent along y.
    pub height: i32,
}

impl Rect {
    /// Create a rectangle from origin and size.
    #[inline(always)]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, `x + width`.
    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive far edge along y, `y + height`.
    #[inline]
    pub const fn top(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Midpoint along x (rounded towards the origin edge).
    #[inline]
    pub const fn middle_x(&self) -> i32 {
        self.x.saturating_add(self.width / 2)
    }

    /// Midpoint along y (rounded towards the origin edge).
    #[inline]
    pub const fn middle_y(&self) -> i32 {
        self.y.saturating_add(self.height / 2)
    }

    /// Whether `other` lies entirely within this rectangle.
    #[inline]
    pub const fn contains(&self, other: &Self) -> bool {
        self.x <= other.x
            && self.y <= other.y
            && other.right() <= self.right()
            && other.top() <= self.top()
    }

    /// Whether the pixel at `(px, py)` lies within this rectangle.
    #[inline]
    pub const fn contains_point(&self, px: i32, py: i32) -> bool {
        self.x <= px && px < self.right() && self.y <= py && py < self.top()
    }

    /// Whether the two rectangles share at least one pixel.
    ///
    /// Rectangles that merely touch along an edge do not intersect.
    #[inline]
    pub const fn intersects(&self, other: &Self) -> bool {
        other.x < self.right()
            && self.x < other.right()
            && other.y < self.top()
            && self.y < other.top()
    }

    /// The overlapping part of two rectangles, or `None` when they are disjoint.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let right = self.right().min(other.right());
        if x >= right {
            return None;
        }
        let y = self.y.max(other.y);
        let top = self.top().min(other.top());
        if y >= top {
            return None;
        }
        Some(Self::new(x, y, right - x, top - y))
    }

    /// Overwrite this rectangle in place.
    #[inline]
    pub fn copy_from(&mut self, other: &Self) {
        *self = *other;
    }

    /// The rectangle as the index sees it: at least one pixel along each axis.
    ///
    /// A zero-width (or negative-width) region occupies the single column at
    /// its `x`, and likewise for height. This keeps point-like regions
    /// attributable to a tree node and keeps root growth strictly increasing.
    /// Extents reaching past `i32::MAX` are cut back to end there.
    #[inline]
    pub const fn footprint(&self) -> Self {
        Self::new(
            self.x,
            self.y,
            footprint_extent(self.x, self.width),
            footprint_extent(self.y, self.height),
        )
    }

    /// Start coordinate along `axis`.
    #[inline]
    pub(crate) const fn start(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    /// End coordinate (exclusive) along `axis`.
    #[inline]
    pub(crate) const fn end(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.right(),
            Axis::Y => self.top(),
        }
    }
}

const fn footprint_extent(start: i32, extent: i32) -> i32 {
    let extent = if extent < 1 { 1 } else { extent };
    let room = i32::MAX.saturating_sub(start);
    if extent > room {
        if room < 1 { 1 } else { room }
    } else {
        extent
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{} {}x{}]", self.x, self.y, self.width, self.height)
    }
}

/// Axis along which a node's area is divided.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) enum Axis {
    /// Split with a vertical line at some x.
    #[default]
    X,
    /// Split with a horizontal line at some y.
    Y,
}

impl Axis {
    /// The axis to split `area` along: the longer dimension, ties going to X.
    #[inline]
    pub(crate) const fn longer_of(area: &Rect) -> Self {
        if area.width >= area.height {
            Self::X
        } else {
            Self::Y
        }
    }
}

/// Which half of a split a child covers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Side {
    /// The half below the split position.
    Left = 0,
    /// The half at or above the split position.
    Right = 1,
}

impl Side {
    pub(crate) const BOTH: [Self; 2] = [Self::Left, Self::Right];

    #[inline]
    pub(crate) const fn idx(self) -> usize {
        self as usize
    }
}
