// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Index configuration.

use crate::error::ConfigError;

/// Configuration for a [`SpatialIndex`][crate::SpatialIndex].
///
/// Only `cell_size` affects behavior: it converts grid coordinates into
/// pixel rectangles for the grid-oriented queries. The tree itself grows to
/// whatever area the inserted regions need, so the world size is informational.
///
/// `wrap` (toroidal worlds) is accepted and reported but not interpreted by
/// the BSP tree; wrap-around geometry has to be handled by the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexConfig {
    /// World width in cells.
    pub world_width: i32,
    /// World height in cells.
    pub world_height: i32,
    /// Size of one grid cell in pixels.
    pub cell_size: i32,
    /// Whether the world wraps around at its edges.
    pub wrap: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            world_width: 0,
            world_height: 0,
            cell_size: 1,
            wrap: false,
        }
    }
}

impl IndexConfig {
    /// A configuration with the given cell size and no world bounds.
    pub fn new(cell_size: i32) -> Self {
        Self {
            cell_size,
            ..Self::default()
        }
    }

    /// Set the world size in cells.
    pub fn world_size(mut self, width: i32, height: i32) -> Self {
        self.world_width = width;
        self.world_height = height;
        self
    }

    /// Set the wrap-around flag.
    pub fn wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    /// Check the preconditions the index relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_size <= 0 {
            return Err(ConfigError::NonPositiveCellSize(self.cell_size));
        }
        if self.world_width < 0 || self.world_height < 0 {
            return Err(ConfigError::NegativeWorldSize {
                width: self.world_width,
                height: self.world_height,
            });
        }
        Ok(())
    }
}
