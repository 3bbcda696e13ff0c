// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_bsp --heading-base-level=0

//! Understory BSP: an adaptive binary space partition over moving 2D rectangles.
//!
//! Understory BSP answers collision and proximity queries over a changing set of
//! axis-aligned integer rectangles ("regions"), such as the actors of a 2D game world.
//!
//! - Insert, move, resize, and remove regions with a user payload.
//! - Query by grid cell, pixel rectangle, radius, neighbourhood, or another region.
//! - Ask for "any one" overlapping region without enumerating all of them.
//!
//! The tree needs no world bounds up front. The root grows by doubling towards
//! whatever region falls outside it, nodes split along their longer side as regions
//! accumulate, and empty nodes are pruned and recycled as regions leave. A region
//! that straddles split lines is attributed to every node it overlaps, and moving a
//! region only revisits the tree near its old and new positions.
//!
//! Grid queries take cell coordinates; [`IndexConfig::cell_size`] converts them to
//! pixels. Query results can be narrowed with a [`ClassFilter`] on the payload.
//!
//! ## Features
//!
//! - `consistency_checks`: run [`SpatialIndex::check_consistency`] after every
//!   mutating operation and panic on corruption. Slow; meant for debugging.
//!
//! # Example
//!
//! ```rust
//! use understory_bsp::{IndexConfig, Rect, SpatialIndex};
//!
//! // 16-pixel grid cells.
//! let mut idx = SpatialIndex::new(IndexConfig::new(16)).unwrap();
//! let player = idx.insert(Rect::new(0, 0, 16, 16), 'p');
//! let coin = idx.insert(Rect::new(40, 0, 8, 8), 'c');
//! let wall = idx.insert(Rect::new(0, 64, 128, 16), 'w');
//!
//! // Nothing touches the player yet.
//! assert_eq!(idx.one_intersecting(player, None), None);
//!
//! // Walk right onto the coin.
//! idx.update_location(player, Rect::new(32, 0, 16, 16));
//! assert_eq!(idx.one_intersecting(player, None), Some((coin, 'c')));
//!
//! // The wall covers the cell row at y = 4.
//! let hits = idx.objects_at(2, 4, None);
//! assert_eq!(hits, vec![(wall, 'w')]);
//!
//! // Only walls within five cells of the player's cell.
//! let walls = idx.in_range(2, 0, 5, Some(&|k: &char| *k == 'w'));
//! assert_eq!(walls, vec![(wall, 'w')]);
//!
//! assert_eq!(idx.remove(coin), Some('c'));
//! assert_eq!(idx.one_intersecting(player, None), None);
//! ```

#![no_std]

extern crate alloc;

mod actor_node;
mod check;
mod config;
mod debug;
mod error;
mod index;
mod node;
mod query;
mod types;

pub use config::IndexConfig;
pub use debug::DebugSurface;
pub use error::{ConfigError, ConsistencyError};
pub use index::{RegionKey, SpatialIndex};
pub use query::ClassFilter;
pub use types::Rect;
