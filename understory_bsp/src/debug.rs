// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics: painting node areas and dumping the tree shape.

use alloc::string::String;
use core::fmt::{self, Debug, Write};

use smallvec::{SmallVec, smallvec};

use crate::index::{NodeStack, SpatialIndex};
use crate::node::{NodeId, split_area};
use crate::types::{Rect, Side};

/// Something node rectangles can be drawn onto.
pub trait DebugSurface {
    /// Outline `rect` (pixel coordinates).
    fn draw_rect(&mut self, rect: Rect);
}

impl<P: Copy + Debug> SpatialIndex<P> {
    /// Draw the area of every node in the tree, parents before children.
    pub fn paint_debug(&self, surface: &mut impl DebugSurface) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack: NodeStack = smallvec![(root, self.nodes[root].area)];
        while let Some((id, area)) = stack.pop() {
            surface.draw_rect(area);
            let node = &self.nodes[id];
            for (side, child) in node.children() {
                stack.push((child, split_area(&area, node.split_axis, node.split_pos, side)));
            }
        }
    }

    /// Write an indented outline of the tree, one node per line.
    ///
    /// ```text
    /// #3: [0,0 20x20] (1)
    ///  \L-#2: [0,0 20x10] (0)
    ///  |  \L-#0: [0,0 10x10] (1)
    ///  \R-#4: [0,10 20x10] (1)
    /// ```
    ///
    /// Each line shows the node slot, its area and how many regions are
    /// attributed to it directly.
    pub fn write_tree(&self, out: &mut impl Write) -> fmt::Result {
        let Some(root) = self.root else {
            return Ok(());
        };
        // (node, exact area, indent for its children, prefix for itself)
        let mut stack: SmallVec<[(NodeId, Rect, String, String); 16]> =
            smallvec![(root, self.nodes[root].area, String::new(), String::new())];
        while let Some((id, area, indent, lead)) = stack.pop() {
            let node = &self.nodes[id];
            writeln!(out, "{lead}#{}: {area} ({})", id.idx(), node.actors.len())?;

            let left = node.raw_child(Side::Left);
            let right = node.raw_child(Side::Right);
            let child_area = |side| split_area(&area, node.split_axis, node.split_pos, side);
            if let Some(r) = right {
                stack.push((
                    r,
                    child_area(Side::Right),
                    alloc::format!("{indent}  "),
                    alloc::format!("{indent} \\R-"),
                ));
            }
            if let Some(l) = left {
                let bar = if right.is_some() { " |" } else { "  " };
                stack.push((
                    l,
                    child_area(Side::Left),
                    alloc::format!("{indent}{bar}"),
                    alloc::format!("{indent} \\L-"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::vec::Vec;

    use super::DebugSurface;
    use crate::{IndexConfig, Rect, SpatialIndex};

    #[derive(Default)]
    struct Recorder(Vec<Rect>);

    impl DebugSurface for Recorder {
        fn draw_rect(&mut self, rect: Rect) {
            self.0.push(rect);
        }
    }

    #[test]
    fn paints_every_node_once() {
        let mut idx: SpatialIndex<u8> = SpatialIndex::new(IndexConfig::new(1)).unwrap();
        let mut rec = Recorder::default();
        idx.paint_debug(&mut rec);
        assert!(rec.0.is_empty());

        idx.insert(Rect::new(0, 0, 100, 100), 0);
        idx.insert(Rect::new(40, 10, 20, 10), 1);
        idx.paint_debug(&mut rec);
        assert_eq!(
            rec.0,
            [
                Rect::new(0, 0, 100, 100),
                Rect::new(50, 0, 50, 100),
                Rect::new(0, 0, 50, 100),
            ]
        );
    }

    #[test]
    fn tree_dump_shows_shape() {
        let mut idx: SpatialIndex<u8> = SpatialIndex::new(IndexConfig::new(1)).unwrap();
        let mut out = String::new();
        idx.write_tree(&mut out).unwrap();
        assert!(out.is_empty());

        idx.insert(Rect::new(0, 0, 10, 10), 0);
        idx.insert(Rect::new(12, 2, 4, 4), 1);
        idx.write_tree(&mut out).unwrap();
        // The first root grows once to the right and takes the new region itself.
        assert_eq!(out, "#1: [0,0 20x10] (1)\n \\L-#0: [0,0 10x10] (1)\n");

        out.clear();
        idx.insert(Rect::new(0, 0, 20, 10), 2);
        idx.insert(Rect::new(11, 1, 1, 1), 3);
        idx.write_tree(&mut out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#1: [0,0 20x10] (3)");
        assert_eq!(lines[1], " \\L-#0: [0,0 10x10] (1)");
        assert_eq!(lines[2], " \\R-#2: [10,0 10x10] (1)");
        assert_eq!(lines.len(), 3);
    }
}
