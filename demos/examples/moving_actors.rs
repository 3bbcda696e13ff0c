// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Moving actors through an `understory_bsp` index.
//!
//! A handful of rocks sit still while two ships fly across them. Every tick
//! the ships are moved and asked what they hit. At the end the tree shape is
//! dumped and the node areas are "painted" into a text surface.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p understory_demos --example moving_actors`

use understory_bsp::{DebugSurface, IndexConfig, Rect, RegionKey, SpatialIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Rock,
    Ship,
}

/// Collects painted node areas as text.
#[derive(Default)]
struct TextSurface(Vec<String>);

impl DebugSurface for TextSurface {
    fn draw_rect(&mut self, rect: Rect) {
        self.0.push(rect.to_string());
    }
}

fn main() {
    env_logger::init();

    let config = IndexConfig::new(20).world_size(32, 24);
    let mut world: SpatialIndex<Kind> = match SpatialIndex::new(config) {
        Ok(world) => world,
        Err(err) => {
            log::error!("bad world configuration: {err}");
            return;
        }
    };

    for i in 0..6 {
        world.insert(Rect::new(60 + i * 90, 100 + (i % 2) * 40, 30, 30), Kind::Rock);
    }
    let mut ships: Vec<(RegionKey, i32, i32)> = vec![
        (world.insert(Rect::new(0, 110, 20, 12), Kind::Ship), 9, 0),
        (world.insert(Rect::new(640, 150, 20, 12), Kind::Ship), -11, 1),
    ];

    let rocks_only = |k: &Kind| *k == Kind::Rock;
    for tick in 0..60 {
        for (ship, dx, dy) in &mut ships {
            let Some(b) = world.bounds(*ship) else {
                continue;
            };
            world.update_location(*ship, Rect::new(b.x + *dx, b.y + *dy, b.width, b.height));
            if let Some((rock, _)) = world.one_intersecting(*ship, Some(&rocks_only)) {
                let at = world.bounds(rock).unwrap_or_default();
                println!("tick {tick:>2}: ship {ship:?} hit rock at {at}");
            }
        }
    }

    let (ship, _, _) = ships[0];
    if let Some(b) = world.bounds(ship) {
        let cell = ((b.x + b.width / 2) / 20, (b.y + b.height / 2) / 20);
        let near = world.in_range(cell.0, cell.1, 4, Some(&rocks_only));
        println!("{} rock(s) within 4 cells of the first ship", near.len());
        let around = world.neighbours(ship, 2, true, None);
        println!("{} actor(s) in the 5x5 cells around it", around.len());
    }

    let mut dump = String::new();
    if world.write_tree(&mut dump).is_ok() {
        println!("tree:\n{dump}");
    }
    let mut surface = TextSurface::default();
    world.paint_debug(&mut surface);
    println!("painted {} node areas: {}", surface.0.len(), surface.0.join(" "));

    if let Err(err) = world.check_consistency() {
        log::error!("index corrupted: {err}");
    }
}
