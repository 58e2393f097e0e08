use glam::Vec3;
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;

use crate::rng::{self, Domain};

// Share of cells that start with food after a reset
const INITIAL_FILL: f32 = 0.1;
const INITIAL_MAX: f32 = 0.5;
// Stream key for the initial fill, kept apart from per-tick keys
const INITIAL_FILL_TICK: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FoodCell {
    pub amount: f32,
    pub freshness: f32,
}

/// Square food grid tiling the x/y extent of the world, wrapping at the edges.
#[derive(Clone, Debug)]
pub struct FoodGrid {
    size: usize,
    world_width: f32,
    world_height: f32,
    cells: Vec<FoodCell>,
}

impl FoodGrid {
    pub fn new(size: usize, world_width: f32, world_height: f32) -> Self {
        let size = size.max(1);
        Self {
            size,
            world_width,
            world_height,
            cells: vec![FoodCell::default(); size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn cells(&self) -> &[FoodCell] {
        &self.cells
    }

    /// Reallocate with a new resolution; all food is lost.
    pub fn resize(&mut self, size: usize) {
        *self = Self::new(size, self.world_width, self.world_height);
    }

    pub fn clear(&mut self) {
        self.cells.fill(FoodCell::default());
    }

    pub fn seed_initial(&mut self, seed: u64) {
        self.cells.par_iter_mut().enumerate().for_each(|(i, cell)| {
            let mut rng = rng::stream(seed, INITIAL_FILL_TICK, i, Domain::Food);
            *cell = if rng.gen::<f32>() < INITIAL_FILL {
                FoodCell {
                    amount: rng.gen::<f32>() * INITIAL_MAX,
                    freshness: 1.0,
                }
            } else {
                FoodCell::default()
            };
        });
    }

    /// One tick of regrowth: spawn, then decay. Cells are independent.
    pub fn update(&mut self, spawn_rate: f32, decay_rate: f32, max_amount: f32, seed: u64, tick: u64) {
        let spawn_rate = spawn_rate.clamp(0.0, 1.0);
        let keep = 1.0 - decay_rate.clamp(0.0, 1.0);
        let max_amount = max_amount.max(0.0);

        self.cells.par_iter_mut().enumerate().for_each(|(i, cell)| {
            let mut rng = rng::stream(seed, tick, i, Domain::Food);
            if rng.gen::<f32>() < spawn_rate {
                let injected = rng.gen::<f32>() * max_amount * 0.5;
                cell.amount = (cell.amount + injected).min(max_amount);
                cell.freshness = 1.0;
            }
            cell.amount *= keep;
            cell.freshness *= keep;
        });
    }

    #[inline]
    fn cell_size(&self) -> (f32, f32) {
        (
            self.world_width / self.size as f32,
            self.world_height / self.size as f32,
        )
    }

    // Unwrapped cell coordinates of a world position
    #[inline]
    fn cell_coords(&self, position: Vec3) -> (i64, i64) {
        let (cw, ch) = self.cell_size();
        let cx = ((position.x + self.world_width * 0.5) / cw).floor() as i64;
        let cy = ((position.y + self.world_height * 0.5) / ch).floor() as i64;
        (cx, cy)
    }

    #[inline]
    fn wrap_index(&self, cx: i64, cy: i64) -> usize {
        let n = self.size as i64;
        (cy.rem_euclid(n) * n + cx.rem_euclid(n)) as usize
    }

    pub fn sample(&self, position: Vec3) -> f32 {
        if !position.is_finite() {
            return 0.0;
        }
        let (cx, cy) = self.cell_coords(position);
        self.cells[self.wrap_index(cx, cy)].amount
    }

    /// Eat everything within `radius` on the x/y plane; the cell under the
    /// position is always included. Returns the amount eaten.
    pub fn consume(&mut self, position: Vec3, radius: f32) -> f32 {
        if !position.is_finite() {
            return 0.0;
        }
        let (cw, ch) = self.cell_size();
        let (cx, cy) = self.cell_coords(position);
        let radius = radius.max(0.0);
        // Half the grid in each direction already covers every wrapped cell
        let half = (self.size / 2) as i64;
        let reach_x = ((radius / cw).ceil() as i64).min(half);
        let reach_y = ((radius / ch).ceil() as i64).min(half);
        let radius_sq = radius * radius;

        let mut eaten = 0.0;
        for dy in -reach_y..=reach_y {
            for dx in -reach_x..=reach_x {
                let gx = cx + dx;
                let gy = cy + dy;
                if dx != 0 || dy != 0 {
                    let center_x = (gx as f32 + 0.5) * cw - self.world_width * 0.5;
                    let center_y = (gy as f32 + 0.5) * ch - self.world_height * 0.5;
                    let ddx = center_x - position.x;
                    let ddy = center_y - position.y;
                    if ddx * ddx + ddy * ddy > radius_sq {
                        continue;
                    }
                }
                let idx = self.wrap_index(gx, gy);
                let cell = &mut self.cells[idx];
                eaten += cell.amount;
                cell.amount = 0.0;
            }
        }
        eaten
    }

    pub fn total(&self) -> f32 {
        self.cells.par_iter().map(|c| c.amount).sum()
    }

    /// Row-major amounts, row 0 at the bottom of the world.
    pub fn amounts(&self) -> Vec<f32> {
        self.cells.iter().map(|c| c.amount).collect()
    }
}
