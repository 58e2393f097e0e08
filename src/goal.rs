//! Goal attractor field.
//!
//! A square grid of attractiveness values in [0, 1] laid over the x/y extent
//! of the world. The grid content depends only on the pattern and its source
//! image, so it is rebuilt on change and otherwise only sampled.

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use crate::config::GoalMode;
use crate::error::{LeniaError, Result};

// Pattern proportions, relative to the grid size
const RING_RADIUS: f32 = 0.3;
const RING_THICKNESS: f32 = 0.05;
const BOX_MARGIN: f32 = 0.2;
const BAND_WIDTH: f32 = 20.0 / 512.0;

pub struct GoalField {
    mode: GoalMode,
    image_path: String,
    size: usize,
    world_width: f32,
    world_height: f32,
    // Row-major, row 0 at the bottom of the world
    data: Vec<f32>,
}

impl GoalField {
    pub fn new(mode: GoalMode, image_path: &str, size: usize, world_width: f32, world_height: f32) -> Self {
        let mut field = Self {
            mode,
            image_path: image_path.to_string(),
            size: size.max(2),
            world_width,
            world_height,
            data: Vec::new(),
        };
        field.rebuild();
        field
    }

    pub fn mode(&self) -> GoalMode {
        self.mode
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn is_active(&self) -> bool {
        self.mode != GoalMode::None
    }

    /// Switch pattern; rebuilds only when the mode or image source changed.
    pub fn set_mode(&mut self, mode: GoalMode, image_path: &str) -> bool {
        let source_changed = mode == GoalMode::Image && image_path != self.image_path;
        if mode == self.mode && !source_changed {
            return false;
        }
        self.mode = mode;
        self.image_path = image_path.to_string();
        self.rebuild();
        true
    }

    /// Re-read the image source even if the path is unchanged.
    pub fn reload(&mut self) {
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let s = self.size;
        self.data = match self.mode {
            GoalMode::None => vec![0.0; s * s],
            GoalMode::Circle => ring_pattern(s),
            GoalMode::Box => box_pattern(s),
            GoalMode::Glyph => glyph_pattern(s),
            GoalMode::Image => match load_image(&self.image_path, s) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "goal image unavailable, using fallback cross");
                    cross_pattern(s)
                }
            },
        };
        tracing::debug!(mode = ?self.mode, size = s, "goal field rebuilt");
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.size + x]
    }

    /// Bilinear sample, clamped at the edges.
    pub fn evaluate(&self, position: Vec3) -> f32 {
        if !position.is_finite() || self.world_width <= 0.0 || self.world_height <= 0.0 {
            return 0.0;
        }
        let last = (self.size - 1) as f32;
        let u = ((position.x / self.world_width + 0.5) * self.size as f32 - 0.5).clamp(0.0, last);
        let v = ((position.y / self.world_height + 0.5) * self.size as f32 - 0.5).clamp(0.0, last);

        let x0 = u.floor() as usize;
        let y0 = v.floor() as usize;
        let x1 = (x0 + 1).min(self.size - 1);
        let y1 = (y0 + 1).min(self.size - 1);
        let fx = u - x0 as f32;
        let fy = v - y0 as f32;

        let bottom = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
        let top = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
        (bottom * (1.0 - fy) + top * fy).clamp(0.0, 1.0)
    }

    /// Central-difference gradient on the x/y plane.
    pub fn gradient(&self, position: Vec3, h: f32) -> Vec2 {
        if !(h > 0.0) {
            return Vec2::ZERO;
        }
        let dx = Vec3::new(h, 0.0, 0.0);
        let dy = Vec3::new(0.0, h, 0.0);
        Vec2::new(
            (self.evaluate(position + dx) - self.evaluate(position - dx)) / (2.0 * h),
            (self.evaluate(position + dy) - self.evaluate(position - dy)) / (2.0 * h),
        )
    }

    /// World distance between two grid samples along x.
    pub fn cell_size(&self) -> f32 {
        self.world_width / self.size as f32
    }
}

fn fill_rows(size: usize, f: impl Fn(usize, usize) -> f32 + Sync) -> Vec<f32> {
    let mut data = vec![0.0; size * size];
    data.par_chunks_mut(size).enumerate().for_each(|(y, row)| {
        for (x, value) in row.iter_mut().enumerate() {
            *value = f(x, y);
        }
    });
    data
}

fn ring_pattern(size: usize) -> Vec<f32> {
    let s = size as f32;
    let center = s / 2.0;
    let radius = s * RING_RADIUS;
    let thickness = s * RING_THICKNESS;
    fill_rows(size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let dist = (dx * dx + dy * dy).sqrt();
        (-(dist - radius).powi(2) / (2.0 * thickness * thickness)).exp()
    })
}

fn box_pattern(size: usize) -> Vec<f32> {
    let s = size as f32;
    let margin = s * BOX_MARGIN;
    let band = s * BAND_WIDTH;
    fill_rows(size, |x, y| {
        let (x, y) = (x as f32, y as f32);
        if x > margin && x < s - margin && y > margin && y < s - margin {
            let edge = (x - margin).min(s - margin - x).min((y - margin).min(s - margin - y));
            if edge < band {
                return 1.0;
            }
        }
        0.0
    })
}

// The letters "HI" on a 10x10 block lattice
fn glyph_pattern(size: usize) -> Vec<f32> {
    let mut data = vec![0.0; size * size];
    let block = (size / 10).max(1);
    let thick = (block / 2).max(1);
    let mut rect = |x: usize, y: usize, w: usize, h: usize| {
        for iy in y..(y + h).min(size) {
            for ix in x..(x + w).min(size) {
                data[iy * size + ix] = 1.0;
            }
        }
    };
    rect(2 * block, 3 * block, thick, 4 * block);
    rect(4 * block, 3 * block, thick, 4 * block);
    rect(2 * block, 5 * block, 2 * block + thick, thick);
    rect(6 * block, 3 * block, thick, 4 * block);
    data
}

fn cross_pattern(size: usize) -> Vec<f32> {
    let band = (size as f32 * BAND_WIDTH) as i64;
    let s = size as i64;
    fill_rows(size, |x, y| {
        let (x, y) = (x as i64, y as i64);
        if (x - y).abs() < band || (x - (s - y)).abs() < band {
            1.0
        } else {
            0.0
        }
    })
}

#[cfg(feature = "goal-images")]
fn load_image(path: &str, size: usize) -> Result<Vec<f32>> {
    let img = image::open(path)
        .map_err(|e| LeniaError::ImageLoad {
            path: path.to_string(),
            message: e.to_string(),
        })?
        .to_rgb8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    if width == 0 || height == 0 {
        return Err(LeniaError::ImageLoad {
            path: path.to_string(),
            message: "image is empty".to_string(),
        });
    }

    // Nearest-neighbour resample, image rows run top to bottom
    Ok(fill_rows(size, |x, y| {
        let src_x = (x * width / size).min(width - 1);
        let src_y = ((size - 1 - y) * height / size).min(height - 1);
        let px = img.get_pixel(src_x as u32, src_y as u32);
        (px[0] as f32 + px[1] as f32 + px[2] as f32) / (3.0 * 255.0)
    }))
}

#[cfg(not(feature = "goal-images"))]
fn load_image(path: &str, _size: usize) -> Result<Vec<f32>> {
    Err(LeniaError::ImageLoad {
        path: path.to_string(),
        message: "built without the goal-images feature".to_string(),
    })
}
