//! Rule-matrix particle life in a 3-D box.
//!
//! Every colour feels every other colour through one entry of a rule matrix:
//! positive entries attract, negative entries repel. All colours share a
//! short-range repulsion so particles never collapse onto each other.

use glam::Vec3;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::kernel::Space;

pub const NUM_COLORS: usize = 6;
pub const DEFAULT_PARTICLE_COUNT: usize = 8000;

// Longest frame the integrator accepts
const MAX_DT: f32 = 0.033;
// Force curve shape, in units of the interaction radius
const MIN_DIST: f32 = 0.02;
const BETA: f32 = 0.3;
// Integration runs in 60 Hz frames
const FRAME_RATE: f32 = 60.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LifeParticle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub color: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeParams {
    pub friction: f32,
    pub max_speed: f32,
    pub interaction_radius: f32,
    pub force_strength: f32,
    pub world_size: f32,
    pub wrap_edges: bool,
}

impl Default for LifeParams {
    fn default() -> Self {
        Self {
            friction: 0.1,
            max_speed: 2.0,
            interaction_radius: 0.3,
            force_strength: 0.5,
            world_size: 3.0,
            wrap_edges: true,
        }
    }
}

/// Force at `distance` (normalised by the interaction radius).
pub fn attraction_force(distance: f32, attraction: f32) -> f32 {
    if distance < MIN_DIST {
        0.0
    } else if distance < BETA {
        distance / BETA - 1.0
    } else if distance < 1.0 {
        attraction * (1.0 - (2.0 * distance - 1.0 - BETA).abs() / (1.0 - BETA))
    } else {
        0.0
    }
}

pub struct ParticleLife {
    pub params: LifeParams,
    particles: Vec<LifeParticle>,
    // rules[a][b]: how colour a feels about colour b
    rules: [[f32; NUM_COLORS]; NUM_COLORS],
}

impl ParticleLife {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, params: LifeParams) -> Self {
        let mut life = Self {
            params,
            particles: Vec::new(),
            rules: [[0.0; NUM_COLORS]; NUM_COLORS],
        };
        life.randomize_rules(rng);
        life
    }

    pub fn particles(&self) -> &[LifeParticle] {
        &self.particles
    }

    pub fn rule(&self, a: usize, b: usize) -> f32 {
        self.rules[a][b]
    }

    pub fn set_rule(&mut self, a: usize, b: usize, value: f32) {
        if a < NUM_COLORS && b < NUM_COLORS {
            self.rules[a][b] = value.clamp(-1.0, 1.0);
        }
    }

    fn space(&self) -> Space {
        Space::new(Vec3::splat(self.params.world_size), self.params.wrap_edges)
    }

    /// Scatter `count` particles at rest through the box.
    pub fn init<R: Rng + ?Sized>(&mut self, rng: &mut R, count: usize) {
        let half = self.params.world_size * 0.5;
        self.particles = (0..count)
            .map(|_| LifeParticle {
                position: Vec3::new(
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                ),
                velocity: Vec3::ZERO,
                color: rng.gen_range(0..NUM_COLORS),
            })
            .collect();
        tracing::debug!(count, "particle life initialised");
    }

    pub fn randomize_rules<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for row in &mut self.rules {
            for rule in row.iter_mut() {
                *rule = rng.gen_range(-1.0..1.0);
            }
        }
    }

    pub fn update(&mut self, dt: f32) {
        let dt = dt.clamp(0.0, MAX_DT);
        let space = self.space();
        let radius = self.params.interaction_radius;
        if radius > 0.0 {
            let forces = self.forces(&space, radius);
            let scale = self.params.force_strength * dt * FRAME_RATE;
            for (p, force) in self.particles.iter_mut().zip(forces) {
                p.velocity += force * scale;
            }
        }
        self.integrate(&space, dt);
    }

    // Forces from a snapshot of the current positions
    fn forces(&self, space: &Space, radius: f32) -> Vec<Vec3> {
        let radius_sq = radius * radius;
        let particles = &self.particles;
        particles
            .par_iter()
            .enumerate()
            .map(|(i, me)| {
                let mut total = Vec3::ZERO;
                for (j, other) in particles.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let diff = space.delta(me.position, other.position);
                    let dist_sq = diff.length_squared();
                    if dist_sq > radius_sq || dist_sq < 1e-4 {
                        continue;
                    }
                    let dist = dist_sq.sqrt();
                    let force = attraction_force(dist / radius, self.rules[me.color][other.color]);
                    total += diff / dist * force;
                }
                total
            })
            .collect()
    }

    fn integrate(&mut self, space: &Space, dt: f32) {
        let keep = 1.0 - self.params.friction;
        let max_speed = self.params.max_speed;
        for p in &mut self.particles {
            p.velocity = (p.velocity * keep).clamp_length_max(max_speed);
            p.position += p.velocity * dt * FRAME_RATE;
            space.confine(&mut p.position, &mut p.velocity);
        }
    }
}
