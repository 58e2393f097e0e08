//! Particle-Lenia field math.
//!
//! Every particle senses its neighbours through a shell-shaped kernel (`U`),
//! maps that density through a bell-shaped growth function (`G`) and feels a
//! short-range repulsion (`R`). The particle climbs `E = G - R`.

use glam::Vec3;

use crate::config::{SimulationConfig, DNA_LEN};
use crate::particle::{Particle, GENE_MU_G, GENE_MU_K, GENE_SIGMA_G2, GENE_SIGMA_K2, GENE_W_K};

/// Geometry of the world box, centred on the origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Space {
    extent: Vec3,
    wrap: bool,
}

impl Space {
    pub fn new(extent: Vec3, wrap: bool) -> Self {
        Self { extent, wrap }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.world_extent(), config.wrap_edges)
    }

    /// Displacement from `from` to `to`, minimum-image when wrapping.
    #[inline]
    pub fn delta(&self, from: Vec3, to: Vec3) -> Vec3 {
        let d = to - from;
        if self.wrap {
            d - self.extent * (d / self.extent).round()
        } else {
            d
        }
    }

    #[inline]
    pub fn distance(&self, a: Vec3, b: Vec3) -> f32 {
        self.delta(a, b).length()
    }

    /// Fold a position back into `[-extent/2, extent/2)` on every axis.
    pub fn wrap_position(&self, p: Vec3) -> Vec3 {
        let half = self.extent * 0.5;
        let mut out = (p + half).rem_euclid(self.extent) - half;
        // rem_euclid can round up to the extent itself for tiny negatives
        for axis in 0..3 {
            if out[axis] >= half[axis] {
                out[axis] = -half[axis];
            }
        }
        out
    }

    /// Keep a particle inside the box: wrap, or clamp and bounce.
    pub fn confine(&self, position: &mut Vec3, velocity: &mut Vec3) {
        if self.wrap {
            *position = self.wrap_position(*position);
            return;
        }
        let half = self.extent * 0.5;
        for axis in 0..3 {
            if position[axis] < -half[axis] {
                position[axis] = -half[axis];
                velocity[axis] *= -0.5;
            } else if position[axis] > half[axis] {
                position[axis] = half[axis];
                velocity[axis] *= -0.5;
            }
        }
    }
}

/// Field constants for one particle, after its DNA is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelParams {
    pub w_k: f32,
    pub mu_k: f32,
    pub sigma_k2: f32,
    pub mu_g: f32,
    pub sigma_g2: f32,
    pub c_rep: f32,
}

impl KernelParams {
    /// Global constants scaled gene by gene: `p * (1 + dna[k])`.
    pub fn for_dna(config: &SimulationConfig, dna: &[f32; DNA_LEN]) -> Self {
        Self {
            w_k: config.w_k * (1.0 + dna[GENE_W_K]),
            mu_k: config.mu_k * (1.0 + dna[GENE_MU_K]),
            sigma_k2: config.sigma_k2 * (1.0 + dna[GENE_SIGMA_K2]),
            mu_g: config.mu_g * (1.0 + dna[GENE_MU_G]),
            sigma_g2: config.sigma_g2 * (1.0 + dna[GENE_SIGMA_G2]),
            c_rep: config.c_rep,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FieldSample {
    pub u: f32,
    pub r: f32,
    pub g: f32,
    pub e: f32,
}

#[inline]
fn finite_or_zero(x: f32) -> f32 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Unnormalised Gaussian bump; zero for a non-positive variance.
#[inline]
pub fn bell(x: f32, mu: f32, sigma2: f32) -> f32 {
    if !(sigma2 > 0.0) {
        return 0.0;
    }
    let d = x - mu;
    finite_or_zero((-(d * d) / (2.0 * sigma2)).exp())
}

/// Growth mapping into [-1, 1]; zero for a non-positive variance.
#[inline]
pub fn growth(u: f32, mu_g: f32, sigma_g2: f32) -> f32 {
    if !(sigma_g2 > 0.0) {
        return 0.0;
    }
    2.0 * bell(u, mu_g, sigma_g2) - 1.0
}

/// Evaluate the fields at `at` against every alive particle except `skip`.
pub fn evaluate(at: Vec3, skip: usize, read: &[Particle], params: &KernelParams, space: &Space) -> FieldSample {
    let mut u = 0.0;
    let mut r = 0.0;
    for (j, other) in read.iter().enumerate() {
        if j == skip || !other.is_alive() {
            continue;
        }
        let dist = space.distance(at, other.position);
        if !dist.is_finite() {
            continue;
        }
        u += params.w_k * bell(dist, params.mu_k, params.sigma_k2);
        let overlap = (1.0 - dist).max(0.0);
        r += overlap * overlap;
    }
    let u = finite_or_zero(u);
    let r = finite_or_zero(params.c_rep * 0.5 * r);
    let g = finite_or_zero(growth(u, params.mu_g, params.sigma_g2));
    FieldSample {
        u,
        r,
        g,
        e: finite_or_zero(g - r),
    }
}

/// Central-difference gradient of `E` with step `h` on all three axes.
pub fn energy_gradient(
    at: Vec3,
    skip: usize,
    read: &[Particle],
    params: &KernelParams,
    space: &Space,
    h: f32,
) -> Vec3 {
    if !(h > 0.0) {
        return Vec3::ZERO;
    }
    let mut grad = Vec3::ZERO;
    for axis in 0..3 {
        let mut offset = Vec3::ZERO;
        offset[axis] = h;
        let ahead = evaluate(at + offset, skip, read, params, space).e;
        let behind = evaluate(at - offset, skip, read, params, space).e;
        grad[axis] = finite_or_zero((ahead - behind) / (2.0 * h));
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alive_at(position: Vec3) -> Particle {
        Particle::newborn(position, 0, [0.0; DNA_LEN])
    }

    #[test]
    fn coincident_particles_sum_the_kernel_peak() {
        let config = SimulationConfig {
            mu_k: 0.0,
            ..SimulationConfig::default()
        };
        let read = vec![alive_at(Vec3::ZERO); 10];
        let params = KernelParams::for_dna(&config, &[0.0; DNA_LEN]);
        let space = Space::from_config(&config);

        let sample = evaluate(Vec3::ZERO, 0, &read, &params, &space);
        assert!((sample.u - 9.0 * config.w_k).abs() < 1e-6);
        assert!((sample.r - 0.5 * config.c_rep * 9.0).abs() < 1e-5);
        assert!(sample.e.is_finite() && sample.g.is_finite());

        let grad = energy_gradient(Vec3::ZERO, 0, &read, &params, &space, config.h);
        assert!(grad.is_finite());
    }

    #[test]
    fn dead_neighbours_are_invisible() {
        let config = SimulationConfig::default();
        let mut read = vec![alive_at(Vec3::ZERO), alive_at(Vec3::new(0.5, 0.0, 0.0))];
        read[1].energy = 0.0;
        let params = KernelParams::for_dna(&config, &[0.0; DNA_LEN]);
        let sample = evaluate(Vec3::ZERO, 0, &read, &params, &Space::from_config(&config));
        assert_eq!(sample.u, 0.0);
        assert_eq!(sample.r, 0.0);
    }

    #[test]
    fn degenerate_variances_contribute_nothing() {
        let config = SimulationConfig {
            sigma_k2: 0.0,
            sigma_g2: -1.0,
            ..SimulationConfig::default()
        };
        let read = vec![alive_at(Vec3::ZERO), alive_at(Vec3::new(4.0, 0.0, 0.0))];
        let params = KernelParams::for_dna(&config, &[0.0; DNA_LEN]);
        let sample = evaluate(Vec3::ZERO, 0, &read, &params, &Space::from_config(&config));
        assert_eq!(sample.u, 0.0);
        assert_eq!(sample.g, 0.0);
        assert!(sample.e.is_finite());
    }

    #[test]
    fn dna_scales_constants_relatively() {
        let config = SimulationConfig::default();
        let params = KernelParams::for_dna(&config, &[0.5, -0.5, 0.0, 0.1, 0.0]);
        assert!((params.w_k - config.w_k * 1.5).abs() < 1e-7);
        assert!((params.mu_k - config.mu_k * 0.5).abs() < 1e-6);
        assert_eq!(params.sigma_k2, config.sigma_k2);
        assert!((params.mu_g - config.mu_g * 1.1).abs() < 1e-6);
        assert_eq!(params.c_rep, config.c_rep);
    }

    #[test]
    fn minimum_image_crosses_the_seam() {
        let space = Space::new(Vec3::splat(10.0), true);
        let d = space.delta(Vec3::new(4.5, 0.0, 0.0), Vec3::new(-4.5, 0.0, 0.0));
        assert!((d.x - 1.0).abs() < 1e-5);

        let closed = Space::new(Vec3::splat(10.0), false);
        let d = closed.delta(Vec3::new(4.5, 0.0, 0.0), Vec3::new(-4.5, 0.0, 0.0));
        assert!((d.x + 9.0).abs() < 1e-5);
    }

    #[test]
    fn positions_fold_into_the_box() {
        let space = Space::new(Vec3::splat(10.0), true);
        let p = space.wrap_position(Vec3::new(5.5, -5.5, 12.0));
        assert!((p - Vec3::new(-4.5, 4.5, 2.0)).length() < 1e-5);
        let edge = space.wrap_position(Vec3::new(5.0, -5.0, 0.0));
        assert_eq!(edge.x, -5.0);
        assert_eq!(edge.y, -5.0);
    }

    #[test]
    fn closed_box_bounces() {
        let space = Space::new(Vec3::splat(10.0), false);
        let mut p = Vec3::new(6.0, 0.0, -7.0);
        let mut v = Vec3::new(2.0, 1.0, -4.0);
        space.confine(&mut p, &mut v);
        assert_eq!(p, Vec3::new(5.0, 0.0, -5.0));
        assert_eq!(v, Vec3::new(-1.0, 1.0, 2.0));
    }

    #[test]
    fn growth_peaks_at_mu_g() {
        assert_eq!(growth(0.6, 0.6, 0.0225), 1.0);
        assert!(growth(5.0, 0.6, 0.0225) < -0.99);
    }
}
