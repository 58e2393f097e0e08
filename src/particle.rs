use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::{DNA_LEN, ENERGY_EPSILON};

// Gene order inside `Particle::dna`
pub const GENE_W_K: usize = 0;
pub const GENE_MU_K: usize = 1;
pub const GENE_SIGMA_K2: usize = 2;
pub const GENE_MU_G: usize = 3;
pub const GENE_SIGMA_G2: usize = 4;

/// One organism slot. Dead slots are kept as [`Particle::DEAD`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub energy: f32,
    pub species: u32,
    pub age: f32,
    pub dna: [f32; DNA_LEN],
    // Last evaluated potential, for renderers and sonification only
    pub potential: f32,
}

impl Default for Particle {
    fn default() -> Self {
        Self::DEAD
    }
}

impl Particle {
    pub const DEAD: Particle = Particle {
        position: Vec3::ZERO,
        velocity: Vec3::ZERO,
        energy: 0.0,
        species: 0,
        age: 0.0,
        dna: [0.0; DNA_LEN],
        potential: 0.0,
    };

    /// A freshly born particle at rest with full energy.
    pub fn newborn(position: Vec3, species: u32, dna: [f32; DNA_LEN]) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            energy: 1.0,
            species,
            age: 0.0,
            dna,
            potential: 0.0,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.energy > ENERGY_EPSILON
    }
}
