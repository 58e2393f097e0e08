// Direct edits applied between steps, identically to both buffers

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::config::{DNA_LEN, MAX_WORLD_EXTENT};
use crate::particle::Particle;
use crate::store::ParticleStore;

// Spread of the DNA drawn for hand-placed particles
const SPAWN_DNA_RANGE: f32 = 0.2;
const ORBIUM_SIZE: usize = 40;
const ORBIUM_SPREAD: f32 = 3.0;
const PAINT_ATTEMPTS: usize = 5;
// Particles this close to the force origin have no defined direction
const FORCE_DEAD_ZONE: f32 = 0.001;

pub fn random_dna<R: Rng + ?Sized>(rng: &mut R) -> [f32; DNA_LEN] {
    let mut dna = [0.0; DNA_LEN];
    for gene in &mut dna {
        *gene = rng.gen_range(-SPAWN_DNA_RANGE..SPAWN_DNA_RANGE);
    }
    dna
}

/// Place a new particle in the first dead slot. `None` when the store is full.
pub fn add_particle<R: Rng + ?Sized>(
    store: &mut ParticleStore,
    rng: &mut R,
    position: Vec3,
    num_species: u32,
) -> Option<usize> {
    let slot = store.active_slice().iter().position(|p| !p.is_alive())?;
    let species = rng.gen_range(0..num_species.max(1));
    let particle = Particle::newborn(position, species, random_dna(rng));
    let (a, b) = store.pair_mut(slot)?;
    *a = particle;
    *b = particle;
    Some(slot)
}

/// Radial impulse around `origin`, falling off linearly to zero at `radius`.
/// Negative strength pulls inwards. Returns how many particles were pushed.
pub fn apply_force(store: &mut ParticleStore, origin: Vec3, strength: f32, radius: f32) -> usize {
    if !(radius > 0.0) {
        return 0;
    }
    let mut affected = 0;
    for slot in 0..store.capacity() {
        let Some((a, b)) = store.pair_mut(slot) else {
            break;
        };
        if !a.is_alive() {
            continue;
        }
        let offset = a.position - origin;
        let dist = offset.length();
        if dist >= radius || dist < FORCE_DEAD_ZONE {
            continue;
        }
        let impulse = offset / dist * strength * (1.0 - dist / radius);
        a.velocity += impulse;
        b.velocity = a.velocity;
        affected += 1;
    }
    affected
}

/// Drop a dense cluster of particles around `center`.
pub fn spawn_orbium<R: Rng + ?Sized>(
    store: &mut ParticleStore,
    rng: &mut R,
    center: Vec3,
    num_species: u32,
) -> usize {
    let mut placed = 0;
    for _ in 0..ORBIUM_SIZE {
        let offset = Vec3::new(
            rng.gen_range(-ORBIUM_SPREAD..ORBIUM_SPREAD),
            rng.gen_range(-ORBIUM_SPREAD..ORBIUM_SPREAD),
            rng.gen_range(-ORBIUM_SPREAD..ORBIUM_SPREAD),
        );
        if add_particle(store, rng, center + offset, num_species).is_some() {
            placed += 1;
        }
    }
    placed
}

/// Brush stroke: a few particles scattered inside a disc on the x/y plane.
pub fn paint<R: Rng + ?Sized>(
    store: &mut ParticleStore,
    rng: &mut R,
    center: Vec3,
    brush_radius: f32,
    num_species: u32,
) -> usize {
    if !(brush_radius > 0.0) {
        return 0;
    }
    let r = brush_radius.min(MAX_WORLD_EXTENT);
    let mut placed = 0;
    for _ in 0..PAINT_ATTEMPTS {
        let offset = Vec2::new(rng.gen_range(-r..r), rng.gen_range(-r..r));
        if offset.length() > r {
            continue;
        }
        let z = rng.gen_range(-r..r) * 0.1;
        let position = center + Vec3::new(offset.x, offset.y, z);
        if add_particle(store, rng, position, num_species).is_some() {
            placed += 1;
        }
    }
    placed
}
