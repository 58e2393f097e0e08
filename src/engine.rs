//! The per-tick update: committed buffer in, next buffer out.
//!
//! A step runs in three phases:
//!
//! 1. Per-slot physics, metabolism, predation and evolution rolls, computed
//!    in parallel from the read buffer only.
//! 2. Food consumption and the life/death decision, serial in slot order,
//!    since the food grid is shared.
//! 3. Births, serial in parent order, each taking the next slot that was dead
//!    in the read buffer.

use glam::Vec3;
use rand::Rng;
use rand_pcg::Pcg32;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{SimulationConfig, DNA_LEN};
use crate::food::FoodGrid;
use crate::goal::GoalField;
use crate::kernel::{self, KernelParams, Space};
use crate::particle::Particle;
use crate::rng::{self, Domain};

// Offspring land within this distance of the parent on every axis
const BIRTH_JITTER: f32 = 0.5;

pub struct StepInput<'a> {
    pub read: &'a [Particle],
    pub write: &'a mut [Particle],
    pub food: Option<&'a mut FoodGrid>,
    pub goal: Option<&'a GoalField>,
    pub config: &'a SimulationConfig,
    pub seed: u64,
    pub tick: u64,
}

/// Counters from one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StepReport {
    pub alive: usize,
    pub births: usize,
    pub deaths: usize,
    pub births_dropped: usize,
    pub food_consumed: f32,
    pub predation_events: usize,
}

// Phase 1 result for one slot that was alive in the read buffer
struct Advanced {
    next: Particle,
    // Metabolism and predation, applied after food
    energy_delta: f32,
    gained: bool,
    killed: bool,
    offspring: Option<Particle>,
    hunts: usize,
}

pub fn step(input: StepInput<'_>) -> StepReport {
    let StepInput {
        read,
        write,
        food,
        goal,
        config,
        seed,
        tick,
    } = input;
    debug_assert_eq!(read.len(), write.len());

    let space = Space::from_config(config);
    let goal = goal.filter(|g| g.is_active());

    // Phase 1
    let advanced: Vec<Option<Advanced>> = read
        .par_iter()
        .enumerate()
        .map(|(i, particle)| {
            if !particle.is_alive() {
                return None;
            }
            let mut rng = rng::stream(seed, tick, i, Domain::Particle);
            Some(advance(i, read, config, &space, goal, &mut rng))
        })
        .collect();

    // Phase 2
    let mut report = StepReport::default();
    let mut food = food.filter(|_| config.food_enabled);
    let mut parents = Vec::new();

    for (i, outcome) in advanced.iter().enumerate() {
        let Some(outcome) = outcome else {
            write[i] = read[i];
            continue;
        };
        let mut next = outcome.next;

        if outcome.killed {
            write[i] = Particle::DEAD;
            report.deaths += 1;
            continue;
        }

        if let Some(grid) = food.as_deref_mut() {
            let consumed = grid.consume(next.position, config.food_consumption_radius);
            if consumed > 0.0 {
                report.food_consumed += consumed;
                next.energy = (next.energy + config.food_energy_gain * consumed).min(config.max_energy);
            }
        }

        next.energy += outcome.energy_delta;
        if outcome.gained {
            next.energy = next.energy.min(config.max_energy);
        }
        report.predation_events += outcome.hunts;

        if !next.is_alive() {
            write[i] = Particle::DEAD;
            report.deaths += 1;
            continue;
        }

        next.age += 1.0;
        write[i] = next;
        report.alive += 1;
        if outcome.offspring.is_some() {
            parents.push(i);
        }
    }

    // Phase 3
    let mut free_slots = read
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_alive())
        .map(|(slot, _)| slot);

    for parent in parents {
        let Some(child) = advanced[parent].as_ref().and_then(|a| a.offspring) else {
            continue;
        };
        match free_slots.next() {
            Some(slot) => {
                write[slot] = child;
                report.births += 1;
                report.alive += 1;
            }
            None => report.births_dropped += 1,
        }
    }

    if report.births_dropped > 0 {
        tracing::trace!(tick, dropped = report.births_dropped, "store full, births dropped");
    }
    report
}

fn advance(
    index: usize,
    read: &[Particle],
    config: &SimulationConfig,
    space: &Space,
    goal: Option<&GoalField>,
    rng: &mut Pcg32,
) -> Advanced {
    let current = read[index];
    let params = KernelParams::for_dna(config, &current.dna);

    let sample = kernel::evaluate(current.position, index, read, &params, space);
    let grad = kernel::energy_gradient(current.position, index, read, &params, space, config.h);

    let mut velocity = current.velocity + grad * config.dt;
    velocity *= 1.0 - config.damping;
    velocity = velocity.clamp_length_max(config.max_speed);
    if !velocity.is_finite() {
        velocity = Vec3::ZERO;
    }

    let mut position = current.position + velocity * config.dt;
    space.confine(&mut position, &mut velocity);

    if let Some(goal) = goal {
        let pull = goal.gradient(position, goal.cell_size());
        velocity.x += config.goal_strength * pull.x * config.dt;
        velocity.y += config.goal_strength * pull.y * config.dt;
    }

    let mut next = current;
    next.position = position;
    next.velocity = velocity;
    next.potential = sample.e;

    let mut energy_delta = 0.0;
    let mut gained = false;
    if config.evolution_enabled {
        energy_delta -= config.energy_decay;
        if sample.g > 0.0 {
            energy_delta += config.energy_from_growth * sample.g;
            gained = true;
        }
    }

    let mut hunts = 0;
    if config.predation_enabled {
        let (delta, events) = predation_balance(index, read, config, space);
        energy_delta += delta;
        gained |= events > 0;
        hunts = events;
    }

    let mut killed = false;
    let mut offspring = None;
    if config.evolution_enabled {
        killed = rng.gen::<f32>() < config.death_rate;
        if !killed && rng.gen::<f32>() < config.birth_rate {
            offspring = Some(offspring_of(&next, config, space, rng));
        }
    }

    Advanced {
        next,
        energy_delta,
        gained,
        killed,
        offspring,
        hunts,
    }
}

/// Which side of the pair `(a, b)` hunts the other, if any.
///
/// Every pair of different species resolves to exactly one predator.
/// Neighbours on the species cycle follow it (each hunts the next one, the
/// lower slot tested first so two species still transfer once). Any other
/// pair is won by the lower species.
pub fn predator_of(a: (usize, u32), b: (usize, u32), num_species: u32) -> Option<usize> {
    if num_species < 2 || a.1 == b.1 {
        return None;
    }
    let (lo, hi) = if a.0 < b.0 { (a, b) } else { (b, a) };
    let prey_of = |species: u32| (species + 1) % num_species;
    if prey_of(lo.1) == hi.1 {
        Some(lo.0)
    } else if prey_of(hi.1) == lo.1 {
        Some(hi.0)
    } else if lo.1 < hi.1 {
        Some(lo.0)
    } else {
        Some(hi.0)
    }
}

// Net energy change of `index` over all its pairs, from read energies only.
// Each side of a pair computes the same transfer, so no writes are shared.
fn predation_balance(index: usize, read: &[Particle], config: &SimulationConfig, space: &Space) -> (f32, usize) {
    let me = read[index];
    let radius_sq = config.predation_radius_sq();
    let mut delta = 0.0;
    let mut hunts = 0;

    for (j, other) in read.iter().enumerate() {
        if j == index || !other.is_alive() {
            continue;
        }
        if space.delta(me.position, other.position).length_squared() > radius_sq {
            continue;
        }
        match predator_of((index, me.species), (j, other.species), config.num_species) {
            Some(p) if p == index => {
                delta += config.predation_rate * other.energy - config.aggression_cost;
                hunts += 1;
            }
            Some(_) => delta -= config.predation_rate * me.energy,
            None => {}
        }
    }
    (delta, hunts)
}

fn offspring_of(parent: &Particle, config: &SimulationConfig, space: &Space, rng: &mut Pcg32) -> Particle {
    let rate = if config.mutation_rate > 0.0 {
        config.mutation_rate.min(1.0)
    } else {
        0.0
    };
    let mut dna = [0.0; DNA_LEN];
    for (gene, inherited) in dna.iter_mut().zip(parent.dna) {
        *gene = if rate > 0.0 {
            inherited + rng.gen_range(-rate..rate)
        } else {
            inherited
        };
    }
    let jitter = Vec3::new(
        rng.gen_range(-BIRTH_JITTER..BIRTH_JITTER),
        rng.gen_range(-BIRTH_JITTER..BIRTH_JITTER),
        rng.gen_range(-BIRTH_JITTER..BIRTH_JITTER),
    );
    let mut position = parent.position + jitter;
    let mut velocity = Vec3::ZERO;
    space.confine(&mut position, &mut velocity);
    let mut child = Particle::newborn(position, parent.species, dna);
    child.energy = child.energy.min(config.max_energy);
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ParticleStore;

    fn still_world() -> SimulationConfig {
        SimulationConfig {
            food_enabled: false,
            evolution_enabled: false,
            predation_enabled: false,
            ..SimulationConfig::default()
        }
    }

    fn run(store: &mut ParticleStore, config: &SimulationConfig, tick: u64) -> StepReport {
        let (read, write) = store.split_for_step();
        let report = step(StepInput {
            read,
            write,
            food: None,
            goal: None,
            config,
            seed: config.seed,
            tick,
        });
        store.swap();
        report
    }

    #[test]
    fn dead_slots_are_copied_through() {
        let config = still_world();
        let mut store = ParticleStore::new(4);
        store
            .write_both(1, Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]))
            .unwrap();
        let report = run(&mut store, &config, 0);
        assert_eq!(report.alive, 1);
        assert_eq!(store.active_slice()[0], Particle::DEAD);
        assert_eq!(store.active_slice()[1].age, 1.0);
    }

    #[test]
    fn lone_particle_keeps_energy_without_evolution() {
        let config = still_world();
        let mut store = ParticleStore::new(2);
        store
            .write_both(0, Particle::newborn(Vec3::ONE, 0, [0.0; DNA_LEN]))
            .unwrap();
        for tick in 0..20 {
            run(&mut store, &config, tick);
        }
        let p = store.active_slice()[0];
        assert_eq!(p.energy, 1.0);
        assert_eq!(p.age, 20.0);
        // With no neighbours there is no gradient to follow
        assert_eq!(p.velocity, Vec3::ZERO);
        assert_eq!(p.position, Vec3::ONE);
    }

    #[test]
    fn predator_choice_follows_the_cycle() {
        assert_eq!(predator_of((0, 0), (1, 1), 3), Some(0));
        assert_eq!(predator_of((1, 1), (0, 0), 3), Some(0));
        assert_eq!(predator_of((0, 2), (1, 0), 3), Some(0));
        assert_eq!(predator_of((0, 1), (1, 1), 3), None);
        // Off the cycle the lower species hunts
        assert_eq!(predator_of((0, 0), (1, 2), 4), Some(0));
        assert_eq!(predator_of((5, 3), (2, 1), 4), Some(2));
        assert_eq!(predator_of((0, 1), (1, 2), 4), Some(0));
        // Two species hunt each other; the lower slot wins the tie
        assert_eq!(predator_of((4, 1), (7, 0), 2), Some(4));
        assert_eq!(predator_of((0, 0), (1, 0), 1), None);
    }

    #[test]
    fn predation_transfers_once_per_pair() {
        let config = SimulationConfig {
            predation_enabled: true,
            predation_rate: 0.1,
            aggression_cost: 0.01,
            ..still_world()
        };
        let mut store = ParticleStore::new(3);
        let mut hunter = Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]);
        hunter.energy = 0.5;
        let prey = Particle::newborn(Vec3::new(0.5, 0.0, 0.0), 1, [0.0; DNA_LEN]);
        store.write_both(0, hunter).unwrap();
        store.write_both(1, prey).unwrap();

        let report = run(&mut store, &config, 0);
        assert_eq!(report.predation_events, 1);
        let after = store.active_slice();
        assert!((after[0].energy - (0.5 + 0.1 - 0.01)).abs() < 1e-6);
        assert!((after[1].energy - 0.9).abs() < 1e-6);
    }

    #[test]
    fn predation_ignores_pairs_out_of_range() {
        let config = SimulationConfig {
            predation_enabled: true,
            ..still_world()
        };
        let mut store = ParticleStore::new(2);
        store
            .write_both(0, Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]))
            .unwrap();
        store
            .write_both(1, Particle::newborn(Vec3::new(10.0, 0.0, 0.0), 1, [0.0; DNA_LEN]))
            .unwrap();
        let report = run(&mut store, &config, 0);
        assert_eq!(report.predation_events, 0);
        assert!(store.active_slice().iter().all(|p| p.energy == 1.0));
    }

    #[test]
    fn births_claim_distinct_slots_and_overflow_is_dropped() {
        let config = SimulationConfig {
            evolution_enabled: true,
            birth_rate: 1.0,
            death_rate: 0.0,
            energy_from_growth: 0.0,
            ..still_world()
        };
        let mut store = ParticleStore::new(5);
        for slot in 0..3 {
            let pos = Vec3::new(slot as f32 * 10.0 - 10.0, 0.0, 0.0);
            store
                .write_both(slot, Particle::newborn(pos, 0, [0.0; DNA_LEN]))
                .unwrap();
        }

        let report = run(&mut store, &config, 0);
        assert_eq!(report.births, 2);
        assert_eq!(report.births_dropped, 1);
        assert_eq!(report.alive, 5);
        let after = store.active_slice();
        assert!(after.iter().all(|p| p.is_alive()));
        // Children go to the lowest free slots in parent order
        assert_eq!(after[3].age, 0.0);
        assert_eq!(after[4].age, 0.0);
        assert!((after[3].position - after[0].position).abs().max_element() <= 0.5 + 1e-5);
        assert!((after[4].position - after[1].position).abs().max_element() <= 0.5 + 1e-5);
    }

    #[test]
    fn certain_death_empties_the_store() {
        let config = SimulationConfig {
            evolution_enabled: true,
            death_rate: 1.0,
            birth_rate: 1.0,
            ..still_world()
        };
        let mut store = ParticleStore::new(3);
        for slot in 0..3 {
            store
                .write_both(slot, Particle::newborn(Vec3::splat(slot as f32 * 5.0), 0, [0.0; DNA_LEN]))
                .unwrap();
        }
        let report = run(&mut store, &config, 0);
        assert_eq!(report.deaths, 3);
        assert_eq!(report.births, 0);
        assert_eq!(store.count_alive(), 0);
    }

    #[test]
    fn starvation_kills_once_energy_runs_out() {
        let config = SimulationConfig {
            evolution_enabled: true,
            birth_rate: 0.0,
            energy_decay: 0.5,
            ..still_world()
        };
        let mut store = ParticleStore::new(1);
        store
            .write_both(0, Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]))
            .unwrap();
        assert_eq!(run(&mut store, &config, 0).deaths, 0);
        assert_eq!(run(&mut store, &config, 1).deaths, 1);
        assert_eq!(store.active_slice()[0], Particle::DEAD);
    }

    #[test]
    fn food_feeds_in_slot_order() {
        let config = SimulationConfig {
            food_enabled: true,
            food_energy_gain: 0.5,
            food_consumption_radius: 0.0,
            max_energy: 2.0,
            ..still_world()
        };
        let mut grid = FoodGrid::new(4, config.world_width, config.world_height);
        grid.update(1.0, 0.0, 1.0, 0, 0);
        let available = grid.sample(Vec3::ZERO);
        assert!(available > 0.0);

        let mut store = ParticleStore::new(2);
        // Both far from each other in z but on the same food cell
        store
            .write_both(0, Particle::newborn(Vec3::new(0.0, 0.0, -15.0), 0, [0.0; DNA_LEN]))
            .unwrap();
        store
            .write_both(1, Particle::newborn(Vec3::new(0.0, 0.0, 15.0), 0, [0.0; DNA_LEN]))
            .unwrap();

        let (read, write) = store.split_for_step();
        let report = step(StepInput {
            read,
            write,
            food: Some(&mut grid),
            goal: None,
            config: &config,
            seed: 1,
            tick: 0,
        });
        store.swap();

        assert!((report.food_consumed - available).abs() < 1e-6);
        let after = store.active_slice();
        assert!((after[0].energy - (1.0 + 0.5 * available)).abs() < 1e-5);
        assert_eq!(after[1].energy, 1.0);
    }

    #[test]
    fn predation_reaches_species_off_the_cycle() {
        let config = SimulationConfig {
            predation_enabled: true,
            predation_rate: 0.1,
            aggression_cost: 0.0,
            num_species: 4,
            ..still_world()
        };
        let mut store = ParticleStore::new(2);
        let mut hunter = Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]);
        hunter.energy = 0.5;
        store.write_both(0, hunter).unwrap();
        store
            .write_both(1, Particle::newborn(Vec3::new(0.5, 0.0, 0.0), 2, [0.0; DNA_LEN]))
            .unwrap();

        let report = run(&mut store, &config, 0);
        assert_eq!(report.predation_events, 1);
        let after = store.active_slice();
        assert!((after[0].energy - 0.6).abs() < 1e-6);
        assert!((after[1].energy - 0.9).abs() < 1e-6);
    }

    #[test]
    fn killed_particles_leave_food_behind() {
        let config = SimulationConfig {
            food_enabled: true,
            food_consumption_radius: 0.0,
            evolution_enabled: true,
            death_rate: 1.0,
            ..still_world()
        };
        let mut grid = FoodGrid::new(4, config.world_width, config.world_height);
        grid.update(1.0, 0.0, 1.0, 0, 0);
        let available = grid.sample(Vec3::ZERO);
        assert!(available > 0.0);

        let mut store = ParticleStore::new(1);
        store
            .write_both(0, Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]))
            .unwrap();
        let (read, write) = store.split_for_step();
        let report = step(StepInput {
            read,
            write,
            food: Some(&mut grid),
            goal: None,
            config: &config,
            seed: 1,
            tick: 0,
        });

        assert_eq!(report.deaths, 1);
        assert_eq!(report.food_consumed, 0.0);
        assert_eq!(grid.sample(Vec3::ZERO), available);
    }

    #[test]
    fn newborn_energy_respects_max_energy() {
        let config = SimulationConfig {
            evolution_enabled: true,
            birth_rate: 1.0,
            death_rate: 0.0,
            energy_from_growth: 0.0,
            max_energy: 0.5,
            ..still_world()
        };
        let mut store = ParticleStore::new(2);
        let mut parent = Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]);
        parent.energy = 0.5;
        store.write_both(0, parent).unwrap();

        let report = run(&mut store, &config, 0);
        assert_eq!(report.births, 1);
        assert_eq!(store.active_slice()[1].energy, 0.5);
    }

    #[test]
    fn huge_mutation_rate_still_steps() {
        let config = SimulationConfig {
            evolution_enabled: true,
            birth_rate: 1.0,
            death_rate: 0.0,
            mutation_rate: f32::MAX,
            ..still_world()
        };
        let mut store = ParticleStore::new(4);
        store
            .write_both(0, Particle::newborn(Vec3::ZERO, 0, [0.0; DNA_LEN]))
            .unwrap();
        let report = run(&mut store, &config, 0);
        assert_eq!(report.births, 1);
        let child = store.active_slice()[1];
        assert!(child.dna.iter().all(|g| g.abs() <= 1.0));
    }
}
