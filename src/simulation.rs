use glam::Vec3;
use rand::Rng;
use std::path::Path;

use crate::config::{GoalMode, SimulationConfig};
use crate::engine::{self, StepInput, StepReport};
use crate::error::Result;
use crate::food::FoodGrid;
use crate::goal::GoalField;
use crate::mutators;
use crate::particle::Particle;
use crate::scene;
use crate::sonify::{self, Voice};
use crate::stats::{PopulationHistory, Stats};
use crate::store::ParticleStore;

// Simulation state - everything a step reads or writes
pub struct SimulationState {
    pub store: ParticleStore,
    pub food: FoodGrid,
    pub goal: GoalField,
    pub tick: u64,
    // Slots with energy above the death threshold, kept exact after every
    // step and every direct edit
    pub alive_count: usize,
    pub stats: Stats,
    pub history: PopulationHistory,
    pub last_report: StepReport,
}

impl SimulationState {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            store: ParticleStore::new(config.max_particles),
            food: FoodGrid::new(config.food_grid_size, config.world_width, config.world_height),
            goal: GoalField::new(
                config.goal_mode,
                &config.goal_image_path,
                config.goal_grid_size,
                config.world_width,
                config.world_height,
            ),
            tick: 0,
            alive_count: 0,
            stats: Stats::default(),
            history: PopulationHistory::default(),
            last_report: StepReport::default(),
        }
    }
}

// Simulation - contains state, config, and control flags
pub struct Simulation {
    pub state: SimulationState,
    pub config: SimulationConfig,
    pub paused: bool,
}

// Implement Deref for convenience - allows sim.store instead of sim.state.store
impl std::ops::Deref for Simulation {
    type Target = SimulationState;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl std::ops::DerefMut for Simulation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Simulation {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::with_config(rng, SimulationConfig::default())
    }

    pub fn with_config<R: Rng + ?Sized>(rng: &mut R, config: SimulationConfig) -> Self {
        let config = config.sanitized();
        let mut sim = Self {
            state: SimulationState::new(&config),
            config,
            paused: false,
        };
        sim.reset(rng);
        sim
    }

    /// Fresh random population and food; geometry and goal are kept.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let config = &self.config;
        let half = config.world_extent() * 0.5;
        let population: Vec<Particle> = (0..config.num_particles)
            .map(|_| {
                let position = Vec3::new(
                    rng.gen_range(-half.x..half.x),
                    rng.gen_range(-half.y..half.y),
                    rng.gen_range(-half.z..half.z),
                );
                let species = rng.gen_range(0..config.num_species);
                Particle::newborn(position, species, mutators::random_dna(rng))
            })
            .collect();

        self.state.store.load(&population);
        self.state.food.clear();
        if self.config.food_enabled {
            let food_seed = rng.gen::<u64>();
            self.state.food.seed_initial(food_seed);
        }
        self.state.tick = 0;
        self.state.history.clear();
        self.state.last_report = StepReport::default();
        self.refresh_stats();
        tracing::info!(
            particles = self.state.alive_count,
            capacity = self.state.store.capacity(),
            "simulation reset"
        );
    }

    /// Swap in a new configuration and rebuild everything from it.
    pub fn reconfigure<R: Rng + ?Sized>(&mut self, rng: &mut R, config: SimulationConfig) {
        self.config = config.sanitized();
        self.state = SimulationState::new(&self.config);
        self.reset(rng);
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Advance one tick: food, engine, swap, then periodic stats.
    pub fn step(&mut self) -> StepReport {
        let config = &self.config;
        let state = &mut self.state;

        if config.food_enabled {
            state.food.update(
                config.food_spawn_rate,
                config.food_decay_rate,
                config.food_max_amount,
                config.seed,
                state.tick,
            );
        }

        let goal = state.goal.is_active().then_some(&state.goal);
        let food = config.food_enabled.then_some(&mut state.food);
        let (read, write) = state.store.split_for_step();
        let report = engine::step(StepInput {
            read,
            write,
            food,
            goal,
            config,
            seed: config.seed,
            tick: state.tick,
        });
        state.store.swap();

        state.tick += 1;
        state.alive_count = report.alive;
        state.last_report = report;
        if state.tick % config.stats_interval == 0 {
            self.refresh_stats();
        }
        report
    }

    pub fn step_n(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn refresh_stats(&mut self) {
        let stats = Stats::scan(self.state.store.active_slice());
        self.state.alive_count = stats.alive_count;
        self.state.stats = stats;
        let tick = self.state.tick;
        self.state.history.push(tick, &stats);
        tracing::debug!(
            tick,
            alive = stats.alive_count,
            avg_energy = stats.avg_energy,
            "population stats"
        );
    }

    /// The committed buffer, for renderers.
    pub fn particles(&self) -> &[Particle] {
        self.state.store.active_slice()
    }

    pub fn food(&self) -> &FoodGrid {
        &self.state.food
    }

    pub fn goal(&self) -> &GoalField {
        &self.state.goal
    }

    pub fn add_particle<R: Rng + ?Sized>(&mut self, rng: &mut R, position: Vec3) -> Option<usize> {
        let slot = mutators::add_particle(&mut self.state.store, rng, position, self.config.num_species)?;
        self.state.alive_count += 1;
        Some(slot)
    }

    pub fn apply_force(&mut self, origin: Vec3, strength: f32, radius: f32) -> usize {
        mutators::apply_force(&mut self.state.store, origin, strength, radius)
    }

    pub fn spawn_orbium<R: Rng + ?Sized>(&mut self, rng: &mut R, center: Vec3) -> usize {
        let placed = mutators::spawn_orbium(&mut self.state.store, rng, center, self.config.num_species);
        self.state.alive_count += placed;
        placed
    }

    pub fn paint<R: Rng + ?Sized>(&mut self, rng: &mut R, center: Vec3) -> usize {
        let placed = mutators::paint(
            &mut self.state.store,
            rng,
            center,
            self.config.brush_radius,
            self.config.num_species,
        );
        self.state.alive_count += placed;
        placed
    }

    /// Change the goal pattern. The field is only rebuilt when something changed.
    pub fn set_goal_mode(&mut self, mode: GoalMode, image_path: Option<&str>) -> bool {
        if let Some(path) = image_path {
            self.config.goal_image_path = path.to_string();
        }
        self.config.goal_mode = mode;
        let rebuilt = self.state.goal.set_mode(mode, &self.config.goal_image_path);
        if rebuilt {
            tracing::info!(?mode, "goal pattern changed");
        }
        rebuilt
    }

    pub fn reload_goal_image(&mut self) {
        self.state.goal.reload();
    }

    pub fn voices(&self) -> Vec<Voice> {
        sonify::voice_targets(
            self.particles(),
            self.config.max_voices,
            self.config.min_frequency,
            self.config.max_frequency,
        )
    }

    pub fn save_scene(&self, path: impl AsRef<Path>) -> Result<()> {
        scene::save(path, &self.config)
    }

    /// Load a scene and reinitialise. On error nothing changes.
    pub fn load_scene<R: Rng + ?Sized>(&mut self, rng: &mut R, path: impl AsRef<Path>) -> Result<()> {
        let config = scene::load(path, &self.config)?;
        self.reconfigure(rng, config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            num_particles: 30,
            max_particles: 64,
            world_width: 12.0,
            world_height: 12.0,
            world_depth: 12.0,
            food_grid_size: 16,
            goal_grid_size: 32,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn reset_seeds_the_configured_population() {
        let mut rng = Pcg32::seed_from_u64(3);
        let sim = Simulation::with_config(&mut rng, small_config());
        assert_eq!(sim.alive_count, 30);
        assert_eq!(sim.store.count_alive(), 30);
        assert_eq!(sim.particles().len(), 64);
        for p in sim.particles().iter().filter(|p| p.is_alive()) {
            assert!(p.position.abs().max_element() <= 6.0);
            assert!(p.species < 3);
        }
    }

    #[test]
    fn alive_count_tracks_steps_and_edits() {
        let mut rng = Pcg32::seed_from_u64(4);
        let mut sim = Simulation::with_config(
            &mut rng,
            SimulationConfig {
                evolution_enabled: true,
                birth_rate: 0.05,
                death_rate: 0.02,
                ..small_config()
            },
        );
        for _ in 0..15 {
            sim.step();
            assert_eq!(sim.alive_count, sim.store.count_alive());
        }
        sim.spawn_orbium(&mut rng, Vec3::ZERO);
        sim.add_particle(&mut rng, Vec3::ONE);
        sim.paint(&mut rng, Vec3::ZERO);
        assert_eq!(sim.alive_count, sim.store.count_alive());
    }

    #[test]
    fn stats_refresh_on_interval() {
        let mut rng = Pcg32::seed_from_u64(5);
        let mut sim = Simulation::with_config(
            &mut rng,
            SimulationConfig {
                stats_interval: 4,
                ..small_config()
            },
        );
        let after_reset = sim.history.len();
        sim.step_n(8);
        assert_eq!(sim.history.len(), after_reset + 2);
        assert_eq!(sim.history.latest().map(|s| s.tick), Some(8));
    }

    #[test]
    fn goal_changes_rebuild_once() {
        let mut rng = Pcg32::seed_from_u64(6);
        let mut sim = Simulation::with_config(&mut rng, small_config());
        assert!(sim.set_goal_mode(GoalMode::Circle, None));
        assert!(!sim.set_goal_mode(GoalMode::Circle, None));
        assert_eq!(sim.config.goal_mode, GoalMode::Circle);
        sim.step();
    }

    #[test]
    fn failed_scene_load_leaves_state_alone() {
        let mut rng = Pcg32::seed_from_u64(7);
        let mut sim = Simulation::with_config(&mut rng, small_config());
        sim.step_n(3);
        let before = sim.particles().to_vec();
        assert!(sim.load_scene(&mut rng, "/missing/scene.txt").is_err());
        assert_eq!(sim.tick, 3);
        assert_eq!(sim.particles(), before.as_slice());
    }

    #[test]
    fn scene_load_reinitialises_with_new_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.txt");
        std::fs::write(&path, "maxParticles=40\nnumParticles=10\nevolutionEnabled=1\n").unwrap();

        let mut rng = Pcg32::seed_from_u64(8);
        let mut sim = Simulation::with_config(&mut rng, small_config());
        sim.step_n(2);
        sim.load_scene(&mut rng, &path).unwrap();
        assert_eq!(sim.store.capacity(), 40);
        assert_eq!(sim.alive_count, 10);
        assert_eq!(sim.tick, 0);
        assert!(sim.config.evolution_enabled);
    }
}
