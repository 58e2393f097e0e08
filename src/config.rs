// Global configuration and constants

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LeniaError, Result};

/// Energy at or below which a slot counts as dead.
pub const ENERGY_EPSILON: f32 = 0.01;

/// Number of DNA genes carried by every particle.
pub const DNA_LEN: usize = 5;

/// Largest accepted world side and general parameter magnitude.
pub const MAX_WORLD_EXTENT: f32 = 1.0e6;
pub const MAX_PARTICLES_LIMIT: usize = 1 << 22;
pub const MAX_GRID_SIZE: usize = 4096;

/// Candidate config files tried by [`SimulationConfig::from_default_paths`].
const DEFAULT_CONFIG_PATHS: [&str; 3] = ["config.yaml", "config.yml", "config.json"];

/// Pattern painted into the goal field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalMode {
    #[default]
    None,
    Circle,
    Box,
    Glyph,
    Image,
}

impl GoalMode {
    /// Numeric code used by scene files.
    pub fn index(self) -> i32 {
        match self {
            GoalMode::None => 0,
            GoalMode::Circle => 1,
            GoalMode::Box => 2,
            GoalMode::Glyph => 3,
            GoalMode::Image => 4,
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            0 => Some(GoalMode::None),
            1 => Some(GoalMode::Circle),
            2 => Some(GoalMode::Box),
            3 => Some(GoalMode::Glyph),
            4 => Some(GoalMode::Image),
            _ => None,
        }
    }
}

// Configuration struct for simulation parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // World (centred on the origin)
    pub world_width: f32,
    pub world_height: f32,
    pub world_depth: f32,
    pub wrap_edges: bool,

    // Population
    pub num_particles: usize,
    pub max_particles: usize,
    pub num_species: u32,

    // Kernel: local density sensing
    pub w_k: f32,
    pub mu_k: f32,
    pub sigma_k2: f32,

    // Growth mapping
    pub mu_g: f32,
    pub sigma_g2: f32,

    // Short-range repulsion
    pub c_rep: f32,

    // Time integration
    pub dt: f32,
    pub h: f32,
    pub damping: f32,
    pub max_speed: f32,

    // Evolution
    pub evolution_enabled: bool,
    pub birth_rate: f32,
    pub death_rate: f32,
    pub mutation_rate: f32,
    pub energy_decay: f32,
    pub energy_from_growth: f32,
    pub max_energy: f32,

    // Predation
    pub predation_enabled: bool,
    pub predation_radius: f32,
    pub predation_rate: f32,
    pub aggression_cost: f32,

    // Food
    pub food_enabled: bool,
    pub food_spawn_rate: f32,
    pub food_decay_rate: f32,
    pub food_max_amount: f32,
    pub food_consumption_radius: f32,
    pub food_energy_gain: f32,
    pub food_grid_size: usize,

    // Goal attractor
    pub goal_mode: GoalMode,
    pub goal_strength: f32,
    pub goal_image_path: String,
    pub goal_grid_size: usize,

    // Run control
    pub seed: u64,
    pub steps_per_frame: u32,
    pub stats_interval: u64,

    // View hints (persisted for the renderer, never read by the core)
    pub translate_x: f32,
    pub translate_y: f32,
    pub translate_z: f32,
    pub zoom: f32,
    pub show_fields: bool,
    pub field_type: i32,
    pub show_food: bool,
    pub view_3d: bool,
    pub camera_angle: f32,
    pub camera_rotation: f32,
    pub camera_distance: f32,
    pub height_scale: f32,
    pub glow_intensity: f32,
    pub show_wireframe: bool,
    pub ambient_light: f32,
    pub particle_size: f32,
    pub show_goal: bool,

    // Interaction tools
    pub interaction_mode: i32,
    pub brush_radius: f32,
    pub force_strength: f32,

    // Sonification
    pub sonification_enabled: bool,
    pub audio_volume: f32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub max_voices: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world_width: 40.0,
            world_height: 40.0,
            world_depth: 40.0,
            wrap_edges: true,
            num_particles: 500,
            max_particles: 2000,
            num_species: 3,
            w_k: 0.022,
            mu_k: 4.0,
            sigma_k2: 1.0,
            mu_g: 0.6,
            sigma_g2: 0.0225,
            c_rep: 1.0,
            dt: 0.1,
            h: 0.01,
            damping: 0.1,
            max_speed: 5.0,
            evolution_enabled: false,
            birth_rate: 0.001,
            death_rate: 0.0,
            mutation_rate: 0.1,
            energy_decay: 0.0,
            energy_from_growth: 0.01,
            max_energy: 1.0,
            predation_enabled: false,
            predation_radius: 1.5,
            predation_rate: 0.02,
            aggression_cost: 0.001,
            food_enabled: true,
            food_spawn_rate: 0.002,
            food_decay_rate: 0.001,
            food_max_amount: 1.0,
            food_consumption_radius: 2.0,
            food_energy_gain: 0.5,
            food_grid_size: 128,
            goal_mode: GoalMode::None,
            goal_strength: 0.1,
            goal_image_path: "goal.bmp".to_string(),
            goal_grid_size: 512,
            seed: 0x5EED_1E41A,
            steps_per_frame: 5,
            stats_interval: 10,
            translate_x: 0.0,
            translate_y: 0.0,
            translate_z: 0.0,
            zoom: 1.0,
            show_fields: true,
            field_type: 3,
            show_food: true,
            view_3d: true,
            camera_angle: 45.0,
            camera_rotation: 0.0,
            camera_distance: 60.0,
            height_scale: 10.0,
            glow_intensity: 1.5,
            show_wireframe: false,
            ambient_light: 0.5,
            particle_size: 20.0,
            show_goal: false,
            interaction_mode: 0,
            brush_radius: 5.0,
            force_strength: 0.5,
            sonification_enabled: false,
            audio_volume: 0.3,
            min_frequency: 80.0,
            max_frequency: 800.0,
            max_voices: 32,
        }
    }
}

impl SimulationConfig {
    /// Load a config file, choosing YAML or JSON by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| LeniaError::io(&shown, e))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let config: Self = match ext.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| LeniaError::ConfigParse {
                    path: shown.clone(),
                    message: e.to_string(),
                })?
            }
            Some("json") => serde_json::from_str(&text).map_err(|e| LeniaError::ConfigParse {
                path: shown.clone(),
                message: e.to_string(),
            })?,
            _ => return Err(LeniaError::UnsupportedConfigFormat(shown)),
        };

        tracing::info!(path = %shown, "loaded simulation config");
        Ok(config)
    }

    /// Try config.yaml, config.yml, config.json in the working directory.
    pub fn from_default_paths() -> Self {
        for candidate in DEFAULT_CONFIG_PATHS {
            if !Path::new(candidate).exists() {
                continue;
            }
            match Self::from_file(candidate) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(error = %e, "ignoring unreadable config"),
            }
        }
        Self::default()
    }

    /// Clamp values the engine cannot work with. Everything ends up finite
    /// and inside a range the random samplers accept. Degenerate kernel
    /// variances are left alone: the field math treats them as zero.
    pub fn sanitized(mut self) -> Self {
        fn within(name: &str, value: &mut f32, min: f32, max: f32) {
            if !(*value >= min && *value <= max) {
                let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
                tracing::warn!(key = name, value = *value, clamped, "clamping config value");
                *value = clamped;
            }
        }
        fn probability(name: &str, value: &mut f32) {
            within(name, value, 0.0, 1.0);
        }

        within("world_width", &mut self.world_width, 1.0, MAX_WORLD_EXTENT);
        within("world_height", &mut self.world_height, 1.0, MAX_WORLD_EXTENT);
        within("world_depth", &mut self.world_depth, 1.0, MAX_WORLD_EXTENT);
        let reach = self.world_extent().max_element();

        within("dt", &mut self.dt, 0.0, MAX_WORLD_EXTENT);
        within("max_speed", &mut self.max_speed, 0.0, MAX_WORLD_EXTENT);
        within("energy_decay", &mut self.energy_decay, 0.0, MAX_WORLD_EXTENT);
        within("energy_from_growth", &mut self.energy_from_growth, -MAX_WORLD_EXTENT, MAX_WORLD_EXTENT);
        within("max_energy", &mut self.max_energy, 2.0 * ENERGY_EPSILON, MAX_WORLD_EXTENT);
        within("aggression_cost", &mut self.aggression_cost, -MAX_WORLD_EXTENT, MAX_WORLD_EXTENT);
        within("food_max_amount", &mut self.food_max_amount, 0.0, MAX_WORLD_EXTENT);
        within("food_energy_gain", &mut self.food_energy_gain, -MAX_WORLD_EXTENT, MAX_WORLD_EXTENT);
        within("goal_strength", &mut self.goal_strength, -MAX_WORLD_EXTENT, MAX_WORLD_EXTENT);
        within("food_consumption_radius", &mut self.food_consumption_radius, 0.0, reach);
        within("predation_radius", &mut self.predation_radius, 0.0, reach);
        within("brush_radius", &mut self.brush_radius, 0.0, reach);
        probability("mutation_rate", &mut self.mutation_rate);
        probability("damping", &mut self.damping);
        probability("birth_rate", &mut self.birth_rate);
        probability("death_rate", &mut self.death_rate);
        probability("predation_rate", &mut self.predation_rate);
        probability("food_spawn_rate", &mut self.food_spawn_rate);
        probability("food_decay_rate", &mut self.food_decay_rate);

        if self.max_particles > MAX_PARTICLES_LIMIT {
            tracing::warn!(max_particles = self.max_particles, limit = MAX_PARTICLES_LIMIT, "capacity too large, capping");
            self.max_particles = MAX_PARTICLES_LIMIT;
        }
        if self.max_particles == 0 {
            tracing::warn!("max_particles must be positive, using 1");
            self.max_particles = 1;
        }
        if self.num_particles > self.max_particles {
            tracing::warn!(
                num_particles = self.num_particles,
                max_particles = self.max_particles,
                "initial population exceeds capacity, truncating"
            );
            self.num_particles = self.max_particles;
        }
        self.num_species = self.num_species.max(1);
        self.food_grid_size = self.food_grid_size.clamp(1, MAX_GRID_SIZE);
        self.goal_grid_size = self.goal_grid_size.clamp(2, MAX_GRID_SIZE);
        self.stats_interval = self.stats_interval.max(1);
        self
    }

    pub fn world_extent(&self) -> Vec3 {
        Vec3::new(self.world_width, self.world_height, self.world_depth)
    }

    pub fn predation_radius_sq(&self) -> f32 {
        self.predation_radius * self.predation_radius
    }
}
