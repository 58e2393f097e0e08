//! Scene files: one `key=value` pair per line, camelCase keys.
//!
//! Unknown keys and values that fail to parse are skipped, so scenes written
//! by older or newer builds still load.

use std::fmt::Write as _;
use std::path::Path;

use crate::config::{GoalMode, SimulationConfig};
use crate::error::{LeniaError, Result};

trait SceneValue: Sized {
    fn encode(&self) -> String;
    fn decode(raw: &str) -> Option<Self>;
}

macro_rules! numeric_scene_value {
    ($($ty:ty),*) => {
        $(impl SceneValue for $ty {
            fn encode(&self) -> String {
                self.to_string()
            }
            fn decode(raw: &str) -> Option<Self> {
                raw.trim().parse().ok()
            }
        })*
    };
}

numeric_scene_value!(f32, i32, u32, u64, usize);

// Written as 0/1; any integer or true/false is read back
impl SceneValue for bool {
    fn encode(&self) -> String {
        u8::from(*self).to_string()
    }
    fn decode(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw {
            "true" => Some(true),
            "false" => Some(false),
            _ => raw.parse::<i64>().ok().map(|v| v != 0),
        }
    }
}

impl SceneValue for String {
    fn encode(&self) -> String {
        self.clone()
    }
    fn decode(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl SceneValue for GoalMode {
    fn encode(&self) -> String {
        self.index().to_string()
    }
    fn decode(raw: &str) -> Option<Self> {
        raw.trim().parse().ok().and_then(GoalMode::from_index)
    }
}

enum Applied {
    Set,
    Invalid,
    Unknown,
}

macro_rules! scene_fields {
    ($($key:literal => $field:ident),* $(,)?) => {
        fn encode_fields(config: &SimulationConfig, out: &mut String) {
            $(let _ = writeln!(out, "{}={}", $key, config.$field.encode());)*
        }

        fn apply_field(config: &mut SimulationConfig, key: &str, raw: &str) -> Applied {
            match key {
                $($key => match SceneValue::decode(raw) {
                    Some(value) => {
                        config.$field = value;
                        Applied::Set
                    }
                    None => Applied::Invalid,
                },)*
                _ => Applied::Unknown,
            }
        }
    };
}

scene_fields! {
    "worldWidth" => world_width,
    "worldHeight" => world_height,
    "worldDepth" => world_depth,
    "wrapEdges" => wrap_edges,
    "numParticles" => num_particles,
    "maxParticles" => max_particles,
    "numSpecies" => num_species,
    "w_k" => w_k,
    "mu_k" => mu_k,
    "sigma_k2" => sigma_k2,
    "mu_g" => mu_g,
    "sigma_g2" => sigma_g2,
    "c_rep" => c_rep,
    "dt" => dt,
    "h" => h,
    "damping" => damping,
    "maxSpeed" => max_speed,
    "evolutionEnabled" => evolution_enabled,
    "birthRate" => birth_rate,
    "deathRate" => death_rate,
    "mutationRate" => mutation_rate,
    "energyDecay" => energy_decay,
    "energyFromGrowth" => energy_from_growth,
    "maxEnergy" => max_energy,
    "predationEnabled" => predation_enabled,
    "predationRadius" => predation_radius,
    "predationRate" => predation_rate,
    "aggressionCost" => aggression_cost,
    "translateX" => translate_x,
    "translateY" => translate_y,
    "translateZ" => translate_z,
    "zoom" => zoom,
    "stepsPerFrame" => steps_per_frame,
    "showFields" => show_fields,
    "fieldType" => field_type,
    "foodEnabled" => food_enabled,
    "foodSpawnRate" => food_spawn_rate,
    "foodDecayRate" => food_decay_rate,
    "foodMaxAmount" => food_max_amount,
    "foodConsumptionRadius" => food_consumption_radius,
    "foodEnergyGain" => food_energy_gain,
    "foodGridSize" => food_grid_size,
    "showFood" => show_food,
    "view3D" => view_3d,
    "cameraAngle" => camera_angle,
    "cameraRotation" => camera_rotation,
    "cameraDistance" => camera_distance,
    "heightScale" => height_scale,
    "glowIntensity" => glow_intensity,
    "showWireframe" => show_wireframe,
    "ambientLight" => ambient_light,
    "particleSize" => particle_size,
    "interactionMode" => interaction_mode,
    "brushRadius" => brush_radius,
    "forceStrength" => force_strength,
    "goalMode" => goal_mode,
    "goalStrength" => goal_strength,
    "goalGridSize" => goal_grid_size,
    "showGoal" => show_goal,
    "goalImagePath" => goal_image_path,
    "seed" => seed,
    "statsInterval" => stats_interval,
    "sonificationEnabled" => sonification_enabled,
    "audioVolume" => audio_volume,
    "minFrequency" => min_frequency,
    "maxFrequency" => max_frequency,
    "maxVoices" => max_voices,
}

pub fn to_scene_string(config: &SimulationConfig) -> String {
    let mut out = String::new();
    encode_fields(config, &mut out);
    out
}

/// Overlay the pairs found in `text` onto `config`. Returns how many were applied.
pub fn apply_scene(config: &mut SimulationConfig, text: &str) -> usize {
    let mut applied = 0;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        match apply_field(config, key.trim(), raw) {
            Applied::Set => applied += 1,
            Applied::Invalid => tracing::debug!(key, value = raw, "skipping unparsable scene value"),
            Applied::Unknown => tracing::debug!(key, "skipping unknown scene key"),
        }
    }
    applied
}

pub fn save(path: impl AsRef<Path>, config: &SimulationConfig) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_scene_string(config)).map_err(|e| LeniaError::io(path.display().to_string(), e))?;
    tracing::info!(path = %path.display(), "scene saved");
    Ok(())
}

/// Read a scene on top of `base`; keys missing from the file keep their value.
pub fn load(path: impl AsRef<Path>, base: &SimulationConfig) -> Result<SimulationConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| LeniaError::io(path.display().to_string(), e))?;
    let mut config = base.clone();
    let applied = apply_scene(&mut config, &text);
    tracing::info!(path = %path.display(), applied, "scene loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_scene_loads_back_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.txt");
        let config = SimulationConfig {
            world_width: 55.5,
            evolution_enabled: true,
            goal_mode: GoalMode::Glyph,
            goal_image_path: "art/target.png".to_string(),
            mu_g: 0.123_456_7,
            max_voices: 12,
            seed: 99,
            ..SimulationConfig::default()
        };
        save(&path, &config).unwrap();
        let loaded = load(&path, &SimulationConfig::default()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn booleans_are_written_as_digits() {
        let text = to_scene_string(&SimulationConfig::default());
        assert!(text.lines().any(|l| l == "evolutionEnabled=0"));
        assert!(text.lines().any(|l| l == "foodEnabled=1"));
        assert!(text.lines().any(|l| l == "goalMode=0"));
    }

    #[test]
    fn junk_lines_and_bad_values_are_skipped() {
        let mut config = SimulationConfig::default();
        let text = "no equals here\n\
                    mysteryKey=4\n\
                    birthRate=lots\n\
                    goalMode=42\n\
                    deathRate=0.25\r\n\
                    foodEnabled=false\n\
                    showGoal=7\n\
                    \n";
        let applied = apply_scene(&mut config, text);
        assert_eq!(applied, 3);
        assert_eq!(config.birth_rate, SimulationConfig::default().birth_rate);
        assert_eq!(config.goal_mode, GoalMode::None);
        assert_eq!(config.death_rate, 0.25);
        assert!(!config.food_enabled);
        assert!(config.show_goal);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load("/no/such/scene.txt", &SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, LeniaError::Io { .. }));
    }
}
