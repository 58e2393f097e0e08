use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use tracing::info;

use particle_lenia::api::{run_server, ApiState};
use particle_lenia::config::SimulationConfig;
use particle_lenia::particle_life::{LifeParams, ParticleLife, DEFAULT_PARTICLE_COUNT};
use particle_lenia::simulation::Simulation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Model {
    /// Particle Lenia with evolution, food and goals
    Lenia,
    /// Rule-matrix particle life
    ParticleLife,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML or JSON). If not specified, searches for config.yaml, config.yml, or config.json in current directory.
    #[arg(short, long)]
    config: Option<String>,

    /// Scene file (key=value) applied on top of the configuration
    #[arg(long)]
    scene: Option<String>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Ticks to run in batch mode
    #[arg(long, default_value_t = 1000)]
    ticks: u64,

    /// Run the HTTP API server instead of a batch run
    #[arg(long)]
    serve: bool,

    /// Port for the API server
    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[arg(long, value_enum, default_value_t = Model::Lenia)]
    model: Model,

    /// Write the final configuration as a scene file
    #[arg(long)]
    save_scene: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    match args.model {
        Model::Lenia => run_lenia(&args, config).await,
        Model::ParticleLife => {
            run_particle_life(config.seed, args.ticks);
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Load configuration from file or use default
fn load_config(config_path: Option<&str>) -> Result<SimulationConfig> {
    match config_path {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("failed to load config from {path}")),
        None => Ok(SimulationConfig::from_default_paths()),
    }
}

async fn run_lenia(args: &Args, config: SimulationConfig) -> Result<()> {
    let mut rng = Pcg32::seed_from_u64(config.seed);
    let mut sim = Simulation::with_config(&mut rng, config);

    if let Some(scene) = &args.scene {
        sim.load_scene(&mut rng, scene)
            .with_context(|| format!("failed to load scene {scene}"))?;
    }

    if args.serve {
        return run_server(ApiState::new(sim), args.port).await;
    }

    let started = std::time::Instant::now();
    let mut births = 0;
    let mut deaths = 0;
    for _ in 0..args.ticks {
        let report = sim.step();
        births += report.births;
        deaths += report.deaths;
        if sim.alive_count == 0 {
            info!(tick = sim.tick, "population went extinct");
            break;
        }
    }
    sim.refresh_stats();

    info!(
        ticks = sim.tick,
        alive = sim.stats.alive_count,
        avg_energy = sim.stats.avg_energy,
        avg_age = sim.stats.avg_age,
        births,
        deaths,
        food = sim.food().total(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch run finished"
    );

    if let Some(path) = &args.save_scene {
        sim.save_scene(path)
            .with_context(|| format!("failed to save scene {path}"))?;
    }
    Ok(())
}

fn run_particle_life(seed: u64, ticks: u64) {
    let mut rng = Pcg32::seed_from_u64(seed);
    let mut life = ParticleLife::new(&mut rng, LifeParams::default());
    life.init(&mut rng, DEFAULT_PARTICLE_COUNT);

    let started = std::time::Instant::now();
    for _ in 0..ticks {
        life.update(1.0 / 60.0);
    }
    let mean_speed = life
        .particles()
        .iter()
        .map(|p| p.velocity.length())
        .sum::<f32>()
        / life.particles().len().max(1) as f32;
    info!(
        ticks,
        particles = life.particles().len(),
        mean_speed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "particle life run finished"
    );
}
