// API module for headless mode - HTTP endpoints to interact with the simulation

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use glam::Vec3;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

use crate::config::{GoalMode, SimulationConfig};
use crate::particle::Particle;
use crate::simulation::Simulation;
use crate::sonify::Voice;
use crate::stats::{HistorySample, Stats};

// Serializable views of simulation data for API responses
#[derive(Serialize, Clone)]
pub struct ParticleData {
    pub slot: usize,
    #[serde(flatten)]
    pub particle: Particle,
}

#[derive(Serialize, Clone)]
pub struct StatsData {
    #[serde(flatten)]
    pub stats: Stats,
    pub alive_count_exact: usize,
    pub tick: u64,
    pub births: usize,
    pub deaths: usize,
    pub food_total: f32,
}

#[derive(Serialize, Clone)]
pub struct SimulationStateResponse {
    pub tick: u64,
    pub paused: bool,
    pub capacity: usize,
    pub particles: Vec<ParticleData>,
    pub stats: StatsData,
}

#[derive(Serialize, Clone)]
pub struct StatsResponse {
    pub current: StatsData,
    pub history: Vec<HistorySample>,
}

#[derive(Serialize, Clone)]
pub struct GridData {
    pub size: usize,
    // Row-major, row 0 at the bottom of the world
    pub values: Vec<f32>,
}

#[derive(Deserialize)]
pub struct StepQuery {
    pub steps: Option<usize>,
}

#[derive(Deserialize)]
pub struct PositionRequest {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl PositionRequest {
    fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

#[derive(Deserialize)]
pub struct ForceRequest {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    pub strength: Option<f32>,
    pub radius: Option<f32>,
}

#[derive(Deserialize)]
pub struct GoalRequest {
    pub mode: GoalMode,
    pub image_path: Option<String>,
    // Re-read the image even if mode and path are unchanged
    #[serde(default)]
    pub reload: bool,
}

// Shared state for the API server
#[derive(Clone)]
pub struct ApiState {
    pub simulation: Arc<Mutex<Simulation>>,
    pub rng: Arc<Mutex<Pcg32>>,
}

impl ApiState {
    pub fn new(sim: Simulation) -> Self {
        let rng = Pcg32::seed_from_u64(sim.config.seed);
        Self {
            simulation: Arc::new(Mutex::new(sim)),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    fn lock_sim(&self) -> Result<MutexGuard<'_, Simulation>, StatusCode> {
        self.simulation
            .lock()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn lock_rng(&self) -> Result<MutexGuard<'_, Pcg32>, StatusCode> {
        self.rng.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn stats_data(sim: &Simulation) -> StatsData {
    StatsData {
        stats: sim.stats,
        alive_count_exact: sim.alive_count,
        tick: sim.tick,
        births: sim.last_report.births,
        deaths: sim.last_report.deaths,
        food_total: sim.food().total(),
    }
}

// Helper function to convert simulation state to API response
fn simulation_to_response(sim: &Simulation) -> SimulationStateResponse {
    SimulationStateResponse {
        tick: sim.tick,
        paused: sim.paused,
        capacity: sim.store.capacity(),
        particles: sim
            .particles()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_alive())
            .map(|(slot, p)| ParticleData { slot, particle: *p })
            .collect(),
        stats: stats_data(sim),
    }
}

// GET /state - Get current simulation state
async fn get_state(
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationStateResponse>, StatusCode> {
    let sim = api_state.lock_sim()?;
    Ok(Json(simulation_to_response(&sim)))
}

// GET /stats - Latest statistics plus population history
async fn get_stats(State(api_state): State<ApiState>) -> Result<Json<StatsResponse>, StatusCode> {
    let sim = api_state.lock_sim()?;
    Ok(Json(StatsResponse {
        current: stats_data(&sim),
        history: sim.history.iter().copied().collect(),
    }))
}

// GET /food - Food amounts
async fn get_food(State(api_state): State<ApiState>) -> Result<Json<GridData>, StatusCode> {
    let sim = api_state.lock_sim()?;
    Ok(Json(GridData {
        size: sim.food().size(),
        values: sim.food().amounts(),
    }))
}

// GET /goal - Goal attractiveness
async fn get_goal(State(api_state): State<ApiState>) -> Result<Json<GridData>, StatusCode> {
    let sim = api_state.lock_sim()?;
    Ok(Json(GridData {
        size: sim.goal().size(),
        values: sim.goal().data().to_vec(),
    }))
}

// GET /voices - Sonification targets
async fn get_voices(State(api_state): State<ApiState>) -> Result<Json<Vec<Voice>>, StatusCode> {
    let sim = api_state.lock_sim()?;
    Ok(Json(sim.voices()))
}

// POST /step - Step the simulation forward
async fn step_simulation(
    Query(params): Query<StepQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationStateResponse>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let steps = params.steps.unwrap_or(1);
    sim.step_n(steps);
    Ok(Json(simulation_to_response(&sim)))
}

// POST /reset - Reset the simulation
async fn reset_simulation(
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationStateResponse>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let mut rng = api_state.lock_rng()?;
    sim.reset(&mut *rng);
    Ok(Json(simulation_to_response(&sim)))
}

// POST /pause - Toggle pause
async fn pause_simulation(
    State(api_state): State<ApiState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    sim.toggle_pause();
    Ok(Json(serde_json::json!({ "paused": sim.paused })))
}

// POST /spawn - Add one particle
async fn spawn_particle(
    State(api_state): State<ApiState>,
    Json(req): Json<PositionRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let mut rng = api_state.lock_rng()?;
    let slot = sim.add_particle(&mut *rng, req.position());
    Ok(Json(serde_json::json!({ "slot": slot, "alive": sim.alive_count })))
}

// POST /orbium - Seed a dense cluster
async fn spawn_orbium(
    State(api_state): State<ApiState>,
    Json(req): Json<PositionRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let mut rng = api_state.lock_rng()?;
    let placed = sim.spawn_orbium(&mut *rng, req.position());
    Ok(Json(serde_json::json!({ "placed": placed, "alive": sim.alive_count })))
}

// POST /paint - Brush stroke with the configured radius
async fn paint(
    State(api_state): State<ApiState>,
    Json(req): Json<PositionRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let mut rng = api_state.lock_rng()?;
    let placed = sim.paint(&mut *rng, req.position());
    Ok(Json(serde_json::json!({ "placed": placed, "alive": sim.alive_count })))
}

// POST /force - Radial impulse
async fn apply_force(
    State(api_state): State<ApiState>,
    Json(req): Json<ForceRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let strength = req.strength.unwrap_or(sim.config.force_strength);
    let radius = req.radius.unwrap_or(sim.config.brush_radius);
    let affected = sim.apply_force(Vec3::new(req.x, req.y, req.z), strength, radius);
    Ok(Json(serde_json::json!({ "affected": affected })))
}

// POST /goal - Change the goal pattern
async fn set_goal(
    State(api_state): State<ApiState>,
    Json(req): Json<GoalRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let mut sim = api_state.lock_sim()?;
    let mut rebuilt = sim.set_goal_mode(req.mode, req.image_path.as_deref());
    if req.reload && !rebuilt {
        sim.reload_goal_image();
        rebuilt = true;
    }
    Ok(Json(serde_json::json!({ "mode": req.mode, "rebuilt": rebuilt })))
}

// GET /config - Get simulation configuration
async fn get_config(
    State(api_state): State<ApiState>,
) -> Result<Json<SimulationConfig>, StatusCode> {
    let sim = api_state.lock_sim()?;
    Ok(Json(sim.config.clone()))
}

// Create the API router
pub fn create_router(api_state: ApiState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/stats", get(get_stats))
        .route("/config", get(get_config))
        .route("/food", get(get_food))
        .route("/goal", get(get_goal).post(set_goal))
        .route("/voices", get(get_voices))
        .route("/step", post(step_simulation))
        .route("/reset", post(reset_simulation))
        .route("/pause", post(pause_simulation))
        .route("/spawn", post(spawn_particle))
        .route("/orbium", post(spawn_orbium))
        .route("/paint", post(paint))
        .route("/force", post(apply_force))
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

// Run the API server with automatic simulation stepping
pub async fn run_server(api_state: ApiState, port: u16) -> anyhow::Result<()> {
    let app = create_router(api_state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!(port, "particle-lenia API server listening on http://localhost:{}", port);
    tracing::info!("GET  /state /stats /config /food /goal /voices");
    tracing::info!("POST /step?steps=N /reset /pause /spawn /orbium /paint /force /goal");
    tracing::info!("simulation runs at ~60 FPS with steps_per_frame ticks per frame (respects pause)");

    // Spawn background task to continuously step the simulation
    let simulation_task = tokio::spawn(simulation_loop(api_state.clone()));

    // Run the server
    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    // Wait for either task to complete
    tokio::select! {
        result = server_handle => {
            result??;
        }
        _ = simulation_task => {
            tracing::error!("simulation loop ended unexpectedly");
        }
    }

    Ok(())
}

// Background task that continuously steps the simulation
async fn simulation_loop(api_state: ApiState) {
    const TARGET_FPS: f32 = 60.0;
    let frame_duration = std::time::Duration::from_secs_f32(1.0 / TARGET_FPS);

    loop {
        let start = std::time::Instant::now();

        {
            let mut sim = match api_state.simulation.lock() {
                Ok(sim) => sim,
                Err(_) => break,
            };
            if !sim.paused {
                let steps = sim.config.steps_per_frame as usize;
                sim.step_n(steps);
            }
        }

        // Sleep to maintain target FPS
        let elapsed = start.elapsed();
        if elapsed < frame_duration {
            tokio::time::sleep(frame_duration - elapsed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> ApiState {
        let mut rng = Pcg32::seed_from_u64(1);
        let config = SimulationConfig {
            num_particles: 8,
            max_particles: 16,
            food_grid_size: 8,
            goal_grid_size: 16,
            ..SimulationConfig::default()
        };
        ApiState::new(Simulation::with_config(&mut rng, config))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn state_lists_only_alive_particles() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::get("/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["particles"].as_array().unwrap().len(), 8);
        assert_eq!(json["capacity"], 16);
    }

    #[tokio::test]
    async fn step_advances_the_tick() {
        let state = test_state();
        let app = create_router(state.clone());
        let response = app
            .oneshot(Request::post("/step?steps=3").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.simulation.lock().unwrap().tick, 3);
    }

    #[tokio::test]
    async fn spawn_reports_the_claimed_slot() {
        let state = test_state();
        let app = create_router(state.clone());
        let request = Request::post("/spawn")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"x": 1.0, "y": 2.0}"#))
            .unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["slot"], 8);
        assert_eq!(json["alive"], 9);
    }

    #[tokio::test]
    async fn goal_post_switches_pattern() {
        let state = test_state();
        let app = create_router(state.clone());
        let request = Request::post("/goal")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"mode": "circle"}"#))
            .unwrap();
        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["rebuilt"], true);
        assert_eq!(state.simulation.lock().unwrap().goal().mode(), GoalMode::Circle);
    }
}
