//! Particle Lenia: a double-buffered population of organism particles that
//! move along continuous Lenia fields, eat, hunt, reproduce and mutate.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod food;
pub mod goal;
pub mod kernel;
pub mod mutators;
pub mod particle;
pub mod particle_life;
pub mod rng;
pub mod scene;
pub mod simulation;
pub mod sonify;
pub mod stats;
pub mod store;

pub use config::SimulationConfig;
pub use error::{LeniaError, Result};
pub use simulation::Simulation;
