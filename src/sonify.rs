//! Voice targets for sonifying the population.
//!
//! Only the mapping lives here. Whoever owns an audio device smooths towards
//! these targets on its own clock.

use serde::Serialize;
use std::cmp::Ordering;

use crate::particle::Particle;

/// Upper bound on simultaneous voices regardless of configuration.
pub const MAX_VOICES: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Voice {
    pub slot: usize,
    pub frequency: f32,
    pub amplitude: f32,
}

fn score(p: &Particle) -> f32 {
    let speed = p.velocity.length();
    let s = p.energy * (1.0 + 0.5 * speed + 0.3 * p.potential);
    if s.is_finite() {
        s
    } else {
        f32::MIN
    }
}

/// Pick the loudest particles: high energy, fast, high potential.
/// Potential maps to pitch on a log scale, speed to volume.
pub fn voice_targets(particles: &[Particle], max_voices: usize, min_freq: f32, max_freq: f32) -> Vec<Voice> {
    let mut ranked: Vec<(usize, f32)> = particles
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_alive())
        .map(|(slot, p)| (slot, score(p)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
    ranked.truncate(max_voices.min(MAX_VOICES));

    let min_freq = min_freq.max(1.0);
    let max_freq = max_freq.max(min_freq);
    ranked
        .into_iter()
        .map(|(slot, _)| {
            let p = &particles[slot];
            let t = (p.potential / 2.0).clamp(0.0, 1.0);
            let speed = p.velocity.length();
            Voice {
                slot,
                frequency: min_freq * (max_freq / min_freq).powf(t),
                amplitude: (speed * 2.0).clamp(0.0, 1.0) * p.energy,
            }
        })
        .collect()
}
