use rayon::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;

use crate::particle::Particle;

/// Samples kept for population plots.
pub const HISTORY_LEN: usize = 300;

/// Population summary; averages are over alive particles only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Stats {
    pub alive_count: usize,
    pub avg_energy: f32,
    pub avg_age: f32,
    pub total_energy: f32,
}

impl Stats {
    pub fn scan(particles: &[Particle]) -> Self {
        let (alive_count, total_energy, total_age) = particles
            .par_iter()
            .filter(|p| p.is_alive())
            .map(|p| (1usize, p.energy, p.age))
            .reduce(|| (0, 0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

        if alive_count == 0 {
            return Self::default();
        }
        Self {
            alive_count,
            avg_energy: total_energy / alive_count as f32,
            avg_age: total_age / alive_count as f32,
            total_energy,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HistorySample {
    pub tick: u64,
    pub alive_count: usize,
    pub avg_energy: f32,
}

/// Bounded ring of recent population samples, oldest first.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PopulationHistory {
    samples: VecDeque<HistorySample>,
}

impl PopulationHistory {
    pub fn push(&mut self, tick: u64, stats: &Stats) {
        if self.samples.len() == HISTORY_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(HistorySample {
            tick,
            alive_count: stats.alive_count,
            avg_energy: stats.avg_energy,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn dead_slots_do_not_dilute_averages() {
        let mut particles = vec![Particle::DEAD; 10];
        particles[2] = Particle::newborn(Vec3::ZERO, 0, [0.0; 5]);
        particles[7] = Particle::newborn(Vec3::ZERO, 1, [0.0; 5]);
        particles[7].energy = 0.5;
        particles[7].age = 4.0;

        let stats = Stats::scan(&particles);
        assert_eq!(stats.alive_count, 2);
        assert!((stats.avg_energy - 0.75).abs() < 1e-6);
        assert!((stats.avg_age - 2.0).abs() < 1e-6);
        assert!((stats.total_energy - 1.5).abs() < 1e-6);
    }

    #[test]
    fn empty_population_reports_zeros() {
        assert_eq!(Stats::scan(&[Particle::DEAD; 4]), Stats::default());
        assert_eq!(Stats::scan(&[]), Stats::default());
    }

    #[test]
    fn history_keeps_the_most_recent_samples() {
        let mut history = PopulationHistory::default();
        let stats = Stats {
            alive_count: 3,
            ..Stats::default()
        };
        for tick in 0..(HISTORY_LEN as u64 + 20) {
            history.push(tick, &stats);
        }
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history.iter().next().map(|s| s.tick), Some(20));
        assert_eq!(history.latest().map(|s| s.tick), Some(HISTORY_LEN as u64 + 19));
    }
}
