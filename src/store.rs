// Fixed-capacity ping-pong storage for particle records

use serde::Serialize;

use crate::error::{LeniaError, Result};
use crate::particle::Particle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BufferId {
    A,
    B,
}

impl BufferId {
    pub fn other(self) -> Self {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }

    fn index(self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }
}

pub struct ParticleStore {
    buffers: [Vec<Particle>; 2],
    // Buffer holding the last committed tick
    active: BufferId,
}

impl ParticleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: [vec![Particle::DEAD; capacity], vec![Particle::DEAD; capacity]],
            active: BufferId::A,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn active(&self) -> BufferId {
        self.active
    }

    pub fn read(&self, buffer: BufferId, slot: usize) -> Option<Particle> {
        self.buffers[buffer.index()].get(slot).copied()
    }

    pub fn write(&mut self, buffer: BufferId, slot: usize, particle: Particle) -> Result<()> {
        let capacity = self.capacity();
        let target = self.buffers[buffer.index()]
            .get_mut(slot)
            .ok_or(LeniaError::SlotOutOfRange { slot, capacity })?;
        *target = particle;
        Ok(())
    }

    /// Write the same record into both buffers (used outside a step).
    pub fn write_both(&mut self, slot: usize, particle: Particle) -> Result<()> {
        self.write(BufferId::A, slot, particle)?;
        self.write(BufferId::B, slot, particle)
    }

    pub fn swap(&mut self) {
        self.active = self.active.other();
    }

    pub fn active_slice(&self) -> &[Particle] {
        &self.buffers[self.active.index()]
    }

    /// Committed buffer for reading and the other one for the next tick.
    pub fn split_for_step(&mut self) -> (&[Particle], &mut [Particle]) {
        let [a, b] = &mut self.buffers;
        match self.active {
            BufferId::A => (a.as_slice(), b.as_mut_slice()),
            BufferId::B => (b.as_slice(), a.as_mut_slice()),
        }
    }

    /// Destructive: every slot is dead afterwards.
    pub fn resize(&mut self, capacity: usize) {
        tracing::debug!(from = self.capacity(), to = capacity, "reallocating particle store");
        *self = Self::new(capacity);
    }

    /// Replace the population in both buffers; extra slots are cleared.
    pub fn load(&mut self, particles: &[Particle]) {
        let capacity = self.capacity();
        if particles.len() > capacity {
            tracing::warn!(
                given = particles.len(),
                capacity,
                "population larger than store, truncating"
            );
        }
        for buffer in &mut self.buffers {
            for (slot, record) in buffer.iter_mut().enumerate() {
                *record = particles.get(slot).copied().unwrap_or(Particle::DEAD);
            }
        }
    }

    /// Mutable access to one slot in both buffers, for direct mutators.
    pub(crate) fn pair_mut(&mut self, slot: usize) -> Option<(&mut Particle, &mut Particle)> {
        let [a, b] = &mut self.buffers;
        Some((a.get_mut(slot)?, b.get_mut(slot)?))
    }

    pub fn count_alive(&self) -> usize {
        self.active_slice().iter().filter(|p| p.is_alive()).count()
    }
}
