//! Counter-based random streams.
//!
//! Every consumer of randomness inside a tick gets its own PCG stream keyed
//! by `(seed, tick, domain)` for the state and the slot or cell index for the
//! stream selector, so results never depend on thread scheduling.

use rand_pcg::Pcg32;

/// Separates streams of different subsystems that share an index space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Particle,
    Food,
}

impl Domain {
    fn salt(self) -> u64 {
        match self {
            Domain::Particle => 0x9E37_79B9_7F4A_7C15,
            Domain::Food => 0xD1B5_4A32_D192_ED03,
        }
    }
}

// splitmix64 finalizer
#[inline]
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Independent generator for one slot/cell on one tick.
pub fn stream(seed: u64, tick: u64, index: usize, domain: Domain) -> Pcg32 {
    let state = mix64(seed ^ mix64(tick.wrapping_add(domain.salt())));
    Pcg32::new(state, index as u64)
}
