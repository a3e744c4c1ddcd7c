//! Deterministic seeded random number generator.
//!
//! Uses the xorshift32 algorithm. Every peer seeds it identically and
//! advances it only from inside the simulation, so all peers observe the
//! same sequence.

use serde::{Deserialize, Serialize};

/// Deterministic seeded random number generator using xorshift32.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    /// Creates a new RNG with the given seed.
    ///
    /// Seed of 0 is treated as 1 to avoid the degenerate all-zero sequence.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    const fn step(state: u32) -> u32 {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x
    }

    /// Returns the next raw u32 value.
    pub fn next_u32(&mut self) -> u32 {
        self.state = Self::step(self.state);
        self.state
    }

    /// Returns a random integer from 0 (inclusive) to `max` (exclusive).
    ///
    /// Returns 0 when `max` is 0.
    pub fn next_int(&mut self, max: u32) -> u32 {
        scale(self.next_u32(), max)
    }

    /// Returns what [`next_int`](Self::next_int) would return without
    /// advancing the generator.
    #[must_use]
    pub const fn peek_int(&self, max: u32) -> u32 {
        scale(Self::step(self.state), max)
    }

    /// Current internal state, for snapshots.
    #[must_use]
    pub const fn state(&self) -> u32 {
        self.state
    }

    /// Restore the internal state from a snapshot.
    pub fn set_state(&mut self, state: u32) {
        self.state = if state == 0 { 1 } else { state };
    }
}

const fn scale(value: u32, max: u32) -> u32 {
    ((value as u64 * max as u64) >> 32) as u32
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_sequence() {
        let mut rng1 = SeededRandom::new(12345);
        let mut rng2 = SeededRandom::new(12345);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u32(), rng2.next_u32());
        }
    }

    #[test]
    fn zero_seed_is_not_degenerate() {
        let mut rng = SeededRandom::new(0);
        assert_ne!(rng.next_u32(), 0);
    }

    #[test]
    fn next_int_bounds() {
        let mut rng = SeededRandom::new(42);
        for _ in 0..1000 {
            assert!(rng.next_int(10) < 10);
        }
        assert_eq!(rng.next_int(0), 0);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut rng = SeededRandom::new(99);
        let peeked = rng.peek_int(1000);
        assert_eq!(rng.peek_int(1000), peeked);
        assert_eq!(rng.next_int(1000), peeked);
        assert_ne!(rng.state(), SeededRandom::new(99).state());
    }

    #[test]
    fn state_round_trip() {
        let mut rng = SeededRandom::new(7);
        rng.next_u32();
        let mut restored = SeededRandom::default();
        restored.set_state(rng.state());
        assert_eq!(restored.next_u32(), rng.next_u32());
    }
}
