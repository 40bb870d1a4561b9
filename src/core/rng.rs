//! Deterministic Random Number Generator
//!
//! Xorshift128+ seeded through SplitMix64. The only source of randomness in
//! the simulation is consumable placement, and it all flows through here so
//! a seeded room replays identically.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use super::cell::Cell;

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Example
///
/// ```
/// use snake_arena::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Xorshift must never be in the all-zero state
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Modulo bias is negligible for arena-sized ranges
        (self.next_u64() % max as u64) as u32
    }

    /// Uniformly random cell in `[0, columns) x [0, rows)`.
    pub fn random_cell(&mut self, columns: u32, rows: u32) -> Cell {
        let x = self.next_int(columns) as i32;
        let y = self.next_int(rows) as i32;
        Cell::new(x, y)
    }

    /// Current internal state (for hashing and debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a round seed from the room code, the round number and caller
/// supplied entropy (random in production, fixed in tests).
pub fn derive_round_seed(room_code: &str, round: u32, entropy: u64) -> u64 {
    let mut hasher = Sha256::new();

    hasher.update(b"SNAKE_ARENA_SEED_V1");
    hasher.update((room_code.len() as u32).to_le_bytes());
    hasher.update(room_code.as_bytes());
    hasher.update(round.to_le_bytes());
    hasher.update(entropy.to_le_bytes());

    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(seed)
}
