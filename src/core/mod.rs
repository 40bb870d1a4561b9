//! Core deterministic primitives.
//!
//! Integer grid geometry, a seeded PRNG and state hashing. Nothing here
//! reads the clock or the environment.

pub mod cell;
pub mod hash;
pub mod rng;

pub use cell::{Cell, Direction};
pub use hash::{compute_state_hash, StateHash, StateHasher};
pub use rng::{derive_round_seed, DeterministicRng};
