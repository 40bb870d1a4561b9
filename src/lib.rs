//! # Snake Arena Server
//!
//! Real-time multiplayer session engine for Snake Arena.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SNAKE ARENA SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── cell.rs     - Grid cells and unit directions            │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State hashing for snapshots               │
//! │                                                              │
//! │  game/           - Simulation (deterministic)                │
//! │  ├── state.rs    - Arena, agents, consumables                │
//! │  ├── tick.rs     - Authoritative simulation step             │
//! │  ├── collision.rs- Wall, self and agent collisions           │
//! │  ├── food.rs     - Consumable spawning and collection        │
//! │  └── events.rs   - Per-tick events                           │
//! │                                                              │
//! │  network/        - Sessions (non-deterministic)              │
//! │  ├── room.rs     - Room lifecycle and broadcast              │
//! │  ├── scheduler.rs- Per-room tick loop and cooldown           │
//! │  ├── directory.rs- Connection -> room mapping                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  └── protocol.rs - Message types                             │
//! │                                                              │
//! │  persistence.rs  - Match result sinks                        │
//! │  config.rs       - Environment configuration                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `core/` and `game/` modules never read the clock and draw all
//! randomness from a seeded Xorshift128+. Given the same seed and the same
//! intents before each step, a simulation produces identical snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod persistence;
pub mod config;

// Re-export commonly used types
pub use core::cell::{Cell, Direction};
pub use core::rng::DeterministicRng;
pub use game::state::ParticipantId;
pub use game::tick::{Simulation, SimulationConfig};
pub use network::{GameServer, SessionDirectory};
pub use config::ServerConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
