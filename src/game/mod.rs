//! Game Logic Module
//!
//! The per-room simulation. Deterministic for a given seed and intent
//! sequence.
//!
//! ## Module Structure
//!
//! - `state`: Arena, agents, consumables, snapshots
//! - `tick`: Authoritative simulation step
//! - `collision`: Wall, self and agent collisions
//! - `food`: Consumable spawning and collection
//! - `events`: Per-tick game events for logs

pub mod state;
pub mod tick;
pub mod collision;
pub mod food;
pub mod events;

// Re-export key types
pub use state::{Agent, Arena, ArenaSnapshot, Consumable, ConsumableKind, ParticipantId};
pub use tick::{Simulation, SimulationConfig, TickResult};
pub use events::{EliminationCause, GameEvent, GameEventData};
