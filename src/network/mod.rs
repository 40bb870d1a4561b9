//! Network Layer
//!
//! Rooms, their timers, the session directory and the WebSocket server.
//! Only the simulation in `game/` is deterministic; everything here
//! depends on wall time and message arrival order.

pub mod protocol;
pub mod room;
pub mod scheduler;
pub mod directory;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, RoomSnapshot, RoomState, ParticipantView, RankingEntry,
    ErrorCode,
};
pub use room::{Room, RoomConfig, RoomError, SharedRoom, JoinAck};
pub use directory::{ConnectionId, SessionDirectory};
pub use server::{GameServer, GameServerError};
