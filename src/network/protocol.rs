//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON objects tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::core::cell::Direction;
use crate::game::state::{AgentView, ArenaBounds, ArenaSnapshot, ConsumableView, ParticipantId};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or create) a room.
    JoinRoom {
        /// Room code, any string
        room_code: String,
        /// Name shown to the other participants
        display_name: String,
    },

    /// Leave the current room.
    LeaveRoom,

    /// Change heading.
    Intent {
        /// Requested unit vector
        direction: DirectionVector,
    },

    /// Start the round.
    StartGame,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back
        timestamp: u64,
    },
}

/// Unit direction vector as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionVector {
    /// X component
    pub x: i32,
    /// Y component
    pub y: i32,
}

impl From<Direction> for DirectionVector {
    fn from(direction: Direction) -> Self {
        let (x, y) = direction.vector();
        Self { x, y }
    }
}

impl TryFrom<DirectionVector> for Direction {
    type Error = InvalidDirection;

    fn try_from(value: DirectionVector) -> Result<Self, Self::Error> {
        Direction::from_vector(value.x, value.y).ok_or(InvalidDirection { x: value.x, y: value.y })
    }
}

/// A vector that is not one of the four unit directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("direction ({x}, {y}) is not a unit axis vector")]
pub struct InvalidDirection {
    /// Rejected X component
    pub x: i32,
    /// Rejected Y component
    pub y: i32,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted.
    RoomJoined {
        /// Room joined
        room_code: String,
        /// Identifier assigned to the joiner
        participant_id: ParticipantId,
        /// Roster including the joiner
        participants: Vec<ParticipantView>,
        /// Current room state
        snapshot: RoomSnapshot,
    },

    /// Join refused, room at capacity.
    RoomFull {
        /// Room that refused the join
        room_code: String,
    },

    /// Someone else joined.
    ParticipantJoined {
        /// The newcomer
        participant: ParticipantView,
    },

    /// Someone else left.
    ParticipantLeft {
        /// Who left
        participant_id: ParticipantId,
    },

    /// Round started.
    GameStarted {
        /// State at tick 0
        snapshot: RoomSnapshot,
    },

    /// State after a tick.
    GameUpdate {
        /// State after the step
        snapshot: RoomSnapshot,
    },

    /// Round over.
    GameEnded {
        /// Final standings
        ranking: Vec<RankingEntry>,
        /// Final state
        snapshot: RoomSnapshot,
    },

    /// Cooldown elapsed, room is waiting again.
    RoomReset {
        /// Cleared room state
        snapshot: RoomSnapshot,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp
        timestamp: u64,
        /// Server time in milliseconds
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is stopping
        reason: String,
    },
}

/// Room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Accepting participants, no round running.
    Waiting,
    /// Round in progress.
    Playing,
    /// Round over, cooling down.
    Finished,
}

/// Roster entry as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Last-known score.
    pub score: u32,
    /// Last-known alive flag.
    pub alive: bool,
    /// First in the roster.
    pub host: bool,
}

/// Room state plus the simulation snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room code.
    pub room_code: String,
    /// Lifecycle state.
    pub room_state: RoomState,
    /// Steps taken this round.
    pub tick: u32,
    /// Roster in join order.
    pub participants: Vec<ParticipantView>,
    /// Agents in join order.
    pub agents: Vec<AgentView>,
    /// Consumables on the field.
    pub consumables: Vec<ConsumableView>,
    /// Arena size in units.
    pub arena_bounds: ArenaBounds,
    /// Cell size in units.
    pub cell_size: i32,
    /// Hex SHA-256 of the simulation state.
    pub state_hash: String,
}

impl RoomSnapshot {
    /// Combine room-level data with a simulation snapshot.
    pub fn new(
        room_code: &str,
        room_state: RoomState,
        participants: Vec<ParticipantView>,
        arena: ArenaSnapshot,
    ) -> Self {
        Self {
            room_code: room_code.to_string(),
            room_state,
            tick: arena.tick,
            participants,
            agents: arena.agents,
            consumables: arena.consumables,
            arena_bounds: arena.arena_bounds,
            cell_size: arena.cell_size,
            state_hash: arena.state_hash,
        }
    }
}

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Participant identifier.
    pub participant_id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: u32,
    /// 1-based rank.
    pub rank: u32,
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message or bad field value.
    InvalidInput,
    /// Room was destroyed while joining.
    RoomClosed,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an `error` message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}
