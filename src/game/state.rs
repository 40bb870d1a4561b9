//! Game State Definitions
//!
//! Arena, agents and consumables for one room's simulation.
//! Agents are kept in join order; that order is the iteration order of
//! every step phase.

use std::collections::VecDeque;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::cell::{Cell, Direction};
use crate::core::hash::StateHasher;

// =============================================================================
// PARTICIPANT ID
// =============================================================================

/// Opaque participant identifier (UUID v4).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub uuid::Uuid);

impl ParticipantId {
    /// Fresh random id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.as_bytes()[..4])
    }
}

impl fmt::Debug for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantId({})", self.short())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ARENA
// =============================================================================

/// Fixed rectangular playing field, measured in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena {
    /// Number of columns
    pub columns: u32,
    /// Number of rows
    pub rows: u32,
    /// Size of one cell in arena units
    pub cell_size: i32,
}

impl Arena {
    /// Build an arena from its size in units. Partial cells are dropped.
    pub fn from_units(width: u32, height: u32, cell_size: i32) -> Self {
        let cell = cell_size.max(1) as u32;
        Self {
            columns: width / cell,
            rows: height / cell,
            cell_size: cell as i32,
        }
    }

    /// Is the cell inside `[0, columns) x [0, rows)`?
    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as u32) < self.columns && (cell.y as u32) < self.rows
    }

    /// Width in arena units.
    pub fn width(&self) -> u32 {
        self.columns * self.cell_size as u32
    }

    /// Height in arena units.
    pub fn height(&self) -> u32 {
        self.rows * self.cell_size as u32
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::from_units(800, 600, 20)
    }
}

// =============================================================================
// AGENT
// =============================================================================

/// The snake controlled by one participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    /// Owning participant
    pub id: ParticipantId,

    /// Occupied cells, head first
    pub body: VecDeque<Cell>,

    /// Vector applied on the last step
    pub direction: Direction,

    /// Vector to apply on the next step
    pub pending_direction: Direction,

    /// Cumulative score
    pub score: u32,

    /// Still moving?
    pub alive: bool,
}

impl Agent {
    /// New one-cell agent facing `direction`.
    pub fn new(id: ParticipantId, head: Cell, direction: Direction) -> Self {
        let mut body = VecDeque::with_capacity(16);
        body.push_back(head);
        Self {
            id,
            body,
            direction,
            pending_direction: direction,
            score: 0,
            alive: true,
        }
    }

    /// Head cell.
    #[inline]
    pub fn head(&self) -> Option<Cell> {
        self.body.front().copied()
    }

    /// Body length in cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Never true for a live agent.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Does any body cell equal `cell`?
    pub fn occupies(&self, cell: Cell) -> bool {
        self.body.iter().any(|c| *c == cell)
    }

    /// Hash this agent's state.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_bytes(self.id.as_bytes());
        hasher.update_u8(self.direction.as_u8());
        hasher.update_u8(self.pending_direction.as_u8());
        hasher.update_u32(self.score);
        hasher.update_bool(self.alive);
        hasher.update_u32(self.body.len() as u32);
        for cell in &self.body {
            hasher.update_cell(*cell);
        }
    }
}

// =============================================================================
// CONSUMABLES
// =============================================================================

/// Presentation tag for a consumable. Has no effect on the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ConsumableKind {
    /// Tag 0
    Apple = 0,
    /// Tag 1
    Cherry = 1,
    /// Tag 2
    Grape = 2,
    /// Tag 3
    Star = 3,
}

impl ConsumableKind {
    /// Number of distinct tags.
    pub const COUNT: u32 = 4;

    /// Get kind from index (0-3).
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(ConsumableKind::Apple),
            1 => Some(ConsumableKind::Cherry),
            2 => Some(ConsumableKind::Grape),
            3 => Some(ConsumableKind::Star),
            _ => None,
        }
    }
}

impl From<ConsumableKind> for u8 {
    fn from(kind: ConsumableKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for ConsumableKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value as u32).ok_or_else(|| format!("unknown consumable kind {value}"))
    }
}

/// A collectible item on one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumable {
    /// Position
    pub cell: Cell,
    /// Presentation tag
    pub kind: ConsumableKind,
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A point in arena units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// X in units
    pub x: i32,
    /// Y in units
    pub y: i32,
}

/// Agent as seen on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    /// Owning participant
    pub participant_id: ParticipantId,
    /// Body in arena units, head first
    pub body_cells: Vec<Point>,
    /// Alive flag
    pub alive: bool,
    /// Score
    pub score: u32,
}

/// Consumable as seen on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableView {
    /// X in units
    pub x: i32,
    /// Y in units
    pub y: i32,
    /// Presentation tag
    #[serde(rename = "type")]
    pub kind: ConsumableKind,
}

/// Arena size in units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaBounds {
    /// Width in units
    pub width: u32,
    /// Height in units
    pub height: u32,
}

/// Full simulation state after a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaSnapshot {
    /// Steps taken since the last reset
    pub tick: u32,
    /// Agents in join order
    pub agents: Vec<AgentView>,
    /// Consumables currently on the field
    pub consumables: Vec<ConsumableView>,
    /// Arena size
    pub arena_bounds: ArenaBounds,
    /// Cell size in units
    pub cell_size: i32,
    /// Terminal flag
    pub round_over: bool,
    /// Hex SHA-256 of the simulation state
    pub state_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_from_units() {
        let arena = Arena::from_units(800, 600, 20);
        assert_eq!(arena.columns, 40);
        assert_eq!(arena.rows, 30);
        assert_eq!(arena.width(), 800);
        assert_eq!(arena.height(), 600);
    }

    #[test]
    fn test_arena_contains() {
        let arena = Arena::default();
        assert!(arena.contains(Cell::new(0, 0)));
        assert!(arena.contains(Cell::new(39, 29)));
        assert!(!arena.contains(Cell::new(40, 0)));
        assert!(!arena.contains(Cell::new(0, 30)));
        assert!(!arena.contains(Cell::new(-1, 5)));
        assert!(!arena.contains(Cell::new(5, -1)));
    }

    #[test]
    fn test_new_agent() {
        let id = ParticipantId::from_bytes([1; 16]);
        let agent = Agent::new(id, Cell::new(5, 15), Direction::Right);

        assert_eq!(agent.head(), Some(Cell::new(5, 15)));
        assert_eq!(agent.len(), 1);
        assert_eq!(agent.pending_direction, Direction::Right);
        assert!(agent.alive);
        assert!(agent.occupies(Cell::new(5, 15)));
        assert!(!agent.occupies(Cell::new(6, 15)));
    }

    #[test]
    fn test_consumable_kind_wire_format() {
        let json = serde_json::to_string(&ConsumableKind::Grape).unwrap();
        assert_eq!(json, "2");

        let parsed: ConsumableKind = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, ConsumableKind::Star);

        assert!(serde_json::from_str::<ConsumableKind>("4").is_err());
    }

    #[test]
    fn test_consumable_view_tag_field_is_type() {
        let view = ConsumableView { x: 40, y: 60, kind: ConsumableKind::Cherry };
        assert_eq!(serde_json::to_string(&view).unwrap(), r#"{"x":40,"y":60,"type":1}"#);
    }

    #[test]
    fn test_participant_id_serializes_as_uuid_string() {
        let id = ParticipantId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abababab-abab-abab-abab-abababababab\"");
        assert_eq!(id.short(), "abababab");
    }
}
