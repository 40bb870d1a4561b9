//! Game Events
//!
//! Notable things that happened during a step, in the order they happened.
//! Rooms log them; clients only ever see snapshots.

use serde::{Serialize, Deserialize};

use crate::core::cell::Cell;
use crate::game::state::{ConsumableKind, ParticipantId};

/// Why an agent stopped moving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", content = "other", rename_all = "snake_case")]
pub enum EliminationCause {
    /// Head left the arena
    Wall,
    /// Head ran into its own body
    SelfCollision,
    /// Head ran into another agent's body
    Agent(ParticipantId),
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// An agent ate a consumable
    ConsumableEaten {
        /// Who ate it
        participant_id: ParticipantId,
        /// Tag of the eaten consumable
        kind: ConsumableKind,
        /// Score after the reward
        new_score: u32,
    },

    /// A consumable was placed
    ConsumableSpawned {
        /// Where it landed
        cell: Cell,
        /// Presentation tag
        kind: ConsumableKind,
    },

    /// An agent died
    AgentEliminated {
        /// Who died
        participant_id: ParticipantId,
        /// What killed them
        cause: EliminationCause,
    },

    /// Terminal flag was raised
    RoundOver {
        /// Last agent alive, if any
        survivor: Option<ParticipantId>,
    },
}

/// A game event stamped with its tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Agent ate a consumable.
    pub fn consumable_eaten(
        tick: u32,
        participant_id: ParticipantId,
        kind: ConsumableKind,
        new_score: u32,
    ) -> Self {
        Self {
            tick,
            data: GameEventData::ConsumableEaten { participant_id, kind, new_score },
        }
    }

    /// Consumable placed.
    pub fn consumable_spawned(tick: u32, cell: Cell, kind: ConsumableKind) -> Self {
        Self {
            tick,
            data: GameEventData::ConsumableSpawned { cell, kind },
        }
    }

    /// Agent died.
    pub fn agent_eliminated(tick: u32, participant_id: ParticipantId, cause: EliminationCause) -> Self {
        Self {
            tick,
            data: GameEventData::AgentEliminated { participant_id, cause },
        }
    }

    /// Round is over.
    pub fn round_over(tick: u32, survivor: Option<ParticipantId>) -> Self {
        Self {
            tick,
            data: GameEventData::RoundOver { survivor },
        }
    }

    /// Participant this event is about, if any.
    pub fn participant(&self) -> Option<ParticipantId> {
        match &self.data {
            GameEventData::ConsumableEaten { participant_id, .. } => Some(*participant_id),
            GameEventData::AgentEliminated { participant_id, .. } => Some(*participant_id),
            GameEventData::RoundOver { survivor } => *survivor,
            GameEventData::ConsumableSpawned { .. } => None,
        }
    }
}
