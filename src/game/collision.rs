//! Collision Detection
//!
//! Grid-occupancy collision rules. The pass is evaluated once per tick after
//! every head has moved, over the post-move bodies, so the outcome does not
//! depend on the order agents are visited in.

use crate::core::cell::Cell;
use crate::game::events::EliminationCause;
use crate::game::state::{Agent, Arena};

/// An agent that must be marked dead this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elimination {
    /// Index into the agent list
    pub index: usize,
    /// What it hit
    pub cause: EliminationCause,
}

/// Check a single head against the rules.
///
/// `others` are the bodies of every other agent that moved this tick,
/// including ones that are about to die.
pub fn check_head<'a, I>(arena: &Arena, agent: &Agent, others: I) -> Option<EliminationCause>
where
    I: IntoIterator<Item = &'a Agent>,
{
    let head = agent.head()?;

    if !arena.contains(head) {
        return Some(EliminationCause::Wall);
    }

    if agent.body.iter().skip(1).any(|c| *c == head) {
        return Some(EliminationCause::SelfCollision);
    }

    others
        .into_iter()
        .find(|other| other.occupies(head))
        .map(|other| EliminationCause::Agent(other.id))
}

/// Run the collision pass.
///
/// `moved[i]` is true for agents that were alive at the start of the tick.
/// Agents that died on earlier ticks are neither checked nor collided with.
pub fn find_eliminations(arena: &Arena, agents: &[Agent], moved: &[bool]) -> Vec<Elimination> {
    let mut eliminations = Vec::new();

    for (index, agent) in agents.iter().enumerate() {
        if !moved.get(index).copied().unwrap_or(false) {
            continue;
        }

        let others = agents
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index && moved.get(*j).copied().unwrap_or(false))
            .map(|(_, other)| other);

        if let Some(cause) = check_head(arena, agent, others) {
            eliminations.push(Elimination { index, cause });
        }
    }

    eliminations
}

/// Index of the first consumable-like item sitting on `cell`.
pub fn position_at<T, F>(items: &[T], cell: Cell, cell_of: F) -> Option<usize>
where
    F: Fn(&T) -> Cell,
{
    items.iter().position(|item| cell_of(item) == cell)
}
