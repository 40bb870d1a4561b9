//! Authoritative Simulation Tick
//!
//! One room's arena advanced one step at a time. Tick-count based: wall
//! clock never enters here, so a seeded simulation fed the same intents
//! produces the same snapshots.

use serde::{Serialize, Deserialize};

use crate::core::cell::{Cell, Direction};
use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::rng::DeterministicRng;
use crate::game::collision::find_eliminations;
use crate::game::events::GameEvent;
use crate::game::food::{replenish, take_at};
use crate::game::state::{
    Agent, AgentView, Arena, ArenaBounds, ArenaSnapshot, Consumable, ConsumableView,
    ParticipantId, Point,
};

/// Result of a tick.
#[derive(Debug, Clone)]
pub struct TickResult {
    /// State after the step
    pub snapshot: ArenaSnapshot,
    /// Events generated this tick
    pub events: Vec<GameEvent>,
}

impl TickResult {
    /// Whether the terminal flag is set.
    pub fn round_over(&self) -> bool {
        self.snapshot.round_over
    }
}

/// Configuration for the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Arena width in units
    pub width: u32,
    /// Arena height in units
    pub height: u32,
    /// Cell size in units (one step = one cell)
    pub cell_size: i32,
    /// Consumables kept on the field while playing
    pub min_consumables: usize,
    /// Score per consumable
    pub food_reward: u32,
    /// X of the first agent's head, in units
    pub start_x: i32,
    /// Horizontal distance between agents, in units
    pub start_spacing: i32,
    /// Y of every agent's head, in units
    pub start_y: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            cell_size: 20,
            min_consumables: 3,
            food_reward: 10,
            start_x: 100,
            start_spacing: 150,
            start_y: 300,
        }
    }
}

impl SimulationConfig {
    /// Arena described by this configuration.
    pub fn arena(&self) -> Arena {
        Arena::from_units(self.width, self.height, self.cell_size)
    }

    /// Starting head cell for the agent at `index` in join order.
    ///
    /// Unit offsets are floored onto the grid.
    pub fn spawn_cell(&self, index: usize) -> Cell {
        let cell = self.cell_size.max(1);
        let x = self.start_x + index as i32 * self.start_spacing;
        Cell::new(x.div_euclid(cell), self.start_y.div_euclid(cell))
    }

    /// Number of agents whose spawn cells land inside the arena.
    pub fn max_agents(&self) -> usize {
        let arena = self.arena();
        (0..=arena.columns as usize)
            .take_while(|&index| arena.contains(self.spawn_cell(index)))
            .count()
    }
}

/// Simulation state for one room.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
    arena: Arena,
    /// Join order
    agents: Vec<Agent>,
    consumables: Vec<Consumable>,
    rng: DeterministicRng,
    tick: u32,
    round_over: bool,
    /// Agents at the last reset; decides the end rule
    starting_agents: usize,
}

impl Simulation {
    /// Create a simulation at rest.
    pub fn new(config: SimulationConfig, seed: u64) -> Self {
        let arena = config.arena();
        Self {
            config,
            arena,
            agents: Vec::new(),
            consumables: Vec::new(),
            rng: DeterministicRng::new(seed),
            tick: 0,
            round_over: false,
            starting_agents: 0,
        }
    }

    /// Replace the PRNG state.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = DeterministicRng::new(seed);
    }

    /// Start a fresh round with one agent per id, in the given order.
    pub fn reset(&mut self, participant_ids: &[ParticipantId]) {
        self.clear();

        self.agents = participant_ids
            .iter()
            .enumerate()
            .map(|(index, id)| Agent::new(*id, self.config.spawn_cell(index), Direction::Right))
            .collect();
        self.starting_agents = self.agents.len();

        replenish(
            &mut self.consumables,
            &mut self.rng,
            &self.arena,
            self.config.min_consumables,
        );
    }

    /// Back to rest: no agents, no consumables.
    pub fn clear(&mut self) {
        self.agents.clear();
        self.consumables.clear();
        self.tick = 0;
        self.round_over = false;
        self.starting_agents = 0;
    }

    /// Queue a direction for the next step.
    ///
    /// Returns false (and changes nothing) for unknown or dead agents and
    /// for the exact reverse of the current direction.
    pub fn apply_intent(&mut self, participant_id: &ParticipantId, direction: Direction) -> bool {
        let Some(agent) = self.agents.iter_mut().find(|a| a.id == *participant_id) else {
            return false;
        };

        if !agent.alive || direction == agent.direction.opposite() {
            return false;
        }

        agent.pending_direction = direction;
        true
    }

    /// Drop an agent. Returns whether it existed.
    pub fn remove_agent(&mut self, participant_id: &ParticipantId) -> bool {
        let before = self.agents.len();
        self.agents.retain(|a| a.id != *participant_id);
        self.agents.len() != before
    }

    /// Advance exactly one tick.
    pub fn step(&mut self) -> TickResult {
        if self.round_over {
            return TickResult {
                snapshot: self.snapshot(),
                events: Vec::new(),
            };
        }

        self.tick += 1;
        let tick = self.tick;
        let mut events = Vec::new();

        let moved: Vec<bool> = self.agents.iter().map(|a| a.alive).collect();

        // 1-2. Commit pending direction and advance the head
        for agent in self.agents.iter_mut().filter(|a| a.alive) {
            agent.direction = agent.pending_direction;
            if let Some(head) = agent.head() {
                agent.body.push_front(head.step(agent.direction));
            }
        }

        // 3. Eat or trim, in join order
        for agent in self.agents.iter_mut().filter(|a| a.alive) {
            let Some(head) = agent.head() else { continue };

            match take_at(&mut self.consumables, head) {
                Some(eaten) => {
                    agent.score = agent.score.saturating_add(self.config.food_reward);
                    events.push(GameEvent::consumable_eaten(tick, agent.id, eaten.kind, agent.score));
                }
                None => {
                    agent.body.pop_back();
                }
            }
        }

        // 4. Collisions against post-move bodies
        for elimination in find_eliminations(&self.arena, &self.agents, &moved) {
            let agent = &mut self.agents[elimination.index];
            agent.alive = false;
            events.push(GameEvent::agent_eliminated(tick, agent.id, elimination.cause));
        }

        // 5. End condition
        let alive = self.alive_count();
        let ended = if self.starting_agents >= 2 { alive <= 1 } else { alive == 0 };
        if ended {
            self.round_over = true;
            let survivor = self.agents.iter().find(|a| a.alive).map(|a| a.id);
            events.push(GameEvent::round_over(tick, survivor));
        }

        // 6. Replenish
        if let Some(spawned) = replenish(
            &mut self.consumables,
            &mut self.rng,
            &self.arena,
            self.config.min_consumables,
        ) {
            events.push(GameEvent::consumable_spawned(tick, spawned.cell, spawned.kind));
        }

        TickResult {
            snapshot: self.snapshot(),
            events,
        }
    }

    /// Current state in wire shape.
    pub fn snapshot(&self) -> ArenaSnapshot {
        let size = self.arena.cell_size;
        let to_point = |cell: &Cell| {
            let (x, y) = cell.to_units(size);
            Point { x, y }
        };

        ArenaSnapshot {
            tick: self.tick,
            agents: self
                .agents
                .iter()
                .map(|a| AgentView {
                    participant_id: a.id,
                    body_cells: a.body.iter().map(to_point).collect(),
                    alive: a.alive,
                    score: a.score,
                })
                .collect(),
            consumables: self
                .consumables
                .iter()
                .map(|c| {
                    let (x, y) = c.cell.to_units(size);
                    ConsumableView { x, y, kind: c.kind }
                })
                .collect(),
            arena_bounds: ArenaBounds {
                width: self.arena.width(),
                height: self.arena.height(),
            },
            cell_size: size,
            round_over: self.round_over,
            state_hash: hex::encode(self.compute_hash()),
        }
    }

    /// Hash of everything that influences future steps.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.tick, |hasher| {
            hasher.update_bool(self.round_over);
            hasher.update_u32(self.starting_agents as u32);

            hasher.update_u32(self.agents.len() as u32);
            for agent in &self.agents {
                agent.hash_into(hasher);
            }

            hasher.update_u32(self.consumables.len() as u32);
            for consumable in &self.consumables {
                hasher.update_cell(consumable.cell);
                hasher.update_u8(consumable.kind as u8);
            }

            let [s0, s1] = self.rng.state();
            hasher.update_u64(s0);
            hasher.update_u64(s1);
        })
    }

    /// Look up an agent.
    pub fn agent(&self, participant_id: &ParticipantId) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == *participant_id)
    }

    /// All agents in join order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Consumables on the field.
    pub fn consumables(&self) -> &[Consumable] {
        &self.consumables
    }

    /// Number of live agents.
    pub fn alive_count(&self) -> usize {
        self.agents.iter().filter(|a| a.alive).count()
    }

    /// Steps since the last reset.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Terminal flag.
    pub fn is_round_over(&self) -> bool {
        self.round_over
    }

    /// Arena bounds.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Configuration in use.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Overwrite an agent's body and heading.
    #[cfg(test)]
    pub(crate) fn place_agent(&mut self, participant_id: &ParticipantId, body: &[Cell], direction: Direction) {
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id == *participant_id) {
            agent.body = body.iter().copied().collect();
            agent.direction = direction;
            agent.pending_direction = direction;
        }
    }

    /// Put a consumable on the field.
    #[cfg(test)]
    pub(crate) fn place_consumable(&mut self, consumable: Consumable) {
        self.consumables.push(consumable);
    }

    /// Set an agent's score.
    #[cfg(test)]
    pub(crate) fn set_score(&mut self, participant_id: &ParticipantId, score: u32) {
        if let Some(agent) = self.agents.iter_mut().find(|a| a.id == *participant_id) {
            agent.score = score;
        }
    }
}
