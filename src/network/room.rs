//! Room Lifecycle
//!
//! A room owns a roster, one simulation and the timers that drive it.
//! Rooms move `waiting -> playing -> finished -> waiting`; every mutation
//! happens while holding the room's mutex, including ticks.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn, debug, trace};

use crate::core::cell::Direction;
use crate::core::rng::derive_round_seed;
use crate::game::events::GameEventData;
use crate::game::state::ParticipantId;
use crate::game::tick::{Simulation, SimulationConfig, TickResult};
use crate::network::protocol::{
    ParticipantView, RankingEntry, RoomSnapshot, RoomState, ServerMessage,
};
use crate::network::scheduler::{spawn_cooldown, spawn_tick_loop};
use crate::persistence::{MatchMetadata, MatchRecord, MatchRecorder, MULTIPLAYER_MODE};

/// A room shared between the directory and its own timers.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Configuration for a room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum roster size.
    pub capacity: usize,
    /// Participants needed to start.
    pub min_participants: usize,
    /// Simulation steps per second.
    pub tick_rate: u32,
    /// Time spent in `finished` before returning to `waiting`.
    pub reset_cooldown: Duration,
    /// Arena and scoring constants.
    pub simulation: SimulationConfig,
    /// Fixed entropy for round seeds (random when unset).
    pub seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            min_participants: 1,
            tick_rate: crate::TICK_RATE,
            reset_cooldown: Duration::from_secs(10),
            simulation: SimulationConfig::default(),
            seed: None,
        }
    }
}

impl RoomConfig {
    /// Period between two steps.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

/// A participant in a room's roster.
#[derive(Debug)]
pub struct Participant {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Display name.
    pub name: String,
    /// Last-known score.
    pub score: u32,
    /// Last-known alive flag.
    pub alive: bool,
    /// Has an agent in the current round.
    in_round: bool,
    /// Outbound channel owned by the connection.
    sender: mpsc::Sender<ServerMessage>,
}

impl Participant {
    /// Took part in the current (or just finished) round.
    pub fn in_round(&self) -> bool {
        self.in_round
    }

    /// Queue a message without waiting. Full or closed channels drop it.
    fn send(&self, message: ServerMessage) {
        if let Err(e) = self.sender.try_send(message) {
            debug!("Dropped message for {}: {}", self.id.short(), e);
        }
    }
}

/// Data returned to a successful joiner.
#[derive(Debug, Clone)]
pub struct JoinAck {
    /// Assigned participant id.
    pub participant_id: ParticipantId,
    /// Roster after the join.
    pub participants: Vec<ParticipantView>,
    /// Room snapshot after the join.
    pub snapshot: RoomSnapshot,
}

/// Room errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Roster is at capacity.
    #[error("Room is full")]
    RoomFull,

    /// Room was destroyed.
    #[error("Room is closed")]
    Closed,
}

/// A game room.
pub struct Room {
    code: String,
    config: RoomConfig,
    state: RoomState,
    /// Join order; the first entry is the host
    participants: Vec<Participant>,
    simulation: Simulation,
    recorder: Arc<dyn MatchRecorder>,
    /// Rounds started so far
    round: u32,
    /// Bumped whenever timers are stopped; stale tasks compare against it
    epoch: u64,
    scheduler: Option<JoinHandle<()>>,
    cooldown: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
    last_tick_elapsed: Duration,
    closed: bool,
    this: Weak<Mutex<Room>>,
}

impl Room {
    /// Create a room behind its shared handle.
    pub fn new_shared(
        code: impl Into<String>,
        config: RoomConfig,
        recorder: Arc<dyn MatchRecorder>,
    ) -> SharedRoom {
        let code = code.into();
        Arc::new_cyclic(|this| {
            let simulation = Simulation::new(config.simulation.clone(), 0);
            Mutex::new(Room {
                code,
                config,
                state: RoomState::Waiting,
                participants: Vec::new(),
                simulation,
                recorder,
                round: 0,
                epoch: 0,
                scheduler: None,
                cooldown: None,
                started_at: None,
                last_tick_elapsed: Duration::ZERO,
                closed: false,
                this: this.clone(),
            })
        })
    }

    /// Room code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Lifecycle state.
    pub fn state(&self) -> RoomState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Roster in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Look up a roster entry.
    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == *id)
    }

    /// Roster size.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// No participants left.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Destroyed rooms accept nothing.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// First participant in the roster.
    pub fn host(&self) -> Option<ParticipantId> {
        self.participants.first().map(|p| p.id)
    }

    /// The owned simulation.
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Rounds started so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Is a tick loop running?
    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Is a reset pending?
    pub fn has_cooldown(&self) -> bool {
        self.cooldown.is_some()
    }

    /// Wall time between the last two ticks.
    pub fn last_tick_elapsed(&self) -> Duration {
        self.last_tick_elapsed
    }

    /// Roster as seen on the wire.
    pub fn participant_views(&self) -> Vec<ParticipantView> {
        self.participants
            .iter()
            .enumerate()
            .map(|(idx, p)| ParticipantView {
                id: p.id,
                name: p.name.clone(),
                score: p.score,
                alive: p.alive,
                host: idx == 0,
            })
            .collect()
    }

    /// Room state plus the simulation snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::new(
            &self.code,
            self.state,
            self.participant_views(),
            self.simulation.snapshot(),
        )
    }

    /// Add someone to the roster.
    ///
    /// The joiner receives `room_joined` and everyone else
    /// `participant_joined`. Joining mid-round is allowed; the newcomer
    /// plays from the next round.
    pub fn add_participant(
        &mut self,
        id: ParticipantId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinAck, RoomError> {
        if self.closed {
            return Err(RoomError::Closed);
        }

        if self.participants.len() >= self.config.capacity {
            return Err(RoomError::RoomFull);
        }

        self.participants.push(Participant {
            id,
            name,
            score: 0,
            alive: true,
            in_round: false,
            sender,
        });

        let participants = self.participant_views();
        let snapshot = self.snapshot();

        if let Some(view) = participants.last() {
            self.broadcast_except(&id, ServerMessage::ParticipantJoined { participant: view.clone() });
        }
        if let Some(joiner) = self.participant(&id) {
            joiner.send(ServerMessage::RoomJoined {
                room_code: self.code.clone(),
                participant_id: id,
                participants: participants.clone(),
                snapshot: snapshot.clone(),
            });
        }

        info!(
            "Room {}: {} joined ({}/{})",
            self.code,
            id.short(),
            self.participants.len(),
            self.config.capacity
        );

        Ok(JoinAck {
            participant_id: id,
            participants,
            snapshot,
        })
    }

    /// Drop someone from the roster. Returns whether they were present.
    ///
    /// Mid-round the agent is removed and ticking continues. A room left
    /// empty is closed.
    pub fn remove_participant(&mut self, id: &ParticipantId) -> bool {
        let Some(idx) = self.participants.iter().position(|p| p.id == *id) else {
            return false;
        };
        self.participants.remove(idx);

        if self.state == RoomState::Playing {
            self.simulation.remove_agent(id);
        }

        info!("Room {}: {} left ({} remaining)", self.code, id.short(), self.participants.len());

        if self.participants.is_empty() {
            self.close();
        } else {
            self.broadcast(ServerMessage::ParticipantLeft { participant_id: *id });
        }

        true
    }

    /// Forward a heading change to the simulation.
    ///
    /// Ignored outside `playing`.
    pub fn apply_intent(&mut self, id: &ParticipantId, direction: Direction) -> bool {
        if self.state != RoomState::Playing {
            debug!("Room {}: intent from {} ignored in {:?}", self.code, id.short(), self.state);
            return false;
        }
        self.simulation.apply_intent(id, direction)
    }

    /// Start a round on behalf of `requester` and spawn the tick loop.
    ///
    /// Ignored unless the room is waiting and has enough participants.
    pub fn start_game(&mut self, requester: &ParticipantId) -> bool {
        if self.participant(requester).is_none() {
            debug!("Room {}: start from non-member {} ignored", self.code, requester.short());
            return false;
        }

        if !self.begin_playing() {
            return false;
        }

        self.epoch += 1;
        self.scheduler = Some(spawn_tick_loop(
            self.this.clone(),
            self.epoch,
            self.config.tick_interval(),
        ));
        true
    }

    /// Enter `playing`: seed, reset the simulation, announce.
    ///
    /// Does not spawn the tick loop.
    pub(crate) fn begin_playing(&mut self) -> bool {
        if self.closed || self.state != RoomState::Waiting {
            debug!("Room {}: start ignored in {:?}", self.code, self.state);
            return false;
        }

        if self.participants.len() < self.config.min_participants {
            debug!(
                "Room {}: start ignored with {} of {} participants",
                self.code,
                self.participants.len(),
                self.config.min_participants
            );
            return false;
        }

        self.round += 1;
        let entropy = self
            .config
            .seed
            .unwrap_or_else(|| uuid::Uuid::new_v4().as_u128() as u64);
        let seed = derive_round_seed(&self.code, self.round, entropy);

        let ids: Vec<ParticipantId> = self.participants.iter().map(|p| p.id).collect();
        self.simulation.reseed(seed);
        self.simulation.reset(&ids);

        for participant in &mut self.participants {
            participant.in_round = true;
            participant.score = 0;
            participant.alive = true;
        }

        self.state = RoomState::Playing;
        self.started_at = Some(Instant::now());

        info!(
            "Room {}: round {} started with {} participants (seed {:016x})",
            self.code,
            self.round,
            ids.len(),
            seed
        );

        self.broadcast(ServerMessage::GameStarted { snapshot: self.snapshot() });
        true
    }

    /// Advance the simulation one step and broadcast the result.
    ///
    /// Returns `None` outside `playing`.
    pub fn run_tick(&mut self) -> Option<TickResult> {
        if self.state != RoomState::Playing {
            return None;
        }

        let result = self.simulation.step();

        for participant in &mut self.participants {
            if let Some(agent) = self.simulation.agent(&participant.id) {
                participant.score = agent.score;
                participant.alive = agent.alive;
            }
        }

        for event in &result.events {
            match &event.data {
                GameEventData::AgentEliminated { participant_id, cause } => {
                    debug!(
                        "Room {}: {} eliminated at tick {} ({:?})",
                        self.code,
                        participant_id.short(),
                        event.tick,
                        cause
                    );
                }
                other => trace!("Room {}: tick {} {:?}", self.code, event.tick, other),
            }
        }

        self.broadcast(ServerMessage::GameUpdate { snapshot: self.snapshot() });

        if result.round_over() {
            self.finish();
        }

        Some(result)
    }

    /// Leave `playing`: stop ticking, rank, announce, persist, schedule reset.
    pub fn finish(&mut self) {
        if self.state != RoomState::Playing {
            return;
        }

        self.stop_scheduler();
        self.state = RoomState::Finished;

        let ranking = self.ranking();
        let ticks = self.simulation.tick();
        let duration_seconds = self.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0);

        info!(
            "Room {}: round {} ended after {} ticks, winner {}",
            self.code,
            self.round,
            ticks,
            ranking.first().map(|r| r.participant_id.short()).unwrap_or_else(|| "-".to_string())
        );

        self.broadcast(ServerMessage::GameEnded {
            ranking: ranking.clone(),
            snapshot: self.snapshot(),
        });

        self.persist(&ranking, ticks, duration_seconds);

        self.cooldown = Some(spawn_cooldown(
            self.this.clone(),
            self.epoch,
            self.config.reset_cooldown,
        ));
    }

    /// Round participants still present, by descending score.
    ///
    /// Ties keep roster order.
    pub fn ranking(&self) -> Vec<RankingEntry> {
        let mut ranked: Vec<&Participant> = self.participants.iter().filter(|p| p.in_round).collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));

        ranked
            .into_iter()
            .enumerate()
            .map(|(idx, p)| RankingEntry {
                participant_id: p.id,
                name: p.name.clone(),
                score: p.score,
                rank: idx as u32 + 1,
            })
            .collect()
    }

    /// Leave `finished`: clear the arena and zero the roster.
    pub fn reset_room(&mut self) {
        if self.state != RoomState::Finished {
            return;
        }

        self.cooldown = None;
        self.simulation.clear();
        self.state = RoomState::Waiting;

        for participant in &mut self.participants {
            participant.score = 0;
            participant.alive = true;
            participant.in_round = false;
        }

        info!("Room {}: reset, waiting for players", self.code);
        self.broadcast(ServerMessage::RoomReset { snapshot: self.snapshot() });
    }

    /// Destroy the room. No timer touches it after this returns.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.stop_scheduler();
        if let Some(handle) = self.cooldown.take() {
            handle.abort();
        }
        self.simulation.clear();

        info!("Room {}: closed", self.code);
    }

    /// Queue a message for everyone.
    pub fn broadcast(&self, message: ServerMessage) {
        for participant in &self.participants {
            participant.send(message.clone());
        }
    }

    /// Queue a message for everyone but `skip`.
    pub fn broadcast_except(&self, skip: &ParticipantId, message: ServerMessage) {
        for participant in self.participants.iter().filter(|p| p.id != *skip) {
            participant.send(message.clone());
        }
    }

    /// Whether a timer spawned at `epoch` may still act.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        !self.closed && self.epoch == epoch
    }

    pub(crate) fn set_last_tick_elapsed(&mut self, elapsed: Duration) {
        self.last_tick_elapsed = elapsed;
    }

    fn stop_scheduler(&mut self) {
        self.epoch += 1;
        if let Some(handle) = self.scheduler.take() {
            handle.abort();
        }
    }

    fn persist(&self, ranking: &[RankingEntry], ticks: u32, duration_seconds: u64) {
        if ranking.is_empty() {
            return;
        }

        let finished_at = chrono::Utc::now();
        let records: Vec<MatchRecord> = ranking
            .iter()
            .map(|entry| MatchRecord {
                participant_id: entry.participant_id,
                display_name: entry.name.clone(),
                mode: MULTIPLAYER_MODE.to_string(),
                score: entry.score,
                duration_seconds,
                finished_at,
                metadata: MatchMetadata {
                    room_code: self.code.clone(),
                    rank: entry.rank,
                    ticks,
                    participants: ranking.len(),
                },
            })
            .collect();

        let recorder = Arc::clone(&self.recorder);
        tokio::task::spawn_blocking(move || {
            for record in &records {
                if let Err(e) = recorder.record_match(record) {
                    warn!(
                        "Failed to record match for {} in room {}: {}",
                        record.participant_id.short(),
                        record.metadata.room_code,
                        e
                    );
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.abort();
        }
        if let Some(handle) = self.cooldown.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::Cell;
    use crate::persistence::MemoryRecorder;

    fn id(n: u8) -> ParticipantId {
        ParticipantId::from_bytes([n; 16])
    }

    fn quiet_config() -> RoomConfig {
        RoomConfig {
            simulation: SimulationConfig {
                min_consumables: 0,
                ..Default::default()
            },
            seed: Some(7),
            ..Default::default()
        }
    }

    fn new_room(config: RoomConfig) -> (SharedRoom, Arc<MemoryRecorder>) {
        let recorder = Arc::new(MemoryRecorder::new());
        (Room::new_shared("TEST", config, recorder.clone()), recorder)
    }

    fn join(room: &mut Room, n: u8) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(256);
        room.add_participant(id(n), format!("player{n}"), tx).unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Put participant 2's head onto participant 1's body on the next step.
    fn set_up_collision(room: &mut Room) {
        let sim = room.simulation_mut();
        sim.place_agent(&id(1), &[Cell::new(10, 10), Cell::new(9, 10), Cell::new(8, 10)], Direction::Right);
        sim.place_agent(&id(2), &[Cell::new(10, 9)], Direction::Down);
    }

    #[tokio::test]
    async fn test_add_remove_participant() {
        let (room, _) = new_room(RoomConfig::default());
        let mut room = room.lock().await;

        let mut rx1 = join(&mut room, 1);
        let _rx2 = join(&mut room, 2);
        assert_eq!(room.participant_count(), 2);
        assert_eq!(room.host(), Some(id(1)));

        let joined = drain(&mut rx1);
        assert!(matches!(joined[0], ServerMessage::RoomJoined { participant_id, .. } if participant_id == id(1)));
        assert!(matches!(&joined[1], ServerMessage::ParticipantJoined { participant } if participant.id == id(2)));

        assert!(room.remove_participant(&id(2)));
        assert!(!room.remove_participant(&id(2)));
        assert_eq!(room.participant_count(), 1);
        assert!(matches!(drain(&mut rx1)[0], ServerMessage::ParticipantLeft { participant_id } if participant_id == id(2)));
    }

    #[tokio::test]
    async fn test_room_full() {
        let (room, _) = new_room(RoomConfig { capacity: 2, ..Default::default() });
        let mut room = room.lock().await;

        join(&mut room, 1);
        join(&mut room, 2);

        let (tx, _rx) = mpsc::channel(10);
        let result = room.add_participant(id(3), "late".to_string(), tx);
        assert!(matches!(result, Err(RoomError::RoomFull)));
        assert_eq!(room.participant_count(), 2);
    }

    #[tokio::test]
    async fn test_host_passes_on_leave() {
        let (room, _) = new_room(RoomConfig::default());
        let mut room = room.lock().await;
        join(&mut room, 1);
        join(&mut room, 2);

        room.remove_participant(&id(1));
        assert_eq!(room.host(), Some(id(2)));
        assert!(room.participant_views()[0].host);
    }

    #[tokio::test]
    async fn test_empty_room_closes() {
        let (room, _) = new_room(RoomConfig::default());
        let mut room = room.lock().await;
        join(&mut room, 1);

        room.remove_participant(&id(1));
        assert!(room.is_closed());

        let (tx, _rx) = mpsc::channel(10);
        assert_eq!(room.add_participant(id(2), "x".to_string(), tx).unwrap_err(), RoomError::Closed);
    }

    #[tokio::test]
    async fn test_invalid_transitions_are_ignored() {
        let (room, _) = new_room(RoomConfig { min_participants: 2, ..quiet_config() });
        let mut room = room.lock().await;
        join(&mut room, 1);

        assert!(!room.apply_intent(&id(1), Direction::Up));
        assert!(room.run_tick().is_none());

        // Not enough participants
        assert!(!room.begin_playing());
        assert_eq!(room.state(), RoomState::Waiting);

        join(&mut room, 2);
        assert!(!room.start_game(&id(9)));
        assert!(room.begin_playing());
        assert!(!room.begin_playing());
        assert_eq!(room.state(), RoomState::Playing);

        room.reset_room();
        assert_eq!(room.state(), RoomState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_room_ignores_start_and_intent() {
        let (room, _) = new_room(quiet_config());
        let mut rx1;
        {
            let mut guard = room.lock().await;
            rx1 = join(&mut guard, 1);
            join(&mut guard, 2);
            guard.begin_playing();
            set_up_collision(&mut guard);
            guard.run_tick();
            assert_eq!(guard.state(), RoomState::Finished);
            drain(&mut rx1);

            assert!(!guard.start_game(&id(1)));
            assert!(!guard.apply_intent(&id(1), Direction::Up));
            assert!(guard.run_tick().is_none());
            assert_eq!(guard.state(), RoomState::Finished);
            assert!(!guard.has_scheduler());

            // Join while finished: admitted, sits out until the next round
            join(&mut guard, 3);
            assert_eq!(guard.state(), RoomState::Finished);
            assert!(!guard.participant(&id(3)).unwrap().in_round());
            assert!(guard.ranking().iter().all(|r| r.participant_id != id(3)));

            assert!(guard.remove_participant(&id(2)));
            assert_eq!(guard.state(), RoomState::Finished);
            assert!(!guard.is_closed());
            assert!(guard.has_cooldown());

            guard.remove_participant(&id(3));
            guard.remove_participant(&id(1));
            assert!(guard.is_closed());
            assert!(!guard.has_cooldown());
        }

        let left = drain(&mut rx1)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::ParticipantLeft { .. }))
            .count();
        assert_eq!(left, 2);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(room.lock().await.state(), RoomState::Finished);
    }

    #[tokio::test]
    async fn test_begin_playing_creates_agents() {
        let (room, _) = new_room(quiet_config());
        let mut room = room.lock().await;
        let mut rx = join(&mut room, 1);
        join(&mut room, 2);
        drain(&mut rx);

        assert!(room.begin_playing());
        assert_eq!(room.simulation().agents().len(), 2);
        assert_eq!(room.round(), 1);
        assert!(room.participants().iter().all(|p| p.in_round()));
        assert!(matches!(&drain(&mut rx)[0], ServerMessage::GameStarted { snapshot } if snapshot.room_state == RoomState::Playing));
    }

    #[tokio::test]
    async fn test_intent_reaches_simulation() {
        let (room, _) = new_room(quiet_config());
        let mut room = room.lock().await;
        join(&mut room, 1);
        room.begin_playing();

        assert!(room.apply_intent(&id(1), Direction::Down));
        assert!(!room.apply_intent(&id(1), Direction::Left));

        room.run_tick();
        let head = room.simulation().agent(&id(1)).and_then(|a| a.head());
        assert_eq!(head, Some(Cell::new(5, 16)));
    }

    #[tokio::test]
    async fn test_collision_finishes_round() {
        let (room, _) = new_room(quiet_config());
        let mut room = room.lock().await;
        let mut rx = join(&mut room, 1);
        join(&mut room, 2);
        room.begin_playing();
        set_up_collision(&mut room);
        drain(&mut rx);

        let result = room.run_tick().unwrap();
        assert!(result.round_over());
        assert_eq!(room.state(), RoomState::Finished);
        assert!(room.participant(&id(1)).unwrap().alive);
        assert!(!room.participant(&id(2)).unwrap().alive);
        assert_eq!(room.simulation().alive_count(), 1);
        assert!(!room.has_scheduler());
        assert!(room.has_cooldown());

        let messages = drain(&mut rx);
        assert!(matches!(messages[0], ServerMessage::GameUpdate { .. }));
        assert!(matches!(&messages[1], ServerMessage::GameEnded { ranking, .. } if ranking.len() == 2));
        assert_eq!(messages.len(), 2);

        // Finished rooms no longer tick
        assert!(room.run_tick().is_none());
    }

    #[tokio::test]
    async fn test_ranking_is_stable_by_score() {
        let (room, _) = new_room(quiet_config());
        let mut room = room.lock().await;
        for n in 1..=4 {
            join(&mut room, n);
        }
        room.begin_playing();

        let sim = room.simulation_mut();
        sim.set_score(&id(1), 10);
        sim.set_score(&id(2), 30);
        sim.set_score(&id(3), 10);
        sim.set_score(&id(4), 0);
        room.run_tick();

        let ranking = room.ranking();
        let order: Vec<(ParticipantId, u32)> = ranking.iter().map(|r| (r.participant_id, r.rank)).collect();
        assert_eq!(order, vec![(id(2), 1), (id(1), 2), (id(3), 3), (id(4), 4)]);
    }

    #[tokio::test]
    async fn test_leaver_is_not_ranked_or_persisted() {
        let (room, recorder) = new_room(quiet_config());
        {
            let mut room = room.lock().await;
            join(&mut room, 1);
            join(&mut room, 2);
            join(&mut room, 3);
            room.begin_playing();

            room.remove_participant(&id(3));
            assert_eq!(room.simulation().agents().len(), 2);
            assert_eq!(room.state(), RoomState::Playing);

            set_up_collision(&mut room);
            room.run_tick();
            assert_eq!(room.state(), RoomState::Finished);

            let ranked: Vec<ParticipantId> = room.ranking().iter().map(|r| r.participant_id).collect();
            assert_eq!(ranked, vec![id(1), id(2)]);
        }

        for _ in 0..100 {
            if recorder.records().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let records = recorder.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.participant_id != id(3)));
        assert!(records.iter().all(|r| r.mode == "multiplayer" && r.metadata.room_code == "TEST"));
        assert_eq!(records[0].metadata.participants, 2);
    }

    #[tokio::test]
    async fn test_late_joiner_waits_for_next_round() {
        let (room, _) = new_room(quiet_config());
        let mut room = room.lock().await;
        join(&mut room, 1);
        join(&mut room, 2);
        room.begin_playing();

        join(&mut room, 3);
        assert!(!room.participant(&id(3)).unwrap().in_round());
        assert!(room.simulation().agent(&id(3)).is_none());
        assert!(!room.apply_intent(&id(3), Direction::Up));

        set_up_collision(&mut room);
        room.run_tick();
        assert!(room.ranking().iter().all(|r| r.participant_id != id(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_room_resets_after_cooldown() {
        let (room, _) = new_room(quiet_config());
        let mut rx;
        {
            let mut guard = room.lock().await;
            rx = join(&mut guard, 1);
            join(&mut guard, 2);
            guard.begin_playing();

            let sim = guard.simulation_mut();
            sim.set_score(&id(1), 30);
            sim.set_score(&id(2), 10);
            set_up_collision(&mut guard);
            guard.run_tick();

            let ranking = guard.ranking();
            assert_eq!(ranking[0].participant_id, id(1));
            assert_eq!(ranking[0].rank, 1);
            assert_eq!(ranking[1].participant_id, id(2));
            assert_eq!(ranking[1].rank, 2);
        }
        drain(&mut rx);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(room.lock().await.state(), RoomState::Finished);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let guard = room.lock().await;
        assert_eq!(guard.state(), RoomState::Waiting);
        assert!(guard.participants().iter().all(|p| p.score == 0 && p.alive));
        assert!(guard.simulation().agents().is_empty());
        assert!(!guard.has_cooldown());
        assert!(matches!(&drain(&mut rx)[0], ServerMessage::RoomReset { snapshot } if snapshot.room_state == RoomState::Waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_drives_round_to_completion() {
        let (room, _) = new_room(quiet_config());
        {
            let mut guard = room.lock().await;
            join(&mut guard, 1);
            assert!(guard.start_game(&id(1)));
            assert!(guard.has_scheduler());
        }

        // Solo agent from column 5 leaves the 40-column arena on tick 35
        tokio::time::sleep(Duration::from_secs(1)).await;
        {
            let guard = room.lock().await;
            assert_eq!(guard.state(), RoomState::Finished);
            assert_eq!(guard.simulation().tick(), 35);
            assert!(!guard.has_scheduler());
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(room.lock().await.state(), RoomState::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_after_close() {
        let (room, _) = new_room(quiet_config());
        let mut rx;
        {
            let mut guard = room.lock().await;
            rx = join(&mut guard, 1);
            join(&mut guard, 2);
            guard.start_game(&id(1));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        let updates = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::GameUpdate { .. }))
            .count();
        assert!(updates > 0);

        room.lock().await.close();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(drain(&mut rx).is_empty());
        let guard = room.lock().await;
        assert!(!guard.has_scheduler());
        assert_eq!(guard.simulation().tick(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_cooldown() {
        let (room, _) = new_room(quiet_config());
        {
            let mut guard = room.lock().await;
            join(&mut guard, 1);
            join(&mut guard, 2);
            guard.begin_playing();
            set_up_collision(&mut guard);
            guard.run_tick();
            assert!(guard.has_cooldown());
            guard.close();
        }

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(room.lock().await.state(), RoomState::Finished);
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let (room, _) = new_room(quiet_config());
        let mut room = room.lock().await;
        let (tx, _rx) = mpsc::channel(1);
        room.add_participant(id(1), "slow".to_string(), tx).unwrap();
        room.begin_playing();

        for _ in 0..10 {
            room.run_tick();
        }
        assert_eq!(room.simulation().tick(), 10);
    }
}
