//! Session Directory
//!
//! Owns the connection -> participant -> room mapping and the set of live
//! rooms. Rooms never see the directory. Lock order is always directory
//! first, then room.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, debug};

use crate::core::cell::Direction;
use crate::game::state::ParticipantId;
use crate::network::protocol::{ErrorCode, RoomSnapshot, ServerMessage};
use crate::network::room::{JoinAck, Room, RoomConfig, RoomError, SharedRoom};
use crate::persistence::MatchRecorder;

/// Transport-assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection currently is.
#[derive(Debug, Clone)]
struct Membership {
    participant_id: ParticipantId,
    room_code: String,
}

#[derive(Default)]
struct DirectoryState {
    connections: BTreeMap<ConnectionId, Membership>,
    rooms: BTreeMap<String, SharedRoom>,
}

/// Manages all rooms and who is in them.
pub struct SessionDirectory {
    state: RwLock<DirectoryState>,
    room_config: RoomConfig,
    recorder: Arc<dyn MatchRecorder>,
}

impl SessionDirectory {
    /// Create an empty directory.
    pub fn new(room_config: RoomConfig, recorder: Arc<dyn MatchRecorder>) -> Self {
        Self {
            state: RwLock::new(DirectoryState::default()),
            room_config,
            recorder,
        }
    }

    /// Put a connection into a room, creating the room if needed.
    ///
    /// Any current membership is dropped first. On failure the requester
    /// is told why and no mapping is recorded.
    pub async fn join(
        &self,
        connection: ConnectionId,
        room_code: &str,
        display_name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinAck, RoomError> {
        let mut state = self.state.write().await;
        Self::leave_locked(&mut state, connection).await;

        let (room, created) = match state.rooms.get(room_code) {
            Some(room) => (Arc::clone(room), false),
            None => (
                Room::new_shared(room_code, self.room_config.clone(), Arc::clone(&self.recorder)),
                true,
            ),
        };

        let participant_id = ParticipantId::random();
        let result = room
            .lock()
            .await
            .add_participant(participant_id, display_name.to_string(), sender.clone());

        match result {
            Ok(ack) => {
                if created {
                    info!("Room {} created", room_code);
                    state.rooms.insert(room_code.to_string(), room);
                }
                state.connections.insert(connection, Membership {
                    participant_id,
                    room_code: room_code.to_string(),
                });
                debug!("{} is {} in room {}", connection, participant_id.short(), room_code);
                Ok(ack)
            }
            Err(e) => {
                if created {
                    room.lock().await.close();
                }

                let reply = match e {
                    RoomError::RoomFull => ServerMessage::RoomFull { room_code: room_code.to_string() },
                    RoomError::Closed => ServerMessage::error(ErrorCode::RoomClosed, e.to_string()),
                };
                if let Err(send_err) = sender.try_send(reply) {
                    debug!("Dropped join reply for {}: {}", connection, send_err);
                }

                info!("{} refused by room {}: {}", connection, room_code, e);
                Err(e)
            }
        }
    }

    /// Take a connection out of its room. Returns whether it was in one.
    pub async fn leave(&self, connection: ConnectionId) -> bool {
        let mut state = self.state.write().await;
        Self::leave_locked(&mut state, connection).await
    }

    /// Same as [`leave`](Self::leave).
    pub async fn on_disconnect(&self, connection: ConnectionId) {
        if self.leave(connection).await {
            debug!("{} disconnected from its room", connection);
        }
    }

    /// Forward a heading change. No-op without a room.
    pub async fn route_intent(&self, connection: ConnectionId, direction: Direction) -> bool {
        let state = self.state.read().await;
        let Some((participant_id, room)) = Self::lookup(&state, connection) else {
            debug!("Intent from {} ignored: not in a room", connection);
            return false;
        };

        let accepted = room.lock().await.apply_intent(&participant_id, direction);
        accepted
    }

    /// Forward a start request. No-op without a room.
    pub async fn route_start(&self, connection: ConnectionId) -> bool {
        let state = self.state.read().await;
        let Some((participant_id, room)) = Self::lookup(&state, connection) else {
            debug!("Start from {} ignored: not in a room", connection);
            return false;
        };

        let started = room.lock().await.start_game(&participant_id);
        started
    }

    /// Live rooms.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// Connections currently in a room.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Snapshot of a room, if it exists.
    pub async fn room_snapshot(&self, room_code: &str) -> Option<RoomSnapshot> {
        let state = self.state.read().await;
        let room = state.rooms.get(room_code)?;
        let snapshot = room.lock().await.snapshot();
        Some(snapshot)
    }

    /// The participant and room code a connection maps to.
    pub async fn membership(&self, connection: ConnectionId) -> Option<(ParticipantId, String)> {
        let state = self.state.read().await;
        state
            .connections
            .get(&connection)
            .map(|m| (m.participant_id, m.room_code.clone()))
    }

    /// Close every room and forget every mapping.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        for room in state.rooms.values() {
            room.lock().await.close();
        }

        info!(
            "Directory shut down: {} rooms, {} connections released",
            state.rooms.len(),
            state.connections.len()
        );
        state.rooms.clear();
        state.connections.clear();
    }

    fn lookup(state: &DirectoryState, connection: ConnectionId) -> Option<(ParticipantId, SharedRoom)> {
        let membership = state.connections.get(&connection)?;
        let room = state.rooms.get(&membership.room_code)?;
        Some((membership.participant_id, Arc::clone(room)))
    }

    async fn leave_locked(state: &mut DirectoryState, connection: ConnectionId) -> bool {
        let Some(membership) = state.connections.remove(&connection) else {
            return false;
        };

        if let Some(room) = state.rooms.get(&membership.room_code).cloned() {
            let empty = {
                let mut guard = room.lock().await;
                guard.remove_participant(&membership.participant_id);
                guard.is_empty()
            };

            if empty {
                state.rooms.remove(&membership.room_code);
                info!("Room {} destroyed", membership.room_code);
            }
        }

        true
    }
}
