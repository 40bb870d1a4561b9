//! Room Timers
//!
//! The per-room tick loop and the post-round cooldown. Both hold only a
//! weak handle to their room and re-check the room's epoch after taking
//! its lock, so a stopped or destroyed room is never touched again.

use std::sync::Weak;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::debug;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::network::protocol::RoomState;
use crate::network::room::Room;

/// Spawn the fixed-rate tick loop for a playing room.
///
/// Missed ticks are skipped, not replayed.
pub fn spawn_tick_loop(room: Weak<Mutex<Room>>, epoch: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately
        ticker.tick().await;
        let mut last_tick = Instant::now();

        loop {
            ticker.tick().await;

            let Some(shared) = room.upgrade() else {
                debug!("Tick loop exiting: room dropped");
                break;
            };
            let mut guard = shared.lock().await;

            if !guard.is_current(epoch) || guard.state() != RoomState::Playing {
                debug!("Tick loop for room {} stopped", guard.code());
                break;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last_tick);
            last_tick = now;
            guard.set_last_tick_elapsed(elapsed);

            #[cfg(feature = "debug-tracing")]
            let started = Instant::now();

            guard.run_tick();

            #[cfg(feature = "debug-tracing")]
            trace!(
                "Room {} tick {} took {:?} ({:?} since last)",
                guard.code(),
                guard.simulation().tick(),
                started.elapsed(),
                elapsed
            );

            if guard.state() != RoomState::Playing {
                break;
            }
        }
    })
}

/// Spawn the one-shot cooldown that returns a finished room to waiting.
pub fn spawn_cooldown(room: Weak<Mutex<Room>>, epoch: u64, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(delay).await;

        let Some(shared) = room.upgrade() else {
            return;
        };
        let mut guard = shared.lock().await;

        if !guard.is_current(epoch) || guard.state() != RoomState::Finished {
            debug!("Cooldown for room {} is stale", guard.code());
            return;
        }

        guard.reset_room();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::game::state::ParticipantId;
    use crate::game::tick::SimulationConfig;
    use crate::network::room::{RoomConfig, SharedRoom};
    use crate::persistence::MemoryRecorder;
    use tokio::sync::mpsc;

    fn playing_room(tick_rate: u32) -> SharedRoom {
        let config = RoomConfig {
            tick_rate,
            simulation: SimulationConfig { min_consumables: 0, ..Default::default() },
            seed: Some(1),
            ..Default::default()
        };
        Room::new_shared("SCHED", config, Arc::new(MemoryRecorder::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_runs_at_rate() {
        let room = playing_room(10);
        let (tx, _rx) = mpsc::channel(64);
        {
            let mut guard = room.lock().await;
            guard
                .add_participant(ParticipantId::from_bytes([1; 16]), "a".to_string(), tx)
                .unwrap();
            guard.begin_playing();
        }

        let handle = spawn_tick_loop(Arc::downgrade(&room), 0, Duration::from_millis(100));
        sleep(Duration::from_millis(1050)).await;

        let guard = room.lock().await;
        assert_eq!(guard.simulation().tick(), 10);
        assert_eq!(guard.last_tick_elapsed(), Duration::from_millis(100));
        drop(guard);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_epoch_never_ticks() {
        let room = playing_room(60);
        let (tx, _rx) = mpsc::channel(64);
        {
            let mut guard = room.lock().await;
            guard
                .add_participant(ParticipantId::from_bytes([1; 16]), "a".to_string(), tx)
                .unwrap();
            guard.begin_playing();
        }

        let handle = spawn_tick_loop(Arc::downgrade(&room), 99, Duration::from_millis(10));
        sleep(Duration::from_millis(200)).await;

        assert_eq!(room.lock().await.simulation().tick(), 0);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_room_ends_timers() {
        let room = playing_room(60);
        let weak = Arc::downgrade(&room);
        drop(room);

        let ticker = spawn_tick_loop(weak.clone(), 0, Duration::from_millis(10));
        let cooldown = spawn_cooldown(weak, 0, Duration::from_millis(10));
        sleep(Duration::from_millis(50)).await;

        assert!(ticker.is_finished());
        assert!(cooldown.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_ignores_waiting_room() {
        let room = playing_room(60);
        let handle = spawn_cooldown(Arc::downgrade(&room), 0, Duration::from_secs(1));
        sleep(Duration::from_secs(2)).await;

        assert!(handle.is_finished());
        assert_eq!(room.lock().await.state(), RoomState::Waiting);
    }
}
