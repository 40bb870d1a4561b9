//! Match Persistence
//!
//! Rooms hand one record per ranked participant to a [`MatchRecorder`]
//! when a round ends. Calls run on the blocking pool, never on the tick
//! path, and failures are logged by the caller and otherwise ignored.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::game::state::ParticipantId;

/// Game mode recorded for every room round.
pub const MULTIPLAYER_MODE: &str = "multiplayer";

/// One participant's result for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Participant identifier.
    pub participant_id: ParticipantId,
    /// Display name at the end of the round.
    pub display_name: String,
    /// Game mode.
    pub mode: String,
    /// Final score.
    pub score: u32,
    /// Round length in whole seconds.
    pub duration_seconds: u64,
    /// Wall-clock end of the round.
    pub finished_at: DateTime<Utc>,
    /// Room-level details.
    pub metadata: MatchMetadata,
}

/// Room-level details attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMetadata {
    /// Room code.
    pub room_code: String,
    /// 1-based rank.
    pub rank: u32,
    /// Ticks played.
    pub ticks: u32,
    /// Number of ranked participants.
    pub participants: usize,
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Sink could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sink for finished-round results.
pub trait MatchRecorder: Send + Sync {
    /// Store one record.
    fn record_match(&self, record: &MatchRecord) -> Result<(), RecordError>;
}

/// Writes records to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl MatchRecorder for LogRecorder {
    fn record_match(&self, record: &MatchRecord) -> Result<(), RecordError> {
        info!(
            "Match result: room {} rank {} participant {} ({}) score {} in {}s",
            record.metadata.room_code,
            record.metadata.rank,
            record.participant_id.short(),
            record.display_name,
            record.score,
            record.duration_seconds,
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesRecorder {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesRecorder {
    /// Open (or create) the file in append mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MatchRecorder for JsonLinesRecorder {
    fn record_match(&self, record: &MatchRecord) -> Result<(), RecordError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<MatchRecord>>,
}

impl MemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn records(&self) -> Vec<MatchRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl MatchRecorder for MemoryRecorder {
    fn record_match(&self, record: &MatchRecord) -> Result<(), RecordError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rank: u32, score: u32) -> MatchRecord {
        MatchRecord {
            participant_id: ParticipantId::from_bytes([rank as u8; 16]),
            display_name: format!("p{rank}"),
            mode: MULTIPLAYER_MODE.to_string(),
            score,
            duration_seconds: 42,
            finished_at: Utc::now(),
            metadata: MatchMetadata {
                room_code: "ROOM".to_string(),
                rank,
                ticks: 2520,
                participants: 2,
            },
        }
    }

    #[test]
    fn test_memory_recorder() {
        let recorder = MemoryRecorder::new();
        recorder.record_match(&record(1, 30)).unwrap();
        recorder.record_match(&record(2, 10)).unwrap();

        let records = recorder.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata.rank, 1);
        assert_eq!(records[1].score, 10);
    }

    #[test]
    fn test_log_recorder_never_fails() {
        assert!(LogRecorder.record_match(&record(1, 0)).is_ok());
    }

    #[test]
    fn test_json_lines_recorder_appends() {
        let path = std::env::temp_dir().join(format!("snake-arena-{}.jsonl", uuid::Uuid::new_v4()));

        {
            let recorder = JsonLinesRecorder::open(&path).unwrap();
            recorder.record_match(&record(1, 30)).unwrap();
            recorder.record_match(&record(2, 10)).unwrap();
            assert_eq!(recorder.path(), path.as_path());
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<MatchRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        std::fs::remove_file(&path).ok();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].mode, "multiplayer");
        assert_eq!(lines[0].metadata.room_code, "ROOM");
        assert_eq!(lines[1].metadata.rank, 2);
    }

    #[test]
    fn test_json_lines_open_fails_on_missing_directory() {
        let path = std::env::temp_dir()
            .join(format!("missing-{}", uuid::Uuid::new_v4()))
            .join("matches.jsonl");
        assert!(matches!(JsonLinesRecorder::open(path), Err(RecordError::Io(_))));
    }
}
