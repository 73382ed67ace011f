use crate::types::{ParticipantId, QuestionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Persisted countdown snapshot, keyed by `(participant, question)` so a
/// stale timer from a previous question can never leak into a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerState {
    pub question_id: QuestionId,
    pub participant_id: ParticipantId,
    pub remaining_seconds: u64,
    /// The absolute deadline this countdown was anchored to
    pub anchor: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt timer state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage seam for TimerState. Implementations must be synchronous and
/// non-blocking in practice; failures are absorbed and logged, never
/// propagated into the countdown.
pub trait TimerStore: Send + Sync {
    fn load(&self, participant: &str, question: &str) -> Option<TimerState>;
    fn save(&self, state: &TimerState);
    fn remove(&self, participant: &str, question: &str);
    /// Drop every record for this participant except the given question
    fn purge_except(&self, participant: &str, keep_question: &str);
}

fn key(participant: &str, question: &str) -> String {
    format!("{}:{}", participant, question)
}

/// In-memory store, used in tests and as the default for embedders that
/// bring their own persistence.
#[derive(Default)]
pub struct MemoryTimerStore {
    entries: Mutex<HashMap<String, TimerState>>,
}

impl TimerStore for MemoryTimerStore {
    fn load(&self, participant: &str, question: &str) -> Option<TimerState> {
        self.entries
            .lock()
            .expect("timer store lock poisoned")
            .get(&key(participant, question))
            .cloned()
    }

    fn save(&self, state: &TimerState) {
        self.entries
            .lock()
            .expect("timer store lock poisoned")
            .insert(key(&state.participant_id, &state.question_id), state.clone());
    }

    fn remove(&self, participant: &str, question: &str) {
        self.entries
            .lock()
            .expect("timer store lock poisoned")
            .remove(&key(participant, question));
    }

    fn purge_except(&self, participant: &str, keep_question: &str) {
        let keep = key(participant, keep_question);
        let prefix = format!("{}:", participant);
        self.entries
            .lock()
            .expect("timer store lock poisoned")
            .retain(|k, _| !k.starts_with(&prefix) || *k == keep);
    }
}

/// File-backed store: one JSON map per client, rewritten on every save.
/// A corrupt or unreadable file degrades to a cold start.
pub struct FileTimerStore {
    path: PathBuf,
}

impl FileTimerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_map(&self) -> Result<HashMap<String, TimerState>, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn load_map(&self) -> HashMap<String, TimerState> {
        match self.read_map() {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding persisted timer state");
                HashMap::new()
            }
        }
    }

    fn write_map(&self, map: &HashMap<String, TimerState>) {
        let result = serde_json::to_string(map)
            .map_err(StoreError::from)
            .and_then(|json| std::fs::write(&self.path, json).map_err(StoreError::from));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to persist timer state");
        }
    }
}

impl TimerStore for FileTimerStore {
    fn load(&self, participant: &str, question: &str) -> Option<TimerState> {
        self.load_map().remove(&key(participant, question))
    }

    fn save(&self, state: &TimerState) {
        let mut map = self.load_map();
        map.insert(key(&state.participant_id, &state.question_id), state.clone());
        self.write_map(&map);
    }

    fn remove(&self, participant: &str, question: &str) {
        let mut map = self.load_map();
        if map.remove(&key(participant, question)).is_some() {
            self.write_map(&map);
        }
    }

    fn purge_except(&self, participant: &str, keep_question: &str) {
        let mut map = self.load_map();
        let keep = key(participant, keep_question);
        let prefix = format!("{}:", participant);
        let before = map.len();
        map.retain(|k, _| !k.starts_with(&prefix) || *k == keep);
        if map.len() != before {
            self.write_map(&map);
        }
    }
}
