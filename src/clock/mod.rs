//! Countdown reconciliation for the active question.
//!
//! The server's absolute deadline is the source of truth; this module keeps a
//! locally persisted snapshot so a reload or crash mid-question resumes the
//! countdown instead of restarting it. Reconstruction always applies
//! `remaining_now = max(0, remaining_saved - (now - saved_at))`, never the
//! stored value literally, so a reload cannot grant bonus time.

pub mod store;

use crate::types::{ParticipantId, QuestionId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use store::{TimerState, TimerStore};

#[derive(Debug, Clone)]
struct ActiveTimer {
    question_id: QuestionId,
    ends_at: DateTime<Utc>,
}

pub struct ClockReconciler {
    participant_id: ParticipantId,
    store: Arc<dyn TimerStore>,
    active: Option<ActiveTimer>,
}

/// Whole seconds until `later`, rounded up, so the countdown reads zero at
/// the deadline itself rather than a second early.
fn seconds_until(later: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (later - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 999) / 1000) as u64
    }
}

impl ClockReconciler {
    pub fn new(participant_id: ParticipantId, store: Arc<dyn TimerStore>) -> Self {
        Self {
            participant_id,
            store,
            active: None,
        }
    }

    pub fn active_question(&self) -> Option<&QuestionId> {
        self.active.as_ref().map(|a| &a.question_id)
    }

    /// Start a countdown against an authoritative deadline. Any persisted
    /// state for other questions is discarded first.
    pub fn activate(
        &mut self,
        question_id: &QuestionId,
        ends_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> u64 {
        self.store.purge_except(&self.participant_id, question_id);
        self.active = Some(ActiveTimer {
            question_id: question_id.clone(),
            ends_at,
        });
        let remaining = seconds_until(ends_at, now);
        self.persist(remaining, ends_at, now);
        remaining
    }

    /// Recompute remaining time and re-persist the snapshot, so a crash
    /// mid-second loses at most about one second of accuracy.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let active = self.active.clone()?;
        let remaining = seconds_until(active.ends_at, now);
        self.persist(remaining, active.ends_at, now);
        Some(remaining)
    }

    /// Resume the countdown for `question_id` after a process restart or
    /// reconnect. A persisted snapshot for this exact question wins over the
    /// deadline (it accounts for suspended wall-clock time); a snapshot for
    /// any other question is discarded, since the server's question identity
    /// is authoritative. With no usable snapshot this behaves like
    /// `activate`.
    pub fn restore(
        &mut self,
        question_id: &QuestionId,
        ends_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> u64 {
        self.store.purge_except(&self.participant_id, question_id);

        let remaining = match self.store.load(&self.participant_id, question_id) {
            Some(state) => {
                let elapsed = (now - state.saved_at).num_seconds().max(0) as u64;
                let reconstructed = state.remaining_seconds.saturating_sub(elapsed);
                tracing::debug!(
                    question_id = %question_id,
                    saved = state.remaining_seconds,
                    elapsed,
                    reconstructed,
                    "Restored countdown from persisted state"
                );
                // Never more than the authoritative deadline allows
                reconstructed.min(seconds_until(ends_at, now))
            }
            None => seconds_until(ends_at, now),
        };

        // Re-anchor so subsequent ticks count down from the reconstructed value
        let anchored_end = now + chrono::Duration::seconds(remaining as i64);
        self.active = Some(ActiveTimer {
            question_id: question_id.clone(),
            ends_at: anchored_end,
        });
        self.persist(remaining, anchored_end, now);
        remaining
    }

    /// Stop the countdown and drop the persisted snapshot. Called on every
    /// terminal transition of the current question.
    pub fn clear(&mut self) {
        if let Some(active) = self.active.take() {
            self.store.remove(&self.participant_id, &active.question_id);
        }
    }

    fn persist(&self, remaining: u64, anchor: DateTime<Utc>, now: DateTime<Utc>) {
        if let Some(active) = &self.active {
            self.store.save(&TimerState {
                question_id: active.question_id.clone(),
                participant_id: self.participant_id.clone(),
                remaining_seconds: remaining,
                anchor,
                saved_at: now,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::store::MemoryTimerStore;
    use super::*;
    use chrono::Duration;

    fn setup() -> (ClockReconciler, Arc<MemoryTimerStore>) {
        let store = Arc::new(MemoryTimerStore::default());
        (
            ClockReconciler::new("p1".to_string(), store.clone()),
            store,
        )
    }

    #[test]
    fn test_activate_computes_initial_remaining() {
        let (mut clock, store) = setup();
        let now = Utc::now();

        let remaining = clock.activate(&"q1".to_string(), now + Duration::seconds(30), now);
        assert_eq!(remaining, 30);
        assert_eq!(store.load("p1", "q1").unwrap().remaining_seconds, 30);
    }

    #[test]
    fn test_activate_past_deadline_yields_zero() {
        let (mut clock, _store) = setup();
        let now = Utc::now();

        let remaining = clock.activate(&"q1".to_string(), now - Duration::seconds(5), now);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_tick_counts_down_and_repersists() {
        let (mut clock, store) = setup();
        let now = Utc::now();
        clock.activate(&"q1".to_string(), now + Duration::seconds(30), now);

        let remaining = clock.tick(now + Duration::seconds(12)).unwrap();
        assert_eq!(remaining, 18);
        assert_eq!(store.load("p1", "q1").unwrap().remaining_seconds, 18);

        // Past the deadline the countdown floors at zero
        let remaining = clock.tick(now + Duration::seconds(60)).unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_restore_applies_elapsed_wall_clock() {
        // Question activated with 30s, client died 10s in, restarts now.
        let store = Arc::new(MemoryTimerStore::default());
        let t0 = Utc::now();
        {
            let mut clock = ClockReconciler::new("p1".to_string(), store.clone());
            clock.activate(&"q1".to_string(), t0 + Duration::seconds(30), t0);
        }

        let t1 = t0 + Duration::seconds(10);
        let mut clock = ClockReconciler::new("p1".to_string(), store);
        let remaining = clock.restore(&"q1".to_string(), t0 + Duration::seconds(30), t1);
        assert_eq!(remaining, 20);
    }

    #[test]
    fn test_restore_never_trusts_stored_value_literally() {
        let store = Arc::new(MemoryTimerStore::default());
        let t0 = Utc::now();
        store.save(&TimerState {
            question_id: "q1".to_string(),
            participant_id: "p1".to_string(),
            remaining_seconds: 30,
            anchor: t0 + Duration::seconds(30),
            saved_at: t0,
        });

        // Restoring long after the save yields zero, never 30 and never negative
        let mut clock = ClockReconciler::new("p1".to_string(), store);
        let remaining = clock.restore(&"q1".to_string(), t0 + Duration::seconds(30), t0 + Duration::seconds(300));
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_restore_discards_other_questions_state() {
        let store = Arc::new(MemoryTimerStore::default());
        let t0 = Utc::now();
        store.save(&TimerState {
            question_id: "q_old".to_string(),
            participant_id: "p1".to_string(),
            remaining_seconds: 25,
            anchor: t0,
            saved_at: t0,
        });

        let mut clock = ClockReconciler::new("p1".to_string(), store.clone());
        let remaining = clock.restore(&"q_new".to_string(), t0 + Duration::seconds(40), t0);

        // Deadline-derived, not merged with the stale record
        assert_eq!(remaining, 40);
        assert!(store.load("p1", "q_old").is_none());
    }

    #[test]
    fn test_activate_purges_previous_question() {
        let (mut clock, store) = setup();
        let now = Utc::now();
        clock.activate(&"qA".to_string(), now + Duration::seconds(30), now);
        clock.activate(&"qB".to_string(), now + Duration::seconds(45), now);

        assert!(store.load("p1", "qA").is_none());
        assert_eq!(store.load("p1", "qB").unwrap().remaining_seconds, 45);
    }

    #[test]
    fn test_clear_removes_persisted_state() {
        let (mut clock, store) = setup();
        let now = Utc::now();
        clock.activate(&"q1".to_string(), now + Duration::seconds(30), now);

        clock.clear();
        assert!(store.load("p1", "q1").is_none());
        assert!(clock.tick(now).is_none());
    }

    #[test]
    fn test_restore_capped_by_authoritative_deadline() {
        // A snapshot claiming more time than the deadline allows is clamped.
        let store = Arc::new(MemoryTimerStore::default());
        let t0 = Utc::now();
        store.save(&TimerState {
            question_id: "q1".to_string(),
            participant_id: "p1".to_string(),
            remaining_seconds: 500,
            anchor: t0,
            saved_at: t0,
        });

        let mut clock = ClockReconciler::new("p1".to_string(), store);
        let remaining = clock.restore(&"q1".to_string(), t0 + Duration::seconds(30), t0);
        assert_eq!(remaining, 30);
    }
}
