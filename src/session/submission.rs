//! The exactly-once submission state machine.
//!
//! Manual submits, local timer expiry, and server expiry pushes all funnel
//! through [`SubmissionCoordinator::try_begin_submit`]; whichever trigger
//! acquires the guard first wins and every later trigger observes a state
//! other than `Answering` and is dropped.

use crate::types::{QuestionId, SubmitTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    /// No active question
    Waiting,
    /// Question active, not yet submitted
    Answering,
    /// Request in flight
    Submitting,
    /// Terminal for this question
    Submitted,
    Revealed,
    Eliminated,
    GameEnded,
}

#[derive(Debug)]
pub struct SubmissionCoordinator {
    state: SubmitState,
    question: Option<QuestionId>,
}

impl SubmissionCoordinator {
    pub fn new() -> Self {
        Self {
            state: SubmitState::Waiting,
            question: None,
        }
    }

    pub fn state(&self) -> SubmitState {
        self.state
    }

    pub fn current_question(&self) -> Option<&QuestionId> {
        self.question.as_ref()
    }

    /// Check if a new question may start answering from the current state
    fn can_begin_question(&self, question_id: &QuestionId) -> bool {
        use SubmitState::*;

        match self.state {
            Waiting | Submitted | Revealed => true,
            // The server advanced past a question we were still on; its
            // question identity is authoritative
            Answering | Submitting => self.question.as_ref() != Some(question_id),
            Eliminated | GameEnded => false,
        }
    }

    /// Enter `Answering` for a server-activated question. Returns false if
    /// the transition is not allowed (terminal session states, or a repeat
    /// activation of the question already being answered).
    pub fn begin_question(&mut self, question_id: &QuestionId) -> bool {
        if !self.can_begin_question(question_id) {
            return false;
        }
        self.state = SubmitState::Answering;
        self.question = Some(question_id.clone());
        true
    }

    /// The single idempotent entry point for all three submission triggers.
    /// Returns the question to submit for exactly once; every other caller
    /// gets `None`.
    pub fn try_begin_submit(&mut self, trigger: SubmitTrigger) -> Option<QuestionId> {
        if self.state != SubmitState::Answering {
            tracing::debug!(?trigger, state = ?self.state, "Submission trigger dropped by guard");
            return None;
        }
        self.state = SubmitState::Submitting;
        self.question.clone()
    }

    /// Server acknowledged the attempt (success or domain-level rejection,
    /// both terminal).
    pub fn complete(&mut self) -> bool {
        if self.state != SubmitState::Submitting {
            return false;
        }
        self.state = SubmitState::Submitted;
        true
    }

    /// The dispatch did not conclude the question (transport, validation, or
    /// server failure): back to `Answering` so a retry can re-acquire the
    /// guard.
    pub fn rollback(&mut self) -> bool {
        if self.state != SubmitState::Submitting {
            return false;
        }
        self.state = SubmitState::Answering;
        true
    }

    /// The answer for the current question was revealed
    pub fn reveal(&mut self) -> bool {
        use SubmitState::*;
        match self.state {
            Waiting | Answering | Submitting | Submitted => {
                self.state = Revealed;
                true
            }
            Revealed | Eliminated | GameEnded => false,
        }
    }

    /// Reachable from any state; cancels local submission intent. An attempt
    /// already in flight may still complete server-side, but no new local
    /// trigger is honored afterwards.
    pub fn eliminate(&mut self) {
        self.state = SubmitState::Eliminated;
    }

    pub fn end_game(&mut self) {
        self.state = SubmitState::GameEnded;
    }

    /// Host re-admitted the participant; scoring history is kept
    pub fn readmit(&mut self) -> bool {
        if self.state != SubmitState::Eliminated {
            return false;
        }
        self.state = SubmitState::Waiting;
        self.question = None;
        true
    }

    /// Back to idle between questions (question-advance without a new
    /// activation)
    pub fn reset_to_waiting(&mut self) -> bool {
        use SubmitState::*;
        match self.state {
            Waiting | Answering | Submitting | Submitted | Revealed => {
                self.state = Waiting;
                self.question = None;
                true
            }
            Eliminated | GameEnded => false,
        }
    }
}

impl Default for SubmissionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answering(question: &str) -> SubmissionCoordinator {
        let mut c = SubmissionCoordinator::new();
        assert!(c.begin_question(&question.to_string()));
        c
    }

    #[test]
    fn test_exactly_one_trigger_wins() {
        let mut c = answering("q1");

        // Local expiry wins the guard
        assert_eq!(c.try_begin_submit(SubmitTrigger::Auto), Some("q1".to_string()));
        // Server expiry and a late manual submit are dropped
        assert_eq!(c.try_begin_submit(SubmitTrigger::ServerExpiry), None);
        assert_eq!(c.try_begin_submit(SubmitTrigger::Manual), None);
    }

    #[test]
    fn test_submit_complete_is_terminal() {
        let mut c = answering("q1");
        c.try_begin_submit(SubmitTrigger::Manual).unwrap();
        assert!(c.complete());
        assert_eq!(c.state(), SubmitState::Submitted);

        // Nothing re-triggers after the acknowledgment
        assert_eq!(c.try_begin_submit(SubmitTrigger::Auto), None);
        assert!(!c.complete());
    }

    #[test]
    fn test_rollback_reopens_the_guard_once() {
        let mut c = answering("q1");
        c.try_begin_submit(SubmitTrigger::Manual).unwrap();
        assert!(c.rollback());
        assert_eq!(c.state(), SubmitState::Answering);

        // The replay goes back through the same guard
        assert_eq!(c.try_begin_submit(SubmitTrigger::Manual), Some("q1".to_string()));
        assert_eq!(c.try_begin_submit(SubmitTrigger::Manual), None);
    }

    #[test]
    fn test_rollback_only_from_submitting() {
        let mut c = answering("q1");
        assert!(!c.rollback());
        c.try_begin_submit(SubmitTrigger::Manual).unwrap();
        c.complete();
        assert!(!c.rollback());
    }

    #[test]
    fn test_eliminate_from_any_state_blocks_triggers() {
        for setup in [
            SubmitState::Waiting,
            SubmitState::Answering,
            SubmitState::Submitting,
            SubmitState::Submitted,
        ] {
            let mut c = SubmissionCoordinator::new();
            if setup != SubmitState::Waiting {
                c.begin_question(&"q1".to_string());
            }
            if matches!(setup, SubmitState::Submitting | SubmitState::Submitted) {
                c.try_begin_submit(SubmitTrigger::Manual).unwrap();
            }
            if setup == SubmitState::Submitted {
                c.complete();
            }

            c.eliminate();
            assert_eq!(c.state(), SubmitState::Eliminated);
            // A timer reaching zero afterwards is not honored
            assert_eq!(c.try_begin_submit(SubmitTrigger::Auto), None);
            // And no new question can start
            assert!(!c.begin_question(&"q2".to_string()));
        }
    }

    #[test]
    fn test_readmit_returns_to_waiting() {
        let mut c = answering("q1");
        c.eliminate();
        assert!(c.readmit());
        assert_eq!(c.state(), SubmitState::Waiting);
        assert!(c.begin_question(&"q2".to_string()));
    }

    #[test]
    fn test_readmit_only_from_eliminated() {
        let mut c = answering("q1");
        assert!(!c.readmit());
    }

    #[test]
    fn test_new_question_resets_after_terminal_states() {
        let mut c = answering("q1");
        c.try_begin_submit(SubmitTrigger::Manual).unwrap();
        c.complete();
        c.reveal();

        assert!(c.begin_question(&"q2".to_string()));
        assert_eq!(c.current_question(), Some(&"q2".to_string()));
        assert_eq!(c.try_begin_submit(SubmitTrigger::Manual), Some("q2".to_string()));
    }

    #[test]
    fn test_repeat_activation_of_same_question_is_dropped() {
        let mut c = answering("q1");
        // A duplicate activate push must not reset an in-progress answer
        assert!(!c.begin_question(&"q1".to_string()));

        c.try_begin_submit(SubmitTrigger::Manual).unwrap();
        assert!(!c.begin_question(&"q1".to_string()));
    }

    #[test]
    fn test_server_advance_supersedes_in_progress_question() {
        let mut c = answering("q1");
        assert!(c.begin_question(&"q2".to_string()));
        assert_eq!(c.current_question(), Some(&"q2".to_string()));
    }

    #[test]
    fn test_game_end_is_terminal() {
        let mut c = answering("q1");
        c.end_game();
        assert_eq!(c.try_begin_submit(SubmitTrigger::Manual), None);
        assert!(!c.begin_question(&"q2".to_string()));
        assert!(!c.reset_to_waiting());
    }

    #[test]
    fn test_reveal_is_terminal_for_question() {
        let mut c = answering("q1");
        assert!(c.reveal());
        assert_eq!(c.try_begin_submit(SubmitTrigger::Manual), None);
        assert!(!c.reveal());
    }
}
