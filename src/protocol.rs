use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-pushed channel events. A closed enum handled exhaustively, so a
/// new event kind is a compile-time-checked addition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A question is now open for answers
    QuestionActivated { question: ActiveQuestion },
    /// Host moved on without opening a new question yet
    QuestionAdvance,
    /// The answer for the current question was revealed
    AnswerRevealed { question_id: QuestionId },
    /// Advisory duplicate of the local countdown hitting zero
    QuestionTimeExpired { question_id: QuestionId },
    LeaderboardUpdate { entries: Vec<LeaderboardEntry> },
    GamePaused,
    GameResumed,
    GameEnded,
    ParticipantEliminated { reason: Option<String> },
    ParticipantReadmitted,
}

/// Transport-level events delivered alongside server pushes
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Event(ServerEvent),
}

/// Response to a rejoin call, safe to apply on every reconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejoinResponse {
    pub participant_id: ParticipantId,
    pub game_id: GameId,
    pub game_status: GameStatus,
    pub active_question: Option<ActiveQuestion>,
    pub eliminated: bool,
    pub server_now: DateTime<Utc>,
}

/// Server's answer to a submission. Idempotent per question: a second call
/// for an already-answered question returns the prior result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub is_correct: Option<bool>,
    pub score_earned: Option<u32>,
    pub message: Option<String>,
}

/// Acknowledgment for a reported violation (fire-and-forget on our side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationReceipt {
    pub warning_count: u32,
    pub action: Option<IntegrityAction>,
}

/// The per-question result most recently acknowledged by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub is_correct: Option<bool>,
    pub score_earned: u32,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_event_wire_format_is_tagged() {
        let ev = ServerEvent::QuestionTimeExpired {
            question_id: "q1".to_string(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""t":"question_time_expired""#));

        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        match back {
            ServerEvent::QuestionTimeExpired { question_id } => assert_eq!(question_id, "q1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn question_activated_round_trips_deadline() {
        let ends_at = Utc::now();
        let ev = ServerEvent::QuestionActivated {
            question: ActiveQuestion {
                id: "q7".to_string(),
                kind: QuestionKind::MultipleChoice,
                ends_at,
                points: 100,
                hint: None,
            },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        match back {
            ServerEvent::QuestionActivated { question } => assert_eq!(question.ends_at, ends_at),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
