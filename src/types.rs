use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type GameId = String;
pub type QuestionId = String;
pub type ParticipantId = String;
pub type AttemptId = String;
pub type ViolationId = String;

/// Answer payloads are opaque to the engine; the per-question-type widgets
/// produce them and the server interprets them.
pub type AnswerPayload = serde_json::Value;

/// Externally observable phase of a participant's session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Connecting,
    Waiting,
    Answering,
    Submitting,
    Submitted,
    Revealed,
    Paused,
    Eliminated,
    Ended,
}

/// Overall game status as reported by the server on rejoin
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Lobby,
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    Crossword,
    CodeEditor,
    Image,
    FillBlank,
}

/// The question currently open for answers. Replaced wholesale on every
/// question-advance push, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveQuestion {
    pub id: QuestionId,
    pub kind: QuestionKind,
    /// Absolute deadline, not a duration
    pub ends_at: DateTime<Utc>,
    pub points: u32,
    pub hint: Option<String>,
}

/// What caused a submission to be dispatched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Auto,
    ServerExpiry,
}

/// A single dispatched answer. At most one per question per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionAttempt {
    pub id: AttemptId,
    pub question_id: QuestionId,
    pub answer: AnswerPayload,
    pub trigger: SubmitTrigger,
    pub time_taken_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Detected suspicious behaviors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabSwitch,
    ExternalFocus,
    CopyPaste,
    BlockedShortcut,
    DevtoolsOpen,
    LowVarianceTyping,
    SequentialKeys,
    RoboticPointer,
    InputBurst,
}

impl ViolationKind {
    /// Severity is a fixed lookup per kind, not computed per instance
    pub fn severity(&self) -> Severity {
        match self {
            ViolationKind::TabSwitch => Severity::Medium,
            ViolationKind::ExternalFocus => Severity::Low,
            ViolationKind::CopyPaste => Severity::Medium,
            ViolationKind::BlockedShortcut => Severity::Low,
            ViolationKind::DevtoolsOpen => Severity::High,
            ViolationKind::LowVarianceTyping => Severity::Medium,
            ViolationKind::SequentialKeys => Severity::Medium,
            ViolationKind::RoboticPointer => Severity::High,
            ViolationKind::InputBurst => Severity::Low,
        }
    }
}

/// Snapshot of the permanent counters at the moment a violation was raised
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViolationContext {
    pub tab_switches: u32,
    pub copy_paste_attempts: u32,
    pub devtools_attempts: u32,
    pub external_focus_losses: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub id: ViolationId,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub at: DateTime<Utc>,
    pub context: ViolationContext,
}

impl ViolationEvent {
    pub fn new(kind: ViolationKind, at: DateTime<Utc>, context: ViolationContext) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            kind,
            severity: kind.severity(),
            at,
            context,
        }
    }
}

/// Escalation steps the score accumulator can trigger, weakest first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityAction {
    Notice,
    Warning,
    SevereWarning,
    Eliminate,
}

/// One row of a leaderboard-update push
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub participant_id: ParticipantId,
    pub display_name: Option<String>,
    pub score: u32,
}
