use crate::protocol::{RejoinResponse, SubmitOutcome, ViolationReceipt};
use crate::types::{SubmissionAttempt, ViolationEvent};
use async_trait::async_trait;

/// Result type for API calls
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors from the storage/API layer, classified by how the session engine
/// must react to them.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No connectivity. The only retryable class: the attempt is queued and
    /// replayed when the channel comes back.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Malformed answer payload. Surfaced to the user, never retried
    /// automatically.
    #[error("rejected answer: {0}")]
    Validation(String),

    /// The server already closed this question. Terminal success with zero
    /// awarded score, not an error from the state machine's point of view.
    #[error("question already closed server-side")]
    QuestionClosed,

    /// Server-side failure (5xx). The session stays in ANSWERING and the
    /// user may retry manually.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
}

/// Minimal contract the session engine requires from the excluded
/// storage/API layer.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Idempotent, safe to call on every reconnect
    async fn rejoin(&self, session_token: &str) -> ApiResult<RejoinResponse>;

    /// Idempotent per question server-side: a second call for an already
    /// answered question returns the prior result.
    async fn submit_answer(&self, attempt: &SubmissionAttempt) -> ApiResult<SubmitOutcome>;

    /// Fire-and-forget from the caller's perspective; the session never
    /// blocks on this.
    async fn report_violation(&self, event: &ViolationEvent) -> ApiResult<ViolationReceipt>;
}
