//! Local harness: runs the session engine against a scripted in-process
//! server so the full question flow (activate, countdown, auto-submit,
//! reveal) can be exercised without a live backend.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizdash::api::{ApiResult, GameApi};
use quizdash::clock::store::MemoryTimerStore;
use quizdash::config::{EngineConfig, MonitorConfig};
use quizdash::monitor::RawSignal;
use quizdash::protocol::{ChannelEvent, RejoinResponse, ServerEvent, SubmitOutcome, ViolationReceipt};
use quizdash::session::SessionController;
use quizdash::types::*;

struct ScriptedApi;

#[async_trait]
impl GameApi for ScriptedApi {
    async fn rejoin(&self, _session_token: &str) -> ApiResult<RejoinResponse> {
        Ok(RejoinResponse {
            participant_id: "demo-participant".to_string(),
            game_id: "demo-game".to_string(),
            game_status: GameStatus::Active,
            active_question: None,
            eliminated: false,
            server_now: Utc::now(),
        })
    }

    async fn submit_answer(&self, attempt: &SubmissionAttempt) -> ApiResult<SubmitOutcome> {
        tracing::info!(question_id = %attempt.question_id, trigger = ?attempt.trigger, "Scripted server received submission");
        Ok(SubmitOutcome {
            accepted: true,
            is_correct: Some(true),
            score_earned: Some(100),
            message: None,
        })
    }

    async fn report_violation(&self, event: &ViolationEvent) -> ApiResult<ViolationReceipt> {
        tracing::info!(kind = ?event.kind, "Scripted server received violation report");
        Ok(ViolationReceipt {
            warning_count: 0,
            action: None,
        })
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizdash=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting quizdash harness...");

    let (events_tx, events_rx) = mpsc::channel(16);
    let handle = SessionController::start(
        EngineConfig::from_env(),
        MonitorConfig::from_env(),
        Arc::new(ScriptedApi),
        Arc::new(MemoryTimerStore::default()),
        "demo-token".to_string(),
        events_rx,
    )
    .await
    .expect("scripted rejoin cannot fail");

    // Open a 5-second question
    events_tx
        .send(ChannelEvent::Event(ServerEvent::QuestionActivated {
            question: ActiveQuestion {
                id: "demo-q1".to_string(),
                kind: QuestionKind::MultipleChoice,
                ends_at: Utc::now() + chrono::Duration::seconds(5),
                points: 100,
                hint: None,
            },
        }))
        .await
        .expect("session loop alive");

    // Simulate a participant typing a draft and wandering off to another tab
    handle
        .update_draft(serde_json::json!({ "choice": 2 }))
        .await
        .expect("session loop alive");
    handle
        .signal(RawSignal::VisibilityChange { hidden: true })
        .await
        .expect("session loop alive");

    // Let the countdown run out; the engine auto-submits the draft
    let mut view = handle.view();
    loop {
        view.changed().await.expect("session loop alive");
        let current = view.borrow().clone();
        tracing::info!(
            phase = ?current.phase,
            remaining = ?current.remaining_seconds,
            score = current.integrity_score,
            "View updated"
        );
        if current.phase == SessionPhase::Submitted {
            tracing::info!(result = ?current.last_result, "Question answered");
            break;
        }
    }

    handle.shutdown().await.ok();
}
