//! The session controller: one cooperative event loop per participant run.
//!
//! All session state is owned by a single spawned task and mutated only
//! there; ticks, window sweeps, server pushes, and local commands are
//! interleaved through `tokio::select!`, never run in parallel against the
//! state. The externally observable read model is published through a
//! `watch` channel after every loop iteration.

pub mod dispatch;
pub mod submission;

use crate::api::{ApiError, GameApi};
use crate::clock::store::TimerStore;
use crate::clock::ClockReconciler;
use crate::config::{EngineConfig, MonitorConfig};
use crate::monitor::sampler::RawSignal;
use crate::monitor::{classifier, EventSampler, ScoreAccumulator};
use crate::protocol::{ChannelEvent, QuestionResult, RejoinResponse, ViolationReceipt};
use crate::types::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use submission::{SubmissionCoordinator, SubmitState};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to join session: {0}")]
    Join(#[from] ApiError),

    #[error("session loop has stopped")]
    Closed,
}

/// Commands delivered into the session loop. The UI layer uses the
/// [`SessionHandle`] methods; the `ViolationAck`/`Rejoined`/`ReconnectFailed`
/// variants are fed back by tasks the loop itself spawned.
#[derive(Debug)]
pub enum Command {
    Submit { answer: AnswerPayload },
    UpdateDraft { answer: AnswerPayload },
    Signal(RawSignal),
    ViolationAck(ViolationReceipt),
    Rejoined(Box<RejoinResponse>),
    ReconnectFailed,
    Shutdown,
}

/// Externally observable session state
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub connected: bool,
    pub remaining_seconds: Option<u64>,
    pub integrity_score: f64,
    pub question: Option<ActiveQuestion>,
    pub last_result: Option<QuestionResult>,
    pub last_action: Option<IntegrityAction>,
    pub last_error: Option<String>,
    pub elimination_reason: Option<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl SessionView {
    fn connecting() -> Self {
        Self {
            phase: SessionPhase::Connecting,
            connected: false,
            remaining_seconds: None,
            integrity_score: 0.0,
            question: None,
            last_result: None,
            last_action: None,
            last_error: None,
            elimination_reason: None,
            leaderboard: Vec::new(),
        }
    }
}

/// Cheap cloneable handle for the UI layer
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl SessionHandle {
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn current(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub async fn submit(&self, answer: AnswerPayload) -> Result<(), SessionError> {
        self.send(Command::Submit { answer }).await
    }

    /// Keep the loop's draft current so an auto-submit carries the latest
    /// widget state
    pub async fn update_draft(&self, answer: AnswerPayload) -> Result<(), SessionError> {
        self.send(Command::UpdateDraft { answer }).await
    }

    pub async fn signal(&self, signal: RawSignal) -> Result<(), SessionError> {
        self.send(Command::Signal(signal)).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

pub struct SessionController {
    config: EngineConfig,
    monitor_config: MonitorConfig,
    api: Arc<dyn GameApi>,
    session_token: String,
    participant_id: ParticipantId,

    clock: ClockReconciler,
    coordinator: SubmissionCoordinator,
    sampler: EventSampler,
    scores: ScoreAccumulator,

    question: Option<ActiveQuestion>,
    question_started_at: Option<DateTime<Utc>>,
    draft: AnswerPayload,
    pending_retry: Option<SubmissionAttempt>,

    paused: bool,
    paused_remaining: Option<u64>,
    connected: bool,
    reconnect_in_flight: bool,

    remaining: Option<u64>,
    last_result: Option<QuestionResult>,
    last_action: Option<IntegrityAction>,
    last_error: Option<String>,
    elimination_reason: Option<String>,
    leaderboard: Vec<LeaderboardEntry>,

    commands: mpsc::Sender<Command>,
    view_tx: watch::Sender<SessionView>,
}

impl SessionController {
    /// Join the game and spawn the session loop. The initial rejoin happens
    /// inline so a bad token fails fast; afterwards the loop owns all state.
    pub async fn start(
        config: EngineConfig,
        monitor_config: MonitorConfig,
        api: Arc<dyn GameApi>,
        store: Arc<dyn TimerStore>,
        session_token: String,
        events: mpsc::Receiver<ChannelEvent>,
    ) -> Result<SessionHandle, SessionError> {
        let response = api.rejoin(&session_token).await?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let (view_tx, view_rx) = watch::channel(SessionView::connecting());

        let participant_id = response.participant_id.clone();
        tracing::info!(
            participant_id = %participant_id,
            game_id = %response.game_id,
            status = ?response.game_status,
            "Joined game session"
        );

        let mut controller = Self {
            config,
            sampler: EventSampler::new(&monitor_config),
            scores: ScoreAccumulator::new(monitor_config.clone()),
            monitor_config,
            api,
            session_token,
            clock: ClockReconciler::new(participant_id.clone(), store),
            participant_id,
            coordinator: SubmissionCoordinator::new(),
            question: None,
            question_started_at: None,
            draft: AnswerPayload::Null,
            pending_retry: None,
            paused: false,
            paused_remaining: None,
            connected: true,
            reconnect_in_flight: false,
            remaining: None,
            last_result: None,
            last_action: None,
            last_error: None,
            elimination_reason: None,
            leaderboard: Vec::new(),
            commands: command_tx.clone(),
            view_tx,
        };

        controller.apply_rejoin(response, Utc::now());
        controller.publish();

        tokio::spawn(controller.run(events, command_rx));

        Ok(SessionHandle {
            commands: command_tx,
            view: view_rx,
        })
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => self.on_tick(Utc::now()).await,
                _ = sweep.tick() => self.on_sweep(Utc::now()),
                event = events.recv() => match event {
                    Some(event) => self.on_channel_event(event).await,
                    None => {
                        tracing::info!("Server channel closed, stopping session loop");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
            }
            self.publish();
        }
    }

    async fn on_tick(&mut self, now: DateTime<Utc>) {
        if self.paused {
            return;
        }
        let Some(remaining) = self.clock.tick(now) else {
            return;
        };
        self.remaining = Some(remaining);

        if remaining == 0 && self.coordinator.state() == SubmitState::Answering {
            tracing::info!(
                question_id = ?self.coordinator.current_question(),
                "Local countdown expired, auto-submitting"
            );
            let draft = self.draft.clone();
            self.trigger_submit(SubmitTrigger::Auto, draft, now).await;
        }
    }

    fn on_sweep(&mut self, now: DateTime<Utc>) {
        if !self.monitoring_active() {
            return;
        }
        let snapshot = self.sampler.snapshot();
        for event in classifier::classify_window(&snapshot, &self.monitor_config, now) {
            self.process_violation(event);
        }

        let update = self
            .scores
            .update_activity(snapshot.keys_per_minute(), snapshot.mouse_events_per_minute());
        if let Some(action) = update.action {
            self.apply_action(action);
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { answer } => {
                self.draft = answer.clone();
                self.trigger_submit(SubmitTrigger::Manual, answer, Utc::now())
                    .await;
            }
            Command::UpdateDraft { answer } => self.draft = answer,
            Command::Signal(signal) => self.on_signal(signal, Utc::now()),
            Command::ViolationAck(receipt) => {
                let update = self.scores.note_server_warnings(receipt.warning_count);
                if let Some(action) = receipt.action.or(update.action) {
                    self.apply_action(action);
                }
            }
            Command::Rejoined(response) => {
                self.reconnect_in_flight = false;
                self.apply_rejoin(*response, Utc::now());
                self.replay_pending().await;
            }
            Command::ReconnectFailed => {
                self.reconnect_in_flight = false;
                self.last_error =
                    Some("connection lost, manual reconnect required".to_string());
            }
            // Handled in the loop itself
            Command::Shutdown => {}
        }
    }

    fn on_signal(&mut self, signal: RawSignal, now: DateTime<Utc>) {
        if !self.monitoring_active() {
            return;
        }
        self.sampler.sample(&signal, now);
        if let Some(event) =
            classifier::classify_inline(&signal, self.sampler.counters(), &self.monitor_config, now)
        {
            self.process_violation(event);
        }
    }

    fn monitoring_active(&self) -> bool {
        !matches!(
            self.coordinator.state(),
            SubmitState::Eliminated | SubmitState::GameEnded
        )
    }

    fn process_violation(&mut self, event: ViolationEvent) {
        let update = self.scores.record(&event);
        self.report_violation(event);
        if let Some(action) = update.action {
            self.apply_action(action);
        }
    }

    /// Fire-and-forget report; the receipt is folded back in via the
    /// command channel whenever it arrives.
    fn report_violation(&self, event: ViolationEvent) {
        let api = self.api.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            match api.report_violation(&event).await {
                Ok(receipt) => {
                    let _ = commands.send(Command::ViolationAck(receipt)).await;
                }
                Err(e) => {
                    tracing::warn!(kind = ?event.kind, error = %e, "Violation report failed");
                }
            }
        });
    }

    fn apply_action(&mut self, action: IntegrityAction) {
        self.last_action = Some(action);
        if action == IntegrityAction::Eliminate {
            self.eliminate_locally(Some("integrity threshold crossed".to_string()));
        }
    }

    /// Local elimination, ahead of (or confirming) the server's decision
    fn eliminate_locally(&mut self, reason: Option<String>) {
        tracing::warn!(reason = reason.as_deref(), "Session eliminated");
        self.coordinator.eliminate();
        self.clock.clear();
        self.remaining = None;
        self.pending_retry = None;
        self.elimination_reason = reason;
    }

    async fn trigger_submit(
        &mut self,
        trigger: SubmitTrigger,
        answer: AnswerPayload,
        now: DateTime<Utc>,
    ) {
        let Some(question_id) = self.coordinator.try_begin_submit(trigger) else {
            return;
        };
        let time_taken_seconds = self
            .question_started_at
            .map(|started| (now - started).num_seconds().max(0) as u64)
            .unwrap_or(0);

        let attempt = SubmissionAttempt {
            id: ulid::Ulid::new().to_string(),
            question_id,
            answer,
            trigger,
            time_taken_seconds,
        };
        self.dispatch_attempt(attempt).await;
    }

    async fn dispatch_attempt(&mut self, attempt: SubmissionAttempt) {
        tracing::info!(
            question_id = %attempt.question_id,
            trigger = ?attempt.trigger,
            time_taken = attempt.time_taken_seconds,
            "Dispatching submission"
        );

        match self.api.submit_answer(&attempt).await {
            Ok(outcome) => {
                self.coordinator.complete();
                self.clock.clear();
                self.remaining = None;
                self.pending_retry = None;
                self.last_error = None;
                self.last_result = Some(QuestionResult {
                    question_id: attempt.question_id,
                    is_correct: outcome.is_correct,
                    score_earned: outcome.score_earned.unwrap_or(0),
                    message: outcome.message,
                });
            }
            // The server closed the question first: terminal, zero score
            Err(ApiError::QuestionClosed) => {
                self.coordinator.complete();
                self.clock.clear();
                self.remaining = None;
                self.pending_retry = None;
                self.last_result = Some(QuestionResult {
                    question_id: attempt.question_id,
                    is_correct: None,
                    score_earned: 0,
                    message: Some("question already closed".to_string()),
                });
            }
            Err(ApiError::Transport(message)) => {
                tracing::warn!(error = %message, "Submission hit transport failure, queueing for replay");
                self.coordinator.rollback();
                self.pending_retry = Some(attempt);
            }
            Err(ApiError::Validation(message)) => {
                self.coordinator.rollback();
                self.last_error = Some(message);
            }
            Err(ApiError::Server { status, message }) => {
                // User may retry manually; no automatic retry
                tracing::error!(status, error = %message, "Submission failed server-side");
                self.coordinator.rollback();
                self.last_error = Some(format!("server error {}: {}", status, message));
            }
        }
    }

    /// Replay a transport-queued attempt after a successful rejoin
    async fn replay_pending(&mut self) {
        let Some(attempt) = self.pending_retry.take() else {
            return;
        };
        if self.coordinator.current_question() != Some(&attempt.question_id) {
            tracing::debug!(
                question_id = %attempt.question_id,
                "Dropping queued attempt for a superseded question"
            );
            return;
        }
        if self.coordinator.try_begin_submit(attempt.trigger).is_some() {
            tracing::info!(question_id = %attempt.question_id, "Replaying queued submission");
            self.dispatch_attempt(attempt).await;
        }
    }

    fn phase(&self) -> SessionPhase {
        match (self.coordinator.state(), self.paused) {
            (SubmitState::Eliminated, _) => SessionPhase::Eliminated,
            (SubmitState::GameEnded, _) => SessionPhase::Ended,
            (_, true) => SessionPhase::Paused,
            (SubmitState::Waiting, _) => SessionPhase::Waiting,
            (SubmitState::Answering, _) => SessionPhase::Answering,
            (SubmitState::Submitting, _) => SessionPhase::Submitting,
            (SubmitState::Submitted, _) => SessionPhase::Submitted,
            (SubmitState::Revealed, _) => SessionPhase::Revealed,
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(SessionView {
            phase: self.phase(),
            connected: self.connected,
            remaining_seconds: self.remaining,
            integrity_score: self.scores.score(),
            question: self.question.clone(),
            last_result: self.last_result.clone(),
            last_action: self.last_action,
            last_error: self.last_error.clone(),
            elimination_reason: self.elimination_reason.clone(),
            leaderboard: self.leaderboard.clone(),
        });
    }
}
