//! Inbound channel-event handling for the session loop.
//!
//! Every server push is matched exhaustively; adding an event kind is a
//! compile-time-checked change here.

use super::submission::SubmitState;
use super::{Command, SessionController};
use crate::protocol::{ChannelEvent, RejoinResponse, ServerEvent};
use crate::types::{ActiveQuestion, AnswerPayload, GameStatus, SubmitTrigger};
use chrono::{DateTime, Utc};
use std::time::Duration;

impl SessionController {
    pub(super) async fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.connected = true;
                // Resync through rejoin; the channel alone says nothing about
                // what we missed
                self.spawn_reconnect();
            }
            ChannelEvent::Disconnected => {
                tracing::warn!("Server channel lost, countdown continues locally");
                self.connected = false;
                self.spawn_reconnect();
            }
            ChannelEvent::Event(event) => self.apply_server_event(event).await,
        }
    }

    async fn apply_server_event(&mut self, event: ServerEvent) {
        let now = Utc::now();
        match event {
            ServerEvent::QuestionActivated { question } => {
                self.activate_question(question, now);
            }
            ServerEvent::QuestionAdvance => {
                if self.coordinator.reset_to_waiting() {
                    self.clock.clear();
                    self.question = None;
                    self.question_started_at = None;
                    self.remaining = None;
                    self.pending_retry = None;
                }
            }
            ServerEvent::AnswerRevealed { question_id } => {
                if self.is_current_question(&question_id) && self.coordinator.reveal() {
                    self.clock.clear();
                    self.remaining = None;
                    self.pending_retry = None;
                }
            }
            ServerEvent::QuestionTimeExpired { question_id } => {
                // Advisory duplicate of the local expiry; the guard makes the
                // race harmless
                if self.is_current_question(&question_id) {
                    let draft = self.draft.clone();
                    self.trigger_submit(SubmitTrigger::ServerExpiry, draft, now)
                        .await;
                }
            }
            ServerEvent::LeaderboardUpdate { entries } => {
                self.leaderboard = entries;
            }
            ServerEvent::GamePaused => self.pause(now),
            ServerEvent::GameResumed => self.resume(now),
            ServerEvent::GameEnded => {
                tracing::info!("Game ended");
                self.coordinator.end_game();
                self.clock.clear();
                self.question = None;
                self.remaining = None;
                self.pending_retry = None;
            }
            ServerEvent::ParticipantEliminated { reason } => {
                self.eliminate_locally(reason.or_else(|| Some("eliminated by server".to_string())));
            }
            ServerEvent::ParticipantReadmitted => {
                if self.coordinator.readmit() {
                    tracing::info!("Re-admitted to the game");
                    self.elimination_reason = None;
                }
            }
        }
    }

    fn is_current_question(&self, question_id: &str) -> bool {
        self.question.as_ref().map(|q| q.id.as_str()) == Some(question_id)
    }

    /// Replace the active question and reset the countdown as one atomic
    /// step, so no tick observed mid-switch is attributed to the old
    /// question.
    fn activate_question(&mut self, question: ActiveQuestion, now: DateTime<Utc>) {
        if self
            .pending_retry
            .as_ref()
            .is_some_and(|a| a.question_id != question.id)
        {
            tracing::debug!("Dropping queued attempt for a previous question");
            self.pending_retry = None;
        }

        if !self.coordinator.begin_question(&question.id) {
            // Terminal session state, or a duplicate push for the question
            // already in progress
            tracing::debug!(question_id = %question.id, state = ?self.coordinator.state(), "Activation ignored");
            return;
        }

        // restore() resumes a persisted countdown for this exact question
        // (reload mid-question) and otherwise derives from the deadline
        let remaining = self.clock.restore(&question.id, question.ends_at, now);
        tracing::info!(question_id = %question.id, remaining, "Question activated");

        self.question = Some(question);
        self.question_started_at = Some(now);
        self.draft = AnswerPayload::Null;
        self.remaining = Some(remaining);
        self.last_error = None;
        if self.paused {
            self.paused_remaining = Some(remaining);
        }
    }

    pub(super) fn apply_rejoin(&mut self, response: RejoinResponse, now: DateTime<Utc>) {
        self.connected = true;

        if response.game_status == GameStatus::Ended {
            self.coordinator.end_game();
            self.clock.clear();
            self.question = None;
            self.remaining = None;
            self.pending_retry = None;
            return;
        }

        if response.eliminated {
            self.eliminate_locally(Some("eliminated (server state)".to_string()));
            return;
        }

        self.paused = response.game_status == GameStatus::Paused;

        match response.active_question {
            Some(question) => {
                let already_submitted = self.coordinator.state() == SubmitState::Submitted
                    && self.coordinator.current_question() == Some(&question.id);
                if already_submitted {
                    // Never re-enter ANSWERING for a question we already
                    // answered; just refresh the display copy
                    self.question = Some(question);
                } else {
                    self.activate_question(question, now);
                }
            }
            None => {
                if self.coordinator.reset_to_waiting() {
                    self.clock.clear();
                    self.question = None;
                    self.question_started_at = None;
                    self.remaining = None;
                }
            }
        }
    }

    /// Freeze the countdown; the deadline is re-anchored on resume
    fn pause(&mut self, now: DateTime<Utc>) {
        if self.paused {
            return;
        }
        tracing::info!("Game paused");
        self.paused = true;
        self.paused_remaining = self.clock.tick(now);
    }

    fn resume(&mut self, now: DateTime<Utc>) {
        if !self.paused {
            return;
        }
        tracing::info!(remaining = ?self.paused_remaining, "Game resumed");
        self.paused = false;
        if let (Some(question), Some(remaining)) = (&self.question, self.paused_remaining.take()) {
            if self.coordinator.state() == SubmitState::Answering {
                let ends_at = now + chrono::Duration::seconds(remaining as i64);
                self.clock.activate(&question.id, ends_at, now);
                self.remaining = Some(remaining);
            }
        }
    }

    /// Re-establish the logical session off-loop: rejoin with exponential
    /// backoff plus jitter, feeding the result back as a command. At most
    /// one reconnect task runs at a time.
    fn spawn_reconnect(&mut self) {
        if self.reconnect_in_flight {
            return;
        }
        self.reconnect_in_flight = true;

        let api = self.api.clone();
        let token = self.session_token.clone();
        let commands = self.commands.clone();
        let base = self.config.reconnect_base_backoff;
        let max = self.config.reconnect_max_backoff;
        let max_attempts = self.config.reconnect_max_attempts;

        tokio::spawn(async move {
            let mut delay = base;
            for attempt in 1..=max_attempts {
                match api.rejoin(&token).await {
                    Ok(response) => {
                        tracing::info!(attempt, "Rejoined after reconnect");
                        let _ = commands.send(Command::Rejoined(Box::new(response))).await;
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Rejoin failed, backing off");
                        let jitter =
                            rand::random_range(0..=(delay.as_millis() as u64 / 2).max(1));
                        tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
                        delay = (delay * 2).min(max);
                    }
                }
            }
            let _ = commands.send(Command::ReconnectFailed).await;
        });
    }
}
