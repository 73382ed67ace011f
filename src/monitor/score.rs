//! Integrity score accumulation and the escalation policy.
//!
//! The score is a pure function of accumulated counters and never
//! decreases. Actions are emitted on upward crossings only, so replaying
//! the same violation sequence yields the same action sequence.

use crate::config::MonitorConfig;
use crate::types::{IntegrityAction, Severity, ViolationEvent, ViolationKind};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub score: f64,
    /// Newly crossed escalation step, if any
    pub action: Option<IntegrityAction>,
}

pub struct ScoreAccumulator {
    config: MonitorConfig,
    /// Weighted sum of recorded violations; only ever grows
    base_score: f64,
    /// High-water mark of the unusual-activity term. Recomputed from raw
    /// per-minute volume but only ratcheted upward, preserving monotonicity.
    activity_score: f64,
    counts: HashMap<ViolationKind, u32>,
    /// Warning-level actions seen so far, local and server-reported
    warnings: u32,
    highest_emitted: Option<IntegrityAction>,
}

impl ScoreAccumulator {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            base_score: 0.0,
            activity_score: 0.0,
            counts: HashMap::new(),
            warnings: 0,
            highest_emitted: None,
        }
    }

    pub fn score(&self) -> f64 {
        self.base_score + self.activity_score
    }

    pub fn count(&self, kind: ViolationKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    fn weight(&self, kind: ViolationKind) -> f64 {
        match kind {
            ViolationKind::TabSwitch => self.config.tab_switch_weight,
            ViolationKind::CopyPaste => self.config.copy_paste_weight,
            ViolationKind::DevtoolsOpen => self.config.devtools_weight,
            ViolationKind::ExternalFocus => self.config.external_focus_weight,
            other => match other.severity() {
                Severity::Low => 1.0,
                Severity::Medium => 2.0,
                Severity::High => 3.0,
            },
        }
    }

    /// Fold one violation into the score and evaluate the threshold policy
    pub fn record(&mut self, event: &ViolationEvent) -> ScoreUpdate {
        *self.counts.entry(event.kind).or_insert(0) += 1;
        self.base_score += self.weight(event.kind);

        tracing::debug!(
            kind = ?event.kind,
            severity = ?event.severity,
            score = self.score(),
            "Violation recorded"
        );

        self.evaluate()
    }

    /// Re-derive the unusual-activity term from raw per-minute input volume
    /// in excess of the configured baselines.
    pub fn update_activity(&mut self, keys_per_minute: f64, mouse_per_minute: f64) -> ScoreUpdate {
        let excess = (keys_per_minute - self.config.baseline_keys_per_min).max(0.0)
            + (mouse_per_minute - self.config.baseline_mouse_per_min).max(0.0);
        let candidate = excess * self.config.unusual_activity_scale;
        if candidate > self.activity_score {
            self.activity_score = candidate;
        }
        self.evaluate()
    }

    /// Fold in the warning count the server reported back for this session
    pub fn note_server_warnings(&mut self, warning_count: u32) -> ScoreUpdate {
        self.warnings = self.warnings.max(warning_count);
        self.evaluate()
    }

    /// Deterministic threshold policy: compute the level implied by the
    /// current counters (highest wins), emit it only if it escalates past
    /// everything already emitted.
    fn evaluate(&mut self) -> ScoreUpdate {
        let score = self.score();
        let c = &self.config;

        let level = if score >= c.eliminate_threshold || self.warnings >= c.warning_cap {
            Some(IntegrityAction::Eliminate)
        } else if score >= c.severe_threshold
            || self.count(ViolationKind::DevtoolsOpen) >= c.devtools_tripwire
        {
            Some(IntegrityAction::SevereWarning)
        } else if score >= c.warning_threshold {
            Some(IntegrityAction::Warning)
        } else if score >= c.notice_threshold {
            Some(IntegrityAction::Notice)
        } else {
            None
        };

        let action = match (level, self.highest_emitted) {
            (Some(level), Some(prev)) if level <= prev => None,
            (Some(level), _) => {
                self.highest_emitted = Some(level);
                if matches!(level, IntegrityAction::Warning | IntegrityAction::SevereWarning) {
                    self.warnings += 1;
                }
                Some(level)
            }
            (None, _) => None,
        };

        if let Some(action) = action {
            tracing::warn!(?action, score, warnings = self.warnings, "Integrity action crossed");
        }

        ScoreUpdate { score, action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ViolationContext, ViolationEvent};
    use chrono::Utc;

    fn event(kind: ViolationKind) -> ViolationEvent {
        ViolationEvent::new(kind, Utc::now(), ViolationContext::default())
    }

    fn accumulator() -> ScoreAccumulator {
        ScoreAccumulator::new(MonitorConfig::default())
    }

    #[test]
    fn test_weighted_sum() {
        let mut acc = accumulator();
        acc.record(&event(ViolationKind::TabSwitch)); // 2.0
        acc.record(&event(ViolationKind::CopyPaste)); // 1.5
        acc.record(&event(ViolationKind::ExternalFocus)); // 1.0
        assert!((acc.score() - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_monotone() {
        let mut acc = accumulator();
        let mut last = 0.0;
        let kinds = [
            ViolationKind::ExternalFocus,
            ViolationKind::TabSwitch,
            ViolationKind::BlockedShortcut,
            ViolationKind::DevtoolsOpen,
            ViolationKind::CopyPaste,
            ViolationKind::InputBurst,
        ];
        for kind in kinds.iter().cycle().take(30) {
            let update = acc.record(&event(*kind));
            assert!(update.score >= last);
            last = update.score;
        }

        // Activity dropping back to baseline must not lower the score
        acc.update_activity(400.0, 0.0);
        let peak = acc.score();
        let update = acc.update_activity(0.0, 0.0);
        assert!(update.score >= peak);
    }

    #[test]
    fn test_thresholds_escalate_in_order() {
        let mut acc = accumulator();
        let mut actions = Vec::new();
        // Tab switches are worth 2.0 each; defaults: notice 5, warning 10,
        // severe 15, eliminate 25
        for _ in 0..13 {
            if let Some(a) = acc.record(&event(ViolationKind::TabSwitch)).action {
                actions.push(a);
            }
        }
        assert_eq!(
            actions,
            vec![
                IntegrityAction::Notice,
                IntegrityAction::Warning,
                IntegrityAction::SevereWarning,
                IntegrityAction::Eliminate,
            ]
        );
    }

    #[test]
    fn test_actions_not_repeated_at_same_level() {
        let mut acc = accumulator();
        acc.record(&event(ViolationKind::TabSwitch));
        acc.record(&event(ViolationKind::TabSwitch));
        let first = acc.record(&event(ViolationKind::TabSwitch)); // 6.0 crosses notice
        assert_eq!(first.action, Some(IntegrityAction::Notice));

        let repeat = acc.record(&event(ViolationKind::ExternalFocus)); // still below warning
        assert_eq!(repeat.action, None);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let sequence = [
            ViolationKind::TabSwitch,
            ViolationKind::DevtoolsOpen,
            ViolationKind::CopyPaste,
            ViolationKind::TabSwitch,
            ViolationKind::DevtoolsOpen,
            ViolationKind::TabSwitch,
            ViolationKind::DevtoolsOpen,
            ViolationKind::CopyPaste,
        ];

        let run = |seq: &[ViolationKind]| {
            let mut acc = accumulator();
            seq.iter()
                .map(|k| acc.record(&event(*k)).action)
                .collect::<Vec<_>>()
        };

        assert_eq!(run(&sequence), run(&sequence));
    }

    #[test]
    fn test_devtools_tripwire_forces_severe_warning() {
        let mut acc = accumulator();
        // 3 devtools attempts = score 9.0, below the severe threshold, but
        // the count trip-wire fires
        acc.record(&event(ViolationKind::DevtoolsOpen));
        acc.record(&event(ViolationKind::DevtoolsOpen));
        let update = acc.record(&event(ViolationKind::DevtoolsOpen));
        assert_eq!(update.action, Some(IntegrityAction::SevereWarning));
    }

    #[test]
    fn test_warning_cap_eliminates() {
        let mut acc = accumulator();
        acc.note_server_warnings(2);
        assert_eq!(acc.warnings(), 2);

        // The third warning (server-side count) tips the cap
        let update = acc.note_server_warnings(3);
        assert_eq!(update.action, Some(IntegrityAction::Eliminate));
    }

    #[test]
    fn test_unusual_activity_feeds_score() {
        let mut acc = accumulator();
        // 150 keys/min over a 50/min baseline at 0.05 scale = 5.0 → notice
        let update = acc.update_activity(150.0, 0.0);
        assert!((update.score - 5.0).abs() < f64::EPSILON);
        assert_eq!(update.action, Some(IntegrityAction::Notice));
    }
}
