use crate::config::MonitorConfig;
use crate::types::ViolationContext;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Raw interaction signals forwarded from the UI layer. Keystroke signals
/// carry metadata only, never content.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSignal {
    Keystroke { key_code: u32 },
    PointerMove { x: f64, y: f64 },
    Click,
    VisibilityChange { hidden: bool },
    FocusChange { focused: bool },
    BlockedShortcut { combo: String },
    CopyPaste,
    /// Timing probe for devtools presence: measured pause around an
    /// instrumented breakpoint plus the outer/inner viewport delta
    DevtoolsProbe { pause_ms: u64, viewport_delta_px: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySample {
    pub at: DateTime<Utc>,
    pub key_code: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerSample {
    pub at: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
}

/// Read-only view over the buffered window handed to the classifier
#[derive(Debug, Clone)]
pub struct SamplerSnapshot {
    pub keystrokes: Vec<KeySample>,
    pub pointer: Vec<PointerSample>,
    pub clicks: Vec<DateTime<Utc>>,
    pub counters: ViolationContext,
    pub window: Duration,
}

impl SamplerSnapshot {
    pub fn keys_per_minute(&self) -> f64 {
        per_minute(self.keystrokes.len(), self.window)
    }

    /// Pointer motion and clicks combined
    pub fn mouse_events_per_minute(&self) -> f64 {
        per_minute(self.pointer.len() + self.clicks.len(), self.window)
    }
}

fn per_minute(count: usize, window: Duration) -> f64 {
    let secs = window.num_seconds().max(1) as f64;
    count as f64 * 60.0 / secs
}

/// Bounded recent-history buffers per signal channel plus permanent
/// monotonically incrementing counters. No side effects beyond its own
/// buffers; never touches the network.
pub struct EventSampler {
    window: Duration,
    devtools_pause_ms: u64,
    viewport_delta_px: u32,
    keystrokes: VecDeque<KeySample>,
    pointer: VecDeque<PointerSample>,
    clicks: VecDeque<DateTime<Utc>>,
    counters: ViolationContext,
}

impl EventSampler {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            window: Duration::from_std(config.window).unwrap_or(Duration::seconds(30)),
            devtools_pause_ms: config.devtools_pause_ms,
            viewport_delta_px: config.viewport_delta_px,
            keystrokes: VecDeque::new(),
            pointer: VecDeque::new(),
            clicks: VecDeque::new(),
            counters: ViolationContext::default(),
        }
    }

    /// True if a devtools probe's measurements look like an open debugger
    pub fn probe_indicates_devtools(&self, pause_ms: u64, viewport_delta_px: u32) -> bool {
        pause_ms >= self.devtools_pause_ms || viewport_delta_px >= self.viewport_delta_px
    }

    pub fn sample(&mut self, signal: &RawSignal, now: DateTime<Utc>) {
        self.prune(now);

        match signal {
            RawSignal::Keystroke { key_code } => {
                self.keystrokes.push_back(KeySample {
                    at: now,
                    key_code: *key_code,
                });
            }
            RawSignal::PointerMove { x, y } => {
                self.pointer.push_back(PointerSample {
                    at: now,
                    x: *x,
                    y: *y,
                });
            }
            RawSignal::Click => {
                self.clicks.push_back(now);
            }
            RawSignal::VisibilityChange { hidden } => {
                if *hidden {
                    self.counters.tab_switches += 1;
                }
            }
            RawSignal::FocusChange { focused } => {
                if !focused {
                    self.counters.external_focus_losses += 1;
                }
            }
            RawSignal::CopyPaste => {
                self.counters.copy_paste_attempts += 1;
            }
            RawSignal::BlockedShortcut { .. } => {}
            RawSignal::DevtoolsProbe {
                pause_ms,
                viewport_delta_px,
            } => {
                if self.probe_indicates_devtools(*pause_ms, *viewport_delta_px) {
                    self.counters.devtools_attempts += 1;
                }
            }
        }
    }

    pub fn counters(&self) -> ViolationContext {
        self.counters
    }

    pub fn snapshot(&self) -> SamplerSnapshot {
        SamplerSnapshot {
            keystrokes: self.keystrokes.iter().cloned().collect(),
            pointer: self.pointer.iter().cloned().collect(),
            clicks: self.clicks.iter().copied().collect(),
            counters: self.counters,
            window: self.window,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while self.keystrokes.front().is_some_and(|s| s.at < cutoff) {
            self.keystrokes.pop_front();
        }
        while self.pointer.front().is_some_and(|s| s.at < cutoff) {
            self.pointer.pop_front();
        }
        while self.clicks.front().is_some_and(|t| *t < cutoff) {
            self.clicks.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler() -> EventSampler {
        EventSampler::new(&MonitorConfig::default())
    }

    #[test]
    fn test_buffers_prune_to_window() {
        let mut s = sampler();
        let t0 = Utc::now();

        s.sample(&RawSignal::Keystroke { key_code: 65 }, t0);
        s.sample(&RawSignal::Keystroke { key_code: 66 }, t0 + Duration::seconds(5));
        // 40s later the first two are outside the 30s window
        s.sample(&RawSignal::Keystroke { key_code: 67 }, t0 + Duration::seconds(40));

        let snapshot = s.snapshot();
        assert_eq!(snapshot.keystrokes.len(), 1);
        assert_eq!(snapshot.keystrokes[0].key_code, 67);
    }

    #[test]
    fn test_counters_survive_pruning() {
        let mut s = sampler();
        let t0 = Utc::now();

        s.sample(&RawSignal::VisibilityChange { hidden: true }, t0);
        s.sample(&RawSignal::VisibilityChange { hidden: false }, t0);
        s.sample(&RawSignal::CopyPaste, t0);
        s.sample(&RawSignal::FocusChange { focused: false }, t0 + Duration::seconds(120));

        let counters = s.counters();
        // Only the hidden transition counts as a tab switch
        assert_eq!(counters.tab_switches, 1);
        assert_eq!(counters.copy_paste_attempts, 1);
        assert_eq!(counters.external_focus_losses, 1);
    }

    #[test]
    fn test_devtools_counter_requires_threshold() {
        let mut s = sampler();
        let now = Utc::now();

        s.sample(
            &RawSignal::DevtoolsProbe {
                pause_ms: 5,
                viewport_delta_px: 10,
            },
            now,
        );
        assert_eq!(s.counters().devtools_attempts, 0);

        s.sample(
            &RawSignal::DevtoolsProbe {
                pause_ms: 450,
                viewport_delta_px: 0,
            },
            now,
        );
        s.sample(
            &RawSignal::DevtoolsProbe {
                pause_ms: 0,
                viewport_delta_px: 300,
            },
            now,
        );
        assert_eq!(s.counters().devtools_attempts, 2);
    }

    #[test]
    fn test_snapshot_rates() {
        let mut s = sampler();
        let t0 = Utc::now();

        for i in 0..15 {
            s.sample(&RawSignal::Keystroke { key_code: 65 }, t0 + Duration::milliseconds(i * 100));
        }
        for i in 0..10 {
            s.sample(
                &RawSignal::PointerMove {
                    x: i as f64,
                    y: 0.0,
                },
                t0 + Duration::milliseconds(i * 100),
            );
        }
        s.sample(&RawSignal::Click, t0 + Duration::seconds(2));

        let snapshot = s.snapshot();
        // 15 keys over a 30s window = 30/min
        assert!((snapshot.keys_per_minute() - 30.0).abs() < f64::EPSILON);
        // 10 moves + 1 click = 22/min
        assert!((snapshot.mouse_events_per_minute() - 22.0).abs() < f64::EPSILON);
    }
}
