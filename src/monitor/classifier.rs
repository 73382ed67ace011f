//! Heuristic rules turning raw samples into discrete violation events.
//!
//! Stateless by design: every function works off the signal or snapshot it
//! is given and holds no cross-call state. Inline checks run on individual
//! high-signal events; the window checks run periodically over the whole
//! buffered history.

use crate::config::MonitorConfig;
use crate::monitor::sampler::{PointerSample, RawSignal, SamplerSnapshot};
use crate::types::{ViolationContext, ViolationEvent, ViolationKind};
use chrono::{DateTime, Utc};

/// Immediate classification of a single high-signal event. Returns at most
/// one violation; low-level motion/typing signals are only judged in the
/// window pass.
pub fn classify_inline(
    signal: &RawSignal,
    counters: ViolationContext,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Option<ViolationEvent> {
    let kind = match signal {
        RawSignal::VisibilityChange { hidden: true } => Some(ViolationKind::TabSwitch),
        RawSignal::FocusChange { focused: false } => Some(ViolationKind::ExternalFocus),
        RawSignal::CopyPaste => Some(ViolationKind::CopyPaste),
        RawSignal::BlockedShortcut { combo } => {
            tracing::debug!(combo = combo.as_str(), "Blocked shortcut attempted");
            Some(ViolationKind::BlockedShortcut)
        }
        RawSignal::DevtoolsProbe {
            pause_ms,
            viewport_delta_px,
        } if *pause_ms >= config.devtools_pause_ms
            || *viewport_delta_px >= config.viewport_delta_px =>
        {
            Some(ViolationKind::DevtoolsOpen)
        }
        _ => None,
    }?;

    Some(ViolationEvent::new(kind, now, counters))
}

/// Pattern-level checks over the buffered window
pub fn classify_window(
    snapshot: &SamplerSnapshot,
    config: &MonitorConfig,
    now: DateTime<Utc>,
) -> Vec<ViolationEvent> {
    let mut events = Vec::new();
    let mut push = |kind: ViolationKind| {
        events.push(ViolationEvent::new(kind, now, snapshot.counters));
    };

    if has_low_variance_typing(snapshot, config) {
        push(ViolationKind::LowVarianceTyping);
    }
    if has_sequential_keys(snapshot, config) {
        push(ViolationKind::SequentialKeys);
    }
    if has_robotic_pointer(&snapshot.pointer, config) {
        push(ViolationKind::RoboticPointer);
    }
    if has_input_burst(snapshot, config) {
        push(ViolationKind::InputBurst);
    }

    events
}

/// Abnormally uniform inter-keystroke timing suggests injected input
fn has_low_variance_typing(snapshot: &SamplerSnapshot, config: &MonitorConfig) -> bool {
    if snapshot.keystrokes.len() < config.min_keys_for_timing_check {
        return false;
    }

    let gaps: Vec<f64> = snapshot
        .keystrokes
        .windows(2)
        .map(|pair| (pair[1].at - pair[0].at).num_milliseconds() as f64)
        .collect();
    if gaps.is_empty() {
        return false;
    }

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    variance < config.min_inter_key_variance
}

/// A long strictly ascending key-code run (e.g. a-b-c-d-e-f) is low-entropy
/// filler, not typing
fn has_sequential_keys(snapshot: &SamplerSnapshot, config: &MonitorConfig) -> bool {
    let mut run = 1usize;
    for pair in snapshot.keystrokes.windows(2) {
        if pair[1].key_code == pair[0].key_code + 1 {
            run += 1;
            if run >= config.sequential_run_len {
                return true;
            }
        } else {
            run = 1;
        }
    }
    false
}

/// Twice the triangle area spanned by three points; near zero means colinear
fn cross_area(a: &PointerSample, b: &PointerSample, c: &PointerSample) -> f64 {
    ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)).abs()
}

/// Near-colinear trajectories over enough consecutive samples look scripted
fn has_robotic_pointer(pointer: &[PointerSample], config: &MonitorConfig) -> bool {
    if pointer.len() < config.colinear_min_run.max(3) {
        return false;
    }

    let mut run = 2usize;
    for window in pointer.windows(3) {
        if cross_area(&window[0], &window[1], &window[2]) <= config.colinear_epsilon {
            run += 1;
            if run >= config.colinear_min_run.max(3) {
                return true;
            }
        } else {
            run = 2;
        }
    }
    false
}

/// Sustained click/key rates above threshold across the window
fn has_input_burst(snapshot: &SamplerSnapshot, config: &MonitorConfig) -> bool {
    let secs = snapshot.window.num_seconds().max(1) as f64;
    let keys_per_sec = snapshot.keystrokes.len() as f64 / secs;
    let clicks_per_sec = snapshot.clicks.len() as f64 / secs;
    keys_per_sec > config.burst_keys_per_sec || clicks_per_sec > config.burst_clicks_per_sec
}
