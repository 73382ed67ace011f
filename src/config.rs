//! Runtime configuration for the session engine and the proctoring monitor.
//!
//! Every heuristic constant lives here rather than at its use site so the
//! thresholds can be recalibrated per event without a code change. The
//! baselines (50 keys/min, 200 mouse events/min, ...) are inherited from
//! production defaults and are expected to be tuned.

use std::str::FromStr;
use std::time::Duration;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Timing and transport knobs for the session event loop
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Countdown tick cadence
    pub tick_interval: Duration,
    /// Cadence of the window-level anomaly sweep
    pub sweep_interval: Duration,
    /// First reconnect delay; doubled per attempt up to the max
    pub reconnect_base_backoff: Duration,
    pub reconnect_max_backoff: Duration,
    /// Give up prompting for automatic reconnects after this many failures
    /// and surface a manual-reconnect prompt instead
    pub reconnect_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(30),
            reconnect_base_backoff: Duration::from_secs(1),
            reconnect_max_backoff: Duration::from_secs(30),
            reconnect_max_attempts: 10,
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            tick_interval: Duration::from_millis(env_parse(
                "QUIZDASH_TICK_MS",
                defaults.tick_interval.as_millis() as u64,
            )),
            sweep_interval: Duration::from_secs(env_parse(
                "QUIZDASH_SWEEP_SECS",
                defaults.sweep_interval.as_secs(),
            )),
            reconnect_base_backoff: Duration::from_millis(env_parse(
                "QUIZDASH_BACKOFF_BASE_MS",
                defaults.reconnect_base_backoff.as_millis() as u64,
            )),
            reconnect_max_backoff: Duration::from_millis(env_parse(
                "QUIZDASH_BACKOFF_MAX_MS",
                defaults.reconnect_max_backoff.as_millis() as u64,
            )),
            reconnect_max_attempts: env_parse(
                "QUIZDASH_RECONNECT_MAX_ATTEMPTS",
                defaults.reconnect_max_attempts,
            ),
        };

        tracing::info!(
            tick_ms = config.tick_interval.as_millis() as u64,
            sweep_secs = config.sweep_interval.as_secs(),
            reconnect_max_attempts = config.reconnect_max_attempts,
            "Engine config loaded"
        );

        config
    }
}

/// Thresholds and weights for the anomaly pipeline
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sliding buffer length per signal channel
    pub window: Duration,

    // Baseline input volume; excess over these feeds the unusual-activity term
    pub baseline_keys_per_min: f64,
    pub baseline_mouse_per_min: f64,
    /// Scale applied to per-minute excess when folding it into the score
    pub unusual_activity_scale: f64,

    // Burst-rate checks
    pub burst_keys_per_sec: f64,
    pub burst_clicks_per_sec: f64,

    // Keystroke timing checks
    pub min_keys_for_timing_check: usize,
    /// Inter-keystroke variance (ms²) below which typing looks scripted
    pub min_inter_key_variance: f64,
    /// Length of a strictly ascending key-code run that counts as sequential
    pub sequential_run_len: usize,

    // Pointer trajectory check
    pub colinear_min_run: usize,
    /// Max triangle area (px²) for three consecutive samples to count as colinear
    pub colinear_epsilon: f64,

    // Devtools probes
    /// Artificial pause around an instrumented breakpoint longer than this
    /// suggests an open debugger
    pub devtools_pause_ms: u64,
    /// Outer/inner viewport delta beyond this suggests docked devtools
    pub viewport_delta_px: u32,

    // Per-kind score weights for the named high-signal violations; the rest
    // derive their weight from severity
    pub tab_switch_weight: f64,
    pub copy_paste_weight: f64,
    pub devtools_weight: f64,
    pub external_focus_weight: f64,

    // Action thresholds, evaluated after every update (highest wins)
    pub notice_threshold: f64,
    pub warning_threshold: f64,
    pub severe_threshold: f64,
    pub eliminate_threshold: f64,
    /// Devtools attempts at or above this trip a severe warning regardless of score
    pub devtools_tripwire: u32,
    /// Accumulated warnings at or above this eliminate regardless of score
    pub warning_cap: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            baseline_keys_per_min: 50.0,
            baseline_mouse_per_min: 200.0,
            unusual_activity_scale: 0.05,
            burst_keys_per_sec: 8.0,
            burst_clicks_per_sec: 6.0,
            min_keys_for_timing_check: 10,
            min_inter_key_variance: 25.0,
            sequential_run_len: 6,
            colinear_min_run: 3,
            colinear_epsilon: 2.0,
            devtools_pause_ms: 100,
            viewport_delta_px: 160,
            tab_switch_weight: 2.0,
            copy_paste_weight: 1.5,
            devtools_weight: 3.0,
            external_focus_weight: 1.0,
            notice_threshold: 5.0,
            warning_threshold: 10.0,
            severe_threshold: 15.0,
            eliminate_threshold: 25.0,
            devtools_tripwire: 3,
            warning_cap: 3,
        }
    }
}

impl MonitorConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let d = Self::default();
        let config = Self {
            window: Duration::from_secs(env_parse("QUIZDASH_WINDOW_SECS", d.window.as_secs())),
            baseline_keys_per_min: env_parse("QUIZDASH_BASELINE_KEYS_PER_MIN", d.baseline_keys_per_min),
            baseline_mouse_per_min: env_parse("QUIZDASH_BASELINE_MOUSE_PER_MIN", d.baseline_mouse_per_min),
            unusual_activity_scale: env_parse("QUIZDASH_ACTIVITY_SCALE", d.unusual_activity_scale),
            burst_keys_per_sec: env_parse("QUIZDASH_BURST_KEYS_PER_SEC", d.burst_keys_per_sec),
            burst_clicks_per_sec: env_parse("QUIZDASH_BURST_CLICKS_PER_SEC", d.burst_clicks_per_sec),
            min_keys_for_timing_check: env_parse("QUIZDASH_MIN_KEYS_TIMING", d.min_keys_for_timing_check),
            min_inter_key_variance: env_parse("QUIZDASH_MIN_KEY_VARIANCE", d.min_inter_key_variance),
            sequential_run_len: env_parse("QUIZDASH_SEQUENTIAL_RUN", d.sequential_run_len),
            colinear_min_run: env_parse("QUIZDASH_COLINEAR_RUN", d.colinear_min_run),
            colinear_epsilon: env_parse("QUIZDASH_COLINEAR_EPSILON", d.colinear_epsilon),
            devtools_pause_ms: env_parse("QUIZDASH_DEVTOOLS_PAUSE_MS", d.devtools_pause_ms),
            viewport_delta_px: env_parse("QUIZDASH_VIEWPORT_DELTA_PX", d.viewport_delta_px),
            tab_switch_weight: env_parse("QUIZDASH_WEIGHT_TAB_SWITCH", d.tab_switch_weight),
            copy_paste_weight: env_parse("QUIZDASH_WEIGHT_COPY_PASTE", d.copy_paste_weight),
            devtools_weight: env_parse("QUIZDASH_WEIGHT_DEVTOOLS", d.devtools_weight),
            external_focus_weight: env_parse("QUIZDASH_WEIGHT_EXTERNAL_FOCUS", d.external_focus_weight),
            notice_threshold: env_parse("QUIZDASH_NOTICE_THRESHOLD", d.notice_threshold),
            warning_threshold: env_parse("QUIZDASH_WARNING_THRESHOLD", d.warning_threshold),
            severe_threshold: env_parse("QUIZDASH_SEVERE_THRESHOLD", d.severe_threshold),
            eliminate_threshold: env_parse("QUIZDASH_ELIMINATE_THRESHOLD", d.eliminate_threshold),
            devtools_tripwire: env_parse("QUIZDASH_DEVTOOLS_TRIPWIRE", d.devtools_tripwire),
            warning_cap: env_parse("QUIZDASH_WARNING_CAP", d.warning_cap),
        };

        tracing::info!(
            window_secs = config.window.as_secs(),
            notice = config.notice_threshold,
            warning = config.warning_threshold,
            severe = config.severe_threshold,
            eliminate = config.eliminate_threshold,
            "Monitor config loaded"
        );

        config
    }
}
