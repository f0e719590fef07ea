/// Rate control
///
/// A token bucket paces every probe the toolkit sends; a sliding window
/// collector aggregates per-window counts; an adaptive controller adjusts
/// the pace from observed loss and timeout rates. The bucket and the window
/// buffer are the only writable shared state during a run and live behind a
/// single mutex.

use crate::config::RateConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Adjustment reason recorded when the controller slows down
pub const REASON_HIGH_LOSS: &str = "high_loss_detected";
/// Adjustment reason recorded when the controller speeds back up
pub const REASON_RECOVERED: &str = "network_recovered";

/// Maximum tokens the bucket may hold, tolerating scheduler jitter without
/// letting a stale bucket burst past the configured rate
const BURST_CAP: f64 = 10.0;

/// Outcome of one paced probe, fed back into the open window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Received,
    Timeout,
    Error,
}

/// One closed measurement window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindow {
    pub index: u64,
    pub sent: u64,
    pub received: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub loss_rate: f64,
    pub timeout_rate: f64,
    pub actual_pps: f64,
}

/// One recorded pace change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateAdjustment {
    pub timestamp: DateTime<Utc>,
    pub old_pps: u32,
    pub new_pps: u32,
    pub reason: String,
    pub observed_loss: f64,
    pub observed_timeouts: f64,
}

/// Snapshot of controller state for summaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateStats {
    pub configured_pps: u32,
    pub current_pps: u32,
    pub total_sent: u64,
    pub total_received: u64,
    pub total_timeouts: u64,
    pub total_errors: u64,
    pub windows: Vec<RateWindow>,
    pub adjustments: Vec<RateAdjustment>,
}

struct ControllerState {
    current_pps: u32,
    tokens: f64,
    last_refill: Instant,
    window_start: Instant,
    window_index: u64,
    sent: u64,
    received: u64,
    timeouts: u64,
    errors: u64,
    good_windows: u32,
    total_sent: u64,
    total_received: u64,
    total_timeouts: u64,
    total_errors: u64,
    windows: Vec<RateWindow>,
    adjustments: Vec<RateAdjustment>,
}

/// Token-bucket pacer with window-driven adaptive adjustment
pub struct RateController {
    original_pps: u32,
    window_duration: Duration,
    adaptive: bool,
    high_loss_threshold: f64,
    downshift_step: f64,
    upshift_step: f64,
    good_windows_required: u32,
    state: Mutex<ControllerState>,
}

impl RateController {
    /// Create a controller paced at `pps`
    pub fn new(pps: u32, config: &RateConfig) -> Self {
        let pps = pps.max(1);
        info!(
            "rate controller: {} pps, adaptive={}, window={}s",
            pps, config.adaptive, config.window_secs
        );

        let now = Instant::now();
        Self {
            original_pps: pps,
            window_duration: Duration::from_secs(config.window_secs),
            adaptive: config.adaptive,
            high_loss_threshold: config.high_loss_threshold,
            downshift_step: config.downshift_step,
            upshift_step: config.upshift_step,
            good_windows_required: config.good_windows_required,
            state: Mutex::new(ControllerState {
                current_pps: pps,
                tokens: 1.0,
                last_refill: now,
                window_start: now,
                window_index: 0,
                sent: 0,
                received: 0,
                timeouts: 0,
                errors: 0,
                good_windows: 0,
                total_sent: 0,
                total_received: 0,
                total_timeouts: 0,
                total_errors: 0,
                windows: Vec::new(),
                adjustments: Vec::new(),
            }),
        }
    }

    /// Acquire one send token, sleeping until the bucket allows it
    ///
    /// Draining a token counts the probe as sent in the open window.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().expect("rate state poisoned");
                self.refill(&mut state);
                self.maybe_close_window(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    state.sent += 1;
                    state.total_sent += 1;
                    return;
                }

                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / state.current_pps as f64)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Record the outcome of a probe whose token was already drained
    pub fn record_outcome(&self, outcome: ProbeOutcome) {
        let mut state = self.state.lock().expect("rate state poisoned");
        match outcome {
            ProbeOutcome::Received => {
                state.received += 1;
                state.total_received += 1;
            }
            ProbeOutcome::Timeout => {
                state.timeouts += 1;
                state.total_timeouts += 1;
            }
            ProbeOutcome::Error => {
                state.errors += 1;
                state.total_errors += 1;
            }
        }
        self.maybe_close_window(&mut state);
    }

    /// Force the open window closed, applying any adaptive adjustment
    ///
    /// The probe loop closes windows naturally as time passes; this exists
    /// so the end of a run (and deterministic tests) can flush the partial
    /// window that remains.
    pub fn close_window(&self) {
        let mut state = self.state.lock().expect("rate state poisoned");
        self.close_window_inner(&mut state);
    }

    /// Current pace in packets per second
    pub fn current_pps(&self) -> u32 {
        self.state.lock().expect("rate state poisoned").current_pps
    }

    /// Snapshot counters, windows, and adjustments for summaries
    pub fn stats(&self) -> RateStats {
        let state = self.state.lock().expect("rate state poisoned");
        RateStats {
            configured_pps: self.original_pps,
            current_pps: state.current_pps,
            total_sent: state.total_sent,
            total_received: state.total_received,
            total_timeouts: state.total_timeouts,
            total_errors: state.total_errors,
            windows: state.windows.clone(),
            adjustments: state.adjustments.clone(),
        }
    }

    fn refill(&self, state: &mut ControllerState) {
        let elapsed = state.last_refill.elapsed();
        state.last_refill = Instant::now();
        // A slow pace gets a correspondingly small burst allowance
        let cap = BURST_CAP.min(state.current_pps as f64).max(1.0);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * state.current_pps as f64).min(cap);
    }

    fn maybe_close_window(&self, state: &mut ControllerState) {
        if state.window_start.elapsed() >= self.window_duration {
            self.close_window_inner(state);
        }
    }

    fn close_window_inner(&self, state: &mut ControllerState) {
        let elapsed = state.window_start.elapsed().as_secs_f64().max(0.001);
        let sent = state.sent;
        let loss_rate = if sent > 0 {
            (sent - state.received.min(sent)) as f64 / sent as f64
        } else {
            0.0
        };
        let timeout_rate = if sent > 0 {
            state.timeouts as f64 / sent as f64
        } else {
            0.0
        };

        let window = RateWindow {
            index: state.window_index,
            sent,
            received: state.received,
            timeouts: state.timeouts,
            errors: state.errors,
            loss_rate,
            timeout_rate,
            actual_pps: sent as f64 / elapsed,
        };

        debug!(
            index = window.index,
            sent = window.sent,
            loss = window.loss_rate,
            pps = window.actual_pps,
            "window closed"
        );

        state.windows.push(window);
        state.window_index += 1;
        state.window_start = Instant::now();
        state.sent = 0;
        state.received = 0;
        state.timeouts = 0;
        state.errors = 0;

        if self.adaptive && sent > 0 {
            self.adjust(state, loss_rate, timeout_rate);
        }
    }

    /// Window-close adjustment: downshift on loss, creep back up after
    /// enough consecutive clean windows; pace stays within [1, original].
    fn adjust(&self, state: &mut ControllerState, loss_rate: f64, timeout_rate: f64) {
        let threshold = self.high_loss_threshold;

        if loss_rate >= threshold || timeout_rate >= threshold {
            let old = state.current_pps;
            let new = (((old as f64) * (1.0 - self.downshift_step)).floor() as u32).max(1);
            state.good_windows = 0;
            if new != old {
                state.current_pps = new;
                state.adjustments.push(RateAdjustment {
                    timestamp: Utc::now(),
                    old_pps: old,
                    new_pps: new,
                    reason: REASON_HIGH_LOSS.to_string(),
                    observed_loss: loss_rate,
                    observed_timeouts: timeout_rate,
                });
                crate::log_rate_adjustment!(old, new, REASON_HIGH_LOSS, loss_rate);
            }
        } else if loss_rate < threshold / 2.0 && timeout_rate < threshold / 2.0 {
            state.good_windows += 1;
            if state.good_windows >= self.good_windows_required {
                state.good_windows = 0;
                let old = state.current_pps;
                let new = (((old as f64) * (1.0 + self.upshift_step)).floor() as u32)
                    .min(self.original_pps);
                if new != old {
                    state.current_pps = new;
                    state.adjustments.push(RateAdjustment {
                        timestamp: Utc::now(),
                        old_pps: old,
                        new_pps: new,
                        reason: REASON_RECOVERED.to_string(),
                        observed_loss: loss_rate,
                        observed_timeouts: timeout_rate,
                    });
                    crate::log_rate_adjustment!(old, new, REASON_RECOVERED, loss_rate);
                }
            }
        }
    }
}
