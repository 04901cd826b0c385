//! Recovery watchdog
//!
//! Guarantees the pipeline never hangs. The watchdog samples the gate's
//! [`GateStatus`] at a fixed interval and reports any supervised phase that
//! has overrun its limit. It never mutates the gate: the page turns a report
//! into [`ForceReason::Stalled`] and calls `RevealGate::force_advance`, the
//! same path the operator command uses.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::core::constants::WATCHDOG_POLL_INTERVAL;
use crate::core::reveal_gate::{ForceReason, GatePhase, GateStatus};
use crate::core::types::Epoch;

/// A stall seen by the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallReport {
    pub phase: GatePhase,
    pub epoch: Epoch,
    pub elapsed: Duration,
    pub limit: Duration,
}

impl StallReport {
    pub fn into_reason(self) -> ForceReason {
        ForceReason::Stalled {
            phase: self.phase,
            elapsed: self.elapsed,
            limit: self.limit,
        }
    }
}

/// Periodic stall detector
#[derive(Debug, Clone)]
pub struct RecoveryWatchdog {
    poll_interval: Duration,
    last_poll: Option<Instant>,
    stalls_seen: u32,
}

impl RecoveryWatchdog {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            last_poll: None,
            stalls_seen: 0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Stalls reported since creation
    pub fn stalls_seen(&self) -> u32 {
        self.stalls_seen
    }

    /// Sample `status`; returns a report when the phase is stalled
    ///
    /// Runs at most once per poll interval. Calls in between return `None`.
    pub fn poll(&mut self, now: Instant, status: &GateStatus) -> Option<StallReport> {
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.poll_interval {
                return None;
            }
        }
        self.last_poll = Some(now);

        if !status.is_stalled() {
            return None;
        }
        let limit = status.limit?;

        self.stalls_seen += 1;
        warn!(
            epoch = %status.epoch,
            state = %status.phase,
            elapsed_ms = status.elapsed.as_millis() as u64,
            limit_ms = limit.as_millis() as u64,
            "[WATCHDOG] Stall detected, forcing transition"
        );
        Some(StallReport {
            phase: status.phase,
            epoch: status.epoch,
            elapsed: status.elapsed,
            limit,
        })
    }
}

impl Default for RecoveryWatchdog {
    fn default() -> Self {
        Self::new(WATCHDOG_POLL_INTERVAL)
    }
}
