//! Ad stage controller
//!
//! Wraps a [`CountdownTimer`] with the dwell bookkeeping for one ad stage.
//! The gate is satisfied by time alone: whether the ad unit itself loaded is
//! tracked for diagnostics but never blocks the countdown.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::core::constants::{
    MONETIZATION_MAX_DWELL, MONETIZATION_MIN_DWELL, PSA_MIN_DWELL, PSA_STALL_GRACE,
};
use crate::core::timer::{CountdownTimer, TimerEvent};

// =============================================================================
// STAGE IDENTITY AND CONFIG
// =============================================================================

/// The two ad stages of the reveal sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdStageId {
    /// Public-service announcement, shown while the scan is in flight
    Psa,
    /// Monetization ad, shown once the scan result is in
    Monetization,
}

impl fmt::Display for AdStageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdStageId::Psa => write!(f, "psa"),
            AdStageId::Monetization => write!(f, "monetization"),
        }
    }
}

/// Dwell settings for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStageConfig {
    /// Countdown length; the gate opens when it reaches zero
    pub min_dwell: Duration,
    /// Hard ceiling after which the watchdog forces the stage open
    pub max_dwell: Option<Duration>,
    /// Overrun tolerated past `min_dwell` when no `max_dwell` is set
    pub stall_grace: Duration,
}

impl AdStageConfig {
    pub fn psa() -> Self {
        Self {
            min_dwell: PSA_MIN_DWELL,
            max_dwell: None,
            stall_grace: PSA_STALL_GRACE,
        }
    }

    pub fn monetization() -> Self {
        Self {
            min_dwell: MONETIZATION_MIN_DWELL,
            max_dwell: Some(MONETIZATION_MAX_DWELL),
            stall_grace: PSA_STALL_GRACE,
        }
    }

    /// Time in stage after which the stage counts as stalled
    pub fn stall_limit(&self) -> Duration {
        self.max_dwell.unwrap_or_else(|| {
            self.min_dwell
                .checked_add(self.stall_grace)
                .unwrap_or(Duration::MAX)
        })
    }

    /// Countdown length in whole seconds, rounded up
    fn countdown_secs(&self) -> u32 {
        let round_up = u64::from(self.min_dwell.subsec_nanos() > 0);
        let secs = self.min_dwell.as_secs().saturating_add(round_up);
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}

// =============================================================================
// EVENTS AND SNAPSHOT
// =============================================================================

/// Events emitted while a stage is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Countdown text should read `remaining`
    Countdown { id: AdStageId, remaining: u32 },
    /// Minimum dwell reached (by countdown or force)
    DwellSatisfied { id: AdStageId, forced: bool },
}

/// Read-only view of a stage, for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdStage {
    pub id: AdStageId,
    pub min_dwell: Duration,
    pub max_dwell: Option<Duration>,
    pub elapsed: Duration,
    pub dwell_satisfied: bool,
    pub forced_advance: bool,
    pub content_loaded: bool,
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Owns one countdown plus the stage's dwell flags
#[derive(Debug, Clone)]
pub struct AdStageController {
    id: AdStageId,
    config: AdStageConfig,
    timer: CountdownTimer,
    started_at: Option<Instant>,
    satisfied_at: Option<Instant>,
    dwell_satisfied: bool,
    forced_advance: bool,
    content_loaded: bool,
}

impl AdStageController {
    pub fn new(id: AdStageId, config: AdStageConfig) -> Self {
        Self {
            id,
            config,
            timer: CountdownTimer::new(),
            started_at: None,
            satisfied_at: None,
            dwell_satisfied: false,
            forced_advance: false,
            content_loaded: false,
        }
    }

    pub fn id(&self) -> AdStageId {
        self.id
    }

    pub fn config(&self) -> &AdStageConfig {
        &self.config
    }

    /// Activate the stage. A stage that was already started is left alone.
    pub fn start(&mut self, now: Instant) -> Vec<StageEvent> {
        if self.started_at.is_some() {
            debug!(stage = %self.id, "[STAGE] start ignored, already started");
            return Vec::new();
        }

        let secs = self.config.countdown_secs();
        self.timer.start(now, secs);
        self.started_at = Some(now);
        info!(stage = %self.id, countdown_secs = secs, "[STAGE] Started");

        // Paint the initial value right away, then catch up if the
        // countdown is zero-length
        let mut events = vec![StageEvent::Countdown {
            id: self.id,
            remaining: secs,
        }];
        events.extend(self.poll(now));
        events
    }

    /// Advance the countdown to `now`
    pub fn poll(&mut self, now: Instant) -> Vec<StageEvent> {
        let mut events = Vec::new();
        for event in self.timer.poll(now) {
            match event {
                TimerEvent::Tick(remaining) => events.push(StageEvent::Countdown {
                    id: self.id,
                    remaining,
                }),
                TimerEvent::Complete => {
                    if !self.dwell_satisfied {
                        self.dwell_satisfied = true;
                        self.satisfied_at = Some(now);
                        info!(
                            stage = %self.id,
                            elapsed_ms = self.elapsed(now).as_millis() as u64,
                            content_loaded = self.content_loaded,
                            "[STAGE] Dwell satisfied"
                        );
                        events.push(StageEvent::DwellSatisfied {
                            id: self.id,
                            forced: false,
                        });
                    }
                }
            }
        }
        events
    }

    /// Open the gate without waiting for the countdown (watchdog path)
    ///
    /// Stops the timer and never restarts it. Returns `None` if the gate was
    /// already satisfied.
    pub fn force_satisfy(&mut self, now: Instant) -> Option<StageEvent> {
        if self.dwell_satisfied {
            return None;
        }
        self.timer.stop();
        self.dwell_satisfied = true;
        self.forced_advance = true;
        self.satisfied_at = Some(now);
        Some(StageEvent::DwellSatisfied {
            id: self.id,
            forced: true,
        })
    }

    /// Record that the ad unit finished loading
    pub fn mark_content_loaded(&mut self) {
        if !self.content_loaded {
            debug!(stage = %self.id, "[STAGE] Ad content loaded");
            self.content_loaded = true;
        }
    }

    /// Stop the countdown and clear every flag
    pub fn reset(&mut self) {
        self.timer.stop();
        self.timer = CountdownTimer::new();
        self.started_at = None;
        self.satisfied_at = None;
        self.dwell_satisfied = false;
        self.forced_advance = false;
        self.content_loaded = false;
    }

    pub fn is_gate_satisfied(&self) -> bool {
        self.dwell_satisfied
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn forced_advance(&self) -> bool {
        self.forced_advance
    }

    pub fn content_loaded(&self) -> bool {
        self.content_loaded
    }

    /// Time spent in the stage; frozen once the gate is satisfied
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            None => Duration::ZERO,
            Some(start) => self
                .satisfied_at
                .unwrap_or(now)
                .saturating_duration_since(start),
        }
    }

    /// Whether the stage has overrun its stall limit without opening
    pub fn is_stalled(&self, now: Instant) -> bool {
        self.is_started() && !self.dwell_satisfied && self.elapsed(now) > self.config.stall_limit()
    }

    pub fn snapshot(&self, now: Instant) -> AdStage {
        AdStage {
            id: self.id,
            min_dwell: self.config.min_dwell,
            max_dwell: self.config.max_dwell,
            elapsed: self.elapsed(now),
            dwell_satisfied: self.dwell_satisfied,
            forced_advance: self.forced_advance,
            content_loaded: self.content_loaded,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
