//! Countdown timer for ad stages
//!
//! The host drives the timer by polling it with the current time. Progress is
//! derived from the wall-clock distance to the start instant, never from how
//! many polls happened, so a throttled host (backgrounded tab, suspended
//! event loop) catches up on the next poll instead of leaving the countdown
//! stuck.

use std::time::{Duration, Instant};

/// Events produced by [`CountdownTimer::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Whole seconds left; strictly decreasing, last value is 0
    Tick(u32),
    /// Fired exactly once, right after `Tick(0)`
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// One-shot countdown measured in whole seconds
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    state: TimerState,
    duration_secs: u32,
    started_at: Option<Instant>,
    ticks_emitted: u32,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            duration_secs: 0,
            started_at: None,
            ticks_emitted: 0,
        }
    }

    /// Start counting down `duration_secs` from `now`
    ///
    /// Returns `false` (and changes nothing) if the timer is already running.
    /// A completed or stopped timer may be started again.
    pub fn start(&mut self, now: Instant, duration_secs: u32) -> bool {
        if self.state == TimerState::Running {
            return false;
        }
        self.state = TimerState::Running;
        self.duration_secs = duration_secs;
        self.started_at = Some(now);
        self.ticks_emitted = 0;
        true
    }

    /// Cancel the countdown. No tick or completion fires afterwards.
    pub fn stop(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Stopped;
        }
    }

    /// Emit every tick whose second boundary has passed, then `Complete` once
    /// the countdown reaches zero
    pub fn poll(&mut self, now: Instant) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        if self.state != TimerState::Running {
            return events;
        }

        let elapsed_secs = self.elapsed(now).as_secs();
        let due = elapsed_secs.min(u64::from(self.duration_secs)) as u32;

        while self.ticks_emitted < due {
            self.ticks_emitted += 1;
            events.push(TimerEvent::Tick(self.duration_secs - self.ticks_emitted));
        }

        if self.ticks_emitted == self.duration_secs {
            self.state = TimerState::Completed;
            events.push(TimerEvent::Complete);
        }

        events
    }

    /// Wall-clock time since start (zero if never started)
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }

    /// Remaining whole seconds as last reported to the host
    pub fn remaining_secs(&self) -> u32 {
        self.duration_secs - self.ticks_emitted
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_complete(&self) -> bool {
        self.state == TimerState::Completed
    }

    pub fn is_stopped(&self) -> bool {
        self.state == TimerState::Stopped
    }
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
