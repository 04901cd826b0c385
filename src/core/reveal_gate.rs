//! Reveal gate - the pipeline state machine
//!
//! RevealGate sequences the PSA, the scan request, the monetization ad and
//! the results reveal. It is the only mutator of pipeline state: ad stages,
//! the stored scan result and the epoch all live here, and everything else
//! reads them through accessors or reacts to the [`GateEvent`]s it returns.
//!
//! ```text
//! Idle ──start_scan──▶ PsaActive ──psa dwell──▶ Scanning ──result──▶ MonetizationActive
//!                          │                       │                        │
//!                          └──── Failure ──────────┴──────▶ Error ◀─────────┤
//!                                                                           ▼
//!                                                              Revealed ◀── ad dwell
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::ad_stage::{AdStage, AdStageConfig, AdStageController, AdStageId, StageEvent};
use crate::core::constants::SCAN_CEILING;
use crate::core::io_traits::{ScanResponseReceiver, ScanSender};
use crate::core::ticket::{build_request, StagedTicket, TicketError};
use crate::core::types::{Epoch, FailureKind, ScanFailure, ScanResponse, ScanResult};

// =============================================================================
// STATES
// =============================================================================

/// Payload-free state tag, for logs and watchdog bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatePhase {
    Idle,
    PsaActive,
    Scanning,
    MonetizationActive,
    Revealed,
    Error,
}

impl GatePhase {
    /// Phases the watchdog supervises
    pub fn is_supervised(self) -> bool {
        matches!(
            self,
            GatePhase::PsaActive | GatePhase::Scanning | GatePhase::MonetizationActive
        )
    }
}

impl fmt::Display for GatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Current state of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    PsaActive,
    /// PSA is done, waiting on the scan result
    Scanning,
    MonetizationActive,
    /// Results may be shown; `forced` when the monetization dwell was cut
    /// short by recovery
    Revealed { forced: bool },
    Error { failure: ScanFailure, forced: bool },
}

impl GateState {
    pub fn phase(&self) -> GatePhase {
        match self {
            GateState::Idle => GatePhase::Idle,
            GateState::PsaActive => GatePhase::PsaActive,
            GateState::Scanning => GatePhase::Scanning,
            GateState::MonetizationActive => GatePhase::MonetizationActive,
            GateState::Revealed { .. } => GatePhase::Revealed,
            GateState::Error { .. } => GatePhase::Error,
        }
    }

    /// Whether this state was reached through a forced transition
    pub fn is_forced(&self) -> bool {
        match self {
            GateState::Revealed { forced } | GateState::Error { forced, .. } => *forced,
            _ => false,
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Why a forced transition happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceReason {
    /// The watchdog saw the phase overrun its limit
    Stalled {
        phase: GatePhase,
        elapsed: Duration,
        limit: Duration,
    },
    /// Operator/diagnostic "force advance to results now"
    Operator,
}

impl fmt::Display for ForceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForceReason::Stalled {
                phase,
                elapsed,
                limit,
            } => write!(
                f,
                "{} stalled for {}ms (limit {}ms)",
                phase,
                elapsed.as_millis(),
                limit.as_millis()
            ),
            ForceReason::Operator => write!(f, "operator recovery command"),
        }
    }
}

/// Events emitted by RevealGate for the page and for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// The gate entered a new state
    Entered(GateState),
    /// Ad stage countdown or dwell change
    Stage(StageEvent),
    /// A scan request was handed to the client
    ScanSubmitted(Epoch),
    /// The current pipeline's scan result was stored
    ResultStored { epoch: Epoch, success: bool },
    /// A response from a superseded pipeline was dropped
    StaleResponseDropped(Epoch),
    /// A forced transition was applied
    Forced(ForceReason),
}

/// Supervision snapshot read by the watchdog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStatus {
    pub phase: GatePhase,
    pub epoch: Epoch,
    /// Time counted against `limit` (stage time for ad stages, time since
    /// request issue for `Scanning`)
    pub elapsed: Duration,
    /// Allowed time before the phase counts as stalled
    pub limit: Option<Duration>,
}

impl GateStatus {
    pub fn is_stalled(&self) -> bool {
        self.phase.is_supervised() && self.limit.is_some_and(|limit| self.elapsed > limit)
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Timing configuration for one gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub psa: AdStageConfig,
    pub monetization: AdStageConfig,
    /// Ceiling for the scan request, measured from when it was issued
    pub scan_ceiling: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            psa: AdStageConfig::psa(),
            monetization: AdStageConfig::monetization(),
            scan_ceiling: SCAN_CEILING,
        }
    }
}

// =============================================================================
// REVEAL GATE
// =============================================================================

/// The ad-gated reveal state machine
pub struct RevealGate {
    config: GateConfig,
    state: GateState,
    entered_at: Option<Instant>,
    epoch: Epoch,
    psa: AdStageController,
    monetization: AdStageController,
    scan_result: Option<ScanResult>,
    scan_issued_at: Option<Instant>,
    results_viewed: bool,
    last_forced: Option<ForceReason>,
}

impl RevealGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            state: GateState::Idle,
            entered_at: None,
            epoch: Epoch::default(),
            psa: AdStageController::new(AdStageId::Psa, config.psa),
            monetization: AdStageController::new(AdStageId::Monetization, config.monetization),
            scan_result: None,
            scan_issued_at: None,
            results_viewed: false,
            last_forced: None,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn phase(&self) -> GatePhase {
        self.state.phase()
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn scan_result(&self) -> Option<&ScanResult> {
        self.scan_result.as_ref()
    }

    pub fn stage(&self, id: AdStageId) -> &AdStageController {
        match id {
            AdStageId::Psa => &self.psa,
            AdStageId::Monetization => &self.monetization,
        }
    }

    pub fn stage_snapshot(&self, id: AdStageId, now: Instant) -> AdStage {
        self.stage(id).snapshot(now)
    }

    pub fn last_forced(&self) -> Option<&ForceReason> {
        self.last_forced.as_ref()
    }

    pub fn results_viewed(&self) -> bool {
        self.results_viewed
    }

    /// Time since the current state was entered
    pub fn time_in_state(&self, now: Instant) -> Duration {
        self.entered_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }

    /// Time since the current scan request was issued
    pub fn scan_elapsed(&self, now: Instant) -> Duration {
        self.scan_issued_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }

    /// Snapshot for the recovery watchdog
    pub fn status(&self, now: Instant) -> GateStatus {
        let phase = self.phase();
        let (elapsed, limit) = match phase {
            GatePhase::PsaActive => (
                self.psa.elapsed(now),
                Some(self.psa.config().stall_limit()),
            ),
            GatePhase::Scanning => (self.scan_elapsed(now), Some(self.config.scan_ceiling)),
            GatePhase::MonetizationActive => (
                self.monetization.elapsed(now),
                Some(self.monetization.config().stall_limit()),
            ),
            _ => (self.time_in_state(now), None),
        };
        GateStatus {
            phase,
            epoch: self.epoch,
            elapsed,
            limit,
        }
    }

    // -------------------------------------------------------------------------
    // User intents
    // -------------------------------------------------------------------------

    /// Start a new pipeline: validate the ticket, cancel whatever pipeline was
    /// running, issue the scan request and show the PSA
    ///
    /// Validation failures return `Err` without touching the current state or
    /// the network.
    pub fn start_scan<S: ScanSender>(
        &mut self,
        now: Instant,
        ticket: Option<&StagedTicket>,
        lottery_type: Option<&str>,
        sender: &S,
    ) -> Result<Vec<GateEvent>, TicketError> {
        let next_epoch = self.epoch.next();
        let request = build_request(ticket, lottery_type, next_epoch)?;

        let mut events = Vec::new();
        if self.phase() != GatePhase::Idle {
            info!(
                epoch = %self.epoch,
                state = %self.phase(),
                "[GATE] Cancelling superseded pipeline"
            );
        }
        self.clear_pipeline();
        self.epoch = next_epoch;

        info!(
            epoch = %self.epoch,
            lottery_type = request.lottery_type_field(),
            bytes = request.image.len(),
            "[GATE] Submitting scan"
        );
        sender.submit(request);
        self.scan_issued_at = Some(now);
        events.push(GateEvent::ScanSubmitted(self.epoch));

        self.enter(GateState::PsaActive, now, &mut events);
        events.extend(self.psa.start(now).into_iter().map(GateEvent::Stage));
        self.advance(now, &mut events);
        Ok(events)
    }

    /// "View Results" clicked
    ///
    /// Returns `true` only in `Revealed`. Anywhere else the click is ignored,
    /// whatever the button looks like.
    pub fn view_results(&mut self) -> bool {
        if self.phase() != GatePhase::Revealed {
            debug!(state = %self.phase(), "[GATE] View results ignored");
            return false;
        }
        self.results_viewed = true;
        true
    }

    /// Retry after an error: back to `Idle`
    pub fn retry(&mut self, now: Instant) -> Vec<GateEvent> {
        if self.phase() != GatePhase::Error {
            debug!(state = %self.phase(), "[GATE] Retry ignored");
            return Vec::new();
        }
        self.reset(now)
    }

    /// Drop the current pipeline and return to `Idle`
    ///
    /// Bumps the epoch so any response still in flight is discarded.
    pub fn reset(&mut self, now: Instant) -> Vec<GateEvent> {
        let mut events = Vec::new();
        self.clear_pipeline();
        self.epoch = self.epoch.next();
        if self.state != GateState::Idle {
            self.enter(GateState::Idle, now, &mut events);
        }
        events
    }

    /// Record that an ad unit finished loading (diagnostics only)
    pub fn mark_content_loaded(&mut self, id: AdStageId) {
        match id {
            AdStageId::Psa => self.psa.mark_content_loaded(),
            AdStageId::Monetization => self.monetization.mark_content_loaded(),
        }
    }

    /// The results renderer failed: surface it as an error
    pub fn fail_render(&mut self, now: Instant, message: impl Into<String>) -> Vec<GateEvent> {
        let mut events = Vec::new();
        let failure = ScanFailure::new(FailureKind::RenderError, message);
        warn!(epoch = %self.epoch, message = %failure.message, "[GATE] Render failed");
        self.stop_stages();
        self.enter(
            GateState::Error {
                failure,
                forced: false,
            },
            now,
            &mut events,
        );
        events
    }

    // -------------------------------------------------------------------------
    // Driving
    // -------------------------------------------------------------------------

    /// Process everything that happened up to `now`
    ///
    /// Order: scan responses, then the active countdown, then transitions
    /// until the state is stable.
    pub fn update<R: ScanResponseReceiver>(
        &mut self,
        now: Instant,
        receiver: &mut R,
    ) -> Vec<GateEvent> {
        let mut events = Vec::new();

        while let Some(response) = receiver.poll_response() {
            self.accept_response(response, now, &mut events);
        }

        let stage_events = match self.phase() {
            GatePhase::PsaActive => self.psa.poll(now),
            GatePhase::MonetizationActive => self.monetization.poll(now),
            _ => Vec::new(),
        };
        events.extend(stage_events.into_iter().map(GateEvent::Stage));

        self.advance(now, &mut events);
        events
    }

    /// Push the current phase forward without waiting for its gate
    ///
    /// This is the single recovery path, shared by the watchdog and the
    /// operator command. It is a no-op in `Idle`, `Revealed` and `Error`.
    pub fn force_advance(&mut self, now: Instant, reason: ForceReason) -> Vec<GateEvent> {
        let mut events = Vec::new();
        let phase = self.phase();
        if !phase.is_supervised() {
            debug!(state = %phase, reason = %reason, "[GATE] Force ignored");
            return events;
        }

        warn!(
            epoch = %self.epoch,
            state = %phase,
            time_in_state_ms = self.time_in_state(now).as_millis() as u64,
            reason = %reason,
            "[GATE] Forcing transition"
        );
        self.last_forced = Some(reason.clone());
        events.push(GateEvent::Forced(reason));

        match phase {
            GatePhase::PsaActive => {
                if let Some(event) = self.psa.force_satisfy(now) {
                    events.push(GateEvent::Stage(event));
                }
            }
            GatePhase::MonetizationActive => {
                if let Some(event) = self.monetization.force_satisfy(now) {
                    events.push(GateEvent::Stage(event));
                }
            }
            GatePhase::Scanning if self.scan_result.is_none() => {
                let failure = ScanFailure::new(
                    FailureKind::TimeoutError,
                    format!(
                        "No scan result after {}s",
                        self.scan_elapsed(now).as_secs()
                    ),
                );
                self.scan_result = Some(ScanResult::Failure(failure.clone()));
                self.stop_stages();
                self.enter(
                    GateState::Error {
                        failure,
                        forced: true,
                    },
                    now,
                    &mut events,
                );
            }
            _ => {}
        }

        self.advance(now, &mut events);
        events
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn accept_response(
        &mut self,
        response: ScanResponse,
        now: Instant,
        events: &mut Vec<GateEvent>,
    ) {
        if response.epoch != self.epoch || !self.phase().is_supervised() {
            debug!(
                response_epoch = %response.epoch,
                current_epoch = %self.epoch,
                state = %self.phase(),
                "[GATE] Dropping stale scan response"
            );
            events.push(GateEvent::StaleResponseDropped(response.epoch));
            return;
        }
        if self.scan_result.is_some() {
            debug!(epoch = %self.epoch, "[GATE] Duplicate scan response ignored");
            return;
        }

        let success = response.result.is_success();
        info!(
            epoch = %self.epoch,
            success,
            after_ms = self.scan_elapsed(now).as_millis() as u64,
            "[GATE] Scan result received"
        );
        events.push(GateEvent::ResultStored {
            epoch: self.epoch,
            success,
        });

        if let ScanResult::Failure(failure) = &response.result {
            let failure = failure.clone();
            self.scan_result = Some(response.result);
            self.stop_stages();
            self.enter(
                GateState::Error {
                    failure,
                    forced: false,
                },
                now,
                events,
            );
            return;
        }
        self.scan_result = Some(response.result);
    }

    /// Apply every transition whose conditions hold
    fn advance(&mut self, now: Instant, events: &mut Vec<GateEvent>) {
        loop {
            let has_result = self
                .scan_result
                .as_ref()
                .is_some_and(ScanResult::is_success);

            match self.state {
                GateState::PsaActive if self.psa.is_gate_satisfied() => {
                    self.enter(GateState::Scanning, now, events);
                }
                GateState::Scanning if self.psa.is_gate_satisfied() && has_result => {
                    self.enter(GateState::MonetizationActive, now, events);
                    let started = self.monetization.start(now);
                    events.extend(started.into_iter().map(GateEvent::Stage));
                }
                GateState::MonetizationActive
                    if self.monetization.is_gate_satisfied() && has_result =>
                {
                    let forced = self.monetization.forced_advance();
                    self.enter(GateState::Revealed { forced }, now, events);
                }
                _ => break,
            }
        }
    }

    fn enter(&mut self, state: GateState, now: Instant, events: &mut Vec<GateEvent>) {
        info!(
            epoch = %self.epoch,
            from = %self.phase(),
            to = %state.phase(),
            forced = state.is_forced(),
            "[GATE] Transition"
        );
        self.state = state.clone();
        self.entered_at = Some(now);
        events.push(GateEvent::Entered(state));
    }

    fn stop_stages(&mut self) {
        self.psa.reset();
        self.monetization.reset();
    }

    fn clear_pipeline(&mut self) {
        self.stop_stages();
        self.scan_result = None;
        self.scan_issued_at = None;
        self.results_viewed = false;
        self.last_forced = None;
    }
}

impl Default for RevealGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io_traits::mocks::MockScanClient;
    use crate::core::protocol::fixtures::powerball_result;
    use crate::core::ticket::fixtures::png_bytes;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn ticket() -> StagedTicket {
        StagedTicket::new(png_bytes(), "ticket.png")
    }

    fn server_error(msg: &str) -> ScanResult {
        ScanResult::Failure(ScanFailure::new(FailureKind::ServerError, msg))
    }

    /// Drive the gate once per second from `from` to `to` inclusive
    fn run(
        gate: &mut RevealGate,
        client: &mut MockScanClient,
        t0: Instant,
        from: u64,
        to: u64,
    ) -> Vec<GateEvent> {
        (from..=to)
            .flat_map(|s| gate.update(t0 + secs(s), client))
            .collect()
    }

    fn entered(events: &[GateEvent]) -> Vec<GatePhase> {
        events
            .iter()
            .filter_map(|e| match e {
                GateEvent::Entered(s) => Some(s.phase()),
                _ => None,
            })
            .collect()
    }

    fn started(t0: Instant) -> (RevealGate, MockScanClient) {
        let mut gate = RevealGate::default();
        let client = MockScanClient::new();
        gate.start_scan(t0, Some(&ticket()), Some("Powerball"), &client)
            .unwrap();
        (gate, client)
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    #[test]
    fn test_initial_state() {
        let gate = RevealGate::default();
        assert_eq!(gate.state(), &GateState::Idle);
        assert_eq!(gate.epoch(), Epoch(0));
        assert!(gate.scan_result().is_none());
        assert!(!gate.status(Instant::now()).is_stalled());
    }

    #[test]
    fn test_start_scan_submits_immediately_and_shows_psa() {
        let t0 = Instant::now();
        let mut gate = RevealGate::default();
        let client = MockScanClient::new();

        let events = gate
            .start_scan(t0, Some(&ticket()), Some("Powerball"), &client)
            .unwrap();

        assert_eq!(client.submit_count(), 1);
        let request = client.last_request().unwrap();
        assert_eq!(request.epoch, Epoch(1));
        assert_eq!(request.lottery_type.as_deref(), Some("Powerball"));

        assert_eq!(gate.phase(), GatePhase::PsaActive);
        assert_eq!(events[0], GateEvent::ScanSubmitted(Epoch(1)));
        assert_eq!(entered(&events), vec![GatePhase::PsaActive]);
        assert!(events.contains(&GateEvent::Stage(StageEvent::Countdown {
            id: AdStageId::Psa,
            remaining: 5
        })));
    }

    #[test]
    fn test_validation_error_never_reaches_network() {
        let t0 = Instant::now();
        let mut gate = RevealGate::default();
        let client = MockScanClient::new();

        let err = gate.start_scan(t0, None, None, &client).unwrap_err();
        assert_eq!(err, TicketError::NoImage);
        assert_eq!(client.submit_count(), 0);
        assert_eq!(gate.phase(), GatePhase::Idle);
        assert_eq!(gate.epoch(), Epoch(0));
    }

    #[test]
    fn test_validation_error_leaves_running_pipeline_alone() {
        let t0 = Instant::now();
        let (mut gate, client) = started(t0);
        let bad = StagedTicket::new(b"plain text".to_vec(), "notes.txt");

        assert!(gate
            .start_scan(t0 + secs(1), Some(&bad), None, &client)
            .is_err());
        assert_eq!(gate.phase(), GatePhase::PsaActive);
        assert_eq!(gate.epoch(), Epoch(1));
        assert_eq!(client.submit_count(), 1);
    }

    // -------------------------------------------------------------------------
    // Happy path and AND-join
    // -------------------------------------------------------------------------

    #[test]
    fn test_result_early_reveals_at_psa_plus_monetization() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);

        run(&mut gate, &mut client, t0, 0, 1);
        client.respond_to_last(powerball_result());

        let events = run(&mut gate, &mut client, t0, 2, 19);
        assert_eq!(
            entered(&events),
            vec![GatePhase::Scanning, GatePhase::MonetizationActive]
        );
        assert_eq!(gate.phase(), GatePhase::MonetizationActive);
        assert!(!gate.view_results());

        let events = gate.update(t0 + secs(20), &mut client);
        assert_eq!(entered(&events), vec![GatePhase::Revealed]);
        assert_eq!(gate.state(), &GateState::Revealed { forced: false });
        assert!(gate.view_results());
        assert!(gate.results_viewed());
    }

    #[test]
    fn test_psa_done_before_result_waits_in_scanning() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);

        let events = run(&mut gate, &mut client, t0, 0, 9);
        assert_eq!(entered(&events), vec![GatePhase::Scanning]);
        assert_eq!(gate.phase(), GatePhase::Scanning);

        client.respond_to_last(powerball_result());
        let events = gate.update(t0 + secs(10), &mut client);
        assert_eq!(entered(&events), vec![GatePhase::MonetizationActive]);

        // Monetization dwell is measured from its own start
        run(&mut gate, &mut client, t0, 11, 24);
        assert_eq!(gate.phase(), GatePhase::MonetizationActive);
        gate.update(t0 + secs(25), &mut client);
        assert_eq!(gate.phase(), GatePhase::Revealed);
    }

    #[test]
    fn test_instant_result_still_waits_for_both_dwells() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        client.respond_to_last(powerball_result());

        for s in 0..20 {
            gate.update(t0 + secs(s), &mut client);
            assert_ne!(gate.phase(), GatePhase::Revealed, "revealed early at {s}s");
            if gate.phase() == GatePhase::MonetizationActive {
                assert!(!gate.stage(AdStageId::Monetization).is_gate_satisfied());
            }
        }
        gate.update(t0 + secs(20), &mut client);
        assert_eq!(gate.phase(), GatePhase::Revealed);
    }

    #[test]
    fn test_throttled_host_catches_up_in_one_update() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        client.respond_to_last(powerball_result());

        // First poll after a long background period: PSA completes, the
        // monetization stage starts now and still needs its full dwell
        let events = gate.update(t0 + secs(60), &mut client);
        assert_eq!(
            entered(&events),
            vec![GatePhase::Scanning, GatePhase::MonetizationActive]
        );
        gate.update(t0 + secs(74), &mut client);
        assert_eq!(gate.phase(), GatePhase::MonetizationActive);
        gate.update(t0 + secs(75), &mut client);
        assert_eq!(gate.phase(), GatePhase::Revealed);
    }

    // -------------------------------------------------------------------------
    // Failures
    // -------------------------------------------------------------------------

    #[test]
    fn test_server_error_goes_to_error_immediately() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        client.respond_to_last(server_error("OCR failed"));

        let events = gate.update(t0 + secs(2), &mut client);
        assert_eq!(entered(&events), vec![GatePhase::Error]);
        match gate.state() {
            GateState::Error { failure, forced } => {
                assert_eq!(failure.kind, FailureKind::ServerError);
                assert_eq!(failure.message, "OCR failed");
                assert!(!forced);
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(!gate.stage(AdStageId::Psa).is_started());

        // Stages are dead: no countdown events afterwards
        assert!(run(&mut gate, &mut client, t0, 3, 30).is_empty());
    }

    #[test]
    fn test_retry_returns_to_idle_and_invalidates_epoch() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        client.respond_to_last(server_error("OCR failed"));
        gate.update(t0 + secs(1), &mut client);

        let epoch_before = gate.epoch();
        let events = gate.retry(t0 + secs(2));
        assert_eq!(entered(&events), vec![GatePhase::Idle]);
        assert!(gate.epoch() > epoch_before);
        assert!(gate.scan_result().is_none());

        // Retry outside Error is a no-op
        assert!(gate.retry(t0 + secs(3)).is_empty());
    }

    #[test]
    fn test_render_failure_enters_error() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        client.respond_to_last(powerball_result());
        run(&mut gate, &mut client, t0, 0, 20);
        assert_eq!(gate.phase(), GatePhase::Revealed);

        gate.fail_render(t0 + secs(21), "boom");
        match gate.state() {
            GateState::Error { failure, .. } => assert_eq!(failure.kind, FailureKind::RenderError),
            other => panic!("unexpected state {:?}", other),
        }
    }

    // -------------------------------------------------------------------------
    // Epochs
    // -------------------------------------------------------------------------

    #[test]
    fn test_stale_response_is_dropped() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        let old_epoch = gate.epoch();

        // New scan supersedes the first one while it is still in flight
        gate.start_scan(t0 + secs(2), Some(&ticket()), None, &client)
            .unwrap();
        assert_eq!(client.submit_count(), 2);
        assert!(gate.epoch() > old_epoch);

        client.respond(old_epoch, server_error("late failure"));
        let events = gate.update(t0 + secs(3), &mut client);
        assert!(events.contains(&GateEvent::StaleResponseDropped(old_epoch)));
        assert!(gate.scan_result().is_none());
        assert_eq!(gate.phase(), GatePhase::PsaActive);
    }

    #[test]
    fn test_new_scan_restarts_psa_from_zero() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        run(&mut gate, &mut client, t0, 0, 4);

        gate.start_scan(t0 + secs(4), Some(&ticket()), None, &client)
            .unwrap();
        gate.update(t0 + secs(8), &mut client);
        assert_eq!(gate.phase(), GatePhase::PsaActive);
        gate.update(t0 + secs(9), &mut client);
        assert_eq!(gate.phase(), GatePhase::Scanning);
    }

    #[test]
    fn test_response_after_timeout_and_retry_is_dropped() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        let epoch = gate.epoch();
        run(&mut gate, &mut client, t0, 0, 31);
        gate.force_advance(t0 + secs(31), ForceReason::Operator);
        assert_eq!(gate.phase(), GatePhase::Error);
        gate.retry(t0 + secs(32));

        client.respond(epoch, powerball_result());
        gate.update(t0 + secs(33), &mut client);
        assert_eq!(gate.phase(), GatePhase::Idle);
        assert!(gate.scan_result().is_none());
    }

    // -------------------------------------------------------------------------
    // Forced transitions
    // -------------------------------------------------------------------------

    #[test]
    fn test_force_in_psa_satisfies_psa_only() {
        let t0 = Instant::now();
        let (mut gate, _client) = started(t0);

        let events = gate.force_advance(t0 + secs(1), ForceReason::Operator);
        assert!(events.contains(&GateEvent::Forced(ForceReason::Operator)));
        assert_eq!(gate.phase(), GatePhase::Scanning);
        assert!(gate.stage(AdStageId::Psa).forced_advance());
    }

    #[test]
    fn test_force_in_scanning_times_out() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        run(&mut gate, &mut client, t0, 0, 31);
        assert_eq!(gate.phase(), GatePhase::Scanning);
        assert!(gate.status(t0 + secs(31)).is_stalled());

        gate.force_advance(t0 + secs(31), ForceReason::Operator);
        match gate.state() {
            GateState::Error { failure, forced } => {
                assert_eq!(failure.kind, FailureKind::TimeoutError);
                assert!(forced);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_force_in_monetization_reveals_forced() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        client.respond_to_last(powerball_result());
        run(&mut gate, &mut client, t0, 0, 7);
        assert_eq!(gate.phase(), GatePhase::MonetizationActive);

        gate.force_advance(t0 + secs(8), ForceReason::Operator);
        assert_eq!(gate.state(), &GateState::Revealed { forced: true });
        assert!(gate.stage_snapshot(AdStageId::Monetization, t0 + secs(8)).forced_advance);
        assert_eq!(gate.last_forced(), Some(&ForceReason::Operator));
    }

    #[test]
    fn test_force_is_noop_outside_supervised_phases() {
        let t0 = Instant::now();
        let mut gate = RevealGate::default();
        assert!(gate.force_advance(t0, ForceReason::Operator).is_empty());
        assert_eq!(gate.phase(), GatePhase::Idle);
        assert!(gate.last_forced().is_none());
    }

    #[test]
    fn test_status_reports_phase_limits() {
        let t0 = Instant::now();
        let (mut gate, mut client) = started(t0);
        let status = gate.status(t0 + secs(2));
        assert_eq!(status.phase, GatePhase::PsaActive);
        assert_eq!(status.limit, Some(secs(8)));
        assert_eq!(status.elapsed, secs(2));

        run(&mut gate, &mut client, t0, 0, 6);
        let status = gate.status(t0 + secs(6));
        assert_eq!(status.phase, GatePhase::Scanning);
        assert_eq!(status.limit, Some(secs(30)));
        assert_eq!(status.elapsed, secs(6));
    }
}
