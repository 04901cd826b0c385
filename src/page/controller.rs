//! Scan page - the host-facing orchestrator
//!
//! ScanPage owns the reveal gate, the recovery watchdog, the scan client and
//! the page view. The host delivers user intents and calls [`ScanPage::tick`]
//! from its event loop; the page feeds both into the gate and paints the
//! resulting events. It is the only code that writes to the view.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::config::Config;
use crate::core::ad_stage::{AdStage, AdStageId, StageEvent};
use crate::core::io_traits::ScanClient;
use crate::core::renderer::{RenderSummary, ResultRenderer};
use crate::core::reveal_gate::{
    ForceReason, GateConfig, GateEvent, GatePhase, GateState, RevealGate,
};
use crate::core::ticket::{StagedTicket, TicketError};
use crate::core::types::{Epoch, ScanFailure};
use crate::core::view::{Element, PageView, UserIntent, LISTENERS};
use crate::core::watchdog::RecoveryWatchdog;

/// Snapshot of the whole pipeline for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDiagnostics {
    pub state: GateState,
    pub epoch: Epoch,
    pub time_in_state: Duration,
    pub scan_elapsed: Duration,
    pub psa: AdStage,
    pub monetization: AdStage,
    pub last_forced: Option<ForceReason>,
    pub render_count: u32,
    pub last_render: Option<RenderSummary>,
    pub requests_in_flight: usize,
    pub stalls_seen: u32,
}

/// The ticket scanning page
pub struct ScanPage<C: ScanClient, V: PageView> {
    gate: RevealGate,
    watchdog: RecoveryWatchdog,
    client: C,
    view: V,
    staged: Option<StagedTicket>,
    lottery_type: Option<String>,
    default_lottery_type: Option<String>,
    mounted: bool,
    render_count: u32,
    last_render: Option<RenderSummary>,
}

impl<C: ScanClient, V: PageView> ScanPage<C, V> {
    pub fn new(gate_config: GateConfig, watchdog_interval: Duration, client: C, view: V) -> Self {
        Self {
            gate: RevealGate::new(gate_config),
            watchdog: RecoveryWatchdog::new(watchdog_interval),
            client,
            view,
            staged: None,
            lottery_type: None,
            default_lottery_type: None,
            mounted: false,
            render_count: 0,
            last_render: None,
        }
    }

    pub fn from_config(config: &Config, client: C, view: V) -> Self {
        let mut page = Self::new(config.gate_config(), config.watchdog_interval(), client, view);
        page.default_lottery_type = config.default_lottery_type().map(str::to_string);
        page
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn gate(&self) -> &RevealGate {
        &self.gate
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn render_count(&self) -> u32 {
        self.render_count
    }

    pub fn diagnostics(&self, now: Instant) -> PipelineDiagnostics {
        PipelineDiagnostics {
            state: self.gate.state().clone(),
            epoch: self.gate.epoch(),
            time_in_state: self.gate.time_in_state(now),
            scan_elapsed: self.gate.scan_elapsed(now),
            psa: self.gate.stage_snapshot(AdStageId::Psa, now),
            monetization: self.gate.stage_snapshot(AdStageId::Monetization, now),
            last_forced: self.gate.last_forced().cloned(),
            render_count: self.render_count,
            last_render: self.last_render,
            requests_in_flight: self.client.in_flight(),
            stalls_seen: self.watchdog.stalls_seen(),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Attach listeners and paint the idle page. Returns the number of
    /// listeners attached; a second call is a no-op.
    pub fn mount(&mut self) -> usize {
        if self.mounted {
            debug!("[PAGE] Already mounted");
            return 0;
        }
        let mut attached = 0;
        for &(element, intent) in LISTENERS {
            match self.view.attach_listener(element, intent) {
                Ok(()) => attached += 1,
                Err(e) => warn!(error = %e, intent = ?intent, "[PAGE] Listener not attached"),
            }
        }
        self.mounted = true;
        self.paint_idle();
        info!(listeners = attached, "[PAGE] Mounted");
        attached
    }

    /// Detach every listener attached by [`mount`](Self::mount)
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        for &(element, _) in LISTENERS {
            self.view.detach_listener(element);
        }
        self.view.set_scroll_locked(false);
        self.mounted = false;
        info!("[PAGE] Unmounted");
    }

    // -------------------------------------------------------------------------
    // Upload component inputs
    // -------------------------------------------------------------------------

    pub fn stage_ticket(&mut self, bytes: Vec<u8>, file_name: impl Into<String>) {
        let ticket = StagedTicket::new(bytes, file_name);
        debug!(bytes = ticket.bytes.len(), file = %ticket.file_name, "[PAGE] Ticket staged");
        self.staged = Some(ticket);
    }

    pub fn clear_ticket(&mut self) {
        self.staged = None;
    }

    /// Lottery type picked by the user; `None` or blank = auto-detect
    pub fn set_lottery_type(&mut self, lottery_type: Option<String>) {
        self.lottery_type = lottery_type;
    }

    // -------------------------------------------------------------------------
    // Driving
    // -------------------------------------------------------------------------

    /// Dispatch a user intent from the host
    pub fn handle_intent(&mut self, intent: UserIntent, now: Instant) {
        debug!(intent = ?intent, state = %self.gate.phase(), "[PAGE] Intent");
        match intent {
            UserIntent::StartScan => {
                // Rejection is already painted
                let _ = self.start_scan(now);
            }
            UserIntent::ViewResults => {
                if self.gate.view_results() {
                    self.show_results();
                }
            }
            UserIntent::Retry => {
                let events = self.gate.retry(now);
                self.apply(events, now);
            }
            UserIntent::PsaContentLoaded => self.gate.mark_content_loaded(AdStageId::Psa),
            UserIntent::AdContentLoaded => self.gate.mark_content_loaded(AdStageId::Monetization),
        }
    }

    /// Start a scan with the staged ticket
    ///
    /// A rejected ticket is shown in the error panel and never reaches the
    /// network; the pipeline keeps whatever state it had.
    pub fn start_scan(&mut self, now: Instant) -> Result<(), TicketError> {
        let lottery_type = self
            .lottery_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.default_lottery_type.as_deref());

        match self
            .gate
            .start_scan(now, self.staged.as_ref(), lottery_type, &self.client)
        {
            Ok(events) => {
                self.last_render = None;
                self.apply(events, now);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "[PAGE] Ticket rejected");
                let failure: ScanFailure = e.clone().into();
                self.set_text(Element::ErrorMessage, &error_text(&failure));
                self.show(Element::ErrorPanel, true);
                self.show(Element::RetryButton, false);
                Err(e)
            }
        }
    }

    /// Advance the pipeline to `now`: scan responses, countdowns, watchdog
    pub fn tick(&mut self, now: Instant) {
        let events = self.gate.update(now, &mut self.client);
        self.apply(events, now);

        let status = self.gate.status(now);
        if let Some(report) = self.watchdog.poll(now, &status) {
            let events = self.gate.force_advance(now, report.into_reason());
            self.apply(events, now);
        }
    }

    /// Operator recovery: push the pipeline out of the ad stages right now
    ///
    /// Uses the same forced-transition path as the watchdog. Ends in
    /// `Revealed` with results shown, or in `Error` when no result exists.
    pub fn force_reveal(&mut self, now: Instant) {
        let events = self.gate.update(now, &mut self.client);
        self.apply(events, now);

        // Each force moves one phase; three phases at most
        for _ in 0..3 {
            if !self.gate.phase().is_supervised() {
                break;
            }
            let events = self.gate.force_advance(now, ForceReason::Operator);
            self.apply(events, now);
        }

        if self.gate.view_results() {
            self.show_results();
        }
    }

    /// Repaint the stored result into the results container
    ///
    /// Clear-and-rebuild, so any number of calls leave the same content.
    pub fn refresh_results(&mut self, now: Instant) {
        if self.gate.phase() == GatePhase::Revealed {
            self.render_results(now);
        }
    }

    // -------------------------------------------------------------------------
    // Painting
    // -------------------------------------------------------------------------

    fn apply(&mut self, events: Vec<GateEvent>, now: Instant) {
        for event in events {
            match event {
                GateEvent::Entered(state) => self.paint_state(&state, now),
                GateEvent::Stage(StageEvent::Countdown { id, remaining }) => {
                    let element = match id {
                        AdStageId::Psa => Element::PsaCountdown,
                        AdStageId::Monetization => Element::MonetizationCountdown,
                    };
                    self.set_text(element, &remaining.to_string());
                }
                GateEvent::Forced(reason) => {
                    debug!(reason = %reason, "[PAGE] Forced transition applied");
                }
                GateEvent::Stage(StageEvent::DwellSatisfied { .. })
                | GateEvent::ScanSubmitted(_)
                | GateEvent::ResultStored { .. }
                | GateEvent::StaleResponseDropped(_) => {}
            }
        }
    }

    fn paint_state(&mut self, state: &GateState, now: Instant) {
        match state {
            GateState::Idle => self.paint_idle(),
            GateState::PsaActive => {
                self.show(Element::ErrorPanel, false);
                self.show(Element::ResultsContainer, false);
                self.show(Element::MonetizationOverlay, false);
                self.show(Element::ScanningIndicator, false);
                self.show(Element::ViewResultsButton, false);
                self.enable(Element::ViewResultsButton, false);
                self.enable(Element::ScanButton, false);
                self.show(Element::RetryButton, false);
                self.enable(Element::RetryButton, false);
                self.show(Element::PsaOverlay, true);
                self.view.set_scroll_locked(true);
            }
            GateState::Scanning => {
                self.show(Element::PsaOverlay, false);
                self.show(Element::ScanningIndicator, true);
            }
            GateState::MonetizationActive => {
                self.show(Element::PsaOverlay, false);
                self.show(Element::ScanningIndicator, false);
                self.show(Element::MonetizationOverlay, true);
                self.show(Element::ViewResultsButton, true);
                self.enable(Element::ViewResultsButton, false);
                self.view.set_scroll_locked(true);
            }
            GateState::Revealed { forced } => {
                if self.render_results(now) {
                    self.show(Element::ViewResultsButton, true);
                    self.enable(Element::ViewResultsButton, true);
                    self.enable(Element::ScanButton, true);
                    info!(forced = *forced, "[PAGE] Results ready");
                }
            }
            GateState::Error { failure, forced } => {
                info!(kind = ?failure.kind, forced = *forced, "[PAGE] Showing error");
                self.show(Element::PsaOverlay, false);
                self.show(Element::MonetizationOverlay, false);
                self.show(Element::ScanningIndicator, false);
                self.show(Element::ResultsContainer, false);
                self.show(Element::ViewResultsButton, false);
                self.enable(Element::ViewResultsButton, false);
                self.view.set_scroll_locked(false);
                self.set_text(Element::ErrorMessage, &error_text(failure));
                self.show(Element::ErrorPanel, true);
                self.show(Element::RetryButton, true);
                self.enable(Element::RetryButton, true);
                self.enable(Element::ScanButton, true);
            }
        }
    }

    fn paint_idle(&mut self) {
        for element in [
            Element::PsaOverlay,
            Element::MonetizationOverlay,
            Element::ScanningIndicator,
            Element::ResultsContainer,
            Element::ErrorPanel,
            Element::ViewResultsButton,
            Element::RetryButton,
        ] {
            self.show(element, false);
        }
        self.enable(Element::ViewResultsButton, false);
        self.enable(Element::RetryButton, false);
        self.enable(Element::ScanButton, true);
        self.view.set_scroll_locked(false);
    }

    /// Paint the stored result; a failure moves the gate to `Error`
    fn render_results(&mut self, now: Instant) -> bool {
        let Some(result) = self.gate.scan_result() else {
            let events = self.gate.fail_render(now, "No scan result to display");
            self.apply(events, now);
            return false;
        };

        match ResultRenderer::render(result, &mut self.view) {
            Ok(summary) => {
                self.render_count += 1;
                self.last_render = Some(summary);
                true
            }
            Err(e) => {
                let events = self.gate.fail_render(now, e.to_string());
                self.apply(events, now);
                false
            }
        }
    }

    fn show_results(&mut self) {
        self.show(Element::MonetizationOverlay, false);
        self.show(Element::ViewResultsButton, false);
        self.view.set_scroll_locked(false);
        self.show(Element::ResultsContainer, true);
        info!(epoch = %self.gate.epoch(), "[PAGE] Results shown");
    }

    fn show(&mut self, element: Element, visible: bool) {
        if let Err(e) = self.view.set_visible(element, visible) {
            debug!(error = %e, "[PAGE] set_visible skipped");
        }
    }

    fn enable(&mut self, element: Element, enabled: bool) {
        if let Err(e) = self.view.set_enabled(element, enabled) {
            debug!(error = %e, "[PAGE] set_enabled skipped");
        }
    }

    fn set_text(&mut self, element: Element, text: &str) {
        if let Err(e) = self.view.set_text(element, text) {
            debug!(error = %e, "[PAGE] set_text skipped");
        }
    }
}

fn error_text(failure: &ScanFailure) -> String {
    format!("{} ({})", failure.kind.headline(), failure.message)
}

// =============================================================================
// TESTS
// =============================================================================
