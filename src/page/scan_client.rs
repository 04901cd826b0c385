//! HTTP scan client
//!
//! Uploads the ticket to `POST {base_url}/scan-ticket` from a worker thread
//! and hands results back over a channel, so the page's driver thread never
//! blocks on the network.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use super::config::Config;
use crate::core::constants::{
    FIELD_CSRF_TOKEN, FIELD_LOTTERY_TYPE, FIELD_TICKET_IMAGE, SCAN_ENDPOINT_PATH,
};
use crate::core::io_traits::{ScanResponseReceiver, ScanSender};
use crate::core::protocol::parse_scan_response;
use crate::core::types::{
    Epoch, FailureKind, ScanFailure, ScanRequest, ScanResponse, ScanResult,
};

// =============================================================================
// TYPES
// =============================================================================

/// Settings the worker needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub csrf_token: String,
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.scan.base_url.clone(),
            csrf_token: config.scan.csrf_token.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    /// Full URL of the scan endpoint
    pub fn scan_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim().trim_end_matches('/'),
            SCAN_ENDPOINT_PATH
        )
    }
}

/// Depth of the request queue between the driver thread and the worker
const REQUEST_QUEUE_DEPTH: usize = 16;

/// Outgoing messages (driver thread -> worker)
#[derive(Debug)]
enum WorkerMessage {
    Scan(ScanRequest),
    Shutdown,
}

// =============================================================================
// HTTP SCAN CLIENT
// =============================================================================

/// Scan client backed by a blocking HTTP worker thread
pub struct HttpScanClient {
    settings: ClientSettings,
    tx: Option<Sender<WorkerMessage>>,
    rx: Option<Receiver<ScanResponse>>,
    thread_handle: Option<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
    /// Failures for requests that never reached the worker
    rejected: RefCell<VecDeque<ScanResponse>>,
}

impl HttpScanClient {
    /// Spawn the worker
    pub fn new(settings: ClientSettings) -> Self {
        let (outgoing_tx, outgoing_rx) = bounded::<WorkerMessage>(REQUEST_QUEUE_DEPTH);
        let (incoming_tx, incoming_rx) = bounded::<ScanResponse>(REQUEST_QUEUE_DEPTH);
        let in_flight = Arc::new(AtomicUsize::new(0));

        let worker_settings = settings.clone();
        let worker_in_flight = Arc::clone(&in_flight);
        let handle = thread::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                scan_worker(worker_settings, outgoing_rx, incoming_tx, worker_in_flight);
            }));

            if let Err(panic_info) = result {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    format!("Scan worker panic: {}", s)
                } else {
                    "Scan worker panic".to_string()
                };
                error!("[SCAN] {}", msg);
            }
        });

        info!(url = %settings.scan_url(), "[SCAN] Worker started");
        Self {
            settings,
            tx: Some(outgoing_tx),
            rx: Some(incoming_rx),
            thread_handle: Some(handle),
            in_flight,
            rejected: RefCell::new(VecDeque::new()),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Stop the worker and wait for it
    ///
    /// A request already on the wire runs to completion (bounded by the
    /// request timeout); its response is discarded.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(WorkerMessage::Shutdown);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.rx = None;
    }

    /// Answer `epoch` locally with a network failure
    fn reject(&self, epoch: Epoch, message: &str) {
        self.rejected.borrow_mut().push_back(ScanResponse {
            epoch,
            result: ScanResult::Failure(ScanFailure::new(FailureKind::NetworkError, message)),
        });
    }
}

impl ScanSender for HttpScanClient {
    fn submit(&self, request: ScanRequest) {
        let epoch = request.epoch;
        let Some(tx) = &self.tx else {
            warn!(epoch = %epoch, "[SCAN] Worker stopped, request rejected");
            self.reject(epoch, "Scan worker stopped");
            return;
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(WorkerMessage::Scan(request)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                warn!(epoch = %epoch, "[SCAN] Request queue full, request rejected");
                self.reject(epoch, "Scan queue full");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                warn!(epoch = %epoch, "[SCAN] Worker gone, request rejected");
                self.reject(epoch, "Scan worker stopped");
            }
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl ScanResponseReceiver for HttpScanClient {
    fn poll_response(&mut self) -> Option<ScanResponse> {
        if let Some(response) = self.rejected.get_mut().pop_front() {
            return Some(response);
        }
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                warn!("[SCAN] Worker channel closed");
                self.rx = None;
                None
            }
        }
    }
}

impl Drop for HttpScanClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// WORKER THREAD
// =============================================================================

fn scan_worker(
    settings: ClientSettings,
    outgoing_rx: Receiver<WorkerMessage>,
    incoming_tx: Sender<ScanResponse>,
    in_flight: Arc<AtomicUsize>,
) {
    let client = match Client::builder().timeout(settings.request_timeout).build() {
        Ok(client) => Some(client),
        Err(e) => {
            error!(error = %e, "[SCAN] HTTP client init failed");
            None
        }
    };

    while let Ok(msg) = outgoing_rx.recv() {
        let mut request = match msg {
            WorkerMessage::Scan(request) => request,
            WorkerMessage::Shutdown => break,
        };

        // Only the newest queued request still has a pipeline waiting on it
        loop {
            match outgoing_rx.try_recv() {
                Ok(WorkerMessage::Scan(newer)) => {
                    debug!(
                        skipped = %request.epoch,
                        newer = %newer.epoch,
                        "[SCAN] Skipping superseded request"
                    );
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    request = newer;
                }
                Ok(WorkerMessage::Shutdown) => return,
                Err(_) => break,
            }
        }

        let epoch = request.epoch;
        let result = match &client {
            Some(client) => perform_scan(client, &settings, request),
            None => ScanResult::Failure(ScanFailure::new(
                FailureKind::NetworkError,
                "HTTP client unavailable",
            )),
        };
        in_flight.fetch_sub(1, Ordering::SeqCst);

        if incoming_tx.send(ScanResponse { epoch, result }).is_err() {
            break;
        }
    }

    debug!("[SCAN] Worker stopped");
}

/// Run one upload and map the outcome
fn perform_scan(client: &Client, settings: &ClientSettings, request: ScanRequest) -> ScanResult {
    let url = settings.scan_url();
    let epoch = request.epoch;
    let lottery_type = request.lottery_type_field().to_string();

    let part = match Part::bytes(request.image)
        .file_name(request.file_name)
        .mime_str(request.mime_type)
    {
        Ok(part) => part,
        Err(e) => {
            return ScanResult::Failure(ScanFailure::new(
                FailureKind::ValidationError,
                format!("Unsupported image type: {}", e),
            ))
        }
    };
    let form = Form::new()
        .part(FIELD_TICKET_IMAGE, part)
        .text(FIELD_LOTTERY_TYPE, lottery_type)
        .text(FIELD_CSRF_TOKEN, settings.csrf_token.clone());

    info!(epoch = %epoch, url = %url, "[SCAN] Uploading ticket");
    let response = match client
        .post(&url)
        .header("X-CSRFToken", settings.csrf_token.as_str())
        .multipart(form)
        .send()
    {
        Ok(response) => response,
        Err(e) => {
            warn!(epoch = %epoch, error = %e, "[SCAN] Request failed");
            return ScanResult::Failure(ScanFailure::new(
                FailureKind::NetworkError,
                format!("Scan request failed: {}", e),
            ));
        }
    };

    let status = response.status().as_u16();
    let body = match response.text() {
        Ok(body) => body,
        Err(e) => {
            warn!(epoch = %epoch, status, error = %e, "[SCAN] Failed to read response body");
            return ScanResult::Failure(ScanFailure::new(
                FailureKind::NetworkError,
                format!("Failed to read scan response: {}", e),
            ));
        }
    };

    let result = parse_scan_response(status, &body);
    match &result {
        ScanResult::Success(s) => info!(
            epoch = %epoch,
            status,
            lottery_type = %s.lottery_type,
            total_matched = s.total_matched,
            "[SCAN] Scan succeeded"
        ),
        ScanResult::Failure(f) => warn!(
            epoch = %epoch,
            status,
            message = %f.message,
            "[SCAN] Scan rejected"
        ),
    }
    result
}

// =============================================================================
// TESTS
// =============================================================================
