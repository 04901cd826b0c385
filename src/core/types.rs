//! Core types - platform-independent data structures
//!
//! Scan requests and results, failure taxonomy, and the epoch counter that
//! ties every asynchronous response to the pipeline instance that issued it.

use std::fmt;

use crate::core::protocol::ScanSuccess;

// =============================================================================
// EPOCH
// =============================================================================

/// Generation counter for pipeline instances
///
/// Incremented every time a new scan starts. Responses tagged with an older
/// epoch belong to a cancelled pipeline and must be dropped on arrival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl Epoch {
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// FAILURES
// =============================================================================

/// Failure taxonomy for the reveal pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request never completed (DNS, connection reset, client timeout)
    NetworkError,
    /// Non-2xx status, `{error}` body, or malformed JSON
    ServerError,
    /// No image staged, or the staged file is not an accepted image
    ValidationError,
    /// Scan exceeded the global ceiling
    TimeoutError,
    /// The result renderer failed while painting
    RenderError,
}

impl FailureKind {
    /// Default user-facing headline for the error panel
    pub fn headline(self) -> &'static str {
        match self {
            FailureKind::NetworkError => "We couldn't reach the scanner. Check your connection.",
            FailureKind::ServerError => "The scanner couldn't read your ticket.",
            FailureKind::ValidationError => "Please choose a ticket photo first.",
            FailureKind::TimeoutError => "Scanning took too long.",
            FailureKind::RenderError => "We couldn't display your results.",
        }
    }
}

/// A typed failure with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// =============================================================================
// SCAN RESULT
// =============================================================================

/// Outcome of a scan, owned by the reveal gate once received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Success(ScanSuccess),
    Failure(ScanFailure),
}

impl ScanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanResult::Success(_))
    }

    pub fn failure(&self) -> Option<&ScanFailure> {
        match self {
            ScanResult::Failure(f) => Some(f),
            ScanResult::Success(_) => None,
        }
    }
}

// =============================================================================
// SCAN REQUEST
// =============================================================================

/// A validated ticket ready for submission
///
/// Immutable once built. Carries the epoch of the pipeline that issued it so
/// the response can be matched back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub epoch: Epoch,
    pub image: Vec<u8>,
    pub file_name: String,
    pub mime_type: &'static str,
    /// Declared lottery type; `None` lets the backend auto-detect
    pub lottery_type: Option<String>,
}

impl ScanRequest {
    /// Value sent in the `lottery_type` form field (empty = auto-detect)
    pub fn lottery_type_field(&self) -> &str {
        self.lottery_type.as_deref().unwrap_or("")
    }
}

/// A response from the scan client, tagged with its request's epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResponse {
    pub epoch: Epoch,
    pub result: ScanResult,
}
