//! I/O traits for the scan request client
//!
//! These traits abstract the network side of the pipeline, so the reveal
//! gate can be driven in tests with a mock backend that answers whenever
//! the test decides.

use crate::core::types::{ScanRequest, ScanResponse};

// =============================================================================
// I/O TRAITS
// =============================================================================

/// Trait for submitting scan requests
pub trait ScanSender {
    /// Queue a request for submission. Must not block.
    ///
    /// The response, whenever it arrives, is delivered through
    /// [`ScanResponseReceiver::poll_response`] tagged with `request.epoch`.
    /// A request that can't be sent is still answered, with a failure.
    fn submit(&self, request: ScanRequest);

    /// Number of requests submitted but not yet answered
    fn in_flight(&self) -> usize;
}

/// Trait for receiving scan responses
pub trait ScanResponseReceiver {
    /// Poll for the next response (non-blocking)
    fn poll_response(&mut self) -> Option<ScanResponse>;
}

/// Combined trait for a full scan client
///
/// This is automatically implemented for any type that implements
/// both `ScanSender` and `ScanResponseReceiver`.
pub trait ScanClient: ScanSender + ScanResponseReceiver {}
impl<T: ScanSender + ScanResponseReceiver> ScanClient for T {}

// =============================================================================
// MOCK IMPLEMENTATIONS FOR TESTING
// =============================================================================


// =============================================================================
// TESTS
// =============================================================================
