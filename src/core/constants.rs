//! Pipeline constants - default dwell times, ceilings, limits
//!
//! These are the defaults baked into the config layer. Every duration here
//! can be overridden from `ticket_reveal.toml`.

use std::time::Duration;

// =============================================================================
// AD STAGES
// =============================================================================

/// Minimum time the public-service announcement stays on screen
pub const PSA_MIN_DWELL: Duration = Duration::from_secs(5);

/// Minimum time the monetization ad stays on screen
pub const MONETIZATION_MIN_DWELL: Duration = Duration::from_secs(15);

/// Hard ceiling for the monetization ad, regardless of ad-unit load state
pub const MONETIZATION_MAX_DWELL: Duration = Duration::from_secs(25);

/// Extra time the PSA may overrun its countdown before the watchdog steps in
/// (the PSA has no configured maximum of its own)
pub const PSA_STALL_GRACE: Duration = Duration::from_secs(3);

// =============================================================================
// SCANNING
// =============================================================================

/// Global ceiling for the scan request, measured from the moment it is issued
pub const SCAN_CEILING: Duration = Duration::from_secs(30);

/// Per-request HTTP timeout (slightly above the ceiling so the watchdog wins)
pub const SCAN_REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

/// Path of the scan endpoint, relative to the configured base URL
pub const SCAN_ENDPOINT_PATH: &str = "/scan-ticket";

/// Multipart field carrying the ticket image
pub const FIELD_TICKET_IMAGE: &str = "ticket_image";

/// Multipart field carrying the declared lottery type (empty = auto-detect)
pub const FIELD_LOTTERY_TYPE: &str = "lottery_type";

/// Multipart field carrying the CSRF token
pub const FIELD_CSRF_TOKEN: &str = "csrf_token";

// =============================================================================
// TICKET VALIDATION
// =============================================================================

/// Largest ticket image accepted for upload
pub const MAX_TICKET_BYTES: usize = 10 * 1024 * 1024;

// =============================================================================
// WATCHDOG
// =============================================================================

/// How often the recovery watchdog inspects the gate
pub const WATCHDOG_POLL_INTERVAL: Duration = Duration::from_secs(1);
