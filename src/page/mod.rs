//! Page module - host integration for the reveal pipeline
//!
//! This module contains the host-facing code:
//! - ScanPage: intent dispatch, tick loop, single writer of the view
//! - HTTP scan client (worker thread)
//! - Configuration loading
//! - Logging setup

pub mod config;
pub mod controller;
pub mod logging;
pub mod scan_client;

pub use config::{Config, ConfigError};
pub use controller::{PipelineDiagnostics, ScanPage};
pub use scan_client::{ClientSettings, HttpScanClient};

use std::path::Path;

use tracing::info;

/// Load `ticket_reveal.toml` from `config_dir` and start logging
///
/// Missing file = defaults. Log file paths in the config are resolved
/// relative to `config_dir`.
pub fn bootstrap(config_dir: &Path) -> Result<Config, ConfigError> {
    let config = Config::load(&config_dir.join(Config::CONFIG_FILENAME))?;
    logging::init_logging(&config.logging, config.log_file_path(config_dir));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.scan.base_url,
        "Ticket reveal starting..."
    );
    Ok(config)
}
