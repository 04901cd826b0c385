// Configuration for the ticket reveal page

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::ad_stage::AdStageConfig;
use crate::core::constants::{
    MONETIZATION_MAX_DWELL, MONETIZATION_MIN_DWELL, PSA_MIN_DWELL, PSA_STALL_GRACE, SCAN_CEILING,
    SCAN_REQUEST_TIMEOUT, WATCHDOG_POLL_INTERVAL,
};
use crate::core::reveal_gate::GateConfig;

use super::logging::crate_directive;

// =============================================================================
// CONFIGURATION STRUCTURES
// =============================================================================

/// Public-service announcement stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsaSettings {
    /// Countdown length in seconds
    #[serde(default = "default_psa_min_dwell")]
    pub min_dwell_secs: u64,
    /// Optional hard ceiling. Unset = `min_dwell_secs` + watchdog grace.
    #[serde(default)]
    pub max_dwell_secs: Option<u64>,
}

fn default_psa_min_dwell() -> u64 {
    PSA_MIN_DWELL.as_secs()
}

impl Default for PsaSettings {
    fn default() -> Self {
        Self {
            min_dwell_secs: default_psa_min_dwell(),
            max_dwell_secs: None,
        }
    }
}

/// Monetization ad stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonetizationSettings {
    #[serde(default = "default_ad_min_dwell")]
    pub min_dwell_secs: u64,
    #[serde(default = "default_ad_max_dwell")]
    pub max_dwell_secs: Option<u64>,
}

fn default_ad_min_dwell() -> u64 {
    MONETIZATION_MIN_DWELL.as_secs()
}
fn default_ad_max_dwell() -> Option<u64> {
    Some(MONETIZATION_MAX_DWELL.as_secs())
}

impl Default for MonetizationSettings {
    fn default() -> Self {
        Self {
            min_dwell_secs: default_ad_min_dwell(),
            max_dwell_secs: default_ad_max_dwell(),
        }
    }
}

/// Scan backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Base URL of the scan service, e.g. "https://lotto.example.com"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// CSRF token sent with every upload
    #[serde(default)]
    pub csrf_token: String,
    /// Ceiling for the whole scan, measured from request issue
    #[serde(default = "default_ceiling")]
    pub ceiling_secs: u64,
    /// HTTP client timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Lottery type sent when the user didn't pick one. Empty = auto-detect.
    #[serde(default)]
    pub default_lottery_type: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_ceiling() -> u64 {
    SCAN_CEILING.as_secs()
}
fn default_request_timeout() -> u64 {
    SCAN_REQUEST_TIMEOUT.as_secs()
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            csrf_token: String::new(),
            ceiling_secs: default_ceiling(),
            request_timeout_secs: default_request_timeout(),
            default_lottery_type: String::new(),
        }
    }
}

/// Recovery watchdog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Overrun tolerated past the PSA countdown when it has no max dwell
    #[serde(default = "default_psa_grace")]
    pub psa_grace_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    WATCHDOG_POLL_INTERVAL.as_millis() as u64
}
fn default_psa_grace() -> u64 {
    PSA_STALL_GRACE.as_secs()
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            psa_grace_secs: default_psa_grace(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Also log to stdout
    #[serde(default)]
    pub console: bool,
    /// Log file path (relative to the config file or absolute). Empty = no file logging.
    #[serde(default)]
    pub log_file: String,
    /// Level for this crate's events; everything else stays at INFO unless
    /// RUST_LOG says otherwise
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            console: false,
            log_file: String::new(),
            level: default_log_level(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub psa: PsaSettings,
    #[serde(default)]
    pub monetization: MonetizationSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub watchdog: WatchdogSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

// =============================================================================
// CONFIG LOADING
// =============================================================================

#[derive(Debug)]
pub enum ConfigError {
    ReadError(std::io::Error),
    ParseError(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config file: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl Config {
    pub const CONFIG_FILENAME: &'static str = "ticket_reveal.toml";

    /// Load configuration from `path`, falling back to defaults if the file
    /// doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
            let config = Self::parse(&contents)?;
            info!(path = %path.display(), "[config] Loaded config");
            config
        } else {
            debug!(path = %path.display(), "[config] No config found, using defaults");
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(ConfigError::ParseError)
    }

    /// Reject dwell and timeout values that can't work together
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.psa.max_dwell_secs {
            if max < self.psa.min_dwell_secs {
                return Err(ConfigError::Invalid(format!(
                    "psa.max_dwell_secs ({}) is below psa.min_dwell_secs ({})",
                    max, self.psa.min_dwell_secs
                )));
            }
        }
        if let Some(max) = self.monetization.max_dwell_secs {
            if max < self.monetization.min_dwell_secs {
                return Err(ConfigError::Invalid(format!(
                    "monetization.max_dwell_secs ({}) is below monetization.min_dwell_secs ({})",
                    max, self.monetization.min_dwell_secs
                )));
            }
        }
        if self.scan.ceiling_secs == 0 {
            return Err(ConfigError::Invalid(
                "scan.ceiling_secs must be positive".to_string(),
            ));
        }
        if self.watchdog.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watchdog.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.scan.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("scan.base_url is empty".to_string()));
        }
        if crate_directive(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "logging.level {:?} is not a log level",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Timing for the reveal gate
    pub fn gate_config(&self) -> GateConfig {
        let grace = Duration::from_secs(self.watchdog.psa_grace_secs);
        GateConfig {
            psa: AdStageConfig {
                min_dwell: Duration::from_secs(self.psa.min_dwell_secs),
                max_dwell: self.psa.max_dwell_secs.map(Duration::from_secs),
                stall_grace: grace,
            },
            monetization: AdStageConfig {
                min_dwell: Duration::from_secs(self.monetization.min_dwell_secs),
                max_dwell: self.monetization.max_dwell_secs.map(Duration::from_secs),
                stall_grace: grace,
            },
            scan_ceiling: Duration::from_secs(self.scan.ceiling_secs),
        }
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scan.request_timeout_secs)
    }

    /// Lottery type to send when the page has none selected
    pub fn default_lottery_type(&self) -> Option<&str> {
        Some(self.scan.default_lottery_type.trim()).filter(|t| !t.is_empty())
    }

    /// Resolve the log file path relative to the config file's directory
    pub fn log_file_path(&self, config_dir: &Path) -> Option<PathBuf> {
        if self.logging.log_file.is_empty() {
            return None;
        }
        let path = PathBuf::from(&self.logging.log_file);
        Some(if path.is_absolute() {
            path
        } else {
            config_dir.join(path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let gate = config.gate_config();
        assert_eq!(gate, GateConfig::default());
        assert_eq!(config.watchdog_interval(), WATCHDOG_POLL_INTERVAL);
        assert_eq!(config.default_lottery_type(), None);
    }

    #[test]
    fn test_shipped_sample_config_is_valid() {
        let config = Config::parse(include_str!("../../ticket_reveal.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.gate_config(), GateConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [monetization]
            min_dwell_secs = 10

            [scan]
            base_url = "https://lotto.example.com"
            csrf_token = "abc123"
            default_lottery_type = " Powerball "
            "#,
        )
        .unwrap();

        assert_eq!(config.monetization.min_dwell_secs, 10);
        assert_eq!(config.monetization.max_dwell_secs, Some(25));
        assert_eq!(config.psa.min_dwell_secs, 5);
        assert_eq!(config.scan.ceiling_secs, 30);
        assert_eq!(config.scan.csrf_token, "abc123");
        assert_eq!(config.default_lottery_type(), Some("Powerball"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_below_min_is_rejected() {
        let config = Config::parse(
            r#"
            [monetization]
            min_dwell_secs = 20
            max_dwell_secs = 10
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("monetization.max_dwell_secs"));
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let config = Config::parse("[logging]\nlevel = \"chatty\"").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));

        let config = Config::parse("[logging]\nlevel = \"trace\"").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            Config::parse("[psa\nmin_dwell_secs = 5"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("ticket_reveal_does_not_exist.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.scan.base_url, default_base_url());
    }

    #[test]
    fn test_log_file_path_resolution() {
        let mut config = Config::default();
        let dir = Path::new("/srv/reveal");
        assert_eq!(config.log_file_path(dir), None);

        config.logging.log_file = "reveal.log".to_string();
        assert_eq!(config.log_file_path(dir), Some(dir.join("reveal.log")));
    }
}
