// Tracing setup for the scan page

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::config::LoggingSettings;

/// Target prefix of every event this crate emits
const CRATE_TARGET: &str = "ticket_reveal";

// Appender guards; dropping them would lose buffered lines
static LOG_GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Filter directive for this crate's own events at `level`
///
/// Accepts the `tracing` level names in any case. Blank or unknown = `None`.
pub fn crate_directive(level: &str) -> Option<Directive> {
    let level = level.trim().parse::<Level>().ok()?;
    format!("{}={}", CRATE_TARGET, level.to_string().to_ascii_lowercase())
        .parse()
        .ok()
}

/// Make sure the log file can be opened for append, creating missing
/// directories. `rolling::never` panics when it can't open its file, so this
/// runs first.
fn prepare_log_file(path: &Path) -> io::Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok((dir, file_name))
}

/// Install the global subscriber from the `[logging]` settings
///
/// Only the first call does anything; later calls and hosts that already
/// installed a subscriber get `false`. Problems with the settings are logged
/// once the subscriber is up instead of aborting startup.
pub fn init_logging(settings: &LoggingSettings, log_file: Option<PathBuf>) -> bool {
    if LOG_GUARDS.get().is_some() {
        return false;
    }
    let mut guards = Vec::new();
    let mut problems = Vec::new();

    let mut filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    match crate_directive(&settings.level) {
        Some(directive) => filter = filter.add_directive(directive),
        None => problems.push(format!(
            "Unknown logging.level {:?}, crate stays at INFO",
            settings.level
        )),
    }

    let file_layer = match log_file {
        None => None,
        Some(path) => match prepare_log_file(&path) {
            Ok((dir, file_name)) => {
                let appender = tracing_appender::rolling::never(dir, file_name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                guards.push(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false),
                )
            }
            Err(e) => {
                problems.push(format!("Log file {} unusable: {}", path.display(), e));
                None
            }
        },
    };

    let console_layer = settings.console.then(|| {
        let (writer, guard) = tracing_appender::non_blocking(io::stdout());
        guards.push(guard);
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(false)
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_ok();
    let _ = LOG_GUARDS.set(guards);

    for problem in &problems {
        warn!("[config] {}", problem);
    }
    if installed {
        info!(
            level = %settings.level.trim(),
            console = settings.console,
            "[config] Logging initialized"
        );
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(level: &str) -> Option<String> {
        crate_directive(level).map(|d| d.to_string().to_ascii_lowercase())
    }

    #[test]
    fn test_crate_directive_levels() {
        assert_eq!(rendered("debug").as_deref(), Some("ticket_reveal=debug"));
        assert_eq!(rendered(" WARN ").as_deref(), Some("ticket_reveal=warn"));
        assert!(crate_directive("").is_none());
        assert!(crate_directive("chatty").is_none());
    }

    #[test]
    fn test_prepare_log_file_creates_directories() {
        let root = std::env::temp_dir().join(format!("ticket_reveal_logs_{}", std::process::id()));
        let path = root.join("nested").join("reveal.log");
        let _ = fs::remove_dir_all(&root);

        let (dir, file_name) = prepare_log_file(&path).unwrap();
        assert_eq!(dir, root.join("nested"));
        assert_eq!(file_name, "reveal.log");
        assert!(path.exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_prepare_log_file_rejects_nameless_path() {
        let err = prepare_log_file(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
