//! # pushlog-logging
//!
//! Logging for the pushlog ingestion service.
//!
//! Library crates emit diagnostics through `tracing`. Operator-facing
//! progress of the polling daemon goes through [`Logger`] as typed
//! [`LogEvent`]s.
//!
//! ## Key Types
//!
//! - [`Logger`] - Structured event logging to stderr and an optional file
//! - [`LogEvent`] - Log event types
//! - [`LogFormat`] - Output formats (Pretty, JSON, Compact)
//!
//! ## Log Formats
//!
//! - `Pretty` - Human-readable colored output
//! - `JSON` - Structured JSON lines
//! - `Compact` - Minimal text output

mod events;

pub use events::{LogEvent, LogFormat, Logger};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose diagnostics follow the configured level. Everything else
/// (HTTP stack, git, SQLite) only reports warnings.
const OWN_TARGETS: &[&str] = &[
    "pushlog",
    "pushlog_core",
    "pushlog_db",
    "pushlog_diff",
    "pushlog_vcs",
];

/// Initialize tracing for the application. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

/// Expand a bare level such as `debug` into per-crate directives. Anything
/// already written as directives is used as is.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }

    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_scopes_to_own_crates() {
        let directives = filter_directives("debug");

        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("pushlog=debug"));
        assert!(directives.contains("pushlog_core=debug"));
        assert!(directives.contains("pushlog_vcs=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_explicit_directives_pass_through() {
        assert_eq!(filter_directives("pushlog_core=trace"), "pushlog_core=trace");
        assert_eq!(filter_directives(" info,hyper=debug "), "info,hyper=debug");
    }
}
