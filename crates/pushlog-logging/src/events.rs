use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Structured log events for the polling daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    PollCycleStarted {
        cycle: u64,
        repositories: usize,
    },
    /// Fetches of an earlier cycle still hold permits
    PollCycleSkipped {
        cycle: u64,
        busy: usize,
    },
    PollCycleFinished {
        cycle: u64,
        pushes: usize,
        failed: usize,
        duration_secs: f64,
    },
    PushesFetched {
        repository: String,
        start: i64,
        count: usize,
    },
    PushesIngested {
        repository: String,
        pushes: usize,
        last_known_push: i64,
    },
    RepositoryCloned {
        repository: String,
        url: String,
        path: PathBuf,
    },
    RepositoryFailed {
        repository: String,
        error: String,
    },
    ForestDiscovered {
        forest: String,
        added: Vec<String>,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }

    /// Single-line form used by [`LogFormat::Compact`].
    fn compact(&self) -> String {
        match self {
            LogEvent::PollCycleStarted {
                cycle,
                repositories,
            } => format!("poll:start:{} repos={}", cycle, repositories),
            LogEvent::PollCycleSkipped { cycle, busy } => {
                format!("poll:skip:{} busy={}", cycle, busy)
            }
            LogEvent::PollCycleFinished {
                cycle,
                pushes,
                failed,
                duration_secs,
            } => format!(
                "poll:done:{} pushes={} failed={} {:.1}s",
                cycle, pushes, failed, duration_secs
            ),
            LogEvent::PushesFetched {
                repository,
                start,
                count,
            } => format!("fetch:{} start={} count={}", repository, start, count),
            LogEvent::PushesIngested {
                repository,
                pushes,
                last_known_push,
            } => format!(
                "ingest:{} pushes={} lkp={}",
                repository, pushes, last_known_push
            ),
            LogEvent::RepositoryCloned { repository, .. } => format!("clone:{}", repository),
            LogEvent::RepositoryFailed { repository, error } => {
                format!("error:{}:{}", repository, error)
            }
            LogEvent::ForestDiscovered { forest, added } => {
                format!("forest:{} added={}", forest, added.join(","))
            }
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for pushlog events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let _ = writeln!(file, "{}", event.with_timestamp());
            }
        }

        let mut stderr = std::io::stderr();
        match self.format {
            LogFormat::Json => {
                if let Ok(json) = serde_json::to_string(event) {
                    let _ = writeln!(stderr, "{}", json);
                }
            }
            LogFormat::Pretty => self.log_pretty(&mut stderr, event),
            LogFormat::Compact => {
                let timestamp = chrono::Utc::now().format("%H:%M:%S");
                let _ = writeln!(stderr, "[{}] {}", timestamp, event.compact());
            }
        }
    }

    fn log_pretty(&self, out: &mut impl Write, event: &LogEvent) {
        match event {
            LogEvent::PollCycleStarted {
                cycle,
                repositories,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {}",
                    "▶".bright_blue(),
                    format!("Poll cycle {}", cycle).bright_blue().bold(),
                    format!("({} repositories)", repositories).dimmed()
                );
            }
            LogEvent::PollCycleSkipped { cycle, busy } => {
                let _ = writeln!(
                    out,
                    "{} Poll cycle {} skipped, {} fetches still running",
                    "⚠".bright_yellow(),
                    cycle,
                    busy
                );
            }
            LogEvent::PollCycleFinished {
                cycle,
                pushes,
                failed,
                duration_secs,
            } => {
                let marker = if *failed == 0 {
                    "✓".bright_green()
                } else {
                    "✗".bright_red()
                };
                let _ = writeln!(
                    out,
                    "{} Poll cycle {} done: {} {}, {} failed ({:.1}s)",
                    marker,
                    cycle,
                    pushes,
                    if *pushes == 1 { "push" } else { "pushes" },
                    failed,
                    duration_secs
                );
            }
            LogEvent::PushesFetched {
                repository,
                start,
                count,
            } => {
                if *count > 0 {
                    let _ = writeln!(
                        out,
                        "    {} {} {} since {}",
                        repository.bright_cyan(),
                        format!("+{}", count).green(),
                        if *count == 1 { "push" } else { "pushes" },
                        start
                    );
                }
            }
            LogEvent::PushesIngested {
                repository,
                pushes,
                last_known_push,
            } => {
                let _ = writeln!(
                    out,
                    "    {} {} ingested {} (last push {})",
                    "✓".bright_green(),
                    repository.bright_cyan(),
                    pushes,
                    last_known_push
                );
            }
            LogEvent::RepositoryCloned {
                repository, path, ..
            } => {
                let _ = writeln!(
                    out,
                    "    {} cloned {} into {}",
                    "⇣".bright_blue(),
                    repository.bright_cyan(),
                    path.display().to_string().dimmed()
                );
            }
            LogEvent::RepositoryFailed { repository, error } => {
                let _ = writeln!(
                    out,
                    "    {} {}: {}",
                    "✗".bright_red(),
                    repository.bright_cyan(),
                    error.bright_red()
                );
            }
            LogEvent::ForestDiscovered { forest, added } => {
                if !added.is_empty() {
                    let _ = writeln!(
                        out,
                        "    {} forest {} added {}",
                        "+".bright_green(),
                        forest.bold(),
                        added.join(", ")
                    );
                }
            }
        }
    }
}
