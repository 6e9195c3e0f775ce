//! Configuration file support for pushlog.
//!
//! Loads `pushlog.toml` from the working directory, or from `--config`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pushlog_core::{ForestSource, PollConfig};
use pushlog_logging::LogFormat;
use serde::Deserialize;

/// The config file name
pub const CONFIG_FILE_NAME: &str = "pushlog.toml";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct PushlogConfig {
    /// SQLite database (default: data dir/pushlog/pushlog.db)
    pub database: Option<PathBuf>,
    /// Where working copies are kept (default: data dir/pushlog/repos)
    pub repository_base: Option<PathBuf>,
    pub poll: PollSettings,
    pub server: ServerSettings,
    pub log: LogSettings,
    pub forests: Vec<ForestSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PollSettings {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Applies to each push or forest fetch
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Pushes requested per fetch
    pub limit: usize,
    pub parallelism: usize,
    /// Move working trees forward after pulling
    pub update: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            limit: 200,
            parallelism: 4,
            update: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogSettings {
    pub level: String,
    /// pretty, json or compact
    pub format: Option<String>,
    /// Poll events are appended here as JSON lines
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForestSettings {
    pub name: String,
    pub url: String,
}

impl PushlogConfig {
    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, `pushlog.toml` in the
    /// current directory is used if present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE_NAME);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(pushlog_db::Database::default_path)
    }

    pub fn repository_base(&self) -> PathBuf {
        self.repository_base.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pushlog")
                .join("repos")
        })
    }

    /// Configured log format, `None` if unset.
    pub fn log_format(&self) -> Result<Option<LogFormat>> {
        self.log
            .format
            .as_deref()
            .map(|format| format.parse::<LogFormat>().map_err(anyhow::Error::msg))
            .transpose()
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll.interval,
            limit: self.poll.limit,
            parallelism: self.poll.parallelism,
        }
    }

    pub fn forest_sources(&self) -> Vec<ForestSource> {
        self.forests
            .iter()
            .map(|forest| ForestSource {
                name: forest.name.clone(),
                url: forest.url.clone(),
            })
            .collect()
    }
}
