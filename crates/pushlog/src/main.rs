mod api;
mod config;
mod diff;
mod poll;
mod repos;
mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use pushlog_core::{DiffService, PushIngestor, RepoLocks, RepoSync};
use pushlog_db::Database;
use pushlog_logging::{LogFormat, Logger};
use pushlog_vcs::GitClient;

use crate::config::PushlogConfig;
use crate::repos::RepoAction;

#[derive(Parser, Debug)]
#[command(
    name = "pushlog",
    about = "Localization pushlog ingestion and entity-aware diffs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: ./pushlog.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormatChoice>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// SQLite database to use
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the diff and pushlog HTTP API
    Serve {
        /// Address to listen on (default from config)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Poll tracked repositories for new pushes
    Poll {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Ingest pushes from a JSON file
    Ingest {
        /// Repository name
        repo: String,
        /// Push list or json-pushes output
        file: PathBuf,
    },

    /// Manage tracked repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Show entity changes between two revisions
    Diff {
        repo: String,
        from: String,
        to: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PushlogConfig::load(cli.config.as_deref())?;

    let log_format = match cli.log_format {
        Some(choice) => choice.into(),
        None => config.log_format()?.unwrap_or_default(),
    };
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.log.level.clone());
    pushlog_logging::init_tracing(&log_level, log_format);

    let database = cli
        .database
        .clone()
        .unwrap_or_else(|| config.database_path());
    let db = Arc::new(
        Database::open_at(&database)
            .with_context(|| format!("Failed to open database {}", database.display()))?,
    );

    let sync = Arc::new(
        RepoSync::new(Arc::new(GitClient::new()), config.repository_base())
            .with_update(config.poll.update),
    );
    let locks = RepoLocks::new();

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let diffs = DiffService::new(db.clone(), sync, locks);
            serve::handle_serve_command(&bind, db, diffs).await
        }
        Command::Poll { once } => {
            let logger = match &config.log.file {
                Some(path) => Logger::with_file(log_format, path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?,
                None => Logger::new(log_format),
            };
            let ingestor = Arc::new(PushIngestor::new(db.clone(), sync, locks));
            poll::handle_poll_command(&config, db, ingestor, Arc::new(logger), once).await
        }
        Command::Ingest { repo, file } => {
            let ingestor = PushIngestor::new(db.clone(), sync, locks);
            poll::handle_ingest_command(&db, &ingestor, &repo, &file).await
        }
        Command::Repo { action } => repos::handle_repo_command(&db, action),
        Command::Diff {
            repo,
            from,
            to,
            json,
        } => {
            let diffs = DiffService::new(db, sync, locks);
            diff::handle_diff_command(&diffs, repo, from, to, json).await
        }
    }
}
