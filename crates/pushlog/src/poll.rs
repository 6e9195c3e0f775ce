use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use pushlog_core::{parse_pushes, HttpPushSource, Poller, PushIngestor};
use pushlog_db::Database;
use pushlog_logging::Logger;

use crate::config::PushlogConfig;

pub async fn handle_poll_command(
    config: &PushlogConfig,
    db: Arc<Database>,
    ingestor: Arc<PushIngestor>,
    logger: Arc<Logger>,
    once: bool,
) -> Result<()> {
    let source = HttpPushSource::new(config.poll.timeout).context("Failed to create HTTP client")?;
    let poller = Arc::new(
        Poller::new(
            db,
            Arc::new(source),
            ingestor,
            logger,
            config.poll_config(),
        )
        .with_forests(config.forest_sources()),
    );

    if once {
        let report = poller.poll_once().await?;
        if report.failed > 0 {
            anyhow::bail!("{} of {} repositories failed", report.failed, report.repositories);
        }
        return Ok(());
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = poller.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current poll cycle...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    poller.run().await?;
    Ok(())
}

pub async fn handle_ingest_command(
    db: &Database,
    ingestor: &PushIngestor,
    repo: &str,
    file: &Path,
) -> Result<()> {
    let record = db
        .repositories()
        .get_by_name(repo)?
        .with_context(|| format!("Unknown repository '{}'", repo))?;

    let body = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let pushes =
        parse_pushes(&body).with_context(|| format!("Failed to parse {}", file.display()))?;

    match ingestor.ingest(record.id, pushes).await? {
        Some(count) => println!(
            "{} Ingested {} {} into {}",
            "✓".bright_green(),
            count,
            if count == 1 { "push" } else { "pushes" },
            record.name.bright_cyan()
        ),
        None => println!("{}", "Nothing to ingest.".dimmed()),
    }
    Ok(())
}
