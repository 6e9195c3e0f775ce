use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use pushlog_core::DiffService;
use pushlog_db::Database;

use crate::api;

pub async fn handle_serve_command(bind: &str, db: Arc<Database>, diffs: DiffService) -> Result<()> {
    let router = api::create_router(db, diffs);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind API server to {}", bind))?;

    eprintln!();
    eprintln!(
        "  {} {}",
        "->".bright_green(),
        format!("Serving diffs on http://{}", bind).bold()
    );
    eprintln!("  {} Press {} to stop", "->".dimmed(), "Ctrl+C".bold());
    eprintln!();

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down...");
}
