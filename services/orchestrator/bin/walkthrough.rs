//! Walkthrough history CLI
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Opening the session history for the configured vertical.
//! 4. Printing past-session digests or re-exporting a stored session's report.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use walkthrough_core::{FileStore, SessionHistory, session_manager::summarize_sessions, verticals};
use walkthrough_service::{config::Config, telemetry};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect and export walkthrough session history")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a digest of recent sessions, newest first.
    Summaries {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Regenerate the report for a stored session and write it to disk.
    Export {
        session_id: Uuid,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// List the built-in verticals.
    Verticals,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    telemetry::init_tracing(config.log_level)?;

    // --- 3. Open History ---
    let vertical = verticals::by_id(&config.vertical)
        .with_context(|| format!("Unknown vertical '{}'", config.vertical))?;
    let store = Arc::new(FileStore::new(&config.history_dir));
    let history = SessionHistory::new(store, vertical.session_key_prefix());
    info!(
        vertical = %vertical.id(),
        history_dir = %config.history_dir.display(),
        "History opened"
    );

    // --- 4. Run Command ---
    match cli.command {
        Command::Summaries { limit } => {
            let digest = summarize_sessions(history.load(), limit);
            if digest.is_empty() {
                println!("No past sessions.");
            } else {
                print!("{digest}");
            }
        }
        Command::Export { session_id, out } => {
            let session = history
                .load()
                .into_iter()
                .find(|s| s.id == session_id)
                .with_context(|| format!("Session {session_id} not found in history"))?;
            let Some(report) = vertical.generate_report(&session) else {
                bail!("The {} vertical produced no report for this session", vertical.id());
            };
            std::fs::create_dir_all(&out)?;
            let path = out.join(report.filename());
            std::fs::write(&path, report.bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", path.display());
        }
        Command::Verticals => {
            for id in verticals::ids() {
                if let Some(v) = verticals::by_id(id) {
                    println!("{:<14} {}: {}", v.id(), v.display_name(), v.description());
                }
            }
        }
    }
    Ok(())
}
