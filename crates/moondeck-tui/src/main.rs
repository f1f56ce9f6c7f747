//! `moondeck` — terminal console for a Klipper printer host.
//!
//! Built on [ratatui](https://ratatui.rs) with a session controller from
//! `moondeck-core` keeping the screen synchronized with the host over a
//! push channel plus REST bootstrap.
//!
//! Logs are written to a file (default `$TMPDIR/moondeck.log`) to avoid
//! corrupting the terminal UI. A background task forwards session events
//! into the console's action loop.
//!
//! Entry point: CLI argument parsing, tracing setup, panic hooks, and app
//! launch.

mod action;
mod app;
mod event;
mod navigation;
mod panel;
mod panels;
mod theme;
mod tui;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;

/// Terminal console for monitoring and controlling a Klipper printer.
#[derive(Parser, Debug)]
#[command(name = "moondeck", version, about)]
struct Cli {
    /// Location of the moondeck configuration file
    #[arg(short = 'c', long, env = "MOONDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Printer to connect to (overrides the configured default)
    #[arg(short = 'p', long)]
    printer: Option<String>,

    /// Log file path (defaults to $TMPDIR/moondeck.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Set up file-based tracing. We MUST NOT log to stdout/stderr — that
/// would corrupt the TUI output. Returns a guard that must be held for
/// the lifetime of the application to ensure logs are flushed.
fn setup_tracing(log_file: &std::path::Path, verbose: u8) -> WorkerGuard {
    let log_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "moondeck={log_level},moondeck_core={log_level},moondeck_api={log_level}"
        ))
    });

    let log_dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(std::env::temp_dir, std::path::Path::to_path_buf);
    let log_filename = log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("moondeck.log"));

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Install panic/error hooks BEFORE entering the terminal
    tui::install_hooks()?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(moondeck_config::config_path);
    let config = moondeck_config::load_config_from(&config_path)
        .map_err(|e| color_eyre::eyre::eyre!("failed to load {}: {e}", config_path.display()))?;

    // Tracing to file — hold the guard so logs flush on exit
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| config.log_file.clone())
        .unwrap_or_else(moondeck_config::default_log_path);
    let _log_guard = setup_tracing(&log_file, cli.verbose);

    info!(
        config = %config_path.display(),
        printers = config.printers.len(),
        "starting moondeck"
    );

    let mut app = App::new(config, cli.printer.clone());
    app.run().await?;

    Ok(())
}
