//! FattyScan — memory-compact disk usage scanner.
//!
//! Thin binary entry point. All scan logic lives in `fattyscan-core`.
//!
//! Usage:
//!   fattyscan [PATH]                 Scan and print a 3-level tree
//!   fattyscan PATH -d 5 -i 0.01      Deeper view, hide entries under 1%
//!   fattyscan PATH --json            Print the projected tree as JSON
//!   fattyscan --list-volumes         Print volume roots

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use fattyscan_core::model::size::{format_size, parse_size};
use fattyscan_core::{ProgressSnapshot, ScanConfig, ScanEvent, ScanListener, ScanSession, ScanState};

#[derive(Parser, Debug)]
#[command(
    name = "fattyscan",
    version,
    about = "Scan a directory and show where the space goes"
)]
struct Cli {
    /// Directory or volume root to scan (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Levels of the tree to print, the scanned directory included
    #[arg(short, long, default_value_t = 3)]
    depth: usize,

    /// Hide entries below this size: a fraction of the parent (e.g. "0.01")
    /// or an absolute size (e.g. "10MB")
    #[arg(short, long, default_value = "0")]
    ignore_size: String,

    /// Sub-directory start path to print instead of the scan root
    #[arg(short, long)]
    start: Option<PathBuf>,

    /// Levels whose file entries are cached during the scan
    #[arg(long)]
    fill_depth: Option<u32>,

    /// JSON file with scan configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop the scan after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the projected tree as JSON
    #[arg(long)]
    json: bool,

    /// Print available volume roots and exit
    #[arg(long)]
    list_volumes: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Renders throttled progress on stderr.
struct StderrProgress;

impl ScanListener for StderrProgress {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        let mut err = std::io::stderr().lock();
        let _ = write!(
            err,
            "\r{:>6.2}%  {:>10}",
            snapshot.fraction * 100.0,
            format_size(snapshot.bytes_processed)
        );
        let _ = err.flush();
    }

    fn on_state_changed(&self, state: ScanState) {
        if matches!(state, ScanState::Completed | ScanState::Idle) {
            eprintln!();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ScanConfig::default(),
    };
    if let Some(fill_depth) = cli.fill_depth {
        config.fill_depth = fill_depth;
    }

    let session = ScanSession::with_config(config);

    if cli.list_volumes {
        for volume in session.list_volumes() {
            println!("{volume}");
        }
        return Ok(());
    }

    let ignore_size = parse_ignore_size(&cli.ignore_size)?;
    let scan_path = absolute(&cli.path)?;

    let rx = session.subscribe();
    session.add_listener(Arc::new(StderrProgress));
    session
        .start_scan(&scan_path)
        .with_context(|| format!("failed to start scan of {}", scan_path.display()))?;

    let deadline = cli.timeout.map(|secs| Instant::now() + Duration::from_secs(secs));
    let final_state = loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(ScanEvent::StateChanged(state @ (ScanState::Completed | ScanState::Idle))) => {
                break state;
            }
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("scan session went away"),
        }
        if deadline.is_some_and(|at| Instant::now() >= at) {
            tracing::warn!("Timeout reached, stopping scan");
            session.stop_scan();
        }
    };

    if final_state != ScanState::Completed {
        bail!("scan of {} did not complete", scan_path.display());
    }

    let start = cli.start.as_deref().map(absolute).transpose()?;
    let view = session
        .get_tree(start.as_deref(), cli.depth.max(1), ignore_size)
        .context("failed to query the scan result")?;

    let Some(view) = view else {
        bail!("no data under the requested path");
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", view.render(cli.depth.max(1)));
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<ScanConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Accept either a plain number ("0.05", "4096") or a size ("10MB").
fn parse_ignore_size(input: &str) -> Result<f64> {
    if let Ok(value) = input.trim().parse::<f64>() {
        return Ok(value);
    }
    match parse_size(input) {
        Some(bytes) => Ok(bytes as f64),
        None => bail!("invalid --ignore-size value: {input}"),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}
