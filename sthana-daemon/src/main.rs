//! Sthana daemon - indoor positioning service
//!
//! Feeds receiver measurements into the Sthana engine and streams position
//! reports.
//!
//! ## Threads
//!
//! - **Ingest**: JSON-lines measurements from stdin or a file
//! - **Pipeline**: locates dirty devices and emits reports
//! - **Calibration**: periodic node calibration when enabled
//! - **Reports**: JSON-lines reports to stdout or a file
//! - **Reload**: applies config file changes without a restart
//!
//! ## Usage
//!
//! ```text
//! sthana-daemon --config configs/config.yaml < measurements.jsonl
//! ```

mod config;
mod error;
mod threads;

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::Parser;
use sthana::{CalibrationMatrix, CalibrationRunner, PipelineWorker, TrackingState};

use config::DaemonConfig;
use error::{DaemonError, Result};
use threads::{IngestThread, ReloadThread, ReportThread};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "configs/config.yaml")]
    config: PathBuf,

    /// Measurement input, overrides `daemon.input` ("-" for stdin)
    #[arg(short, long)]
    input: Option<String>,

    /// Report output, overrides `daemon.output` ("-" for stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Keep running after the input ends
    #[arg(long)]
    follow: bool,
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Sthana daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DaemonConfig::load_or_default(&args.config)?;
    if let Some(input) = args.input {
        config.daemon.input = input;
    }
    if let Some(output) = args.output {
        config.daemon.output = output;
    }
    log::info!(
        "{} floors, {} nodes, optimization {}",
        config.engine.floors.len(),
        config.engine.nodes.len(),
        if config.engine.optimization.enabled { "on" } else { "off" }
    );

    let daemon = config.daemon.clone();
    let state = Arc::new(TrackingState::new(config.engine));

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| DaemonError::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // Engine threads
    let (report_tx, report_rx) = crossbeam_channel::bounded(1024);
    let pipeline = PipelineWorker::spawn(Arc::clone(&state), report_tx)?;
    let calibration = CalibrationRunner::spawn(Arc::clone(&state))?;

    // Daemon threads
    let report_handle = spawn_reports(&daemon.output, report_rx, Arc::clone(&running))?;
    let ingest_handle = spawn_ingest(&daemon.input, Arc::clone(&state), Arc::clone(&running))?;
    let reload_handle = if daemon.reload_secs > 0 && args.config.exists() {
        let mut reload = ReloadThread::new(
            args.config.clone(),
            Duration::from_secs(daemon.reload_secs),
            Arc::clone(&state),
            Arc::clone(&running),
        );
        Some(
            thread::Builder::new()
                .name("reload".into())
                .spawn(move || reload.run())?,
        )
    } else {
        None
    };

    log::info!("Sthana running. Press Ctrl-C to stop.");

    // Main thread: monitor until shutdown or end of input
    let check_interval = Duration::from_millis(500);
    let stats_interval = Duration::from_secs(daemon.stats_secs.max(1));
    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        thread::sleep(check_interval);

        if ingest_handle.is_finished() && !args.follow {
            log::info!("Input finished, shutting down");
            // Let the pipeline catch up with the last measurements
            thread::sleep(Duration::from_millis(
                2 * state.config().pipeline.poll_interval_ms,
            ));
            break;
        }
        if !pipeline.is_running() {
            log::error!("Pipeline thread exited unexpectedly");
            break;
        }
        if report_handle.is_finished() {
            log::error!("Report thread exited unexpectedly");
            break;
        }

        if last_stats.elapsed() >= stats_interval {
            log_stats(&state, &calibration);
            last_stats = Instant::now();
        }
    }

    // Shutdown: engine first so the report thread drains everything
    log::info!("Shutting down...");
    drop(pipeline);
    summarize_calibration(&calibration);
    drop(calibration);
    running.store(false, Ordering::Relaxed);

    match report_handle.join() {
        Ok(Ok(count)) => log::info!("Wrote {} reports", count),
        Ok(Err(e)) => log::error!("Report thread error: {}", e),
        Err(_) => log::error!("Report thread panicked"),
    }
    if let Some(handle) = reload_handle
        && handle.join().is_err()
    {
        log::error!("Reload thread panicked");
    }
    // A reader blocked on stdin cannot be interrupted; leave it behind
    if ingest_handle.is_finished() && ingest_handle.join().is_err() {
        log::error!("Ingest thread panicked");
    }

    if let Some(path) = &daemon.matrix_path {
        write_matrix(&state, path)?;
    }
    log_stats_final(&state);
    Ok(())
}

fn spawn_ingest(
    input: &str,
    state: Arc<TrackingState>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let builder = thread::Builder::new().name("ingest".into());
    let handle = if input == "-" {
        log::info!("Reading measurements from stdin");
        builder.spawn(move || {
            let mut ingest = IngestThread::new(io::stdin().lock(), state, running);
            if let Err(e) = ingest.run() {
                log::error!("Ingest thread error: {}", e);
            }
        })?
    } else {
        log::info!("Reading measurements from {}", input);
        let file = File::open(input)
            .map_err(|e| DaemonError::Other(format!("Failed to open {}: {}", input, e)))?;
        builder.spawn(move || {
            let mut ingest = IngestThread::new(BufReader::new(file), state, running);
            if let Err(e) = ingest.run() {
                log::error!("Ingest thread error: {}", e);
            }
        })?
    };
    Ok(handle)
}

fn spawn_reports(
    output: &str,
    reports: crossbeam_channel::Receiver<sthana::PositionReport>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<Result<u64>>> {
    let builder = thread::Builder::new().name("reports".into());
    let handle = if output == "-" {
        builder.spawn(move || ReportThread::new(io::stdout().lock(), reports, running).run())?
    } else {
        log::info!("Writing reports to {}", output);
        let file = File::create(output)
            .map_err(|e| DaemonError::Other(format!("Failed to create {}: {}", output, e)))?;
        builder.spawn(move || ReportThread::new(BufWriter::new(file), reports, running).run())?
    };
    Ok(handle)
}

fn log_stats(state: &TrackingState, calibration: &CalibrationRunner) {
    let t = state.telemetry().snapshot();
    log::info!(
        "{} messages, {} moved, {} malformed, {} unknown node, {} skipped, {} devices",
        t.messages,
        t.moved,
        t.malformed,
        t.unknown_node,
        t.skipped,
        state.devices().len()
    );
    let diag = calibration.calibrator().state();
    if let (Some(rmse), Some(r)) = (diag.best_rmse, diag.best_r) {
        log::info!("Calibration rmse {:.2} dB, r {:.3}", rmse, r);
    }
}

fn log_stats_final(state: &TrackingState) {
    let t = state.telemetry().snapshot();
    match serde_json::to_string(&t) {
        Ok(json) => log::info!("Telemetry: {}", json),
        Err(e) => log::warn!("Telemetry serialization failed: {}", e),
    }
}

fn summarize_calibration(calibration: &CalibrationRunner) {
    let diag = calibration.calibrator().state();
    if let Some(last_run) = diag.last_run {
        log::info!(
            "Last calibration {} applied [{}]",
            last_run.to_rfc3339(),
            diag.applied.join(", ")
        );
    }
}

fn write_matrix(state: &TrackingState, path: &str) -> Result<()> {
    let matrix = CalibrationMatrix::compute(state, Utc::now());
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &matrix)?;
    log::info!("Calibration matrix ({} pairs) written to {}", matrix.len(), path);
    Ok(())
}
