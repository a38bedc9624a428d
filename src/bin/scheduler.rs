//! Daemon that runs the labeler at fixed times every day.
//!
//! Each run rotates the log file first, so every run gets a fresh log and the
//! last N runs are kept next to it, gzip compressed.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use explicit_labeler::cli::{env_filter, execute, RunArgs};
use explicit_labeler::config::parse_bool_flag;
use explicit_labeler::schedule::{next_local_run, parse_times, DailyTime, LogRotation};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "explicit-labeler-scheduler")]
#[command(about = "Run explicit-labeler on a daily schedule with rotating logs")]
struct Args {
    /// Comma-separated daily run times in 24h HH:MM
    #[arg(long, env = "APP_TIMES", default_value = "02:00")]
    times: String,

    #[arg(long, env = "LOG_FILE", default_value = "logs/explicit-labeler.log")]
    log_file: PathBuf,

    /// Number of rotated logs to keep (values below 1 mean 7)
    #[arg(long, env = "LOG_RETENTION_RUNS", default_value = "7", allow_negative_numbers = true)]
    log_retention_runs: i64,

    /// Run once immediately before waiting for the first scheduled time
    #[arg(long, env = "RUN_AT_START", default_value = "true")]
    run_at_start: String,

    #[command(flatten)]
    run: RunArgs,
}

/// Appends each event to the log file, reopening it every time so rotation
/// can move the file between runs.
struct AppendLog {
    path: PathBuf,
}

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::sink()),
        }
    }
}

fn init_tracing(log_file: PathBuf, verbose: bool) {
    let stdout = tracing_subscriber::fmt::layer().with_target(false);
    let file = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(AppendLog { path: log_file });
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stdout)
        .with(file)
        .try_init();
}

fn run_once(rotation: &LogRotation, run: &RunArgs) -> i32 {
    if let Err(e) = rotation.rotate() {
        eprintln!("Failed to rotate {}: {}", rotation.path().display(), e);
    }

    let started = Local::now();
    info!("{:=<60}", "");
    info!("Run started at {}", started.format("%Y-%m-%d %H:%M:%S"));
    info!("{:=<60}", "");

    let code = match execute(run) {
        Ok(_) => 0,
        Err(e) => {
            error!("Run failed: {:#}", e);
            1
        }
    };

    let finished = Local::now();
    info!("{:=<60}", "");
    info!(
        "Run finished at {} (exit code {})",
        finished.format("%Y-%m-%d %H:%M:%S"),
        code
    );
    info!("{:=<60}", "");
    code
}

fn sleep_until_next(times: &[DailyTime]) -> Result<()> {
    let now = Local::now();
    let Some(next) = next_local_run(now, times) else {
        bail!("Could not compute next run time");
    };
    info!("Next run scheduled at {}", next.format("%Y-%m-%d %H:%M:%S"));
    let wait = (next - now).to_std().unwrap_or_default();
    std::thread::sleep(wait);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let times = parse_times(&args.times).context("Invalid APP_TIMES")?;
    let rotation = LogRotation::new(&args.log_file, args.log_retention_runs);

    let mut run = args.run.clone();
    run.log_only = true;

    rotation
        .ensure_dir()
        .with_context(|| format!("Cannot create log directory for {}", args.log_file.display()))?;
    init_tracing(args.log_file.clone(), run.verbose);
    let listed: Vec<String> = times.iter().map(DailyTime::to_string).collect();
    info!("Scheduler started. Daily runs at: {}", listed.join(", "));
    info!(
        "Logs: {} (keeping {} previous runs)",
        rotation.path().display(),
        rotation.retention()
    );

    if parse_bool_flag(&args.run_at_start) {
        run_once(&rotation, &run);
    }

    loop {
        sleep_until_next(&times)?;
        run_once(&rotation, &run);
    }
}
