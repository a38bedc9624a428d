//! Command-line surface shared by both binaries.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::catalog::plex::PlexCatalog;
use crate::config::{
    parse_cli_delay, resolve_pacing, Config, LibrarySelection, PacingOverrides, RunOptions,
    DEFAULT_LIBRARY,
};
use crate::engine::Reconciler;
use crate::models::RunSummary;
use crate::progress::{format_duration, Progress};

/// Options for one reconciliation run.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Server address, e.g. http://127.0.0.1:32400
    #[arg(long, env = "PLEX_BASEURL")]
    pub baseurl: Option<String>,

    #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Music library name (can be specified multiple times)
    #[arg(long = "library", env = "PLEX_LIBRARY", default_value = DEFAULT_LIBRARY)]
    pub libraries: Vec<String>,

    /// Process all music libraries found on the server
    #[arg(long)]
    pub all_libraries: bool,

    /// Limit to artists matching this name
    #[arg(long)]
    pub artist: Option<String>,

    #[arg(long)]
    pub dry_run: bool,

    /// Show folder/filename detection details
    #[arg(long)]
    pub verbose: bool,

    /// Also remove 'Explicit' labels when not explicit
    #[arg(long)]
    pub remove_labels: bool,

    /// Force reprocessing of all albums (ignore processed cache)
    #[arg(long)]
    pub force: bool,

    /// Resume from last position (default)
    #[arg(long, overrides_with = "no_resume")]
    pub resume: bool,

    /// Don't resume, start from beginning
    #[arg(long, overrides_with = "resume")]
    pub no_resume: bool,

    /// Delay after processing album in seconds (env: DELAY_AFTER_ALBUM, default 0.5)
    #[arg(long, value_parser = parse_cli_delay)]
    pub delay_album: Option<f64>,

    /// Delay after processing track in seconds (env: DELAY_AFTER_TRACK, default 0.2)
    #[arg(long, value_parser = parse_cli_delay)]
    pub delay_track: Option<f64>,

    /// Delay after processing artist in seconds (env: DELAY_AFTER_ARTIST, default 1.0)
    #[arg(long, value_parser = parse_cli_delay)]
    pub delay_artist: Option<f64>,

    /// Delay after API call in seconds (env: DELAY_AFTER_API_CALL, default 0.1)
    #[arg(long, value_parser = parse_cli_delay)]
    pub delay_api: Option<f64>,

    /// Clear progress and processed albums cache, then exit
    #[arg(long)]
    pub clear_progress: bool,

    /// Directory holding progress state files
    #[arg(long, env = "DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Hide progress bars (for tail-friendly log output)
    #[arg(long)]
    pub log_only: bool,
}

impl RunArgs {
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.baseurl.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) if !url.trim().is_empty() && !token.trim().is_empty() => {
                Ok((url, token))
            }
            _ => bail!("Set --baseurl/--token or PLEX_BASEURL/PLEX_TOKEN."),
        }
    }

    pub fn config(&self) -> Config {
        let overrides = PacingOverrides {
            api_call: self.delay_api,
            track: self.delay_track,
            album: self.delay_album,
            artist: self.delay_artist,
        };
        Config {
            data_dir: self.data_dir.clone(),
            pacing: resolve_pacing(overrides, |name| std::env::var(name).ok()),
            log_only: self.log_only,
        }
    }

    pub fn options(&self) -> RunOptions {
        let libraries = if self.all_libraries {
            LibrarySelection::All
        } else {
            LibrarySelection::Named(self.libraries.clone())
        };
        RunOptions {
            libraries,
            artist_filter: self.artist.clone(),
            dry_run: self.dry_run,
            remove_labels: self.remove_labels,
            force: self.force,
            resume: !self.no_resume,
        }
    }
}

/// Log filter: `RUST_LOG` wins, otherwise info, or debug when verbose.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

pub fn init_tracing(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .try_init();
}

/// Run once against the configured server.
///
/// Returns `None` when only the cache-clear action was performed.
pub fn execute(args: &RunArgs) -> Result<Option<RunSummary>> {
    let (baseurl, token) = args.credentials()?;
    let config = args.config();
    let store = config.store();

    if args.clear_progress {
        store.clear();
        info!("Progress and processed albums cache cleared.");
        return Ok(None);
    }

    let progress = Progress::new(config.log_only);
    let spinner = progress.create_spinner("Connecting to server");
    let connected = PlexCatalog::connect(baseurl, token);
    spinner.finish_and_clear();
    let catalog = connected.context("Connect failed")?;

    let pacer = config.pacer();
    let options = args.options();
    let summary = Reconciler::new(&catalog, &store, &pacer, &options)
        .with_progress(progress)
        .run()?;
    report_summary(&summary, options.dry_run);
    Ok(Some(summary))
}

pub fn report_summary(summary: &RunSummary, dry_run: bool) {
    info!("Summary:");
    info!("  Tracks checked:  {}", summary.tracks_checked);
    info!("  Titles updated:  {}", summary.titles_updated);
    info!("  Albums updated:  {}", summary.albums_updated);
    info!("  Labels added:    {}", summary.labels_added);
    info!("  Labels removed:  {}", summary.labels_removed);
    info!("  Albums skipped:  {}", summary.albums_skipped);
    info!("  Album failures:  {}", summary.album_failures);
    info!("  Elapsed:         {}", format_duration(summary.elapsed));
    if dry_run {
        info!("  (Dry run only; no changes were saved.)");
    }
}
