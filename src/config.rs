//! Run configuration.
//!
//! Everything is resolved once at process start and handed to the engine,
//! store and pacer constructors. Nothing in the core reads the environment.

use crate::pacing::{
    Pacer, Pacing, DEFAULT_DELAY_AFTER_ALBUM, DEFAULT_DELAY_AFTER_API_CALL,
    DEFAULT_DELAY_AFTER_ARTIST, DEFAULT_DELAY_AFTER_TRACK,
};
use crate::store::ProgressStore;
use std::path::PathBuf;
use std::time::Duration;

/// Library processed when none is named.
pub const DEFAULT_LIBRARY: &str = "Music";

pub const ENV_DELAY_AFTER_API_CALL: &str = "DELAY_AFTER_API_CALL";
pub const ENV_DELAY_AFTER_TRACK: &str = "DELAY_AFTER_TRACK";
pub const ENV_DELAY_AFTER_ALBUM: &str = "DELAY_AFTER_ALBUM";
pub const ENV_DELAY_AFTER_ARTIST: &str = "DELAY_AFTER_ARTIST";

/// Which libraries a run walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibrarySelection {
    /// Every music library on the server.
    All,
    Named(Vec<String>),
}

/// Behaviour toggles for one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub libraries: LibrarySelection,
    pub artist_filter: Option<String>,
    pub dry_run: bool,
    /// Also remove the explicit label from clean entries.
    pub remove_labels: bool,
    /// Ignore the processed-album set.
    pub force: bool,
    pub resume: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            libraries: LibrarySelection::Named(vec![DEFAULT_LIBRARY.to_string()]),
            artist_filter: None,
            dry_run: false,
            remove_labels: false,
            force: false,
            resume: true,
        }
    }
}

/// Process-wide settings shared by store, pacer and progress output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub pacing: Pacing,
    /// Hide progress bars for tail-friendly output.
    pub log_only: bool,
}

impl Config {
    pub fn store(&self) -> ProgressStore {
        ProgressStore::new(&self.data_dir)
    }

    pub fn pacer(&self) -> Pacer {
        Pacer::new(self.pacing)
    }
}

// ============================================================================
// Pacing Resolution
// ============================================================================

/// Delays given explicitly on the command line, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PacingOverrides {
    pub api_call: Option<f64>,
    pub track: Option<f64>,
    pub album: Option<f64>,
    pub artist: Option<f64>,
}

/// Parse a delay from an environment value. Missing, empty, unparsable,
/// negative or non-finite values give the default.
pub fn parse_env_delay(raw: Option<&str>, default: f64) -> f64 {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => default,
    }
}

/// Command-line value parser for delay flags.
pub fn parse_cli_delay(raw: &str) -> Result<f64, String> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        Ok(_) => Err(format!("delay must be a non-negative number of seconds: {}", raw)),
        Err(e) => Err(format!("invalid delay '{}': {}", raw, e)),
    }
}

/// Combine CLI overrides, environment values and defaults into a [`Pacing`].
///
/// `env` looks up a variable by name so callers control where values come
/// from.
pub fn resolve_pacing<F>(overrides: PacingOverrides, env: F) -> Pacing
where
    F: Fn(&str) -> Option<String>,
{
    let pick = |cli: Option<f64>, var: &str, default: f64| -> Duration {
        let secs = cli.unwrap_or_else(|| parse_env_delay(env(var).as_deref(), default));
        Duration::from_secs_f64(secs)
    };
    Pacing {
        api_call: pick(overrides.api_call, ENV_DELAY_AFTER_API_CALL, DEFAULT_DELAY_AFTER_API_CALL),
        track: pick(overrides.track, ENV_DELAY_AFTER_TRACK, DEFAULT_DELAY_AFTER_TRACK),
        album: pick(overrides.album, ENV_DELAY_AFTER_ALBUM, DEFAULT_DELAY_AFTER_ALBUM),
        artist: pick(overrides.artist, ENV_DELAY_AFTER_ARTIST, DEFAULT_DELAY_AFTER_ARTIST),
    }
}

/// Truthy environment flag: "true", "1" or "yes", any case.
pub fn parse_bool_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}
