//! Daily run schedule and compressed log rotation for the scheduler daemon.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, TimeZone};
use flate2::write::GzEncoder;
use flate2::Compression;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// 24-hour `HH:MM`, hour 0-23 with optional leading zero, minute 00-59.
static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9])$").unwrap());

/// Retention used when the configured value is below one run.
pub const DEFAULT_LOG_RETENTION_RUNS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid time format: {0}. Expected HH:MM format (e.g., 02:00, 14:00)")]
    InvalidTime(String),
    #[error("schedule is empty or invalid: '{0}'")]
    Empty(String),
}

// ============================================================================
// Daily Times
// ============================================================================

/// A wall-clock time at which a run starts every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyTime {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTime {
    fn as_naive(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for DailyTime {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let caps = TIME_OF_DAY
            .captures(s)
            .ok_or_else(|| ScheduleError::InvalidTime(s.to_string()))?;
        let hour = caps[1]
            .parse()
            .map_err(|_| ScheduleError::InvalidTime(s.to_string()))?;
        let minute = caps[2]
            .parse()
            .map_err(|_| ScheduleError::InvalidTime(s.to_string()))?;
        Ok(DailyTime { hour, minute })
    }
}

/// Parse a comma-separated list such as `"02:00, 14:30"`.
pub fn parse_times(list: &str) -> Result<Vec<DailyTime>, ScheduleError> {
    let parts: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(ScheduleError::Empty(list.to_string()));
    }
    let mut times = parts
        .into_iter()
        .map(DailyTime::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    times.sort();
    times.dedup();
    Ok(times)
}

/// Earliest scheduled moment strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, times: &[DailyTime]) -> Option<NaiveDateTime> {
    let today = now.date();
    let tomorrow = today.succ_opt()?;
    [today, tomorrow]
        .into_iter()
        .flat_map(|day| times.iter().filter_map(move |t| Some(day.and_time(t.as_naive()?))))
        .filter(|candidate| *candidate > now)
        .min()
}

/// Next scheduled local time after `now`, skipping moments that do not exist
/// locally (DST gaps).
pub fn next_local_run(now: DateTime<Local>, times: &[DailyTime]) -> Option<DateTime<Local>> {
    let mut cursor = now.naive_local();
    for _ in 0..(times.len() * 2 + 1) {
        let candidate = next_run_after(cursor, times)?;
        if let Some(local) = Local.from_local_datetime(&candidate).earliest() {
            return Some(local);
        }
        cursor = candidate + ChronoDuration::seconds(1);
    }
    None
}

// ============================================================================
// Log Rotation
// ============================================================================

/// Run-count based rotation: `name.log` is compressed to `name-1.log.gz`,
/// older logs shift up by one, and anything beyond the retention count is
/// deleted. Rotated logs may be plain or gzip; both variants are shifted.
#[derive(Debug, Clone)]
pub struct LogRotation {
    path: PathBuf,
    retention: usize,
}

impl LogRotation {
    /// Retention values below one fall back to the default.
    pub fn new(path: impl Into<PathBuf>, retention: i64) -> Self {
        let retention = usize::try_from(retention)
            .ok()
            .filter(|r| *r >= 1)
            .unwrap_or(DEFAULT_LOG_RETENTION_RUNS);
        Self {
            path: path.into(),
            retention,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Path of the `index`-th rotated log, uncompressed.
    pub fn rotated_path(&self, index: usize) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.path.extension() {
            Some(ext) => format!("{}-{}.{}", stem, index, ext.to_string_lossy()),
            None => format!("{}-{}", stem, index),
        };
        self.path.with_file_name(name)
    }

    /// Path of the `index`-th rotated log, gzip compressed.
    pub fn compressed_path(&self, index: usize) -> PathBuf {
        let mut name = self.rotated_path(index).into_os_string();
        name.push(".gz");
        PathBuf::from(name)
    }

    /// Create the directory holding the log.
    pub fn ensure_dir(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
            _ => Ok(()),
        }
    }

    /// Rotate before a run. Creates the log directory when there is no log.
    pub fn rotate(&self) -> io::Result<()> {
        if !self.path.exists() {
            return self.ensure_dir();
        }

        for oldest in [
            self.rotated_path(self.retention),
            self.compressed_path(self.retention),
        ] {
            remove_if_exists(&oldest)?;
        }
        for i in (2..=self.retention).rev() {
            let shifts = [
                (self.rotated_path(i - 1), self.rotated_path(i)),
                (self.compressed_path(i - 1), self.compressed_path(i)),
            ];
            for (prev, next) in shifts {
                if prev.exists() {
                    fs::rename(&prev, &next)?;
                }
            }
        }

        let compressed = self.compressed_path(1);
        if !compressed.exists() {
            match gzip_file(&self.path, &compressed) {
                Ok(()) => return fs::remove_file(&self.path),
                Err(e) => {
                    warn!("Failed to compress {}: {}", self.path.display(), e);
                    let _ = fs::remove_file(&compressed);
                }
            }
        }
        fs::rename(&self.path, self.rotated_path(1))
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn gzip_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;
    let mut encoder = GzEncoder::new(File::create(dst)?, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}
