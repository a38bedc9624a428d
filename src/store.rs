//! Durable progress tracking between runs.
//!
//! Two JSON files live under the data directory: the last resume point and
//! the set of albums whose mutations are fully applied. Both are written via a
//! temporary file and a rename, so a reader never sees a half-written file.
//!
//! The processed set is read-modify-written as a whole on every mark. Only
//! one writer may use a data directory at a time.

use crate::models::{AlbumKey, ProcessedAlbums, ProgressRecord};
use chrono::Local;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const PROGRESS_FILE: &str = ".progress.json";
pub const PROCESSED_ALBUMS_FILE: &str = ".processed_albums.json";

/// File-backed progress store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    progress_path: PathBuf,
    processed_path: PathBuf,
}

impl ProgressStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            progress_path: dir.join(PROGRESS_FILE),
            processed_path: dir.join(PROCESSED_ALBUMS_FILE),
        }
    }

    pub fn progress_path(&self) -> &Path {
        &self.progress_path
    }

    pub fn processed_path(&self) -> &Path {
        &self.processed_path
    }

    /// Last saved resume point, or an empty record if none is readable.
    pub fn load(&self) -> ProgressRecord {
        read_json(&self.progress_path).unwrap_or_default()
    }

    /// Overwrite the resume point. Failures are logged, never returned.
    pub fn save(&self, library: &str, artist_key: &str, album_key: &AlbumKey) {
        let record = ProgressRecord {
            last_library: Some(library.to_string()),
            last_artist_key: Some(artist_key.to_string()),
            last_album_key: Some(album_key.clone()),
            timestamp: Some(now_timestamp()),
        };
        if let Err(e) = write_json(&self.progress_path, &record) {
            warn!(path = %self.progress_path.display(), "failed to save progress: {}", e);
        }
    }

    /// Delete both state files. Missing files are not an error.
    pub fn clear(&self) {
        for path in [&self.progress_path, &self.processed_path] {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed state file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to remove state file: {}", e),
            }
        }
    }

    /// Albums recorded as fully processed, or an empty set if unreadable.
    pub fn load_processed_albums(&self) -> BTreeSet<AlbumKey> {
        read_json::<ProcessedAlbums>(&self.processed_path)
            .map(|p| p.albums)
            .unwrap_or_default()
    }

    /// Add an album to the processed set, rewriting the whole file. An entry
    /// for the same album under an older title is replaced.
    pub fn mark_processed(&self, key: &AlbumKey) {
        let mut albums = self.load_processed_albums();
        albums.retain(|existing| !existing.same_album(key));
        albums.insert(key.clone());
        let record = ProcessedAlbums {
            albums,
            last_updated: Some(now_timestamp()),
        };
        if let Err(e) = write_json(&self.processed_path, &record) {
            warn!(path = %self.processed_path.display(), "failed to save processed albums: {}", e);
        }
    }
}

fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            debug!(path = %path.display(), "unreadable state file ignored: {}", e);
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), "corrupt state file ignored: {}", e);
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}
