//! Core data models for explicit labeling.
//!
//! This module contains the catalog entry types, the album identity used for
//! resumability, and the records persisted by the progress store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Label attached to entries classified as explicit.
pub const EXPLICIT_LABEL: &str = "Explicit";

/// Separator used inside serialized album and artist keys.
const KEY_SEPARATOR: &str = "|||";

// ============================================================================
// Catalog Models
// ============================================================================

/// Kind of catalog entry the engine mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Album,
    Track,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Album => "album",
            EntryKind::Track => "track",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A music library (Plex section) on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    /// Section identifier used in API paths.
    pub key: String,
    pub title: String,
}

/// An artist inside a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub rating_key: String,
    pub title: String,
    /// Section identifier of the owning library.
    pub library_key: String,
}

impl Artist {
    /// Key recorded in the progress file to address this artist on resume.
    pub fn resume_key(&self) -> String {
        format!("{}{}{}", self.title, KEY_SEPARATOR, self.rating_key)
    }
}

/// An album or track owned by the remote catalog.
///
/// Tracks carry the file paths of every physical part. Albums carry no paths
/// of their own; their folder is derived from one of their tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub kind: EntryKind,
    pub rating_key: String,
    pub title: String,
    pub labels: Vec<String>,
    pub paths: Vec<String>,
    /// Section identifier of the owning library.
    pub library_key: String,
}

impl MediaEntry {
    pub fn album(rating_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Album,
            rating_key: rating_key.into(),
            title: title.into(),
            labels: Vec::new(),
            paths: Vec::new(),
            library_key: String::new(),
        }
    }

    pub fn track(
        rating_key: impl Into<String>,
        title: impl Into<String>,
        paths: Vec<String>,
    ) -> Self {
        Self {
            kind: EntryKind::Track,
            rating_key: rating_key.into(),
            title: title.into(),
            labels: Vec::new(),
            paths,
            library_key: String::new(),
        }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Case-insensitive label membership.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

// ============================================================================
// Album Identity
// ============================================================================

/// Composite identity of an album instance: the unit of resumability and
/// de-duplication.
///
/// Serialized as `library|||artist|||album|||ratingKey`, the format used by
/// the processed-album file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AlbumKey {
    pub library: String,
    pub artist: String,
    pub album: String,
    pub rating_key: String,
}

impl AlbumKey {
    pub fn new(library: &str, artist: &str, album: &str, rating_key: &str) -> Self {
        Self {
            library: library.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
            rating_key: rating_key.to_string(),
        }
    }

    /// Identity without the album title, which the labeler itself rewrites.
    pub fn id(&self) -> AlbumId {
        AlbumId {
            library: self.library.clone(),
            artist: self.artist.clone(),
            rating_key: self.rating_key.clone(),
        }
    }

    /// Same library, artist and rating key; titles may differ.
    pub fn same_album(&self, other: &AlbumKey) -> bool {
        self.rating_key == other.rating_key
            && self.library == other.library
            && self.artist == other.artist
    }
}

/// Title-independent part of an [`AlbumKey`], used for set lookups.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlbumId {
    pub library: String,
    pub artist: String,
    pub rating_key: String,
}

impl fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.library,
            self.artist,
            self.album,
            self.rating_key,
            sep = KEY_SEPARATOR
        )
    }
}

/// Error returned when a serialized album key does not have four parts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed album key: {0}")]
pub struct MalformedAlbumKey(pub String);

impl FromStr for AlbumKey {
    type Err = MalformedAlbumKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Rating keys never contain the separator, so split from the right
        // to tolerate titles that do.
        let mut parts = s.rsplitn(2, KEY_SEPARATOR);
        let rating_key = parts.next();
        let rest = parts.next();
        let (rating_key, rest) = match (rating_key, rest) {
            (Some(k), Some(r)) => (k, r),
            _ => return Err(MalformedAlbumKey(s.to_string())),
        };
        let mut head = rest.splitn(3, KEY_SEPARATOR);
        match (head.next(), head.next(), head.next()) {
            (Some(library), Some(artist), Some(album)) => {
                Ok(AlbumKey::new(library, artist, album, rating_key))
            }
            _ => Err(MalformedAlbumKey(s.to_string())),
        }
    }
}

impl From<AlbumKey> for String {
    fn from(key: AlbumKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for AlbumKey {
    type Error = MalformedAlbumKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Persisted State
// ============================================================================

/// Where processing last reached. Empty when no run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub last_library: Option<String>,
    #[serde(rename = "last_artist")]
    pub last_artist_key: Option<String>,
    #[serde(rename = "last_album")]
    pub last_album_key: Option<AlbumKey>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ProgressRecord {
    pub fn is_empty(&self) -> bool {
        self.last_library.is_none()
    }
}

/// On-disk layout of the processed-album set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedAlbums {
    pub albums: BTreeSet<AlbumKey>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

// ============================================================================
// Run Statistics
// ============================================================================

/// Counters reported at the end of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tracks_checked: u64,
    pub titles_updated: u64,
    pub albums_updated: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub albums_skipped: u64,
    pub album_failures: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Total number of title and label mutations requested during the run.
    pub fn mutations(&self) -> u64 {
        self.titles_updated + self.albums_updated + self.labels_added + self.labels_removed
    }
}
