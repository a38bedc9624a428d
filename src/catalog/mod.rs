//! Media catalog abstraction and concrete implementations.
//!
//! The engine only needs a narrow slice of a media server: hierarchical
//! listing, entry re-fetch, field locks, title edits and labels. Each call
//! returns a typed [`CatalogError`] and the engine decides whether a failure
//! skips a scope or is swallowed.

pub mod memory;
pub mod plex;

use crate::models::{Artist, Library, MediaEntry};

/// Failure reasons reported by a catalog implementation.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("request failed ({context}): {message}")]
    Transport { context: String, message: String },
    #[error("server returned HTTP {status} ({context})")]
    Status { context: String, status: u16 },
    #[error("unexpected response ({context}): {message}")]
    Parse { context: String, message: String },
    #[error("not found: {0}")]
    NotFound(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Interface implemented by media servers the labeler can reconcile.
///
/// Calls are made sequentially from a single thread.
pub trait Catalog {
    /// All libraries holding music.
    fn music_libraries(&self) -> CatalogResult<Vec<Library>>;

    /// A library by its display name.
    fn library(&self, name: &str) -> CatalogResult<Library>;

    /// Artists of a library, optionally filtered by name.
    fn artists(&self, library: &Library, name_filter: Option<&str>) -> CatalogResult<Vec<Artist>>;

    fn albums(&self, artist: &Artist) -> CatalogResult<Vec<MediaEntry>>;

    /// Tracks of an album, each with its backing file paths.
    fn tracks(&self, album: &MediaEntry) -> CatalogResult<Vec<MediaEntry>>;

    /// Re-read an entry from the server.
    fn fetch(&self, entry: &MediaEntry) -> CatalogResult<MediaEntry>;

    /// Whether per-field lock and unlock is available.
    fn supports_field_locks(&self) -> bool {
        true
    }

    fn set_field_lock(&self, entry: &MediaEntry, field: &str, locked: bool) -> CatalogResult<()>;

    fn set_field(&self, entry: &MediaEntry, field: &str, value: &str) -> CatalogResult<()>;

    fn add_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()>;

    fn remove_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()>;

    /// Low-level metadata update with arbitrary field parameters.
    fn put_metadata(&self, entry: &MediaEntry, fields: &[(&str, &str)]) -> CatalogResult<()>;
}
