//! In-memory catalog.
//!
//! Holds a library/artist/album/track hierarchy, records every mutation it
//! receives, and can be told to fail specific calls. The engine runs against
//! it unchanged, which makes it the backbone of the integration tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::{Catalog, CatalogError, CatalogResult};
use crate::models::{Artist, Library, MediaEntry};

/// A mutation received by the catalog, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Lock { key: String, field: String, locked: bool },
    SetField { key: String, field: String, value: String },
    AddLabel { key: String, label: String },
    RemoveLabel { key: String, label: String },
    PutMetadata { key: String, fields: Vec<(String, String)> },
}

impl Mutation {
    /// Lock toggles do not change what a user sees.
    pub fn is_visible(&self) -> bool {
        !matches!(self, Mutation::Lock { .. })
    }
}

#[derive(Debug)]
struct MemArtist {
    artist: Artist,
    albums: Vec<String>,
}

#[derive(Debug)]
struct MemLibrary {
    library: Library,
    artists: Vec<MemArtist>,
}

#[derive(Debug, Default)]
struct State {
    libraries: Vec<MemLibrary>,
    entries: HashMap<String, MediaEntry>,
    album_tracks: HashMap<String, Vec<String>>,
    mutations: Vec<Mutation>,
    next_key: u64,
    failing_libraries: HashSet<String>,
    failing_album_listings: HashSet<String>,
    failing_track_listings: HashSet<String>,
    failing_label_adds: HashSet<String>,
    failing_label_removes: HashSet<String>,
    ignore_field_edits: bool,
    reject_direct_put: bool,
}

impl State {
    fn next_key(&mut self) -> String {
        self.next_key += 1;
        self.next_key.to_string()
    }

    fn entry_mut(&mut self, key: &str) -> CatalogResult<&mut MediaEntry> {
        self.entries
            .get_mut(key)
            .ok_or_else(|| CatalogError::NotFound(format!("entry {}", key)))
    }

    fn find_artist(&self, artist: &Artist) -> Option<&MemArtist> {
        self.libraries
            .iter()
            .flat_map(|l| l.artists.iter())
            .find(|a| a.artist.rating_key == artist.rating_key)
    }
}

/// Single-threaded in-memory [`Catalog`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RefCell<State>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------------

    pub fn add_library(&self, title: &str) -> Library {
        let mut state = self.state.borrow_mut();
        let library = Library {
            key: state.next_key(),
            title: title.to_string(),
        };
        state.libraries.push(MemLibrary {
            library: library.clone(),
            artists: Vec::new(),
        });
        library
    }

    /// Add an artist to the named library, creating the library if needed.
    pub fn add_artist(&self, library_title: &str, title: &str) -> Artist {
        let mut state = self.state.borrow_mut();
        let idx = match state
            .libraries
            .iter()
            .position(|l| l.library.title == library_title)
        {
            Some(idx) => idx,
            None => {
                let key = state.next_key();
                state.libraries.push(MemLibrary {
                    library: Library {
                        key,
                        title: library_title.to_string(),
                    },
                    artists: Vec::new(),
                });
                state.libraries.len() - 1
            }
        };
        let rating_key = state.next_key();
        let lib = &mut state.libraries[idx];
        let artist = Artist {
            rating_key,
            title: title.to_string(),
            library_key: lib.library.key.clone(),
        };
        lib.artists.push(MemArtist {
            artist: artist.clone(),
            albums: Vec::new(),
        });
        artist
    }

    /// Add an album under an artist and return its rating key.
    pub fn add_album(&self, artist: &Artist, title: &str) -> String {
        let mut state = self.state.borrow_mut();
        let key = state.next_key();
        let mut entry = MediaEntry::album(key.clone(), title);
        entry.library_key = artist.library_key.clone();
        state.entries.insert(key.clone(), entry);
        state.album_tracks.insert(key.clone(), Vec::new());
        if let Some(a) = state
            .libraries
            .iter_mut()
            .flat_map(|l| l.artists.iter_mut())
            .find(|a| a.artist.rating_key == artist.rating_key)
        {
            a.albums.push(key.clone());
        }
        key
    }

    /// Add a track backed by a single file and return its rating key.
    pub fn add_track(&self, album_key: &str, title: &str, path: &str) -> String {
        self.add_track_parts(album_key, title, vec![path.to_string()])
    }

    pub fn add_track_parts(&self, album_key: &str, title: &str, paths: Vec<String>) -> String {
        let mut state = self.state.borrow_mut();
        let key = state.next_key();
        let library_key = state
            .entries
            .get(album_key)
            .map(|a| a.library_key.clone())
            .unwrap_or_default();
        let mut entry = MediaEntry::track(key.clone(), title, paths);
        entry.library_key = library_key;
        state.entries.insert(key.clone(), entry);
        state
            .album_tracks
            .entry(album_key.to_string())
            .or_default()
            .push(key.clone());
        key
    }

    /// Overwrite the title of an entry without recording a mutation.
    pub fn rename(&self, key: &str, title: &str) {
        if let Some(entry) = self.state.borrow_mut().entries.get_mut(key) {
            entry.title = title.to_string();
        }
    }

    /// Attach a label without recording a mutation.
    pub fn preset_label(&self, key: &str, label: &str) {
        if let Some(entry) = self.state.borrow_mut().entries.get_mut(key) {
            entry.labels.push(label.to_string());
        }
    }

    // ------------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------------

    pub fn fail_library(&self, title: &str) {
        self.state.borrow_mut().failing_libraries.insert(title.to_string());
    }

    pub fn fail_album_listing(&self, artist: &Artist) {
        self.state
            .borrow_mut()
            .failing_album_listings
            .insert(artist.rating_key.clone());
    }

    pub fn fail_track_listing(&self, album_key: &str) {
        self.state
            .borrow_mut()
            .failing_track_listings
            .insert(album_key.to_string());
    }

    pub fn fail_label_add(&self, key: &str) {
        self.state.borrow_mut().failing_label_adds.insert(key.to_string());
    }

    pub fn fail_label_remove(&self, key: &str) {
        self.state
            .borrow_mut()
            .failing_label_removes
            .insert(key.to_string());
    }

    /// Accept field edits but leave the stored value untouched.
    pub fn ignore_field_edits(&self, ignore: bool) {
        self.state.borrow_mut().ignore_field_edits = ignore;
    }

    /// Answer raw metadata updates with an HTTP error.
    pub fn reject_direct_put(&self, reject: bool) {
        self.state.borrow_mut().reject_direct_put = reject;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn entry(&self, key: &str) -> Option<MediaEntry> {
        self.state.borrow().entries.get(key).cloned()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.borrow().mutations.clone()
    }

    /// Mutations that change a title or label.
    pub fn visible_mutations(&self) -> Vec<Mutation> {
        self.mutations().into_iter().filter(Mutation::is_visible).collect()
    }

    pub fn clear_mutations(&self) {
        self.state.borrow_mut().mutations.clear();
    }
}

impl Catalog for MemoryCatalog {
    fn music_libraries(&self) -> CatalogResult<Vec<Library>> {
        Ok(self
            .state
            .borrow()
            .libraries
            .iter()
            .map(|l| l.library.clone())
            .collect())
    }

    fn library(&self, name: &str) -> CatalogResult<Library> {
        let state = self.state.borrow();
        if state.failing_libraries.contains(name) {
            return Err(CatalogError::Status {
                context: format!("library {}", name),
                status: 500,
            });
        }
        state
            .libraries
            .iter()
            .find(|l| l.library.title == name)
            .map(|l| l.library.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("library {}", name)))
    }

    fn artists(&self, library: &Library, name_filter: Option<&str>) -> CatalogResult<Vec<Artist>> {
        let state = self.state.borrow();
        let lib = state
            .libraries
            .iter()
            .find(|l| l.library.key == library.key)
            .ok_or_else(|| CatalogError::NotFound(format!("library {}", library.title)))?;
        let filter = name_filter.map(str::to_lowercase);
        Ok(lib
            .artists
            .iter()
            .filter(|a| match &filter {
                Some(f) => a.artist.title.to_lowercase().contains(f.as_str()),
                None => true,
            })
            .map(|a| a.artist.clone())
            .collect())
    }

    fn albums(&self, artist: &Artist) -> CatalogResult<Vec<MediaEntry>> {
        let state = self.state.borrow();
        if state.failing_album_listings.contains(&artist.rating_key) {
            return Err(CatalogError::Transport {
                context: format!("albums of {}", artist.title),
                message: "connection reset".to_string(),
            });
        }
        let mem = state
            .find_artist(artist)
            .ok_or_else(|| CatalogError::NotFound(format!("artist {}", artist.title)))?;
        Ok(mem
            .albums
            .iter()
            .filter_map(|k| state.entries.get(k).cloned())
            .collect())
    }

    fn tracks(&self, album: &MediaEntry) -> CatalogResult<Vec<MediaEntry>> {
        let state = self.state.borrow();
        if state.failing_track_listings.contains(&album.rating_key) {
            return Err(CatalogError::Transport {
                context: format!("tracks of {}", album.title),
                message: "connection reset".to_string(),
            });
        }
        let keys = state
            .album_tracks
            .get(&album.rating_key)
            .ok_or_else(|| CatalogError::NotFound(format!("album {}", album.title)))?;
        Ok(keys
            .iter()
            .filter_map(|k| state.entries.get(k).cloned())
            .collect())
    }

    fn fetch(&self, entry: &MediaEntry) -> CatalogResult<MediaEntry> {
        self.entry(&entry.rating_key)
            .ok_or_else(|| CatalogError::NotFound(format!("entry {}", entry.rating_key)))
    }

    fn set_field_lock(&self, entry: &MediaEntry, field: &str, locked: bool) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        state.entry_mut(&entry.rating_key)?;
        state.mutations.push(Mutation::Lock {
            key: entry.rating_key.clone(),
            field: field.to_string(),
            locked,
        });
        Ok(())
    }

    fn set_field(&self, entry: &MediaEntry, field: &str, value: &str) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        let ignore = state.ignore_field_edits;
        let stored = state.entry_mut(&entry.rating_key)?;
        if field == "title" && !ignore {
            stored.title = value.to_string();
        }
        state.mutations.push(Mutation::SetField {
            key: entry.rating_key.clone(),
            field: field.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn add_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_label_adds.contains(&entry.rating_key) {
            return Err(CatalogError::Status {
                context: format!("add label to {}", entry.title),
                status: 500,
            });
        }
        let stored = state.entry_mut(&entry.rating_key)?;
        if !stored.has_label(label) {
            stored.labels.push(label.to_string());
        }
        state.mutations.push(Mutation::AddLabel {
            key: entry.rating_key.clone(),
            label: label.to_string(),
        });
        Ok(())
    }

    fn remove_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_label_removes.contains(&entry.rating_key) {
            return Err(CatalogError::Status {
                context: format!("remove label from {}", entry.title),
                status: 500,
            });
        }
        let stored = state.entry_mut(&entry.rating_key)?;
        stored.labels.retain(|l| !l.eq_ignore_ascii_case(label));
        state.mutations.push(Mutation::RemoveLabel {
            key: entry.rating_key.clone(),
            label: label.to_string(),
        });
        Ok(())
    }

    fn put_metadata(&self, entry: &MediaEntry, fields: &[(&str, &str)]) -> CatalogResult<()> {
        let mut state = self.state.borrow_mut();
        if state.reject_direct_put {
            return Err(CatalogError::Status {
                context: format!("metadata {}", entry.rating_key),
                status: 400,
            });
        }
        let stored = state.entry_mut(&entry.rating_key)?;
        for (name, value) in fields {
            if *name == "title.value" {
                stored.title = value.to_string();
            }
        }
        state.mutations.push(Mutation::PutMetadata {
            key: entry.rating_key.clone(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        Ok(())
    }
}
