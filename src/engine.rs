//! Reconciliation engine.
//!
//! Walks libraries, artists, albums and tracks in order, classifies every
//! album and track from its file paths, and asks the mutation layer to bring
//! titles and labels in line. Progress is checkpointed after every album so
//! an interrupted run can resume where it stopped.
//!
//! Failures are isolated per scope: a library that cannot be opened, an
//! artist whose albums cannot be listed, or an album that errors midway is
//! logged and skipped. Only an unusable library selection aborts the run.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::classify::{classify_album, classify_track};
use crate::config::{LibrarySelection, RunOptions};
use crate::models::{
    AlbumId, AlbumKey, Artist, MediaEntry, ProgressRecord, RunSummary, EXPLICIT_LABEL,
};
use crate::mutation::{
    add_label_if_missing, edit_title, remove_label_if_present, LabelOutcome, MutationContext,
};
use crate::normalize::{desired_title, has_marker};
use crate::pacing::Pacer;
use crate::progress::Progress;
use crate::store::ProgressStore;

/// Errors that abort a run before any album is touched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to list libraries: {0}")]
    ListLibraries(#[source] CatalogError),
    #[error("no music libraries found on server")]
    NoMusicLibraries,
}

// ============================================================================
// Resume Traversal
// ============================================================================

/// Saved position a run resumes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub library: String,
    pub artist: Option<String>,
    pub album: Option<AlbumKey>,
}

impl ResumePoint {
    pub fn from_record(record: &ProgressRecord) -> Option<Self> {
        Some(Self {
            library: record.last_library.clone()?,
            artist: record.last_artist_key.clone(),
            album: record.last_album_key.clone(),
        })
    }

    fn after_library(self) -> TraversalState {
        if self.artist.is_some() {
            TraversalState::BeforeArtist(self)
        } else {
            TraversalState::Normal
        }
    }

    fn after_artist(self) -> TraversalState {
        if self.album.is_some() {
            TraversalState::BeforeAlbum(self)
        } else {
            TraversalState::Normal
        }
    }
}

/// Where the traversal stands relative to the resume point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraversalState {
    /// Skipping libraries until the resume library.
    BeforeLibrary(ResumePoint),
    /// Inside the resume library, skipping artists until the resume artist.
    BeforeArtist(ResumePoint),
    /// Inside the resume artist, skipping albums until the resume album.
    BeforeAlbum(ResumePoint),
    /// Past the resume point, or no resume requested.
    Normal,
}

/// Traversal events fed to [`ResumeCursor::transition`].
#[derive(Debug, Clone, Copy)]
pub enum TraversalEvent<'a> {
    EnterLibrary(&'a str),
    EnterArtist(&'a str),
    EnterAlbum(&'a AlbumKey),
    /// The artist enumeration of an entered library is exhausted.
    LeaveLibrary,
    /// The album enumeration of an entered artist is exhausted.
    LeaveArtist,
}

/// What to do with the scope just entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Skip,
    /// The saved resume scope itself.
    Resume,
    Process,
}

/// Explicit state machine replacing nested skip flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeCursor {
    state: TraversalState,
}

impl ResumeCursor {
    /// Start a traversal. A resume library outside the current selection
    /// cannot be reached, so resume is abandoned up front.
    pub fn new(point: Option<ResumePoint>, libraries: &[String]) -> Self {
        let state = match point {
            Some(p) if libraries.contains(&p.library) => TraversalState::BeforeLibrary(p),
            Some(p) => {
                warn!(
                    "Resume library '{}' is not selected for this run; starting from the beginning",
                    p.library
                );
                TraversalState::Normal
            }
            None => TraversalState::Normal,
        };
        Self { state }
    }

    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    /// The single transition function of the traversal.
    ///
    /// Leaving the resume library or artist without meeting the saved key
    /// means it disappeared upstream; everything after it is processed
    /// normally.
    pub fn transition(&mut self, event: TraversalEvent<'_>) -> Visit {
        use TraversalEvent as E;
        use TraversalState as S;

        let state = std::mem::replace(&mut self.state, S::Normal);
        let (next, visit) = match (state, event) {
            (S::Normal, _) => (S::Normal, Visit::Process),

            (S::BeforeLibrary(p), E::EnterLibrary(name)) => {
                if p.library == name {
                    (p.after_library(), Visit::Resume)
                } else {
                    (S::BeforeLibrary(p), Visit::Skip)
                }
            }
            (S::BeforeArtist(p), E::EnterArtist(key)) => {
                if p.artist.as_deref() == Some(key) {
                    (p.after_artist(), Visit::Resume)
                } else {
                    (S::BeforeArtist(p), Visit::Skip)
                }
            }
            (S::BeforeAlbum(p), E::EnterAlbum(key)) => {
                if p.album.as_ref().is_some_and(|saved| saved.same_album(key)) {
                    (S::Normal, Visit::Resume)
                } else {
                    (S::BeforeAlbum(p), Visit::Skip)
                }
            }

            (S::BeforeArtist(p), E::LeaveLibrary) => {
                warn!(
                    "Resume artist {} not found in library '{}'; continuing normally",
                    p.artist.as_deref().unwrap_or("?"),
                    p.library
                );
                (S::Normal, Visit::Process)
            }
            (S::BeforeAlbum(p), E::LeaveArtist | E::LeaveLibrary) => {
                warn!(
                    "Resume album {} not found; continuing normally",
                    p.album.as_ref().map(|k| k.album.as_str()).unwrap_or("?")
                );
                (S::Normal, Visit::Process)
            }

            (state, _) => (state, Visit::Process),
        };
        self.state = next;
        visit
    }

    pub fn enter_library(&mut self, name: &str) -> Visit {
        self.transition(TraversalEvent::EnterLibrary(name))
    }

    pub fn enter_artist(&mut self, key: &str) -> Visit {
        self.transition(TraversalEvent::EnterArtist(key))
    }

    pub fn enter_album(&mut self, key: &AlbumKey) -> Visit {
        self.transition(TraversalEvent::EnterAlbum(key))
    }

    pub fn leave_library(&mut self) {
        self.transition(TraversalEvent::LeaveLibrary);
    }

    pub fn leave_artist(&mut self) {
        self.transition(TraversalEvent::LeaveArtist);
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// One reconciliation run over a catalog.
pub struct Reconciler<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    store: &'a ProgressStore,
    pacer: &'a Pacer,
    options: &'a RunOptions,
    progress: Progress,
    processed: BTreeSet<AlbumId>,
    summary: RunSummary,
}

impl<'a, C: Catalog + ?Sized> Reconciler<'a, C> {
    pub fn new(
        catalog: &'a C,
        store: &'a ProgressStore,
        pacer: &'a Pacer,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            catalog,
            store,
            pacer,
            options,
            progress: Progress::hidden(),
            processed: BTreeSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Run to completion. Per-item failures are reported in the summary,
    /// never returned.
    pub fn run(mut self) -> Result<RunSummary, EngineError> {
        let start = Instant::now();
        let libraries = self.resolve_libraries()?;

        let resume_point = if self.options.resume {
            ResumePoint::from_record(&self.store.load())
        } else {
            None
        };
        if let Some(p) = &resume_point {
            info!(
                "Resuming from: Library '{}' / {} / {}",
                p.library,
                p.artist.as_deref().unwrap_or("N/A"),
                p.album.as_ref().map(|k| k.album.as_str()).unwrap_or("N/A")
            );
        }

        self.processed = if self.options.force {
            BTreeSet::new()
        } else {
            self.store
                .load_processed_albums()
                .iter()
                .map(AlbumKey::id)
                .collect()
        };
        info!("Processed albums cache: {} albums", self.processed.len());
        if self.options.force {
            info!("Force mode: will reprocess all albums");
        }

        let mut cursor = ResumeCursor::new(resume_point, &libraries);
        for name in &libraries {
            self.process_library(name, &mut cursor);
        }

        if !self.options.dry_run {
            self.store.clear();
            info!("Progress cleared (run completed successfully)");
        }

        self.summary.elapsed = start.elapsed();
        Ok(self.summary)
    }

    fn resolve_libraries(&self) -> Result<Vec<String>, EngineError> {
        match &self.options.libraries {
            LibrarySelection::Named(names) => Ok(names.clone()),
            LibrarySelection::All => {
                let names: Vec<String> = self
                    .catalog
                    .music_libraries()
                    .map_err(EngineError::ListLibraries)?
                    .into_iter()
                    .map(|l| l.title)
                    .collect();
                if names.is_empty() {
                    return Err(EngineError::NoMusicLibraries);
                }
                info!(
                    "Found {} music library/libraries: {}",
                    names.len(),
                    names.join(", ")
                );
                Ok(names)
            }
        }
    }

    fn process_library(&mut self, name: &str, cursor: &mut ResumeCursor) {
        match cursor.enter_library(name) {
            Visit::Skip => {
                info!("Skipping library: {} (already processed)", name);
                return;
            }
            Visit::Resume => info!("Processing Library: {} (resuming from here)", name),
            Visit::Process => info!("Processing Library: {}", name),
        }

        let library = match self.catalog.library(name) {
            Ok(library) => library,
            Err(e) => {
                error!(library = name, "ERROR: Library '{}': {}", name, e);
                cursor.leave_library();
                return;
            }
        };

        let filter = self.options.artist_filter.as_deref();
        let artists = match self.catalog.artists(&library, filter) {
            Ok(artists) => artists,
            Err(e) => {
                error!(library = name, "ERROR: listing artists in '{}': {}", name, e);
                cursor.leave_library();
                return;
            }
        };
        if let (Some(filter), true) = (filter, artists.is_empty()) {
            info!("No artists matched '{}' in library '{}'.", filter, name);
        }

        let pb = self
            .progress
            .create_progress_bar(artists.len() as u64, &format!("Library {}", name));
        for artist in &artists {
            self.process_artist(name, artist, cursor);
            pb.inc(1);
        }
        pb.finish_and_clear();
        cursor.leave_library();
    }

    fn process_artist(&mut self, library: &str, artist: &Artist, cursor: &mut ResumeCursor) {
        let artist_key = artist.resume_key();
        match cursor.enter_artist(&artist_key) {
            Visit::Skip => return,
            Visit::Resume => info!("Resuming from artist: {}", artist.title),
            Visit::Process => {}
        }

        info!("Artist: {}", artist.title);
        let albums = match self.catalog.albums(artist) {
            Ok(albums) => albums,
            Err(e) => {
                warn!(library, artist = %artist.title, "  - Skipping artist (albums error): {}", e);
                cursor.leave_artist();
                self.pacer.after_artist();
                return;
            }
        };

        for album in albums {
            self.visit_album(library, artist, &artist_key, album, cursor);
        }
        cursor.leave_artist();
        self.pacer.after_artist();
    }

    fn visit_album(
        &mut self,
        library: &str,
        artist: &Artist,
        artist_key: &str,
        album: MediaEntry,
        cursor: &mut ResumeCursor,
    ) {
        let key = AlbumKey::new(library, &artist.title, &album.title, &album.rating_key);
        match cursor.enter_album(&key) {
            Visit::Skip => return,
            Visit::Resume => info!("  Album: {} (resuming from here)", album.title),
            Visit::Process => info!("  Album: {}", album.title),
        }

        if !self.options.force && self.processed.contains(&key.id()) {
            info!("    - Skipping (already processed)");
            self.summary.albums_skipped += 1;
            return;
        }

        let title = album.title.clone();
        match self.process_album(album) {
            Ok(()) => {
                if !self.options.dry_run {
                    self.store.mark_processed(&key);
                    self.processed.insert(key.id());
                }
                self.store.save(library, artist_key, &key);
            }
            Err(e) => {
                self.summary.album_failures += 1;
                error!(
                    library,
                    artist = %artist.title,
                    album = %title,
                    "    - ERROR processing album: {}",
                    e
                );
                self.store.save(library, artist_key, &key);
                error!(
                    "    - Progress saved, can resume from: Library '{}' / {} / {}",
                    library, artist.title, title
                );
            }
        }
        self.pacer.after_album();
    }

    /// Album title and label first, then every track on its own verdict.
    fn process_album(&mut self, mut album: MediaEntry) -> Result<(), CatalogError> {
        let catalog = self.catalog;
        let pacer = self.pacer;
        let ctx = MutationContext {
            dry_run: self.options.dry_run,
            pacer,
        };

        let tracks = catalog.tracks(&album)?;
        pacer.after_api_call();

        let sample = tracks
            .first()
            .and_then(|t| t.paths.first())
            .map(String::as_str);
        let album_explicit = classify_album(sample);
        pacer.after_api_call();

        let desired = desired_title(&album.title, album_explicit);
        if desired != album.title {
            self.summary.albums_updated += 1;
            info!(
                "    * Album title {}: {}",
                if album_explicit { "mark" } else { "unmark" },
                album.title
            );
            edit_title(catalog, &mut album, &desired, &ctx);
        }
        self.reconcile_label(&mut album, album_explicit, &ctx)?;

        for mut track in tracks {
            self.summary.tracks_checked += 1;
            let explicit = classify_track(&track.paths);
            pacer.after_api_call();

            // Clean tracks are only touched when they carry a marker.
            let desired = desired_title(&track.title, explicit);
            if desired != track.title && (explicit || has_marker(&track.title)) {
                self.summary.titles_updated += 1;
                info!(
                    "    Track {}: {}",
                    if explicit { "mark" } else { "unmark" },
                    track.title
                );
                edit_title(catalog, &mut track, &desired, &ctx);
            }
            self.reconcile_label(&mut track, explicit, &ctx)?;
            pacer.after_track();
        }
        Ok(())
    }

    fn reconcile_label(
        &mut self,
        entry: &mut MediaEntry,
        explicit: bool,
        ctx: &MutationContext<'_>,
    ) -> Result<(), CatalogError> {
        if explicit {
            let outcome = add_label_if_missing(self.catalog, entry, EXPLICIT_LABEL, ctx)?;
            if matches!(outcome, LabelOutcome::Changed | LabelOutcome::WouldChange) {
                self.summary.labels_added += 1;
            }
        } else if self.options.remove_labels {
            let outcome = remove_label_if_present(self.catalog, entry, EXPLICIT_LABEL, ctx);
            if matches!(outcome, LabelOutcome::Changed | LabelOutcome::WouldChange) {
                self.summary.labels_removed += 1;
            }
        }
        Ok(())
    }
}
