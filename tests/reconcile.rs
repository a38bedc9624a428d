//! End-to-end reconciliation runs against the in-memory catalog.

use explicit_labeler::catalog::memory::{MemoryCatalog, Mutation};
use explicit_labeler::catalog::{Catalog, CatalogResult};
use explicit_labeler::config::{LibrarySelection, RunOptions};
use explicit_labeler::engine::{EngineError, Reconciler};
use explicit_labeler::models::{AlbumKey, Artist, Library, MediaEntry, RunSummary, EXPLICIT_LABEL};
use explicit_labeler::pacing::{Pacer, Pacing};
use explicit_labeler::store::ProgressStore;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ===== Helpers =====

struct Harness {
    catalog: MemoryCatalog,
    dir: TempDir,
    pacer: Pacer,
}

impl Harness {
    fn new() -> Self {
        Self {
            catalog: MemoryCatalog::new(),
            dir: TempDir::new().unwrap(),
            pacer: Pacer::new(Pacing::none()),
        }
    }

    fn store(&self) -> ProgressStore {
        ProgressStore::new(self.dir.path())
    }

    fn run(&self, options: &RunOptions) -> Result<RunSummary, EngineError> {
        let store = self.store();
        Reconciler::new(&self.catalog, &store, &self.pacer, options).run()
    }

    fn title(&self, key: &str) -> String {
        self.catalog.entry(key).unwrap().title
    }

    fn labeled(&self, key: &str) -> bool {
        self.catalog.entry(key).unwrap().has_label(EXPLICIT_LABEL)
    }

    /// Keys of entries that received a visible mutation.
    fn touched(&self) -> BTreeSet<String> {
        self.catalog
            .visible_mutations()
            .into_iter()
            .map(|m| match m {
                Mutation::Lock { key, .. }
                | Mutation::SetField { key, .. }
                | Mutation::AddLabel { key, .. }
                | Mutation::RemoveLabel { key, .. }
                | Mutation::PutMetadata { key, .. } => key,
            })
            .collect()
    }
}

fn options() -> RunOptions {
    RunOptions {
        resume: false,
        ..RunOptions::default()
    }
}

fn libraries(names: &[&str]) -> LibrarySelection {
    LibrarySelection::Named(names.iter().map(|n| n.to_string()).collect())
}

/// An album in an explicit folder with one explicit track. Returns
/// (album key, track key).
fn explicit_album(h: &Harness, artist: &Artist, title: &str) -> (String, String) {
    let album = h.catalog.add_album(artist, title);
    let dir = format!("/music/{}/{} [E]", artist.title, title);
    let track = h
        .catalog
        .add_track(&album, "Song", &format!("{}/01 Song [E].mp3", dir));
    (album, track)
}

// ===== Scenarios =====

#[test]
fn test_greatest_hits_scenario() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let album = h.catalog.add_album(&artist, "Greatest Hits");
    let intro = h
        .catalog
        .add_track(&album, "Intro", "/music/X/Greatest Hits [E]/01 Intro.mp3");
    let rough = h
        .catalog
        .add_track(&album, "Rough", "/music/X/Greatest Hits [E]/02 Rough [E].mp3");

    let summary = h.run(&options()).unwrap();

    assert_eq!(h.title(&album), "[E] Greatest Hits");
    assert!(h.labeled(&album));
    assert_eq!(h.title(&intro), "Intro");
    assert!(!h.labeled(&intro));
    assert_eq!(h.title(&rough), "[E] Rough");
    assert!(h.labeled(&rough));

    assert_eq!(summary.tracks_checked, 2);
    assert_eq!(summary.albums_updated, 1);
    assert_eq!(summary.titles_updated, 1);
    assert_eq!(summary.labels_added, 2);
    assert_eq!(summary.album_failures, 0);
    assert!(!h.touched().contains(&intro));
}

#[test]
fn test_stale_markers_removed_from_clean_entries() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "Y");
    let album = h.catalog.add_album(&artist, "[E] Quiet  Songs [E]");
    let track = h
        .catalog
        .add_track(&album, "Lullaby [e]", "/music/Y/Quiet Songs/01 Lullaby.flac");

    h.run(&options()).unwrap();

    assert_eq!(h.title(&album), "Quiet Songs");
    assert_eq!(h.title(&track), "Lullaby");
    assert!(!h.labeled(&album));
}

#[test]
fn test_clean_track_without_marker_is_left_alone() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "Y");
    let album = h.catalog.add_album(&artist, "Live");
    let spaced = h
        .catalog
        .add_track(&album, "Song  (Live) ", "/music/Y/Live/01 Song.mp3");
    let marked = h
        .catalog
        .add_track(&album, "Other [e]  (Live)", "/music/Y/Live/02 Other.mp3");

    let summary = h.run(&options()).unwrap();

    assert_eq!(h.title(&spaced), "Song  (Live) ");
    assert!(!h.touched().contains(&spaced));
    assert_eq!(h.title(&marked), "Other (Live)");
    assert_eq!(summary.titles_updated, 1);
}

#[test]
fn test_second_run_makes_no_changes() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    explicit_album(&h, &artist, "One");
    let clean = h.catalog.add_album(&artist, "Two");
    h.catalog.add_track(&clean, "Calm", "/music/X/Two/01 Calm.mp3");

    let first = h.run(&options()).unwrap();
    assert!(first.mutations() > 0);

    h.catalog.clear_mutations();
    let second = h.run(&options()).unwrap();

    assert!(h.catalog.visible_mutations().is_empty());
    assert_eq!(second.mutations(), 0);
    assert_eq!(second.tracks_checked, first.tracks_checked);
}

#[test]
fn test_completed_run_clears_state() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    explicit_album(&h, &artist, "One");

    h.run(&options()).unwrap();

    let store = h.store();
    assert!(!store.progress_path().exists());
    assert!(!store.processed_path().exists());
}

#[test]
fn test_resume_skips_everything_before_saved_album() {
    let h = Harness::new();
    let early = h.catalog.add_artist("Podcasts", "Early");
    let (early_album, _) = explicit_album(&h, &early, "Before");

    let a = h.catalog.add_artist("Music", "A");
    let b = h.catalog.add_artist("Music", "B");
    let c = h.catalog.add_artist("Music", "C");
    let (a_album, _) = explicit_album(&h, &a, "First");
    let (b_one, _) = explicit_album(&h, &b, "One");
    let (b_two, b_two_track) = explicit_album(&h, &b, "Two");
    let (b_three, _) = explicit_album(&h, &b, "Three");
    let (c_album, _) = explicit_album(&h, &c, "Last");

    h.store()
        .save("Music", &b.resume_key(), &AlbumKey::new("Music", "B", "Two", &b_two));

    let run = RunOptions {
        libraries: libraries(&["Podcasts", "Music"]),
        resume: true,
        ..RunOptions::default()
    };
    h.run(&run).unwrap();

    let touched = h.touched();
    for skipped in [&early_album, &a_album, &b_one] {
        assert!(!touched.contains(skipped), "{} should be skipped", skipped);
    }
    for processed in [&b_two, &b_two_track, &b_three, &c_album] {
        assert!(touched.contains(processed), "{} should be processed", processed);
    }
    assert_eq!(h.title(&b_one), "One");
    assert_eq!(h.title(&b_two), "[E] Two");
}

#[test]
fn test_resume_from_album_renamed_before_interruption() {
    let h = Harness::new();
    let a = h.catalog.add_artist("Music", "A");
    let b = h.catalog.add_artist("Music", "B");
    let (a_album, _) = explicit_album(&h, &a, "First");
    let (two, two_track) = explicit_album(&h, &b, "Two");
    let (three, _) = explicit_album(&h, &b, "Three");

    // The interrupted run retitled the album after saving its key.
    h.catalog.rename(&two, "[E] Two");
    h.store()
        .save("Music", &b.resume_key(), &AlbumKey::new("Music", "B", "Two", &two));

    let run = RunOptions {
        resume: true,
        ..RunOptions::default()
    };
    h.run(&run).unwrap();

    let touched = h.touched();
    assert!(!touched.contains(&a_album));
    assert!(touched.contains(&two_track));
    assert_eq!(h.title(&three), "[E] Three");
    assert!(!h.store().progress_path().exists());
}

#[test]
fn test_resume_with_vanished_album_continues() {
    let h = Harness::new();
    let a = h.catalog.add_artist("Music", "A");
    let b = h.catalog.add_artist("Music", "B");
    let (a_album, _) = explicit_album(&h, &a, "Kept");
    let (b_album, _) = explicit_album(&h, &b, "Next");

    h.store()
        .save("Music", &a.resume_key(), &AlbumKey::new("Music", "A", "Deleted", "999"));

    let run = RunOptions {
        resume: true,
        ..RunOptions::default()
    };
    h.run(&run).unwrap();

    let touched = h.touched();
    assert!(!touched.contains(&a_album));
    assert!(touched.contains(&b_album));
}

#[test]
fn test_no_resume_ignores_saved_point() {
    let h = Harness::new();
    let a = h.catalog.add_artist("Music", "A");
    let b = h.catalog.add_artist("Music", "B");
    let (a_album, _) = explicit_album(&h, &a, "First");
    let (b_album, _) = explicit_album(&h, &b, "Second");
    h.store()
        .save("Music", &b.resume_key(), &AlbumKey::new("Music", "B", "Second", &b_album));

    h.run(&options()).unwrap();

    let touched = h.touched();
    assert!(touched.contains(&a_album));
    assert!(touched.contains(&b_album));
}

#[test]
fn test_processed_albums_are_skipped() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (done, _) = explicit_album(&h, &artist, "Done");
    let (todo, _) = explicit_album(&h, &artist, "Todo");
    h.store()
        .mark_processed(&AlbumKey::new("Music", "X", "Done", &done));

    let summary = h.run(&options()).unwrap();

    assert_eq!(summary.albums_skipped, 1);
    assert_eq!(h.title(&done), "Done");
    assert_eq!(h.title(&todo), "[E] Todo");
}

#[test]
fn test_processed_album_skipped_after_rename() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (done, _) = explicit_album(&h, &artist, "Done");
    h.store()
        .mark_processed(&AlbumKey::new("Music", "X", "Done", &done));
    h.catalog.rename(&done, "[E] Done");

    let summary = h.run(&options()).unwrap();

    assert_eq!(summary.albums_skipped, 1);
    assert!(h.touched().is_empty());
}

/// Delegates to a [`MemoryCatalog`] and snapshots the processed set whenever
/// tracks are listed.
struct SnapshotCatalog<'a> {
    inner: &'a MemoryCatalog,
    store: ProgressStore,
    snapshots: RefCell<Vec<BTreeSet<AlbumKey>>>,
}

impl Catalog for SnapshotCatalog<'_> {
    fn music_libraries(&self) -> CatalogResult<Vec<Library>> {
        self.inner.music_libraries()
    }

    fn library(&self, name: &str) -> CatalogResult<Library> {
        self.inner.library(name)
    }

    fn artists(&self, library: &Library, name_filter: Option<&str>) -> CatalogResult<Vec<Artist>> {
        self.inner.artists(library, name_filter)
    }

    fn albums(&self, artist: &Artist) -> CatalogResult<Vec<MediaEntry>> {
        self.inner.albums(artist)
    }

    fn tracks(&self, album: &MediaEntry) -> CatalogResult<Vec<MediaEntry>> {
        self.snapshots
            .borrow_mut()
            .push(self.store.load_processed_albums());
        self.inner.tracks(album)
    }

    fn fetch(&self, entry: &MediaEntry) -> CatalogResult<MediaEntry> {
        self.inner.fetch(entry)
    }

    fn set_field_lock(&self, entry: &MediaEntry, field: &str, locked: bool) -> CatalogResult<()> {
        self.inner.set_field_lock(entry, field, locked)
    }

    fn set_field(&self, entry: &MediaEntry, field: &str, value: &str) -> CatalogResult<()> {
        self.inner.set_field(entry, field, value)
    }

    fn add_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()> {
        self.inner.add_label(entry, label)
    }

    fn remove_label(&self, entry: &MediaEntry, label: &str) -> CatalogResult<()> {
        self.inner.remove_label(entry, label)
    }

    fn put_metadata(&self, entry: &MediaEntry, fields: &[(&str, &str)]) -> CatalogResult<()> {
        self.inner.put_metadata(entry, fields)
    }
}

#[test]
fn test_force_reprocesses_without_duplicate_keys() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (done, _) = explicit_album(&h, &artist, "Done");
    explicit_album(&h, &artist, "After");
    let done_key = AlbumKey::new("Music", "X", "Done", &done);
    h.store().mark_processed(&done_key);

    let catalog = SnapshotCatalog {
        inner: &h.catalog,
        store: h.store(),
        snapshots: RefCell::new(Vec::new()),
    };
    let store = h.store();
    let run = RunOptions {
        force: true,
        ..options()
    };
    let summary = Reconciler::new(&catalog, &store, &h.pacer, &run).run().unwrap();

    assert_eq!(summary.albums_skipped, 0);
    assert_eq!(h.title(&done), "[E] Done");

    // The second album's listing sees the set as rewritten by the first.
    let snapshots = catalog.snapshots.into_inner();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1], BTreeSet::from([done_key]));
    let raw = std::fs::read_to_string(store.processed_path());
    assert!(raw.is_err(), "state is cleared after the run");
}

#[test]
fn test_dry_run_changes_nothing() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (album, track) = explicit_album(&h, &artist, "One");
    let stale = h.catalog.add_album(&artist, "[E] Two");
    h.catalog.add_track(&stale, "Calm", "/music/X/Two/01 Calm.mp3");
    h.catalog.preset_label(&stale, EXPLICIT_LABEL);

    let run = RunOptions {
        dry_run: true,
        remove_labels: true,
        ..options()
    };
    let summary = h.run(&run).unwrap();

    assert!(h.catalog.mutations().is_empty());
    assert_eq!(h.title(&album), "One");
    assert_eq!(h.title(&track), "Song");
    assert_eq!(summary.albums_updated, 2);
    assert_eq!(summary.labels_added, 2);
    assert_eq!(summary.labels_removed, 1);

    let store = h.store();
    assert!(store.load_processed_albums().is_empty());
    let record = store.load();
    assert_eq!(record.last_library.as_deref(), Some("Music"));
    assert_eq!(record.last_album_key.map(|k| k.album), Some("[E] Two".to_string()));
}

#[test]
fn test_remove_labels_from_clean_entries() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let album = h.catalog.add_album(&artist, "Plain");
    let track = h.catalog.add_track(&album, "Calm", "/music/X/Plain/01 Calm.mp3");
    h.catalog.preset_label(&album, EXPLICIT_LABEL);
    h.catalog.preset_label(&track, EXPLICIT_LABEL);

    h.run(&options()).unwrap();
    assert!(h.labeled(&album), "labels stay without the removal toggle");

    let run = RunOptions {
        remove_labels: true,
        ..options()
    };
    let summary = h.run(&run).unwrap();
    assert!(!h.labeled(&album));
    assert!(!h.labeled(&track));
    assert_eq!(summary.labels_removed, 2);
}

#[test]
fn test_label_removal_failure_is_ignored() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let album = h.catalog.add_album(&artist, "Plain");
    h.catalog.add_track(&album, "Calm", "/music/X/Plain/01 Calm.mp3");
    h.catalog.preset_label(&album, EXPLICIT_LABEL);
    h.catalog.fail_label_remove(&album);

    let run = RunOptions {
        remove_labels: true,
        ..options()
    };
    let summary = h.run(&run).unwrap();

    assert!(h.labeled(&album));
    assert_eq!(summary.album_failures, 0);
    assert_eq!(summary.labels_removed, 0);
}

// ===== Failure Isolation =====

#[test]
fn test_failing_album_does_not_stop_run() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (broken, _) = explicit_album(&h, &artist, "Broken");
    let (fine, _) = explicit_album(&h, &artist, "Fine");
    h.catalog.fail_track_listing(&broken);

    let summary = h.run(&options()).unwrap();

    assert_eq!(summary.album_failures, 1);
    assert_eq!(h.title(&broken), "Broken");
    assert_eq!(h.title(&fine), "[E] Fine");
}

#[test]
fn test_label_add_failure_fails_only_that_album() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (first, _) = explicit_album(&h, &artist, "First");
    let (second, second_track) = explicit_album(&h, &artist, "Second");
    h.catalog.fail_label_add(&first);

    let summary = h.run(&options()).unwrap();

    assert_eq!(summary.album_failures, 1);
    assert!(!h.labeled(&first));
    assert!(h.labeled(&second));
    assert!(h.labeled(&second_track));
}

#[test]
fn test_failing_artist_is_skipped() {
    let h = Harness::new();
    let broken = h.catalog.add_artist("Music", "Broken");
    let fine = h.catalog.add_artist("Music", "Fine");
    explicit_album(&h, &broken, "Hidden");
    let (album, _) = explicit_album(&h, &fine, "Shown");
    h.catalog.fail_album_listing(&broken);

    let summary = h.run(&options()).unwrap();

    assert_eq!(summary.album_failures, 0);
    assert_eq!(h.title(&album), "[E] Shown");
}

#[test]
fn test_failing_artists_still_pause() {
    let h = Harness::new();
    for name in ["One", "Two", "Three"] {
        let artist = h.catalog.add_artist("Music", name);
        h.catalog.fail_album_listing(&artist);
    }
    let pacer = Pacer::new(Pacing {
        artist: Duration::from_millis(40),
        ..Pacing::none()
    });
    let store = h.store();
    let started = Instant::now();

    Reconciler::new(&h.catalog, &store, &pacer, &options()).run().unwrap();

    assert!(started.elapsed() >= Duration::from_millis(120));
}

#[test]
fn test_missing_library_is_skipped() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (album, _) = explicit_album(&h, &artist, "One");
    h.catalog.add_artist("Flaky", "Y");
    h.catalog.fail_library("Flaky");

    let run = RunOptions {
        libraries: libraries(&["Flaky", "Nowhere", "Music"]),
        ..options()
    };
    h.run(&run).unwrap();

    assert_eq!(h.title(&album), "[E] One");
}

#[test]
fn test_all_libraries() {
    let h = Harness::new();
    let x = h.catalog.add_artist("Music", "X");
    let y = h.catalog.add_artist("Live", "Y");
    let (x_album, _) = explicit_album(&h, &x, "Studio");
    let (y_album, _) = explicit_album(&h, &y, "Concert");

    let run = RunOptions {
        libraries: LibrarySelection::All,
        ..options()
    };
    h.run(&run).unwrap();

    assert_eq!(h.title(&x_album), "[E] Studio");
    assert_eq!(h.title(&y_album), "[E] Concert");
}

#[test]
fn test_all_libraries_without_music_is_fatal() {
    let h = Harness::new();
    let run = RunOptions {
        libraries: LibrarySelection::All,
        ..options()
    };
    assert!(matches!(h.run(&run), Err(EngineError::NoMusicLibraries)));
}

#[test]
fn test_artist_filter() {
    let h = Harness::new();
    let kept = h.catalog.add_artist("Music", "The Band");
    let other = h.catalog.add_artist("Music", "Someone Else");
    let (kept_album, _) = explicit_album(&h, &kept, "Loud");
    let (other_album, _) = explicit_album(&h, &other, "Also Loud");

    let run = RunOptions {
        artist_filter: Some("band".to_string()),
        ..options()
    };
    h.run(&run).unwrap();

    assert_eq!(h.title(&kept_album), "[E] Loud");
    assert_eq!(h.title(&other_album), "Also Loud");
}

// ===== Title Fallback =====

#[test]
fn test_title_falls_back_to_direct_put() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (album, _) = explicit_album(&h, &artist, "One");
    h.catalog.ignore_field_edits(true);

    h.run(&options()).unwrap();

    assert_eq!(h.title(&album), "[E] One");
    assert!(h
        .catalog
        .mutations()
        .iter()
        .any(|m| matches!(m, Mutation::PutMetadata { key, .. } if *key == album)));
}

#[test]
fn test_unverified_title_is_not_fatal() {
    let h = Harness::new();
    let artist = h.catalog.add_artist("Music", "X");
    let (album, track) = explicit_album(&h, &artist, "One");
    h.catalog.ignore_field_edits(true);
    h.catalog.reject_direct_put(true);

    let summary = h.run(&options()).unwrap();

    assert_eq!(summary.album_failures, 0);
    assert_eq!(h.title(&album), "One");
    assert!(h.labeled(&album));
    assert!(h.labeled(&track));
}
