//! Explicitness classification from file system naming.
//!
//! Album verdicts come from the directory holding a track file, track verdicts
//! from the file's base name. Nothing else is consulted: labels and titles on
//! the server may be stale or hand-edited and must not feed back into the
//! verdict.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Standalone word "explicit", any case.
static EXPLICIT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bexplicit\b").unwrap());

/// Lowercase marker searched for in path segments.
const MARKER_LOWER: &str = "[e]";

/// True if a single path segment names explicit content.
pub fn segment_is_explicit(segment: &str) -> bool {
    segment.to_lowercase().contains(MARKER_LOWER) || EXPLICIT_WORD.is_match(segment)
}

/// Last component of a path. Both separators are accepted since the server
/// may run on a different platform than this tool.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Name of the directory directly containing the file, or "" if none.
fn parent_dir_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(idx) => file_name(&path[..idx]),
        None => "",
    }
}

/// Track verdict: explicit if any backing file's base name is explicit.
pub fn classify_track(paths: &[String]) -> bool {
    if paths.is_empty() {
        debug!("track filename check: no media parts found -> clean");
        return false;
    }
    for path in paths {
        let base = file_name(path);
        let hit = segment_is_explicit(base);
        debug!(
            "track filename check: {} -> {}",
            base,
            if hit { "EXPLICIT" } else { "clean" }
        );
        if hit {
            return true;
        }
    }
    false
}

/// Album verdict from the parent directory of one representative track file.
pub fn classify_album(sample_path: Option<&str>) -> bool {
    match sample_path {
        Some(path) => {
            let dir = parent_dir_name(path);
            let hit = segment_is_explicit(dir);
            debug!(
                "album folder check: {} -> {}",
                dir,
                if hit { "EXPLICIT" } else { "clean" }
            );
            hit
        }
        None => {
            debug!("album folder check: no paths found -> clean");
            false
        }
    }
}
