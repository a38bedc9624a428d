//! Request pacing against the media server.
//!
//! Four independent delays gate the run: after each API-affecting call, after
//! each track, after each album and after each artist. They apply whether or
//! not anything changed, bounding the request rate of a long batch.

use std::thread;
use std::time::Duration;

pub const DEFAULT_DELAY_AFTER_API_CALL: f64 = 0.1;
pub const DEFAULT_DELAY_AFTER_TRACK: f64 = 0.2;
pub const DEFAULT_DELAY_AFTER_ALBUM: f64 = 0.5;
pub const DEFAULT_DELAY_AFTER_ARTIST: f64 = 1.0;

/// Delay durations for each pacing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub api_call: Duration,
    pub track: Duration,
    pub album: Duration,
    pub artist: Duration,
}

impl Pacing {
    /// No delays at all; used by tests and in-memory catalogs.
    pub fn none() -> Self {
        Self {
            api_call: Duration::ZERO,
            track: Duration::ZERO,
            album: Duration::ZERO,
            artist: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            api_call: Duration::from_secs_f64(DEFAULT_DELAY_AFTER_API_CALL),
            track: Duration::from_secs_f64(DEFAULT_DELAY_AFTER_TRACK),
            album: Duration::from_secs_f64(DEFAULT_DELAY_AFTER_ALBUM),
            artist: Duration::from_secs_f64(DEFAULT_DELAY_AFTER_ARTIST),
        }
    }
}

/// Blocks the calling thread according to a [`Pacing`].
#[derive(Debug, Clone)]
pub struct Pacer {
    pacing: Pacing,
}

impl Pacer {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    pub fn after_api_call(&self) {
        pause(self.pacing.api_call);
    }

    pub fn after_track(&self) {
        pause(self.pacing.track);
    }

    pub fn after_album(&self) {
        pause(self.pacing.album);
    }

    pub fn after_artist(&self) {
        pause(self.pacing.artist);
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pacing_matches_documented_values() {
        let pacing = Pacing::default();
        assert_eq!(pacing.api_call, Duration::from_millis(100));
        assert_eq!(pacing.track, Duration::from_millis(200));
        assert_eq!(pacing.album, Duration::from_millis(500));
        assert_eq!(pacing.artist, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_pacing_does_not_block() {
        let pacer = Pacer::new(Pacing::none());
        let start = std::time::Instant::now();
        for _ in 0..1000 {
            pacer.after_api_call();
            pacer.after_track();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
