//! Aggregate counters for dashboards.
//!
//! The pipeline is the only writer; any number of [`StatsHandle`]s may read
//! concurrently from other threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_derive::Serialize;

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    active_suspicious_tracks: AtomicU64,
    clips_opened: AtomicU64,
    clips_failed: AtomicU64,
    write_errors: AtomicU64,
    dropped_frames: AtomicU64,
    log_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Ticks,
    ClipsOpened,
    ClipsFailed,
    WriteErrors,
    DroppedFrames,
    LogFailures,
}

/// Writer side, owned by the pipeline.
#[derive(Debug, Default)]
pub struct Stats {
    counters: Arc<Counters>,
}

/// Read-only view that can be sent to another thread.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    counters: Arc<Counters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub active_suspicious_tracks: u64,
    pub clips_opened: u64,
    pub clips_failed: u64,
    pub write_errors: u64,
    pub dropped_frames: u64,
    pub log_failures: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> StatsHandle {
        StatsHandle {
            counters: self.counters.clone(),
        }
    }

    #[inline]
    pub fn inc(&self, counter: Counter) {
        self.atomic(counter).fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_active_suspicious(&self, count: usize) {
        self.counters
            .active_suspicious_tracks
            .store(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        snapshot(&self.counters)
    }

    fn atomic(&self, counter: Counter) -> &AtomicU64 {
        let c = &self.counters;

        match counter {
            Counter::Ticks => &c.ticks,
            Counter::ClipsOpened => &c.clips_opened,
            Counter::ClipsFailed => &c.clips_failed,
            Counter::WriteErrors => &c.write_errors,
            Counter::DroppedFrames => &c.dropped_frames,
            Counter::LogFailures => &c.log_failures,
        }
    }
}

impl StatsHandle {
    pub fn snapshot(&self) -> StatsSnapshot {
        snapshot(&self.counters)
    }

    #[inline]
    pub fn active_suspicious_tracks(&self) -> u64 {
        self.counters.active_suspicious_tracks.load(Ordering::Relaxed)
    }
}

fn snapshot(c: &Counters) -> StatsSnapshot {
    StatsSnapshot {
        ticks: c.ticks.load(Ordering::Relaxed),
        active_suspicious_tracks: c.active_suspicious_tracks.load(Ordering::Relaxed),
        clips_opened: c.clips_opened.load(Ordering::Relaxed),
        clips_failed: c.clips_failed.load(Ordering::Relaxed),
        write_errors: c.write_errors.load(Ordering::Relaxed),
        dropped_frames: c.dropped_frames.load(Ordering::Relaxed),
        log_failures: c.log_failures.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_sees_writer_updates_across_threads() {
        let stats = Stats::new();
        let handle = stats.handle();

        stats.inc(Counter::ClipsOpened);
        stats.inc(Counter::ClipsOpened);
        stats.set_active_suspicious(3);

        let snap = std::thread::spawn(move || handle.snapshot()).join().unwrap();

        assert_eq!(snap.clips_opened, 2);
        assert_eq!(snap.active_suspicious_tracks, 3);
        assert_eq!(snap.write_errors, 0);
    }
}
