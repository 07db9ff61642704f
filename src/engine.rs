use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::audit::{AuditLog, LogEntry};
use crate::classifier::Verdict;
use crate::clip::{ClipHandle, ClipRecorder, WriteStatus};
use crate::error::Error;
use crate::frame::Image;
use crate::stats::{Counter, Stats};
use crate::TrackId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recording {
    pub handle: ClipHandle,
    pub started_at: f64,
}

/// Everything the engine remembers about one live track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEventState {
    /// Last verdict written to the audit log; `None` verdicts never land here.
    pub last_logged: Option<Verdict>,
    pub recording: Option<Recording>,
    pub last_seen: u64,
}

impl TrackEventState {
    fn new(tick: u64) -> Self {
        Self {
            last_logged: None,
            recording: None,
            last_seen: tick,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        if self.recording.is_some() {
            Phase::Recording
        } else {
            Phase::Idle
        }
    }

    #[inline]
    pub fn is_suspicious(&self) -> bool {
        self.last_logged.map_or(false, |v| v.is_suspicious())
    }
}

/// Side effects requested by a verdict for one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub log: Option<Verdict>,
    pub start_recording: bool,
}

/// Decides what a fresh verdict means for the track.
pub fn on_verdict(state: &TrackEventState, verdict: Verdict) -> Transition {
    if !verdict.is_suspicious() || state.last_logged == Some(verdict) {
        return Transition::default();
    }

    Transition {
        log: Some(verdict),
        start_recording: state.phase() == Phase::Idle,
    }
}

/// A clip has outlived its budget once strictly more than `clip_duration`
/// seconds passed since it started.
#[inline]
pub fn expired(recording: &Recording, now: f64, clip_duration: f64) -> bool {
    now - recording.started_at > clip_duration
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Maximal clip length in seconds.
    pub clip_duration: f64,
    /// Frame rate written into clip files.
    pub frame_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clip_duration: 5.0,
            frame_rate: 30.0,
        }
    }
}

/// Turns verdict transitions into audit entries and clip lifetimes.
///
/// Every failure is confined to the track it happened on: it is logged,
/// counted in [`Stats`] and processing goes on.
pub struct TrackEventEngine {
    config: EngineConfig,
    tracks: HashMap<TrackId, TrackEventState>,
    recorder: ClipRecorder,
    audit: AuditLog,
    stats: Stats,
}

impl TrackEventEngine {
    pub fn new(config: EngineConfig, recorder: ClipRecorder, audit: AuditLog) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            recorder,
            audit,
            stats: Stats::new(),
        }
    }

    /// Applies this tick's verdict for the track.
    pub fn observe(
        &mut self,
        track_id: TrackId,
        verdict: Verdict,
        now: f64,
        tick: u64,
        dims: (u32, u32),
    ) -> Transition {
        let state = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| TrackEventState::new(tick));
        state.last_seen = tick;

        let transition = on_verdict(state, verdict);

        if let Some(verdict) = transition.log {
            state.last_logged = Some(verdict);
            info!(%track_id, %verdict, "suspicious behavior");

            if let Err(err) = self.audit.append(LogEntry::new(track_id, verdict)) {
                self.stats.inc(Counter::LogFailures);
                warn!(%track_id, "audit append failed: {}", err);
            }
        }

        if transition.start_recording {
            match self.recorder.open(track_id, dims, self.config.frame_rate) {
                Ok(handle) => {
                    state.recording = Some(Recording {
                        handle,
                        started_at: now,
                    });
                    self.stats.inc(Counter::ClipsOpened);
                }
                Err(err) => {
                    self.stats.inc(Counter::ClipsFailed);
                    warn!(%track_id, "recording skipped: {}", err);
                }
            }
        }

        if transition.log.is_some() {
            self.update_suspicious();
        }

        transition
    }

    /// Closes clips that ran out of time, then feeds the frame to the rest.
    pub fn advance(&mut self, now: f64, image: &Image) {
        let clip_duration = self.config.clip_duration;

        for (&track_id, state) in self.tracks.iter_mut() {
            let recording = match state.recording {
                Some(recording) => recording,
                None => continue,
            };

            if expired(&recording, now, clip_duration) {
                state.recording = None;
                debug!(%track_id, "clip duration reached");

                if let Err(err) = self.recorder.close(recording.handle) {
                    self.stats.inc(Counter::WriteErrors);
                    warn!(%track_id, "degraded recording: {}", err);
                }

                continue;
            }

            match self.recorder.write(recording.handle, image) {
                Ok(WriteStatus::Written) => {}
                Ok(WriteStatus::Dropped) => self.stats.inc(Counter::DroppedFrames),
                Err(err) => {
                    state.recording = None;
                    self.stats.inc(Counter::WriteErrors);
                    warn!(%track_id, "degraded recording, clip dropped: {}", err);

                    // writer already failed; only the release matters here
                    let _ = self.recorder.close(recording.handle);
                }
            }
        }
    }

    /// Drops every trace of the track, closing its clip first.
    pub fn forget(&mut self, track_id: TrackId) {
        let state = match self.tracks.remove(&track_id) {
            Some(state) => state,
            None => return,
        };

        if let Some(recording) = state.recording {
            match self.recorder.close(recording.handle) {
                Ok(_) => {}
                Err(Error::WriteError { reason, .. }) => {
                    self.stats.inc(Counter::WriteErrors);
                    warn!(%track_id, "clip finalized with errors: {}", reason);
                }
                Err(err) => warn!(%track_id, "clip close failed: {}", err),
            }
        }

        debug!(%track_id, "track forgotten");

        if state.is_suspicious() {
            self.update_suspicious();
        }
    }

    /// Tracks not observed during the last `max_age` ticks.
    pub fn stale_tracks(&self, tick: u64, max_age: u64) -> Vec<TrackId> {
        self.tracks
            .iter()
            .filter(|(_, s)| tick.saturating_sub(s.last_seen) > max_age)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Forgets every track and flushes the audit log.
    pub fn shutdown(&mut self) {
        for track_id in self.live_tracks() {
            self.forget(track_id);
        }

        // clips the engine lost track of, if any
        self.recorder.close_all();

        if let Err(err) = self.audit.flush() {
            self.stats.inc(Counter::LogFailures);
            warn!("audit flush failed on shutdown: {}", err);
        }
    }

    pub fn live_tracks(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    #[inline]
    pub fn state(&self, track_id: TrackId) -> Option<&TrackEventState> {
        self.tracks.get(&track_id)
    }

    #[inline]
    pub fn phase(&self, track_id: TrackId) -> Option<Phase> {
        self.tracks.get(&track_id).map(TrackEventState::phase)
    }

    #[inline]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    #[inline]
    pub fn recorder(&self) -> &ClipRecorder {
        &self.recorder
    }

    #[inline]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn update_suspicious(&self) {
        let count = self.tracks.values().filter(|s| s.is_suspicious()).count();
        self.stats.set_active_suspicious(count);
    }
}

impl Drop for TrackEventEngine {
    fn drop(&mut self) {
        if !self.tracks.is_empty() {
            self.shutdown();
        }
    }
}
