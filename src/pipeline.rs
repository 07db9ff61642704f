use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra as na;
use tracing::{debug, info};

use crate::audit::{AuditLog, FileLogStore, LogEntry, LogStore};
use crate::classifier::{BehaviorClassifier, Verdict};
use crate::clip::ClipRecorder;
use crate::config::Config;
use crate::engine::TrackEventEngine;
use crate::error::Result;
use crate::frame::Frame;
use crate::sink::ClipSink;
use crate::smoother::Smoother;
use crate::stats::{Counter, StatsHandle, StatsSnapshot};
use crate::trajectory::TrajectoryStore;
use crate::TrackId;

/// Cooperative stop signal, checked once per tick.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub track_id: TrackId,
    pub position: na::Point2<f32>,
    pub verdict: Verdict,
}

/// What happened to every confirmed track during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub tracks: Vec<TrackReport>,
    pub forgotten: Vec<TrackId>,
}

impl TickReport {
    pub fn verdict(&self, track_id: TrackId) -> Option<Verdict> {
        self.tracks
            .iter()
            .find(|t| t.track_id == track_id)
            .map(|t| t.verdict)
    }
}

/// Feeds tracker output through smoothing, classification and the event
/// engine, one frame at a time.
pub struct Pipeline {
    config: Config,
    smoother: Smoother,
    trajectories: TrajectoryStore,
    classifier: BehaviorClassifier,
    engine: TrackEventEngine,
    tick: u64,
}

impl Pipeline {
    pub fn new(config: Config, sink: Box<dyn ClipSink>, store: Box<dyn LogStore>) -> Result<Self> {
        config.validate()?;

        let recorder = ClipRecorder::new(&config.output_directory, sink, config.write_mode);
        let audit = AuditLog::new(store, config.persistence);

        Ok(Self {
            smoother: Smoother::new(config.smoothing_window),
            trajectories: TrajectoryStore::new(config.behavior_window),
            classifier: BehaviorClassifier::new(config.classifier()),
            engine: TrackEventEngine::new(config.engine(), recorder, audit),
            tick: 0,
            config,
        })
    }

    /// Pipeline writing clips with the default sink and the audit log to
    /// `config.log_path`.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = FileLogStore::open(&config.log_path)?;

        Self::new(config, default_sink(), Box::new(store))
    }

    pub fn tick(&mut self, frame: &Frame) -> TickReport {
        self.tick += 1;
        self.engine.stats().inc(Counter::Ticks);

        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        for &track_id in &frame.lost {
            self.forget(track_id);
            report.forgotten.push(track_id);
        }

        let dims = frame.dims();

        for det in frame.confirmed() {
            let track_id = det.track_id;
            let position = self.smoother.observe(track_id, det.center());
            self.trajectories.push(track_id, position);

            let verdict = self.classifier.classify(&self.trajectories.window(track_id));
            self.engine
                .observe(track_id, verdict, frame.timestamp, self.tick, dims);

            report.tracks.push(TrackReport {
                track_id,
                position,
                verdict,
            });
        }

        self.engine.advance(frame.timestamp, &frame.image);

        for track_id in self.engine.stale_tracks(self.tick, self.config.track_max_age) {
            debug!(%track_id, "track aged out");
            self.forget(track_id);
            report.forgotten.push(track_id);
        }

        report
    }

    /// Releases everything kept for the track; unknown ids are ignored.
    pub fn forget(&mut self, track_id: TrackId) {
        self.engine.forget(track_id);
        self.smoother.forget(track_id);
        self.trajectories.forget(track_id);
    }

    /// Processes frames until the input ends or `stop` fires, then shuts
    /// down. Returns the number of ticks processed.
    pub fn run<I>(&mut self, frames: I, stop: &StopToken) -> u64
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut processed = 0;

        for frame in frames {
            if stop.is_stopped() {
                info!("stop requested");
                break;
            }

            self.tick(&frame);
            processed += 1;
        }

        self.shutdown();
        info!(ticks = processed, "pipeline finished");

        processed
    }

    /// Forgets every live track so no clip is left open.
    pub fn shutdown(&mut self) {
        for track_id in self.engine.live_tracks() {
            self.forget(track_id);
        }

        self.engine.shutdown();
    }

    #[inline]
    pub fn stats(&self) -> StatsHandle {
        self.engine.stats().handle()
    }

    #[inline]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.engine.stats().snapshot()
    }

    #[inline]
    pub fn audit_entries(&self) -> &[LogEntry] {
        self.engine.audit().entries()
    }

    pub fn clip_files(&self) -> Result<Vec<String>> {
        self.engine.recorder().clip_files()
    }

    #[inline]
    pub fn engine(&self) -> &TrackEventEngine {
        &self.engine
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Behavior window of the track, oldest first.
    pub fn trajectory(&self, track_id: TrackId) -> Vec<na::Point2<f32>> {
        self.trajectories.window(track_id)
    }
}

#[cfg(not(feature = "opencv"))]
fn default_sink() -> Box<dyn ClipSink> {
    Box::new(crate::sink::Y4mSink)
}

#[cfg(feature = "opencv")]
fn default_sink() -> Box<dyn ClipSink> {
    Box::new(crate::sink::OpencvSink)
}
