use std::collections::HashMap;

use nalgebra as na;

use crate::rolling_avg::RollingAvg;
use crate::TrackId;

/// Per-track moving-average filter over raw detection centers.
#[derive(Debug)]
pub struct Smoother {
    window: usize,
    tracks: HashMap<TrackId, RollingAvg>,
}

impl Smoother {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            tracks: HashMap::new(),
        }
    }

    /// Feeds a raw position and returns the stabilized one.
    pub fn observe(&mut self, track_id: TrackId, raw: na::Point2<f32>) -> na::Point2<f32> {
        let window = self.window;

        self.tracks
            .entry(track_id)
            .or_insert_with(|| RollingAvg::new(window))
            .push(raw)
    }

    /// Number of raw positions currently buffered for the track.
    pub fn window_len(&self, track_id: TrackId) -> usize {
        self.tracks.get(&track_id).map_or(0, RollingAvg::num_points)
    }

    pub fn forget(&mut self, track_id: TrackId) {
        self.tracks.remove(&track_id);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
