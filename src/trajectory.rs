use std::collections::HashMap;

use nalgebra as na;

use crate::circular_queue::CircularQueue;
use crate::TrackId;

/// Behavior windows: the most recent smoothed positions of every live track.
#[derive(Debug)]
pub struct TrajectoryStore {
    capacity: usize,
    tracks: HashMap<TrackId, CircularQueue<na::Point2<f32>>>,
}

impl TrajectoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tracks: HashMap::new(),
        }
    }

    pub fn push(&mut self, track_id: TrackId, pos: na::Point2<f32>) {
        let capacity = self.capacity;

        self.tracks
            .entry(track_id)
            .or_insert_with(|| CircularQueue::with_capacity(capacity))
            .push(pos);
    }

    /// Positions of the track in arrival order. Empty for unknown tracks.
    pub fn window(&self, track_id: TrackId) -> Vec<na::Point2<f32>> {
        self.tracks
            .get(&track_id)
            .map(CircularQueue::to_vec)
            .unwrap_or_default()
    }

    pub fn last(&self, track_id: TrackId) -> Option<na::Point2<f32>> {
        self.tracks.get(&track_id)?.latest().copied()
    }

    pub fn forget(&mut self, track_id: TrackId) {
        self.tracks.remove(&track_id);
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.tracks.contains_key(&track_id)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
