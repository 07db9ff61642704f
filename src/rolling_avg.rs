use crate::circular_queue::CircularQueue;
use crate::math;
use nalgebra as na;

/// Moving average over the last `hcount` raw positions of one track.
#[derive(Debug, Clone)]
pub struct RollingAvg {
    history: CircularQueue<na::Point2<f32>>,
}

impl RollingAvg {
    pub fn new(hcount: usize) -> Self {
        Self {
            history: CircularQueue::with_capacity(hcount.max(1)),
        }
    }

    /// Pushes a raw position and returns the mean of the current window.
    pub fn push(&mut self, pos: na::Point2<f32>) -> na::Point2<f32> {
        self.history.push(pos);

        math::mean_point(self.history.iter()).unwrap_or(pos)
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.history.len()
    }
}
