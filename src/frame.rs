use ndarray::Array3;

use crate::detection::Detection;
use crate::TrackId;

/// Frame pixels, rows x cols x 3 channels in BGR order.
pub type Image = Array3<u8>;

/// One tick of input: the frame, the tracker output for it and the tracks
/// the tracker gave up on since the previous tick.
pub struct Frame {
    /// Stream time in seconds.
    pub timestamp: f64,
    pub image: Image,
    pub detections: Vec<Detection>,
    pub lost: Vec<TrackId>,
}

impl Frame {
    pub fn new(timestamp: f64, image: Image, detections: Vec<Detection>) -> Self {
        Self {
            timestamp,
            image,
            detections,
            lost: Vec::new(),
        }
    }

    /// Blank frame of the given size, for replaying detections without video.
    pub fn blank(timestamp: f64, dims: (u32, u32), detections: Vec<Detection>) -> Self {
        let (w, h) = dims;

        Self::new(timestamp, Array3::zeros((h as usize, w as usize, 3)), detections)
    }

    pub fn with_lost(mut self, lost: Vec<TrackId>) -> Self {
        self.lost = lost;
        self
    }

    /// (width, height) in pixels
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        let (rows, cols, _) = self.image.dim();

        (cols as u32, rows as u32)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Detections the tracker has confirmed, in input order.
    #[inline]
    pub fn confirmed(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.confirmed)
    }
}
