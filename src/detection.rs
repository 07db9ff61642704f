use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::Location;
use crate::TrackId;

/// One tracker output for a frame: a track identity and where it is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    #[serde(rename = "id")]
    pub track_id: TrackId,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default = "confirmed_default")]
    pub confirmed: bool,
}

fn confirmed_default() -> bool {
    true
}

impl Detection {
    pub fn new<L: Into<Location>>(track_id: TrackId, location: L, confirmed: bool) -> Self {
        Self {
            track_id,
            location: location.into(),
            confirmed,
        }
    }

    /// Confirmed detection at the given center.
    #[inline]
    pub fn at(track_id: TrackId, x: f32, y: f32) -> Self {
        Self::new(track_id, na::Point2::new(x, y), true)
    }

    #[inline(always)]
    pub fn center(&self) -> na::Point2<f32> {
        self.location.center()
    }
}
