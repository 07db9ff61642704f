use nalgebra as na;
use serde::{Deserialize, Serialize};
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug {}

/// Left-top-width-height format, contains left top corner and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltwh;
impl BBoxFormat for Ltwh {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BBox<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq>(
    [f32; 4],
    PhantomData<F>,
);

impl<F: BBoxFormat + Serialize + Deserialize<'static> + PartialEq> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }
}

impl BBox<Ltwh> {
    #[inline]
    pub fn ltwh(left: f32, top: f32, width: f32, height: f32) -> Self {
        BBox([left, top, width, height], Default::default())
    }

    #[inline(always)]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(self.0[0] + self.0[2] / 2.0, self.0[1] + self.0[3] / 2.0)
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        let [l, t, w, h] = self.0;

        BBox::ltrb(l, t, l + w, t + h)
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        BBox([left, top, right, bottom], Default::default())
    }

    #[inline(always)]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new((self.0[0] + self.0[2]) / 2.0, (self.0[1] + self.0[3]) / 2.0)
    }

    #[inline]
    pub fn as_ltwh(&self) -> BBox<Ltwh> {
        let [l, t, r, b] = self.0;

        BBox::ltwh(l, t, r - l, b - t)
    }
}

/// Where a tracker reports a track: either the center directly or a box.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Center([f32; 2]),
    Ltrb([f32; 4]),
    Ltwh([f32; 4]),
}

impl Location {
    pub fn center(&self) -> na::Point2<f32> {
        match self {
            Location::Center([x, y]) => na::Point2::new(*x, *y),
            Location::Ltrb([l, t, r, b]) => BBox::ltrb(*l, *t, *r, *b).center(),
            Location::Ltwh([l, t, w, h]) => BBox::ltwh(*l, *t, *w, *h).center(),
        }
    }
}

impl From<BBox<Ltrb>> for Location {
    fn from(bbox: BBox<Ltrb>) -> Self {
        Location::Ltrb(*bbox.as_slice())
    }
}

impl From<BBox<Ltwh>> for Location {
    fn from(bbox: BBox<Ltwh>) -> Self {
        Location::Ltwh(*bbox.as_slice())
    }
}

impl From<na::Point2<f32>> for Location {
    fn from(p: na::Point2<f32>) -> Self {
        Location::Center([p.x, p.y])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_agree_across_formats() {
        let ltrb = BBox::ltrb(10.0, 20.0, 30.0, 60.0);
        let ltwh = ltrb.as_ltwh();

        assert_eq!(ltwh.as_slice(), &[10.0, 20.0, 20.0, 40.0]);
        assert_eq!(ltrb.center(), na::Point2::new(20.0, 40.0));
        assert_eq!(Location::from(ltwh).center(), na::Point2::new(20.0, 40.0));
    }

    #[test]
    fn location_from_json() {
        let loc: Location = serde_json::from_str(r#"{"center":[3.0,4.0]}"#).unwrap();
        assert_eq!(loc.center(), na::Point2::new(3.0, 4.0));

        let loc: Location = serde_json::from_str(r#"{"ltrb":[0.0,0.0,4.0,2.0]}"#).unwrap();
        assert_eq!(loc.center(), na::Point2::new(2.0, 1.0));
    }
}
