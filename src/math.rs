use nalgebra as na;

/// Arithmetic mean of the points, `None` for an empty input.
pub fn mean_point<'a, I>(points: I) -> Option<na::Point2<f32>>
where
    I: IntoIterator<Item = &'a na::Point2<f32>>,
{
    let mut sum = na::Vector2::zeros();
    let mut count = 0usize;

    for p in points {
        sum += p.coords;
        count += 1;
    }

    if count == 0 {
        return None;
    }

    Some((sum / count as f32).into())
}

/// Euclidean distances between consecutive points, in input order.
pub fn displacements(points: &[na::Point2<f32>]) -> impl Iterator<Item = f32> + '_ {
    points.windows(2).map(|w| na::distance(&w[0], &w[1]))
}

/// Mean step length over the sequence, `None` when there is no step.
pub fn mean_displacement(points: &[na::Point2<f32>]) -> Option<f32> {
    if points.len() < 2 {
        return None;
    }

    let total: f32 = displacements(points).sum();

    Some(total / (points.len() - 1) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_points() {
        let pts = [na::Point2::new(0.0, 0.0), na::Point2::new(4.0, 2.0)];
        assert_eq!(mean_point(&pts), Some(na::Point2::new(2.0, 1.0)));
        assert_eq!(mean_point(&[]), None);
    }

    #[test]
    fn mean_step_length() {
        let pts = [
            na::Point2::new(0.0, 0.0),
            na::Point2::new(3.0, 4.0),
            na::Point2::new(3.0, 4.0),
        ];

        assert_eq!(mean_displacement(&pts), Some(2.5));
        assert_eq!(mean_displacement(&pts[..1]), None);
    }
}
