use std::fmt;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::math;

/// Per-tick behavior classification of one track.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Verdict {
    #[default]
    None,
    Running,
    Loitering,
}

impl Verdict {
    #[inline]
    pub fn is_suspicious(&self) -> bool {
        !matches!(self, Verdict::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::None => "None",
            Verdict::Running => "Running",
            Verdict::Loitering => "Loitering",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Windows shorter than this are not classified.
    pub min_positions: usize,
    /// Mean step length (px per tick) above which a track is running.
    pub speed_threshold: f32,
    /// Mean step length below which a track may be loitering.
    pub loiter_speed_threshold: f32,
    /// Minimal window length required for loitering.
    pub loiter_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_positions: 5,
            speed_threshold: 10.0,
            loiter_speed_threshold: 1.0,
            loiter_window: 30,
        }
    }
}

/// Stateless trajectory classifier.
#[derive(Debug, Clone, Default)]
pub struct BehaviorClassifier {
    config: ClassifierConfig,
}

impl BehaviorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, window: &[na::Point2<f32>]) -> Verdict {
        if window.len() < self.config.min_positions.max(2) {
            return Verdict::None;
        }

        let avg_speed = match math::mean_displacement(window) {
            Some(speed) => speed,
            None => return Verdict::None,
        };

        if avg_speed > self.config.speed_threshold {
            Verdict::Running
        } else if avg_speed < self.config.loiter_speed_threshold
            && window.len() >= self.config.loiter_window
        {
            Verdict::Loitering
        } else {
            Verdict::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize, step: f32) -> Vec<na::Point2<f32>> {
        (0..n)
            .map(|i| na::Point2::new(i as f32 * step, 0.0))
            .collect()
    }

    #[test]
    fn short_window_is_none() {
        let c = BehaviorClassifier::default();

        for n in 0..5 {
            assert_eq!(c.classify(&line(n, 100.0)), Verdict::None);
            assert_eq!(c.classify(&line(n, 0.0)), Verdict::None);
        }
    }

    #[test]
    fn stationary_full_window_loiters() {
        let c = BehaviorClassifier::default();
        let window = vec![na::Point2::new(4.0, 0.0); 30];

        assert_eq!(c.classify(&window), Verdict::Loitering);
    }

    #[test]
    fn stationary_partial_window_is_none() {
        let c = BehaviorClassifier::default();
        let window = vec![na::Point2::new(4.0, 0.0); 29];

        assert_eq!(c.classify(&window), Verdict::None);
    }

    #[test]
    fn fast_steps_run() {
        let c = BehaviorClassifier::default();

        assert_eq!(c.classify(&line(5, 20.0)), Verdict::Running);
        assert_eq!(c.classify(&line(30, 20.0)), Verdict::Running);
    }

    #[test]
    fn thresholds_are_strict() {
        let c = BehaviorClassifier::default();

        // exactly 10 px per tick is not running
        assert_eq!(c.classify(&line(6, 10.0)), Verdict::None);
        // exactly 1 px per tick is not loitering
        assert_eq!(c.classify(&line(30, 1.0)), Verdict::None);
    }

    #[test]
    fn thresholds_are_injected() {
        let c = BehaviorClassifier::new(ClassifierConfig {
            min_positions: 3,
            speed_threshold: 2.0,
            loiter_speed_threshold: 0.5,
            loiter_window: 3,
        });

        assert_eq!(c.classify(&line(3, 3.0)), Verdict::Running);
        assert_eq!(c.classify(&line(3, 0.0)), Verdict::Loitering);
    }
}
