use std::fs;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::audit::PersistencePolicy;
use crate::classifier::ClassifierConfig;
use crate::clip::WriteMode;
use crate::engine::EngineConfig;
use crate::error::{Error, Result};

/// Every tunable of the pipeline. The thresholds were picked empirically for
/// one camera setup; expect to retune them for others.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Raw positions averaged into one smoothed position.
    pub smoothing_window: usize,
    /// Smoothed positions kept for classification.
    pub behavior_window: usize,
    /// Positions needed before any verdict is given.
    pub min_positions: usize,
    /// px per tick
    pub speed_threshold: f32,
    /// px per tick
    pub loiter_speed_threshold: f32,
    /// seconds
    pub clip_duration: f64,
    pub output_directory: PathBuf,
    pub log_path: PathBuf,
    /// Frame rate stamped into clip files.
    pub frame_rate: f64,
    /// Ticks a track may stay unseen before it is forgotten.
    pub track_max_age: u64,
    pub write_mode: WriteMode,
    pub persistence: PersistencePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            behavior_window: 30,
            min_positions: 5,
            speed_threshold: 10.0,
            loiter_speed_threshold: 1.0,
            clip_duration: 5.0,
            output_directory: PathBuf::from("suspicious_clips"),
            log_path: PathBuf::from("suspicious_log.txt"),
            frame_rate: 30.0,
            track_max_age: 30,
            write_mode: WriteMode::default(),
            persistence: PersistencePolicy::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.smoothing_window == 0 {
            return Err(Error::Config("smoothing_window must be at least 1".into()));
        }

        if self.behavior_window < 2 {
            return Err(Error::Config("behavior_window must be at least 2".into()));
        }

        if self.min_positions > self.behavior_window {
            return Err(Error::Config(format!(
                "min_positions ({}) exceeds behavior_window ({})",
                self.min_positions, self.behavior_window
            )));
        }

        let positive = [
            ("speed_threshold", self.speed_threshold as f64),
            ("loiter_speed_threshold", self.loiter_speed_threshold as f64),
            ("clip_duration", self.clip_duration),
            ("frame_rate", self.frame_rate),
        ];

        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("{} must be positive, got {}", name, value)));
            }
        }

        if let WriteMode::Queued { depth: 0 } = self.write_mode {
            return Err(Error::Config("write queue depth must be at least 1".into()));
        }

        Ok(())
    }

    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig {
            min_positions: self.min_positions,
            speed_threshold: self.speed_threshold,
            loiter_speed_threshold: self.loiter_speed_threshold,
            loiter_window: self.behavior_window,
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            clip_duration: self.clip_duration,
            frame_rate: self.frame_rate,
        }
    }
}
