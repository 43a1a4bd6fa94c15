//! Recorder configuration, loaded once before the core starts
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::RecorderError;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const DEFAULT_BUFFER_SIZE: usize = 60;
pub const DEFAULT_MOTION_COMPARE_PAST: usize = 10;
pub const DEFAULT_RECORD_MIN_FRAMES: usize = 50;
pub const DEFAULT_ANALYSIS_SIZE: (u32, u32) = (160, 120);
pub const DEFAULT_THRESHOLD: f64 = 3.0;
pub const DEFAULT_FRAME_RATE: f64 = 30.0;
const DEFAULT_SAVE_LOCATION: &str = "moverecs";

/// Immutable once the recorder is built. Every field has a default so a
/// partial YAML file is enough.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Ring capacity N, in frames.
    pub buffer_size: usize,
    /// How many ticks back the motion comparison looks.
    pub motion_compare_past: usize,
    /// Pre-trigger frames kept in every clip, counting the triggering frame.
    /// Defaults to the whole ring.
    pub history_span: Option<usize>,
    /// Frames recorded after the last trigger.
    pub record_min_frames: usize,
    pub analysis_width: u32,
    pub analysis_height: u32,
    /// Motion threshold per analysis pixel.
    pub threshold: f64,
    /// Frame rate written into the clips.
    pub frame_rate: f64,
    pub save_location: PathBuf,
    pub verbose: bool,
    pub headless: bool,
    pub show_difference: bool,
    /// Hand every clip to its own writer thread.
    pub threaded_writer: bool,
    /// Burn the capture time into recorded frames.
    pub overlay: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            motion_compare_past: DEFAULT_MOTION_COMPARE_PAST,
            history_span: None,
            record_min_frames: DEFAULT_RECORD_MIN_FRAMES,
            analysis_width: DEFAULT_ANALYSIS_SIZE.0,
            analysis_height: DEFAULT_ANALYSIS_SIZE.1,
            threshold: DEFAULT_THRESHOLD,
            frame_rate: DEFAULT_FRAME_RATE,
            save_location: PathBuf::from(DEFAULT_SAVE_LOCATION),
            verbose: false,
            headless: false,
            show_difference: false,
            threaded_writer: false,
            overlay: true,
        }
    }
}

impl RecorderConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RecorderError> {
        serde_yml::from_str(yaml).map_err(|e| RecorderError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| RecorderError::Config(format!("{}: {e}", path.display())))?;
        serde_yml::from_reader(file)
            .map_err(|e| RecorderError::Config(format!("{}: {e}", path.display())))
    }

    pub fn history_span(&self) -> usize {
        self.history_span.unwrap_or(self.buffer_size)
    }

    pub fn analysis_pixels(&self) -> u64 {
        self.analysis_width as u64 * self.analysis_height as u64
    }

    /// Absolute threshold on the motion score.
    pub fn motion_threshold(&self) -> f64 {
        self.threshold * self.analysis_pixels() as f64
    }

    /// Frames a clip holds when triggered once.
    pub fn session_length(&self) -> usize {
        self.history_span() + self.record_min_frames
    }

    /// The drain cursor moves in lockstep with the write cursor, so it stays
    /// `history_span - 1` slots behind it for the whole session. That is safe
    /// for any session length as long as the history fits in the ring.
    pub fn validate(&self) -> Result<(), RecorderError> {
        let invalid = |msg: String| -> Result<(), RecorderError> {
            Err(RecorderError::InvalidBufferConfiguration(msg))
        };
        let n = self.buffer_size;
        let lag = self.motion_compare_past;
        let history = self.history_span();

        if n < 2 {
            return invalid(format!("buffer_size must be at least 2 (got {n})"));
        }
        if lag < 1 || lag >= n {
            return invalid(format!(
                "motion_compare_past must satisfy 1 <= lag < buffer_size (got {lag}, buffer_size {n})"
            ));
        }
        if history < 1 || history > n {
            return invalid(format!(
                "history_span must satisfy 1 <= history_span <= buffer_size (got {history}, buffer_size {n})"
            ));
        }
        if self.analysis_width == 0 || self.analysis_height == 0 {
            return invalid(format!(
                "analysis resolution must be non-zero (got {}x{})",
                self.analysis_width, self.analysis_height
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return invalid(format!("threshold must be a non-negative number (got {})", self.threshold));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return invalid(format!("frame_rate must be positive (got {})", self.frame_rate));
        }
        Ok(())
    }
}
