//! Lagged-frame motion measurement
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::RecorderConfig;
use crate::frame::Frame;
use crate::motion::preprocessing;
use image::GrayImage;
use ndarray::{Array2, Zip};
use std::fmt;

/// Sum of absolute differences between two mean-normalised projections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionScore {
    total: f64,
    pixels: u64,
}

impl MotionScore {
    pub fn new(total: f64, pixels: u64) -> Self {
        Self { total, pixels }
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Score normalised by the analysis pixel count.
    pub fn per_pixel(&self) -> f64 {
        if self.pixels == 0 {
            0.0
        } else {
            self.total / self.pixels as f64
        }
    }

    pub fn exceeds(&self, threshold: f64) -> bool {
        self.total > threshold
    }
}

impl fmt::Display for MotionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.per_pixel())
    }
}

/// Stateless: it only measures. Whether a score counts as motion is the
/// recording controller's call.
#[derive(Debug, Clone)]
pub struct MotionDetector {
    width: u32,
    height: u32,
}

impl MotionDetector {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(config.analysis_width, config.analysis_height)
    }

    pub fn analysis_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn normalised(&self, frame: &Frame) -> Array2<f32> {
        preprocessing::subtract_mean(preprocessing::project(
            &frame.image,
            self.width,
            self.height,
        ))
    }

    fn abs_difference(&self, a: &Frame, b: &Frame) -> Array2<f32> {
        let mut diff = self.normalised(a);
        let other = self.normalised(b);
        Zip::from(&mut diff).and(&other).par_for_each(|d, &o| {
            *d = (*d - o).abs();
        });
        diff
    }

    pub fn score(&self, current: &Frame, past: &Frame) -> MotionScore {
        let diff = self.abs_difference(current, past);
        let total: f64 = diff.iter().map(|&v| v as f64).sum();
        MotionScore::new(total, self.width as u64 * self.height as u64)
    }

    /// Per-pixel difference at analysis resolution, for the difference preview.
    pub fn difference_image(&self, current: &Frame, past: &Frame) -> GrayImage {
        let diff = self.abs_difference(current, past);
        let pixels: Vec<u8> = diff.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect();
        GrayImage::from_raw(self.width, self.height, pixels)
            .expect("Difference buffer matches analysis size")
    }
}
