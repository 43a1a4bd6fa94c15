//! SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Local};
use image::RgbImage;

/// Format of the timestamp burned into recorded and previewed frames.
pub const OVERLAY_TIME_FORMAT: &str = "%d %b %Y - %H:%M:%S";

/// Format of the clip names, one clip per trigger.
pub const SESSION_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Represents a single captured frame. Once stored in the ring it is only ever
/// replaced as a whole; anything leaving the ring is a clone.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
    /// Tick number assigned by the recorder (1-based). Zero until stored.
    pub seq: u64,
}

impl Frame {
    /// Wraps an image captured right now.
    pub fn capture(image: RgbImage) -> Self {
        Self::new(image, Local::now())
    }

    pub fn new(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Self {
            image,
            captured_at,
            seq: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Human-readable capture time for the overlay.
    pub fn label(&self) -> String {
        self.captured_at.format(OVERLAY_TIME_FORMAT).to_string()
    }
}
