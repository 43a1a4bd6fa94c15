//! Collaborator seams of the recorder core.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::frame::Frame;
use anyhow::Error;
use image::RgbImage;
use std::path::Path;

/// Live or recorded video. `Ok(None)` means the stream ended cleanly.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
}

/// One open clip. Frames arrive in recording order.
pub trait OutputSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), Error>;
    /// Finalizes the clip and returns how many frames it holds.
    fn close(self: Box<Self>) -> Result<u64, Error>;
}

pub trait SinkFactory {
    /// `identifier` has no extension. The sink picks its own container.
    fn open(
        &mut self,
        identifier: &Path,
        frame_rate: f64,
        resolution: (u32, u32),
    ) -> Result<Box<dyn OutputSink>, Error>;
}

/// Preview window. Returning `Ok(false)` asks the main loop to stop.
pub trait DisplaySink {
    fn show(&mut self, image: &RgbImage) -> Result<bool, Error>;
}

/// Headless operation.
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _image: &RgbImage) -> Result<bool, Error> {
        Ok(true)
    }
}
