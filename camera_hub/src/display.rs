//! Live preview through ffplay
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::ffmpeg::child_command;
use anyhow::{anyhow, bail, Context, Error};
use image::RgbImage;
use recorder_core::traits::DisplaySink;
use std::io::{self, Write};
use std::process::{Child, ChildStdin, Stdio};

struct Window {
    child: Child,
    stdin: ChildStdin,
    size: (u32, u32),
}

/// Opened lazily on the first image, since the difference preview is smaller
/// than the camera picture. Closing the window (Esc or q) stops the recorder.
pub struct FfplayDisplay {
    title: String,
    frame_rate: f64,
    window: Option<Window>,
}

impl FfplayDisplay {
    pub fn new(title: &str, frame_rate: f64) -> Self {
        Self {
            title: title.to_string(),
            frame_rate,
            window: None,
        }
    }

    fn open(&self, (width, height): (u32, u32)) -> Result<Window, Error> {
        let mut child = child_command("ffplay")
            .args(["-hide_banner", "-loglevel", "error", "-f", "rawvideo"])
            .args(["-pixel_format", "rgb24"])
            .arg("-video_size")
            .arg(format!("{width}x{height}"))
            .arg("-framerate")
            .arg(format!("{}", self.frame_rate))
            .arg("-window_title")
            .arg(&self.title)
            .args(["-i", "pipe:0"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .context("Failed to spawn ffplay")?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to open ffplay stdin"))?;
        Ok(Window {
            child,
            stdin,
            size: (width, height),
        })
    }
}

impl DisplaySink for FfplayDisplay {
    fn show(&mut self, image: &RgbImage) -> Result<bool, Error> {
        if self.window.is_none() {
            self.window = Some(self.open(image.dimensions())?);
        }
        let Some(window) = self.window.as_mut() else {
            return Ok(false);
        };

        if window.size != image.dimensions() {
            bail!(
                "Preview opened at {:?}, got a {:?} image",
                window.size,
                image.dimensions()
            );
        }
        if window.child.try_wait()?.is_some() {
            return Ok(false);
        }
        match window.stdin.write_all(image.as_raw()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(false),
            Err(e) => Err(e).context("Failed to send frame to ffplay"),
        }
    }
}

impl Drop for FfplayDisplay {
    fn drop(&mut self) {
        if let Some(mut window) = self.window.take() {
            let _ = window.child.kill();
            let _ = window.child.wait();
        }
    }
}
