//! Camera or file capture through ffmpeg, decoded to raw rgb24 frames
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::ffmpeg::{child_command, rgb24_frame_size};
use anyhow::{anyhow, Context, Error};
use cfg_if::cfg_if;
use image::RgbImage;
use recorder_core::traits::FrameSource;
use recorder_core::Frame;
use std::ffi::OsString;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Stdio};

/// ffmpeg input format for live cameras on this platform.
fn capture_format() -> &'static str {
    cfg_if! {
        if #[cfg(target_os = "macos")] {
            "avfoundation"
        } else if #[cfg(target_os = "windows")] {
            "dshow"
        } else {
            "v4l2"
        }
    }
}

/// Camera opened when the configuration names none.
pub fn default_device() -> &'static str {
    cfg_if! {
        if #[cfg(target_os = "macos")] {
            "0"
        } else if #[cfg(target_os = "windows")] {
            "video=Integrated Camera"
        } else {
            "/dev/video0"
        }
    }
}

/// An existing regular file is played back at its native rate. Anything
/// else is treated as a camera.
fn decoder_args(input: &str, width: u32, height: u32, frame_rate: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    if Path::new(input).is_file() {
        args.push("-re".into());
    } else {
        args.push("-f".into());
        args.push(capture_format().into());
        args.push("-framerate".into());
        args.push(format!("{frame_rate}").into());
    }
    args.push("-i".into());
    args.push(input.into());
    for arg in ["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-vf"] {
        args.push(arg.into());
    }
    args.push(format!("scale={width}:{height}").into());
    args.push("pipe:1".into());
    args
}

pub struct FfmpegSource {
    input: String,
    width: u32,
    height: u32,
    child: Child,
    reader: BufReader<ChildStdout>,
    frames: u64,
}

impl FfmpegSource {
    pub fn spawn(input: &str, width: u32, height: u32, frame_rate: f64) -> Result<Self, Error> {
        let mut child = child_command("ffmpeg")
            .args(decoder_args(input, width, height, frame_rate))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg for capture")?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to capture stdout from ffmpeg"))?;

        info!("Capturing {} at {}x{}", input, width, height);
        Ok(Self {
            input: input.to_string(),
            width,
            height,
            child,
            reader: BufReader::with_capacity(rgb24_frame_size(width, height), stdout),
            frames: 0,
        })
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut data = vec![0u8; rgb24_frame_size(self.width, self.height)];
        match self.reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                let status = self.child.wait()?;
                if self.frames == 0 || !status.success() {
                    return Err(anyhow!(
                        "ffmpeg stopped delivering frames from {} ({})",
                        self.input,
                        status
                    ));
                }
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read frame from {}", self.input))
            }
        }

        self.frames += 1;
        let image = RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| anyhow!("Frame buffer does not match {}x{}", self.width, self.height))?;
        Ok(Some(Frame::capture(image)))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
