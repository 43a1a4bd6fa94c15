//! Encodes clips by piping raw frames into an ffmpeg child process
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::ffmpeg::profile::ContainerProfile;
use crate::ffmpeg::{child_command, rgb24_frame_size};
use anyhow::{anyhow, bail, Context, Error};
use recorder_core::traits::{OutputSink, SinkFactory};
use recorder_core::Frame;
use std::ffi::OsString;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};

pub struct FfmpegSinkFactory {
    profile: ContainerProfile,
    program: String,
}

impl FfmpegSinkFactory {
    pub fn new(profile: ContainerProfile) -> Self {
        Self {
            profile,
            program: "ffmpeg".to_string(),
        }
    }

    pub fn profile(&self) -> &ContainerProfile {
        &self.profile
    }
}

/// `identifier` plus the container extension. The identifier may contain
/// dashes and digits only, so nothing in it is mistaken for an extension.
pub fn output_path(identifier: &Path, profile: &ContainerProfile) -> PathBuf {
    let mut name = OsString::from(identifier.as_os_str());
    name.push(".");
    name.push(profile.extension);
    PathBuf::from(name)
}

fn encoder_args(
    profile: &ContainerProfile,
    frame_rate: f64,
    (width, height): (u32, u32),
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    args.push("-s".into());
    args.push(format!("{width}x{height}").into());
    args.push("-r".into());
    args.push(format!("{frame_rate}").into());
    for arg in [
        "-i",
        "pipe:0",
        "-c:v",
        profile.encoder,
        "-pix_fmt",
        profile.pixel_format,
        "-vtag",
        profile.codec_tag,
    ] {
        args.push(arg.into());
    }
    args.push(output.as_os_str().to_owned());
    args
}

impl SinkFactory for FfmpegSinkFactory {
    fn open(
        &mut self,
        identifier: &Path,
        frame_rate: f64,
        resolution: (u32, u32),
    ) -> Result<Box<dyn OutputSink>, Error> {
        let path = output_path(identifier, &self.profile);
        if path.exists() {
            bail!("{} already exists", path.display());
        }

        let mut child = child_command(&self.program)
            .args(encoder_args(&self.profile, frame_rate, resolution, &path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to open ffmpeg stdin"))?;

        debug!("Encoding {} with {}", path.display(), self.profile.encoder);
        Ok(Box::new(FfmpegSink {
            path,
            resolution,
            child,
            stdin: BufWriter::new(stdin),
            frames: 0,
        }))
    }
}

pub struct FfmpegSink {
    path: PathBuf,
    resolution: (u32, u32),
    child: Child,
    stdin: BufWriter<ChildStdin>,
    frames: u64,
}

impl OutputSink for FfmpegSink {
    fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        if frame.dimensions() != self.resolution {
            bail!(
                "Frame is {:?}, {} was opened for {:?}",
                frame.dimensions(),
                self.path.display(),
                self.resolution
            );
        }
        debug_assert_eq!(
            frame.image.as_raw().len(),
            rgb24_frame_size(self.resolution.0, self.resolution.1)
        );
        self.stdin
            .write_all(frame.image.as_raw())
            .with_context(|| format!("Failed to pipe frame into ffmpeg for {}", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<u64, Error> {
        let FfmpegSink {
            path,
            mut child,
            stdin,
            frames,
            ..
        } = *self;

        // ffmpeg finalizes the container once its stdin reaches EOF.
        let flushed = stdin
            .into_inner()
            .map(drop)
            .map_err(|e| anyhow!("Failed to flush frames for {}: {}", path.display(), e.error()));
        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for ffmpeg writing {}", path.display()))?;
        flushed?;
        if !status.success() {
            bail!("ffmpeg exited with {} while writing {}", status, path.display());
        }
        Ok(frames)
    }
}
