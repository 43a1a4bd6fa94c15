//! Container and codec used for the recorded clips, picked per platform
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use cfg_if::cfg_if;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProfile {
    /// File extension, without the dot.
    pub extension: &'static str,
    /// FourCC written into the container.
    pub codec_tag: &'static str,
    /// ffmpeg encoder producing that codec.
    pub encoder: &'static str,
    pub pixel_format: &'static str,
}

impl ContainerProfile {
    pub fn quicktime_h264() -> Self {
        Self {
            extension: "mov",
            codec_tag: "avc1",
            encoder: "libx264",
            pixel_format: "yuv420p",
        }
    }

    pub fn avi_divx() -> Self {
        Self {
            extension: "avi",
            codec_tag: "DIVX",
            encoder: "mpeg4",
            pixel_format: "yuv420p",
        }
    }

    pub fn avi_mjpeg() -> Self {
        Self {
            extension: "avi",
            codec_tag: "MJPG",
            encoder: "mjpeg",
            pixel_format: "yuvj420p",
        }
    }

    /// What players on this platform open without extra codecs.
    pub fn for_platform() -> Self {
        cfg_if! {
            if #[cfg(target_os = "macos")] {
                Self::quicktime_h264()
            } else if #[cfg(target_os = "windows")] {
                Self::avi_divx()
            } else {
                Self::avi_mjpeg()
            }
        }
    }
}
