//! Camera hub configuration file
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::ffmpeg::source::default_device;
use recorder_core::RecorderConfig;
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device, or a video file to play back.
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_device().to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Recorder settings sit at the top level of the file, next to the
/// `camera` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    #[serde(flatten)]
    pub recorder: RecorderConfig,
    pub camera: CameraConfig,
}

impl HubConfig {
    /// Returns `None` when the file does not exist.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let config = serde_yml::from_reader(file).map_err(|e| {
            io::Error::other(format!("Failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(config))
    }

    pub fn from_yaml_str(yaml: &str) -> io::Result<Self> {
        serde_yml::from_str(yaml).map_err(io::Error::other)
    }
}
