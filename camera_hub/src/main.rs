//! Motion-triggered camera recorder.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

#[macro_use]
extern crate log;

use docopt::Docopt;
use recorder_core::traits::{DisplaySink, NullDisplay};
use recorder_core::writer::ThreadedSinkFactory;
use recorder_core::MotionRecorder;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

mod config;
use crate::config::HubConfig;
mod display;
use crate::display::FfplayDisplay;
mod ffmpeg;
use crate::ffmpeg::profile::ContainerProfile;
use crate::ffmpeg::sink::FfmpegSinkFactory;
use crate::ffmpeg::source::FfmpegSource;

// Raised by SIGINT/SIGTERM, checked once per frame.
static STOP: AtomicBool = AtomicBool::new(false);

const USAGE: &str = "
Recorder camera hub: keeps the last seconds of camera video in memory and saves a clip, history included, whenever something moves.

Usage:
  recorder-camera-hub [options]
  recorder-camera-hub --version
  recorder-camera-hub (--help | -h)

Options:
    -t, --threshold <value>   Motion threshold per analysis pixel (default 3)
    -c, --config <file>       Configuration file [default: camera_hub.yaml]
    -s, --source <input>      Camera device or video file to read
    -v, --verbose             Log the motion value of every frame
    -d, --difference          Preview the difference image instead of the camera
    -q, --quiet               No preview window, warnings only
    --version                 Show version
    -h, --help                Show help
";

#[derive(Debug, Clone, Deserialize)]
struct Args {
    flag_threshold: Option<f64>,
    flag_config: String,
    flag_source: Option<String>,
    flag_verbose: bool,
    flag_difference: bool,
    flag_quiet: bool,
}

impl Args {
    fn apply(&self, config: &mut HubConfig) {
        if let Some(threshold) = self.flag_threshold {
            config.recorder.threshold = threshold;
        }
        if let Some(source) = &self.flag_source {
            config.camera.device = source.clone();
        }
        config.recorder.verbose |= self.flag_verbose;
        config.recorder.show_difference |= self.flag_difference;
        config.recorder.headless |= self.flag_quiet;
    }
}

#[cfg(unix)]
extern "C" fn signal_handler(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

fn main() -> io::Result<()> {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let loaded = HubConfig::load(Path::new(&args.flag_config))?;
    let found_config = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    args.apply(&mut config);

    let level = if args.flag_quiet {
        "warn"
    } else if config.recorder.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if !found_config {
        info!("{} not found, using defaults", args.flag_config);
    }
    config
        .recorder
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    fs::create_dir_all(&config.recorder.save_location)?;
    install_signal_handlers();

    let profile = ContainerProfile::for_platform();
    let sinks = FfmpegSinkFactory::new(profile);
    info!(
        "Saving clips to {} as .{} ({})",
        config.recorder.save_location.display(),
        sinks.profile().extension,
        sinks.profile().codec_tag
    );

    let mut source = FfmpegSource::spawn(
        &config.camera.device,
        config.camera.width,
        config.camera.height,
        config.recorder.frame_rate,
    )
    .map_err(io::Error::other)?;

    let mut display: Box<dyn DisplaySink> = if config.recorder.headless {
        Box::new(NullDisplay)
    } else {
        Box::new(FfplayDisplay::new("Motion recorder", config.recorder.frame_rate))
    };

    let mut recorder = MotionRecorder::new(config.recorder.clone())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let result = if config.recorder.threaded_writer {
        let mut sinks = ThreadedSinkFactory::new(sinks);
        recorder.run(&mut source, &mut sinks, display.as_mut(), &STOP)
    } else {
        let mut sinks = sinks;
        recorder.run(&mut source, &mut sinks, display.as_mut(), &STOP)
    };

    match result {
        Ok(summary) => {
            info!(
                "Stopped after {} frames, saved {} clips",
                summary.ticks,
                summary.clips.len()
            );
            if summary.failures > 0 {
                warn!("{} recording failures, see the log above", summary.failures);
            }
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(io::Error::other(e))
        }
    }
}
