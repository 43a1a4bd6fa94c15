//! Tick loop tying the ring, the detector and the controller together
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::buffer::FrameBuffer;
use crate::config::RecorderConfig;
use crate::controller::{RecordingController, RecordingState, SessionSummary, TickOutcome};
use crate::error::RecorderError;
use crate::frame::Frame;
use crate::motion::{MotionDetector, MotionScore};
use crate::sequencer::PointerSequencer;
use crate::traits::{DisplaySink, FrameSource, SinkFactory};
use image::{DynamicImage, GrayImage, RgbImage};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};

/// Totals of one `run`.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub clips: Vec<SessionSummary>,
    pub failures: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: TickOutcome) {
        self.ticks += 1;
        if outcome.failure.is_some() {
            self.failures += 1;
        }
        if let Some(clip) = outcome.closed {
            self.clips.push(clip);
        }
    }
}

/// Owns all recorder state. Built once from a validated configuration.
pub struct MotionRecorder {
    config: RecorderConfig,
    sequencer: PointerSequencer,
    buffer: FrameBuffer,
    detector: MotionDetector,
    controller: RecordingController,
}

impl MotionRecorder {
    pub fn new(config: RecorderConfig) -> Result<Self, RecorderError> {
        let sequencer = PointerSequencer::from_config(&config)?;
        Ok(Self {
            buffer: FrameBuffer::new(config.buffer_size),
            detector: MotionDetector::from_config(&config),
            controller: RecordingController::new(&config),
            sequencer,
            config,
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecordingState {
        self.controller.state()
    }

    pub fn sequencer(&self) -> &PointerSequencer {
        &self.sequencer
    }

    pub fn controller(&self) -> &RecordingController {
        &self.controller
    }

    /// Stores `frame` as the newest one and runs detection and recording on it.
    pub fn tick(
        &mut self,
        mut frame: Frame,
        sinks: &mut dyn SinkFactory,
    ) -> Result<TickOutcome, RecorderError> {
        let slot = self.sequencer.advance();
        frame.seq = self.sequencer.ticks();
        self.buffer.store(slot, frame)?;

        let score = self.score()?;
        if let Some(score) = score {
            if self.sequencer.warmed_up() {
                debug!("Motion parameter = {}", score);
            }
        }
        self.controller
            .on_tick(score, &self.sequencer, &self.buffer, sinks)
    }

    /// Current frame against the one `motion_compare_past` ticks back.
    /// `None` until that frame exists.
    pub fn score(&self) -> Result<Option<MotionScore>, RecorderError> {
        if !self.sequencer.lag_available() {
            return Ok(None);
        }
        let current = self.buffer.get_written(self.sequencer.write_ix())?;
        let past = self.buffer.get_written(self.sequencer.lag_ix())?;
        Ok(Some(self.detector.score(current, past)))
    }

    pub fn difference_image(&self) -> Result<Option<GrayImage>, RecorderError> {
        if !self.sequencer.lag_available() {
            return Ok(None);
        }
        let current = self.buffer.get_written(self.sequencer.write_ix())?;
        let past = self.buffer.get_written(self.sequencer.lag_ix())?;
        Ok(Some(self.detector.difference_image(current, past)))
    }

    /// What the preview window shows for the current tick.
    pub fn preview_image(&self) -> Result<Option<RgbImage>, RecorderError> {
        if self.sequencer.ticks() == 0 {
            return Ok(None);
        }
        let current = self.buffer.get_written(self.sequencer.write_ix())?;
        if self.config.show_difference {
            let Some(diff) = self.difference_image()? else {
                return Ok(None);
            };
            let mut rgb = DynamicImage::ImageLuma8(diff).to_rgb8();
            if let Some(overlay) = self.controller.overlay() {
                overlay.draw_text(&mut rgb, &current.label());
            }
            return Ok(Some(rgb));
        }
        let mut current = current.clone();
        if let Some(overlay) = self.controller.overlay() {
            overlay.stamp(&mut current);
        }
        Ok(Some(current.image))
    }

    /// Flushes and closes the open clip, if any.
    pub fn shutdown(&mut self) -> Result<Option<SessionSummary>, RecorderError> {
        self.controller.finish(&self.sequencer, &self.buffer)
    }

    /// Pulls frames until the source ends, the preview is closed or `stop` is
    /// raised. An open clip is flushed in every case, including a source failure.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sinks: &mut dyn SinkFactory,
        display: &mut dyn DisplaySink,
        stop: &AtomicBool,
    ) -> Result<RunSummary, RecorderError> {
        let mut summary = RunSummary::default();
        let mut preview = !self.config.headless;

        while !stop.load(Ordering::SeqCst) {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Frame source ended after {} frames", summary.ticks);
                    break;
                }
                Err(e) => {
                    error!("Failed to acquire frame: {:#}", e);
                    self.flush(&mut summary);
                    return Err(RecorderError::SourceUnavailable(format!("{e:#}")));
                }
            };

            let outcome = self.tick(frame, sinks)?;
            summary.record(outcome);

            if preview {
                if let Some(image) = self.preview_image()? {
                    match display.show(&image) {
                        Ok(true) => {}
                        Ok(false) => {
                            info!("Preview closed, stopping");
                            break;
                        }
                        Err(e) => {
                            warn!("Preview unavailable, continuing without it: {:#}", e);
                            preview = false;
                        }
                    }
                }
            }
        }

        self.flush(&mut summary);
        Ok(summary)
    }

    fn flush(&mut self, summary: &mut RunSummary) {
        match self.shutdown() {
            Ok(Some(clip)) => summary.clips.push(clip),
            Ok(None) => {}
            Err(e) => {
                error!("{}", e);
                summary.failures += 1;
            }
        }
    }
}
