//! Triggered-recording state machine
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::buffer::FrameBuffer;
use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::frame::{Frame, SESSION_TIME_FORMAT};
use crate::motion::MotionScore;
use crate::overlay::TimestampOverlay;
use crate::sequencer::{DrainCursor, PointerSequencer};
use crate::traits::{OutputSink, SinkFactory};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Hash, Eq, PartialEq, Clone, Debug, Copy, Serialize, Deserialize)]
/// Recording lifecycle
pub enum RecordingState {
    /// The ring has not been filled once yet, triggers are ignored.
    Warmup,
    Idle,
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Warmup => "Warmup",
            RecordingState::Idle => "Idle",
            RecordingState::Recording => "Recording",
        }
    }
}

/// Open clip. Only exists while the controller is `Recording`.
pub struct RecordingSession {
    identifier: PathBuf,
    sink: Box<dyn OutputSink>,
    drain: DrainCursor,
    frames_remaining: usize,
    frames_written: u64,
}

impl RecordingSession {
    pub fn identifier(&self) -> &Path {
        &self.identifier
    }

    pub fn frames_remaining(&self) -> usize {
        self.frames_remaining
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Slot the next recorded frame is taken from.
    pub fn drain_position(&self) -> usize {
        self.drain.position()
    }

    fn write_failure(&self, reason: impl fmt::Display) -> RecorderError {
        RecorderError::SinkWriteFailure {
            identifier: self.identifier.display().to_string(),
            frames_written: self.frames_written,
            reason: reason.to_string(),
        }
    }

    /// Copies the oldest undrained frame out of the ring and hands it to the sink.
    fn write_next(
        &mut self,
        buffer: &FrameBuffer,
        overlay: Option<&TimestampOverlay>,
    ) -> Result<(), RecorderError> {
        let slot = self.drain.next_slot();
        let mut frame: Frame = buffer.get_written(slot)?.clone();
        if let Some(overlay) = overlay {
            overlay.stamp(&mut frame);
        }
        if let Err(e) = self.sink.write(&frame) {
            error!(
                "Failed to write frame captured at {} to {}: {:#}",
                frame.label(),
                self.identifier.display(),
                e
            );
            return Err(self.write_failure(format!("{e:#}")));
        }
        self.frames_written += 1;
        self.frames_remaining = self.frames_remaining.saturating_sub(1);
        Ok(())
    }

    fn close(self, completed: bool) -> (SessionSummary, Option<RecorderError>) {
        let summary = SessionSummary {
            identifier: self.identifier.clone(),
            frames_written: self.frames_written,
            completed,
        };
        match self.sink.close() {
            Ok(count) => {
                if count != self.frames_written {
                    warn!(
                        "{} reports {} frames, {} were sent",
                        self.identifier.display(),
                        count,
                        self.frames_written
                    );
                }
                (summary, None)
            }
            Err(e) => {
                error!("Failed to close {}: {:#}", self.identifier.display(), e);
                let err = RecorderError::SinkWriteFailure {
                    identifier: self.identifier.display().to_string(),
                    frames_written: self.frames_written,
                    reason: format!("{e:#}"),
                };
                (summary, Some(err))
            }
        }
    }
}

/// What happened to a clip when it was closed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub identifier: PathBuf,
    pub frames_written: u64,
    /// False if the clip was cut short by a write failure.
    pub completed: bool,
}

/// Report of a single tick.
#[derive(Debug)]
pub struct TickOutcome {
    pub state: RecordingState,
    pub triggered: bool,
    pub opened: Option<PathBuf>,
    pub closed: Option<SessionSummary>,
    /// Sink trouble the controller recovered from.
    pub failure: Option<RecorderError>,
}

impl TickOutcome {
    fn new(state: RecordingState) -> Self {
        Self {
            state,
            triggered: false,
            opened: None,
            closed: None,
            failure: None,
        }
    }
}

pub struct RecordingController {
    threshold: f64,
    session_length: usize,
    frame_rate: f64,
    save_location: PathBuf,
    overlay: Option<TimestampOverlay>,
    state: RecordingState,
    session: Option<RecordingSession>,
    // Clip name of the latest session and how often it has been reused.
    last_name: Option<(String, u32)>,
}

impl RecordingController {
    pub fn new(config: &RecorderConfig) -> Self {
        Self {
            threshold: config.motion_threshold(),
            session_length: config.session_length(),
            frame_rate: config.frame_rate,
            save_location: config.save_location.clone(),
            overlay: config.overlay.then(TimestampOverlay::default),
            state: RecordingState::Warmup,
            session: None,
            last_name: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn overlay(&self) -> Option<&TimestampOverlay> {
        self.overlay.as_ref()
    }

    /// Consumes this tick's score. The current frame must already be stored
    /// at the sequencer's write slot.
    pub fn on_tick(
        &mut self,
        score: Option<MotionScore>,
        sequencer: &PointerSequencer,
        buffer: &FrameBuffer,
        sinks: &mut dyn SinkFactory,
    ) -> Result<TickOutcome, RecorderError> {
        if self.state == RecordingState::Warmup && sequencer.warmed_up() {
            info!("Frame buffer filled, watching for motion");
            self.state = RecordingState::Idle;
        }

        let mut outcome = TickOutcome::new(self.state);
        outcome.triggered = self.state != RecordingState::Warmup
            && score.is_some_and(|s| s.exceeds(self.threshold));

        if outcome.triggered {
            match self.session.as_mut() {
                Some(session) => {
                    session.frames_remaining =
                        cmp::max(session.frames_remaining, self.session_length);
                    debug!(
                        "Motion again, {} frames left in {}",
                        session.frames_remaining,
                        session.identifier.display()
                    );
                }
                None => match self.open_session(sequencer, buffer, sinks) {
                    Ok(identifier) => outcome.opened = Some(identifier),
                    Err(e) if e.is_recoverable() => {
                        error!("{}", e);
                        outcome.failure = Some(e);
                    }
                    Err(e) => return Err(e),
                },
            }
        }

        if let Some(session) = self.session.as_mut() {
            let written = session.write_next(buffer, self.overlay.as_ref());
            let exhausted = session.frames_remaining == 0;
            match written {
                Ok(()) if exhausted => {
                    self.close_session(true, &mut outcome);
                }
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    outcome.failure = Some(e);
                    self.close_session(false, &mut outcome);
                }
                Err(e) => return Err(e),
            }
        }

        outcome.state = self.state;
        Ok(outcome)
    }

    /// Writes every frame that was captured for the open clip but not yet
    /// recorded, then closes it. Frames after the current one are never
    /// made up, so a clip cut short by shutdown is shorter than usual.
    pub fn finish(
        &mut self,
        sequencer: &PointerSequencer,
        buffer: &FrameBuffer,
    ) -> Result<Option<SessionSummary>, RecorderError> {
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };
        if self.state == RecordingState::Recording {
            self.state = RecordingState::Idle;
        }

        let pending = cmp::min(
            session.drain.pending_through(sequencer.write_ix()),
            session.frames_remaining,
        );
        info!(
            "Stopping, flushing {} buffered frames to {}",
            pending,
            session.identifier.display()
        );
        for _ in 0..pending {
            if let Err(e) = session.write_next(buffer, self.overlay.as_ref()) {
                // The write error is the one returned. `close` has already
                // logged its own failure, if any.
                let (summary, _) = session.close(false);
                warn!(
                    " -> aborted {} after {} frames",
                    summary.identifier.display(),
                    summary.frames_written
                );
                return Err(e);
            }
        }

        let (summary, failure) = session.close(true);
        info!(" -> done, wrote {} frames", summary.frames_written);
        match failure {
            Some(e) => Err(e),
            None => Ok(Some(summary)),
        }
    }

    fn open_session(
        &mut self,
        sequencer: &PointerSequencer,
        buffer: &FrameBuffer,
        sinks: &mut dyn SinkFactory,
    ) -> Result<PathBuf, RecorderError> {
        let trigger = buffer.get_written(sequencer.write_ix())?;
        let identifier = self.next_identifier(trigger);
        info!("Detected motion, creating file: {}", identifier.display());

        let sink = sinks
            .open(&identifier, self.frame_rate, trigger.dimensions())
            .map_err(|e| RecorderError::SinkOpenFailure {
                identifier: identifier.display().to_string(),
                reason: format!("{e:#}"),
            })?;

        self.session = Some(RecordingSession {
            identifier: identifier.clone(),
            sink,
            drain: DrainCursor::starting_at(sequencer),
            frames_remaining: self.session_length,
            frames_written: 0,
        });
        self.state = RecordingState::Recording;
        Ok(identifier)
    }

    fn close_session(&mut self, completed: bool, outcome: &mut TickOutcome) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.state = RecordingState::Idle;
        let (summary, failure) = session.close(completed);
        if completed {
            info!(" -> done, wrote {} frames", summary.frames_written);
        } else {
            warn!(
                " -> aborted {} after {} frames",
                summary.identifier.display(),
                summary.frames_written
            );
        }
        if outcome.failure.is_none() {
            outcome.failure = failure;
        }
        outcome.closed = Some(summary);
    }

    /// `<save_location>/<YYYYMMDD-HHMMSS>` of the triggering frame, with a
    /// `-<n>` suffix when several clips start within the same second.
    fn next_identifier(&mut self, trigger: &Frame) -> PathBuf {
        let name = trigger.captured_at.format(SESSION_TIME_FORMAT).to_string();
        let repeat = match &self.last_name {
            Some((last, n)) if *last == name => n + 1,
            _ => 0,
        };
        self.last_name = Some((name.clone(), repeat));

        if repeat == 0 {
            self.save_location.join(name)
        } else {
            self.save_location.join(format!("{name}-{repeat}"))
        }
    }
}
