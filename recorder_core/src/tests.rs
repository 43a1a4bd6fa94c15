//! In-memory collaborators and end-to-end recording scenarios
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::buffer::FrameBuffer;
use crate::config::RecorderConfig;
use crate::controller::{RecordingController, RecordingState, TickOutcome};
use crate::error::RecorderError;
use crate::frame::Frame;
use crate::motion::MotionScore;
use crate::recorder::MotionRecorder;
use crate::sequencer::PointerSequencer;
use crate::traits::{DisplaySink, FrameSource, NullDisplay, OutputSink, SinkFactory};
use anyhow::{bail, Error};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) fn uniform_frame(value: u8) -> Frame {
    Frame::capture(RgbImage::from_pixel(8, 6, Rgb([value, value, value])))
}

/// What a fake sink received.
#[derive(Debug, Clone)]
pub(crate) struct Clip {
    pub identifier: PathBuf,
    pub resolution: (u32, u32),
    /// Sequence numbers of the written frames, in write order.
    pub frames: Vec<u64>,
    pub closed: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemorySinks {
    pub fail_open: bool,
    /// Writes beyond this many fail.
    pub fail_write_after: Option<usize>,
    clips: Arc<Mutex<Vec<Clip>>>,
}

impl MemorySinks {
    pub fn clips(&self) -> Vec<Clip> {
        self.clips.lock().unwrap().clone()
    }
}

impl SinkFactory for MemorySinks {
    fn open(
        &mut self,
        identifier: &Path,
        _frame_rate: f64,
        resolution: (u32, u32),
    ) -> Result<Box<dyn OutputSink>, Error> {
        if self.fail_open {
            bail!("No space left on device");
        }
        let mut clips = self.clips.lock().unwrap();
        clips.push(Clip {
            identifier: identifier.to_path_buf(),
            resolution,
            frames: Vec::new(),
            closed: false,
        });
        Ok(Box::new(MemorySink {
            index: clips.len() - 1,
            clips: Arc::clone(&self.clips),
            fail_write_after: self.fail_write_after,
        }))
    }
}

struct MemorySink {
    index: usize,
    clips: Arc<Mutex<Vec<Clip>>>,
    fail_write_after: Option<usize>,
}

impl OutputSink for MemorySink {
    fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        let mut clips = self.clips.lock().unwrap();
        let clip = &mut clips[self.index];
        if self.fail_write_after == Some(clip.frames.len()) {
            bail!("Device unplugged");
        }
        clip.frames.push(frame.seq);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<u64, Error> {
        let mut clips = self.clips.lock().unwrap();
        let clip = &mut clips[self.index];
        clip.closed = true;
        Ok(clip.frames.len() as u64)
    }
}

/// Plays back a fixed list of frames.
struct ScriptedSource {
    frames: std::vec::IntoIter<Frame>,
    fail_at_end: bool,
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        match self.frames.next() {
            Some(frame) => Ok(Some(frame)),
            None if self.fail_at_end => bail!("Camera disconnected"),
            None => Ok(None),
        }
    }
}

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;

fn scene() -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let v = 40 + ((x + 2 * y) % 120) as u8;
        Rgb([v, v, v])
    })
}

/// The scene with a bright 40x40 block whose left edge is at `left`.
fn scene_with_block(left: u32) -> RgbImage {
    let mut image = scene();
    for x in left..(left + 40).min(WIDTH) {
        for y in 40..80 {
            image.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    image
}

fn reference_config() -> RecorderConfig {
    RecorderConfig {
        buffer_size: 60,
        motion_compare_past: 10,
        history_span: Some(60),
        record_min_frames: 50,
        analysis_width: WIDTH,
        analysis_height: HEIGHT,
        threshold: 3.0,
        headless: true,
        save_location: PathBuf::from("moverecs"),
        ..Default::default()
    }
}

#[test]
fn reference_threshold_is_three_per_analysis_pixel() {
    assert_eq!(reference_config().motion_threshold(), 3.0 * 160.0 * 120.0);
}

#[test]
fn single_trigger_records_whole_history_then_post_roll() {
    let mut recorder = MotionRecorder::new(reference_config()).unwrap();
    let mut sinks = MemorySinks::default();
    let still = scene();
    let object = scene_with_block(20);

    for tick in 1..=200u64 {
        // After tick 60 every frame matches the one ten ticks earlier,
        // so nothing but tick 60 itself counts as motion.
        let image = if tick >= 60 && tick % 10 == 0 {
            object.clone()
        } else {
            still.clone()
        };
        let outcome = recorder.tick(Frame::capture(image), &mut sinks).unwrap();

        match tick {
            1..=59 => assert_eq!(outcome.state, RecordingState::Warmup),
            60 => {
                assert!(outcome.triggered);
                assert!(outcome.opened.is_some());
                assert_eq!(outcome.state, RecordingState::Recording);
            }
            169 => {
                assert!(!outcome.triggered);
                assert_eq!(outcome.closed.unwrap().frames_written, 110);
                assert_eq!(outcome.state, RecordingState::Idle);
            }
            _ => assert!(!outcome.triggered, "unexpected trigger at tick {tick}"),
        }
    }

    let clips = sinks.clips();
    assert_eq!(clips.len(), 1);
    assert!(clips[0].closed);
    assert_eq!(clips[0].resolution, (WIDTH, HEIGHT));
    assert!(clips[0].identifier.starts_with("moverecs"));
    assert_eq!(clips[0].frames, (1..=110).collect::<Vec<u64>>());
}

#[test]
fn failed_open_keeps_monitoring() {
    let mut recorder = MotionRecorder::new(reference_config()).unwrap();
    let mut sinks = MemorySinks {
        fail_open: true,
        ..Default::default()
    };

    let mut failures = 0;
    for tick in 1..=69u64 {
        let image = if tick == 60 { scene_with_block(20) } else { scene() };
        let outcome = recorder.tick(Frame::capture(image), &mut sinks).unwrap();
        if tick == 60 {
            assert!(outcome.triggered);
            assert!(matches!(
                outcome.failure,
                Some(RecorderError::SinkOpenFailure { .. })
            ));
        } else {
            assert!(!outcome.triggered);
            assert!(outcome.failure.is_none());
        }
        if outcome.failure.is_some() {
            failures += 1;
        }
        if tick >= 60 {
            assert_eq!(outcome.state, RecordingState::Idle);
        }
    }
    assert_eq!(failures, 1);
    assert!(sinks.clips().is_empty());

    // Tick 70 compares against the block frame of tick 60 and triggers again.
    sinks.fail_open = false;
    let outcome = recorder.tick(Frame::capture(scene()), &mut sinks).unwrap();
    assert!(outcome.triggered);
    assert!(outcome.opened.is_some());
    assert_eq!(recorder.state(), RecordingState::Recording);
}

#[test]
fn sustained_motion_is_one_clip() {
    let mut frames = Vec::new();
    for tick in 1..=400u32 {
        // A block sweeping across the frame on ticks 61..=260.
        let image = if (61..=260).contains(&tick) {
            scene_with_block((tick % 20) * 8)
        } else {
            scene()
        };
        frames.push(Frame::capture(image));
    }
    let mut source = ScriptedSource {
        frames: frames.into_iter(),
        fail_at_end: false,
    };
    let mut sinks = MemorySinks::default();
    let mut recorder = MotionRecorder::new(reference_config()).unwrap();

    let summary = recorder
        .run(&mut source, &mut sinks, &mut NullDisplay, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(summary.ticks, 400);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.clips.len(), 1);

    // First trigger at tick 61, last at tick 270 when the settled scene is
    // still compared against the moving block. The clip ends 50 frames later.
    let clips = sinks.clips();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].frames, (2..=320).collect::<Vec<u64>>());
    assert_eq!(summary.clips[0].frames_written, 319);
}

#[test]
fn stopping_mid_clip_flushes_captured_frames() {
    let mut frames = Vec::new();
    for tick in 1..=80u32 {
        let image = if tick == 60 { scene_with_block(20) } else { scene() };
        frames.push(Frame::capture(image));
    }
    let mut source = ScriptedSource {
        frames: frames.into_iter(),
        fail_at_end: true,
    };
    let mut sinks = MemorySinks::default();
    let mut recorder = MotionRecorder::new(reference_config()).unwrap();

    let err = recorder
        .run(&mut source, &mut sinks, &mut NullDisplay, &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, RecorderError::SourceUnavailable(_)));

    // Ticks 60..=80 drained frames 1..=21; the rest of the ring up to
    // frame 80 is written on the way out.
    let clips = sinks.clips();
    assert_eq!(clips.len(), 1);
    assert!(clips[0].closed);
    assert_eq!(clips[0].frames, (1..=80).collect::<Vec<u64>>());
    assert_eq!(recorder.state(), RecordingState::Idle);
}

/// Raises `stop` once it has handed out `raise_after` frames.
struct StoppingSource {
    inner: ScriptedSource,
    delivered: usize,
    raise_after: usize,
    stop: Arc<AtomicBool>,
}

impl FrameSource for StoppingSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let frame = self.inner.next_frame()?;
        self.delivered += 1;
        if self.delivered == self.raise_after {
            self.stop.store(true, Ordering::SeqCst);
        }
        Ok(frame)
    }
}

/// Preview that reports the window closed on its `close_on`-th frame.
struct ClosingDisplay {
    shown: usize,
    close_on: usize,
}

impl DisplaySink for ClosingDisplay {
    fn show(&mut self, _image: &RgbImage) -> Result<bool, Error> {
        self.shown += 1;
        Ok(self.shown < self.close_on)
    }
}

/// 200 frames with motion only at tick 60.
fn single_motion_frames() -> ScriptedSource {
    let frames: Vec<Frame> = (1..=200u32)
        .map(|tick| {
            let image = if tick == 60 { scene_with_block(20) } else { scene() };
            Frame::capture(image)
        })
        .collect();
    ScriptedSource {
        frames: frames.into_iter(),
        fail_at_end: false,
    }
}

#[test]
fn stop_signal_mid_clip_flushes_captured_frames() {
    let stop = Arc::new(AtomicBool::new(false));
    let mut source = StoppingSource {
        inner: single_motion_frames(),
        delivered: 0,
        raise_after: 80,
        stop: Arc::clone(&stop),
    };
    let mut sinks = MemorySinks::default();
    let mut recorder = MotionRecorder::new(reference_config()).unwrap();

    let summary = recorder
        .run(&mut source, &mut sinks, &mut NullDisplay, &stop)
        .unwrap();

    assert_eq!(summary.ticks, 80);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.clips.len(), 1);
    assert!(summary.clips[0].completed);

    let clips = sinks.clips();
    assert_eq!(clips.len(), 1);
    assert!(clips[0].closed);
    assert_eq!(clips[0].frames, (1..=80).collect::<Vec<u64>>());
    assert_eq!(recorder.state(), RecordingState::Idle);
}

#[test]
fn closing_the_preview_mid_clip_flushes_captured_frames() {
    let config = RecorderConfig {
        headless: false,
        ..reference_config()
    };
    let mut source = single_motion_frames();
    let mut sinks = MemorySinks::default();
    let mut display = ClosingDisplay {
        shown: 0,
        close_on: 80,
    };
    let mut recorder = MotionRecorder::new(config).unwrap();

    let summary = recorder
        .run(&mut source, &mut sinks, &mut display, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(display.shown, 80);
    assert_eq!(summary.ticks, 80);
    assert_eq!(summary.clips.len(), 1);

    let clips = sinks.clips();
    assert_eq!(clips.len(), 1);
    assert!(clips[0].closed);
    assert_eq!(clips[0].frames, (1..=80).collect::<Vec<u64>>());
}

#[test]
fn difference_preview_carries_the_timestamp() {
    let overlay_color = Rgb([255, 0, 0]);
    for overlay in [true, false] {
        let config = RecorderConfig {
            show_difference: true,
            overlay,
            ..reference_config()
        };
        let mut recorder = MotionRecorder::new(config).unwrap();
        let mut sinks = MemorySinks::default();
        assert!(recorder.preview_image().unwrap().is_none());

        for _ in 0..11 {
            recorder.tick(Frame::capture(scene()), &mut sinks).unwrap();
        }
        let preview = recorder.preview_image().unwrap().unwrap();
        assert_eq!(preview.dimensions(), (WIDTH, HEIGHT));

        // Identical frames leave a black difference, so anything lit is text.
        let lit: Vec<(u32, u32)> = preview
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != Rgb([0, 0, 0]))
            .map(|(x, y, _)| (x, y))
            .collect();
        if overlay {
            assert!(!lit.is_empty());
            assert!(lit.iter().all(|&(x, y)| {
                *preview.get_pixel(x, y) == overlay_color && x >= 10 && (96..110).contains(&y)
            }));
        } else {
            assert!(lit.is_empty());
        }
    }
}

#[test]
fn stop_flag_ends_the_loop_before_the_first_frame() {
    let mut source = ScriptedSource {
        frames: vec![Frame::capture(scene())].into_iter(),
        fail_at_end: false,
    };
    let mut sinks = MemorySinks::default();
    let mut recorder = MotionRecorder::new(reference_config()).unwrap();
    let summary = recorder
        .run(&mut source, &mut sinks, &mut NullDisplay, &AtomicBool::new(true))
        .unwrap();
    assert_eq!(summary.ticks, 0);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let config = RecorderConfig {
        motion_compare_past: 60,
        ..reference_config()
    };
    assert!(matches!(
        MotionRecorder::new(config),
        Err(RecorderError::InvalidBufferConfiguration(_))
    ));
}

/// Drives a controller with injected scores, the way the recorder would.
struct Harness {
    sequencer: PointerSequencer,
    buffer: FrameBuffer,
    controller: RecordingController,
    sinks: MemorySinks,
}

impl Harness {
    fn new(config: &RecorderConfig) -> Self {
        Self {
            sequencer: PointerSequencer::from_config(config).unwrap(),
            buffer: FrameBuffer::new(config.buffer_size),
            controller: RecordingController::new(config),
            sinks: MemorySinks::default(),
        }
    }

    fn tick(&mut self, score: f64) -> TickOutcome {
        let slot = self.sequencer.advance();
        let mut frame = uniform_frame(0);
        frame.seq = self.sequencer.ticks();
        self.buffer.store(slot, frame).unwrap();
        let score = self
            .sequencer
            .lag_available()
            .then(|| MotionScore::new(score, 16));
        self.controller
            .on_tick(score, &self.sequencer, &self.buffer, &mut self.sinks)
            .unwrap()
    }
}

fn injected_config(buffer_size: usize, lag: usize, history: usize, post: usize) -> RecorderConfig {
    RecorderConfig {
        buffer_size,
        motion_compare_past: lag,
        history_span: Some(history),
        record_min_frames: post,
        analysis_width: 4,
        analysis_height: 4,
        threshold: 1.0,
        overlay: false,
        ..Default::default()
    }
}

#[test]
fn huge_scores_during_warmup_never_trigger() {
    let config = injected_config(12, 3, 12, 5);
    let mut harness = Harness::new(&config);
    for _ in 1..12 {
        let outcome = harness.tick(f64::MAX);
        assert!(!outcome.triggered);
        assert_eq!(outcome.state, RecordingState::Warmup);
    }
    let outcome = harness.tick(f64::MAX);
    assert!(outcome.triggered);
    assert_eq!(outcome.state, RecordingState::Recording);
}

#[test]
fn retrigger_never_shortens_a_clip() {
    let config = injected_config(10, 2, 6, 8);
    let mut harness = Harness::new(&config);
    for _ in 0..10 {
        harness.tick(0.0);
    }
    harness.tick(100.0);
    let full = config.session_length();
    assert_eq!(harness.controller.session().unwrap().frames_remaining(), full - 1);

    for _ in 0..5 {
        harness.tick(0.0);
    }
    let before = harness.controller.session().unwrap().frames_remaining();
    assert_eq!(before, full - 6);

    // Back-to-back triggers hold the countdown at the full length.
    for _ in 0..20 {
        harness.tick(100.0);
        let remaining = harness.controller.session().unwrap().frames_remaining();
        assert!(remaining >= before - 1);
        assert_eq!(remaining, full - 1);
    }
    assert_eq!(harness.sinks.clips().len(), 1);
}

#[test]
fn drained_frames_stay_behind_the_write_cursor() {
    let layouts = [
        (2, 1, 1, 0),
        (2, 1, 2, 3),
        (5, 1, 5, 1),
        (7, 3, 4, 20),
        (16, 15, 16, 2),
        (60, 10, 60, 50),
        (60, 10, 1, 50),
    ];

    for (n, lag, history, post) in layouts {
        let config = injected_config(n, lag, history, post);
        let mut harness = Harness::new(&config);
        let mut last_written: Option<u64> = None;

        for tick in 1..=600u64 {
            let score = if (tick * 7) % 23 == 0 { 1e6 } else { 0.0 };
            let outcome = harness.tick(score);

            let clips = harness.sinks.clips();
            let Some(clip) = clips.last() else { continue };
            let Some(&newest) = clip.frames.last() else { continue };
            if outcome.closed.is_none() && outcome.opened.is_none() && last_written == Some(newest) {
                continue;
            }

            // The frame written this tick is exactly history - 1 ticks old,
            // so it is still in the ring and never newer than the current one.
            assert_eq!(
                newest + history as u64 - 1,
                tick,
                "layout {:?} at tick {}",
                (n, lag, history, post),
                tick
            );
            assert!(tick - newest < n as u64);
            last_written = Some(newest);
        }

        for clip in harness.sinks.clips() {
            assert!(clip.frames.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }
}
