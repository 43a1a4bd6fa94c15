//! Moves clip encoding off the tick thread.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::frame::Frame;
use crate::traits::{OutputSink, SinkFactory};
use anyhow::{anyhow, Context, Error};
use crossbeam_channel::{bounded, Sender};
use log::{debug, warn};
use std::path::Path;
use std::thread::{self, JoinHandle};

/// Frames queued per clip before `write` blocks.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Wraps another factory so every sink it opens runs on its own thread.
pub struct ThreadedSinkFactory<F> {
    inner: F,
    queue_depth: usize,
}

impl<F: SinkFactory> ThreadedSinkFactory<F> {
    pub fn new(inner: F) -> Self {
        Self::with_queue_depth(inner, DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(inner: F, queue_depth: usize) -> Self {
        Self {
            inner,
            queue_depth: queue_depth.max(1),
        }
    }
}

impl<F: SinkFactory> SinkFactory for ThreadedSinkFactory<F> {
    fn open(
        &mut self,
        identifier: &Path,
        frame_rate: f64,
        resolution: (u32, u32),
    ) -> Result<Box<dyn OutputSink>, Error> {
        let sink = self.inner.open(identifier, frame_rate, resolution)?;
        let threaded = ThreadedSink::spawn(identifier, sink, self.queue_depth)?;
        Ok(Box::new(threaded))
    }
}

/// Frames go through a bounded channel in order. When the worker fails it
/// drops the receiver, so the next `write` notices and reports the error.
pub struct ThreadedSink {
    name: String,
    sender: Option<Sender<Frame>>,
    worker: Option<JoinHandle<Result<u64, Error>>>,
}

impl ThreadedSink {
    fn spawn(
        identifier: &Path,
        mut sink: Box<dyn OutputSink>,
        queue_depth: usize,
    ) -> Result<Self, Error> {
        let name = identifier.display().to_string();
        let (sender, receiver) = bounded::<Frame>(queue_depth);

        let worker = thread::Builder::new()
            .name(format!("writer {name}"))
            .spawn(move || -> Result<u64, Error> {
                for frame in receiver.iter() {
                    if let Err(e) = sink.write(&frame) {
                        // The clip is cut short, but whatever reached the
                        // sink still gets finalized.
                        if let Err(close_err) = sink.close() {
                            warn!("Failed to close after write failure: {:#}", close_err);
                        }
                        return Err(e);
                    }
                }
                sink.close()
            })
            .with_context(|| format!("Failed to start writer thread for {name}"))?;

        Ok(Self {
            name,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn join(&mut self) -> Result<u64, Error> {
        // Dropping the sender ends the worker's receive loop.
        self.sender.take();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("Writer for {} already stopped", self.name))?;
        worker
            .join()
            .map_err(|_| anyhow!("Writer thread for {} panicked", self.name))?
    }
}

impl OutputSink for ThreadedSink {
    fn write(&mut self, frame: &Frame) -> Result<(), Error> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("Writer for {} already stopped", self.name))?;
        if sender.send(frame.clone()).is_ok() {
            return Ok(());
        }

        match self.join() {
            Err(e) => Err(e),
            Ok(count) => Err(anyhow!(
                "Writer for {} stopped after {} frames",
                self.name,
                count
            )),
        }
    }

    fn close(mut self: Box<Self>) -> Result<u64, Error> {
        let count = self.join()?;
        debug!("Writer for {} finished, {} frames", self.name, count);
        Ok(count)
    }
}
