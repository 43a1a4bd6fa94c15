//! Cursor bookkeeping for the frame ring
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::RecorderConfig;
use crate::error::RecorderError;

/// `(ix - back) mod capacity`, with `back` allowed to exceed `ix`.
fn offset_back(ix: usize, back: usize, capacity: usize) -> usize {
    (ix + capacity - back % capacity) % capacity
}

/// Owns the write cursor. The lag cursor and the start of a clip's history are
/// derived from it on demand and never stored, so they cannot drift apart.
#[derive(Debug, Clone)]
pub struct PointerSequencer {
    capacity: usize,
    lag: usize,
    history_span: usize,
    write_ix: usize,
    ticks: u64,
}

impl PointerSequencer {
    pub fn new(capacity: usize, lag: usize, history_span: usize) -> Result<Self, RecorderError> {
        if capacity == 0 || lag < 1 || lag >= capacity || history_span < 1 || history_span > capacity
        {
            return Err(RecorderError::InvalidBufferConfiguration(format!(
                "capacity {capacity}, lag {lag}, history_span {history_span}"
            )));
        }
        Ok(Self {
            capacity,
            lag,
            history_span,
            // The first advance() lands on slot 0.
            write_ix: capacity - 1,
            ticks: 0,
        })
    }

    pub fn from_config(config: &RecorderConfig) -> Result<Self, RecorderError> {
        config.validate()?;
        Self::new(
            config.buffer_size,
            config.motion_compare_past,
            config.history_span(),
        )
    }

    /// Start a new tick; returns the slot the acquired frame goes into.
    pub fn advance(&mut self) -> usize {
        self.write_ix = (self.write_ix + 1) % self.capacity;
        self.ticks += 1;
        self.write_ix
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_ix(&self) -> usize {
        self.write_ix
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Slot compared against the current frame for motion.
    pub fn lag_ix(&self) -> usize {
        offset_back(self.write_ix, self.lag, self.capacity)
    }

    /// First slot a clip triggered on this tick drains. The triggering frame
    /// itself is the last of the `history_span` history frames.
    pub fn drain_start(&self) -> usize {
        offset_back(self.write_ix, self.history_span - 1, self.capacity)
    }

    /// True once the lag slot holds a real frame.
    pub fn lag_available(&self) -> bool {
        self.ticks > self.lag as u64
    }

    /// True once the ring has been filled completely.
    pub fn warmed_up(&self) -> bool {
        self.ticks >= self.capacity as u64
    }
}

/// The one cursor that is not derived from the write cursor. It is seeded from
/// `drain_start()` when a clip opens and then only ever steps forward, so a
/// clip walks history in order even when retriggers lengthen it.
#[derive(Debug, Clone)]
pub struct DrainCursor {
    ix: usize,
    capacity: usize,
}

impl DrainCursor {
    pub fn starting_at(sequencer: &PointerSequencer) -> Self {
        Self {
            ix: sequencer.drain_start(),
            capacity: sequencer.capacity(),
        }
    }

    pub fn position(&self) -> usize {
        self.ix
    }

    /// Returns the slot to drain now and steps past it.
    pub fn next_slot(&mut self) -> usize {
        let ix = self.ix;
        self.ix = (self.ix + 1) % self.capacity;
        ix
    }

    /// Slots from this cursor up to and including `write_ix`. A cursor sitting
    /// just past `write_ix` has caught up and has nothing pending.
    pub fn pending_through(&self, write_ix: usize) -> usize {
        (write_ix + 1 + self.capacity - self.ix) % self.capacity
    }
}
