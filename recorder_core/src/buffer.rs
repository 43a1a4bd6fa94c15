//! Fixed-capacity ring of recent frames
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::RecorderError;
use crate::frame::Frame;

/// Fixed ring of frame slots, indexed by the pointer sequencer.
///
/// Unlike a queue, nothing is ever popped: a slot keeps its frame until the
/// write cursor comes around again, so readers can look back up to
/// `capacity - 1` ticks.
pub struct FrameBuffer {
    slots: Vec<Option<Frame>>,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots that have received a frame at least once.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Overwrite the slot unconditionally.
    pub fn store(&mut self, index: usize, frame: Frame) -> Result<(), RecorderError> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(RecorderError::OutOfRangeIndex { index, capacity })?;
        *slot = Some(frame);
        Ok(())
    }

    /// Current contents of a slot. The reference is only good until the slot
    /// is next overwritten, so callers that keep the frame must clone it.
    pub fn get(&self, index: usize) -> Result<Option<&Frame>, RecorderError> {
        self.slots
            .get(index)
            .map(Option::as_ref)
            .ok_or(RecorderError::OutOfRangeIndex {
                index,
                capacity: self.capacity(),
            })
    }

    /// Like `get`, but an empty slot is a contract violation.
    pub(crate) fn get_written(&self, index: usize) -> Result<&Frame, RecorderError> {
        self.get(index)?
            .ok_or(RecorderError::UninitializedSlot { index })
    }
}
