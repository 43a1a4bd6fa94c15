//! Error taxonomy for the recorder core
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Everything the core can fail with.
///
/// Only `SinkOpenFailure` and `SinkWriteFailure` are recovered locally by the
/// controller. The remaining variants end the tick loop.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("invalid buffer configuration: {0}")]
    InvalidBufferConfiguration(String),
    #[error("could not open output {identifier}: {reason}")]
    SinkOpenFailure { identifier: String, reason: String },
    #[error("write to output {identifier} failed after {frames_written} frames: {reason}")]
    SinkWriteFailure {
        identifier: String,
        frames_written: u64,
        reason: String,
    },
    #[error("slot index {index} out of range for a buffer of {capacity} slots")]
    OutOfRangeIndex { index: usize, capacity: usize },
    #[error("slot {index} was read before it was ever written")]
    UninitializedSlot { index: usize },
    #[error("configuration error: {0}")]
    Config(String),
}

impl RecorderError {
    /// Whether the controller can carry on monitoring after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RecorderError::SinkOpenFailure { .. } | RecorderError::SinkWriteFailure { .. }
        )
    }
}
