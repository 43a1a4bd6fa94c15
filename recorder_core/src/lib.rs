//! Motion-triggered recording core: a ring of recent frames, a lagged-frame
//! motion detector and the state machine that turns triggers into clips.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod motion;
pub mod overlay;
pub mod recorder;
pub mod sequencer;
pub mod traits;
pub mod writer;

#[cfg(test)]
mod tests;

pub use config::RecorderConfig;
pub use error::RecorderError;
pub use frame::Frame;
pub use recorder::{MotionRecorder, RunSummary};
