//! ffmpeg-backed capture and clip encoding.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::ffi::OsStr;
use std::process::Command;

pub mod profile;
pub mod sink;
pub mod source;

/// Bytes in one packed rgb24 frame.
pub fn rgb24_frame_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Command for a helper process that runs in its own process group. A Ctrl-C
/// at the terminal then reaches only the recorder, which stops its children
/// after the open clip is flushed.
pub fn child_command<S: AsRef<OsStr>>(program: S) -> Command {
    #[allow(unused_mut)]
    let mut command = Command::new(program);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}
