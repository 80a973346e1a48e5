//! Video capture.
//!
//! [`webcam::Webcam`] streams decoded frames from a V4L2 device, [`select`] lets the user pick a
//! camera interactively, and [`names`] maps camera indices to human-readable names.

pub mod names;
pub mod select;
pub mod webcam;

use std::path::PathBuf;

/// Returns the device node of the camera with the given index.
pub fn device_path(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/video{index}"))
}
