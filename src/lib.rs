//! Live hand landmark tracking on a webcam feed.
//!
//! Frames are captured from a V4L2 webcam, mirrored, run through a palm detector and a hand
//! landmark network, annotated with the tracked hand skeleton, a highlighted landmark and a frame
//! rate readout, and finally shown in a window.
//!
//! # Coordinates
//!
//! All 2D positions are in image pixels: X points to the right, Y points *down*. Rotation angles
//! are in radians and clockwise as seen on screen.
//!
//! # Environment Variables
//!
//! * `HANDCAM_JPEG_BACKEND`: Configures the JPEG image decoder to use. Allowed values are:
//!   * `mozjpeg` (the default): uses the [mozjpeg] library to decode JPEG images.
//!   * `zune-jpeg`: uses the pure-Rust [zune-jpeg] crate.
//!   * `jpeg-decoder`: uses the [jpeg-decoder] crate (through `image`).
//! * `HANDCAM_PALM_MODEL` / `HANDCAM_LANDMARK_MODEL`: paths of the ONNX models, see [`cli::Args`].
//! * `RUST_LOG`: overrides the default log filter, see [`init_logger`].
//!
//! [mozjpeg]: https://github.com/mozilla/mozjpeg
//! [zune-jpeg]: https://github.com/etemesi254/zune-jpeg
//! [jpeg-decoder]: https://github.com/image-rs/jpeg-decoder/

use log::LevelFilter;

pub mod cli;
pub mod detection;
pub mod fps;
pub mod gui;
pub mod hand;
pub mod image;
pub mod landmark;
pub mod nn;
pub mod num;
pub mod overlay;
pub mod session;
pub mod termination;
pub mod timer;
pub mod video;

/// Initializes logging to *stderr*.
///
/// This crate logs at *debug* level, `wgpu` at *warn* level. `RUST_LOG` is applied on top of that.
///
/// If a global logger is already registered, this does nothing.
pub fn init_logger() {
    env_logger::Builder::new()
        .filter(Some(env!("CARGO_CRATE_NAME")), LevelFilter::Debug)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}
