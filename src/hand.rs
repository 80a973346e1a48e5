//! Detection and pose estimation of human hands.
//!
//! Palms are found by [`detection::PalmNetwork`], then the full hand is tracked from frame to frame
//! by running [`landmark::LandmarkNetwork`] on a region of interest that follows the landmarks.
//! [`tracking::HandTracker`] ties both together.

pub mod detection;
pub mod landmark;
pub mod tracking;

use crate::{image::Image, timer::Timer};

pub use landmark::{Handedness, LandmarkIdx, LandmarkResult};
pub use tracking::{HandId, HandTracker};

/// Something that finds hand landmarks in camera frames.
///
/// This is the interface the frame loop in [`crate::session`] works with.
pub trait HandDetector {
    /// Processes the next frame of a video stream.
    ///
    /// Returns the landmarks of all hands found in `image`, in image coordinates.
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<LandmarkResult>>;

    /// Profiling timers that are logged alongside the frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}
