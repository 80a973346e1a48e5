//! Non-Maximum Suppression and Averaging.
//!
//! Single-Shot MultiBox Detectors (SSD) produce duplicate detections for individual objects.
//! Non-Maximum Suppression (NMS) filters these duplicates out, leaving only a single detection
//! with high confidence for each object.
//!
//! Two variants are implemented, selected with [`SuppressionMode`]: classic suppression that
//! removes any overlapping detections with lower confidence ([`SuppressionMode::Remove`]), and
//! Non-Maximum Averaging ([`SuppressionMode::Average`]), which computes a confidence-weighted
//! average of overlapping detections. Averaging reduces jitter between frames and is the default.

use itertools::Itertools;

use crate::{image::Rect, num::TotalF32};

use super::{Detection, Keypoint};

/// A non-maximum suppression algorithm.
pub struct NonMaxSuppression {
    iou_thresh: f32,
    avg_buf: Vec<Detection>,
    out_buf: Vec<Detection>,
    mode: SuppressionMode,
}

impl NonMaxSuppression {
    /// The default intersection-over-union threshold used to determine if two detections overlap.
    pub const DEFAULT_IOU_THRESH: f32 = 0.3;

    /// Creates a new non-maximum suppressor.
    ///
    /// The returned suppression algorithm will use [`SuppressionMode::Average`] and
    /// [`Self::DEFAULT_IOU_THRESH`].
    pub fn new() -> Self {
        Self {
            iou_thresh: Self::DEFAULT_IOU_THRESH,
            avg_buf: Vec::new(),
            out_buf: Vec::new(),
            mode: SuppressionMode::Average,
        }
    }

    /// Sets the suppression mode.
    pub fn set_mode(&mut self, mode: SuppressionMode) {
        self.mode = mode;
    }

    /// Performs non-maximum suppression on `detections`.
    ///
    /// `detections` is drained in the process. The filtered detections are returned as an
    /// iterator, most confident first.
    pub fn process(
        &mut self,
        detections: &mut Vec<Detection>,
    ) -> impl Iterator<Item = Detection> + '_ {
        self.out_buf.clear();

        // Sort by ascending confidence, process highest confidence first by starting at the back.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence));

        while let Some(seed) = detections.pop() {
            match self.mode {
                SuppressionMode::Remove => {
                    detections.retain(|other| {
                        seed.bounding_rect().iou(&other.bounding_rect()) < self.iou_thresh
                    });
                    self.out_buf.push(seed);
                }
                SuppressionMode::Average => {
                    self.avg_buf.clear();
                    let iou_thresh = self.iou_thresh;
                    let avg_buf = &mut self.avg_buf;
                    detections.retain(|other| {
                        if seed.bounding_rect().iou(&other.bounding_rect()) >= iou_thresh {
                            avg_buf.push(other.clone());
                            false
                        } else {
                            true
                        }
                    });
                    avg_buf.push(seed);

                    let averaged = average(avg_buf);
                    self.out_buf.push(averaged);
                }
            }
        }

        self.avg_buf.clear();
        self.out_buf.drain(..)
    }
}

/// Computes the confidence-weighted average of `group`.
///
/// The seed is the last element; its confidence is kept.
fn average(group: &[Detection]) -> Detection {
    let seed = &group[group.len() - 1];

    let mut center = [0.0, 0.0];
    let mut size = [0.0, 0.0];
    let mut angle = 0.0;
    let mut keypoints = vec![Keypoint::new(0.0, 0.0); seed.keypoints().len()];
    let mut divisor = 0.0;
    for det in group {
        let factor = det.confidence;
        divisor += factor;
        for (acc, kp) in keypoints.iter_mut().zip_eq(&det.keypoints) {
            acc.x += kp.x * factor;
            acc.y += kp.y * factor;
        }
        let rect = det.bounding_rect();
        center[0] += rect.center().x * factor;
        center[1] += rect.center().y * factor;
        size[0] += rect.width() * factor;
        size[1] += rect.height() * factor;
        angle += det.angle * factor;
    }

    for kp in &mut keypoints {
        kp.x /= divisor;
        kp.y /= divisor;
    }

    let mut acc = Detection::with_keypoints(
        seed.confidence(),
        Rect::from_center(
            center[0] / divisor,
            center[1] / divisor,
            size[0] / divisor,
            size[1] / divisor,
        ),
        keypoints,
    );
    acc.set_angle(angle / divisor);
    acc
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

/// Describes how [`NonMaxSuppression`] should deal with overlapping detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Remove overlapping detections, only retain the detection with highest confidence score.
    Remove,

    /// Compute a confidence-weighted average of overlapping detections.
    Average,
}
