//! Hand tracking across video frames.

use std::fmt;

use nalgebra::{Rotation2, Vector2};

use crate::detection::nms::SuppressionMode;
use crate::detection::{Detection, Detector};
use crate::image::{Image, Rect, RotatedRect};
use crate::landmark::{Estimator, LandmarkTracker, TrackingResult};
use crate::timer::Timer;

use super::detection::PalmNetwork;
use super::landmark::{LandmarkNetwork, LandmarkResult};
use super::HandDetector;

/// Scale factor from a palm bounding box to the RoI that contains the whole hand.
const PALM_TO_HAND_SCALE: f32 = 2.6;

/// Shift of the RoI center towards the fingers, relative to the palm box height.
const PALM_TO_HAND_SHIFT: f32 = -0.5;

/// A unique identifier assigned to every hand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandId(u64);

impl fmt::Debug for HandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct TrackedHand {
    id: HandId,
    tracker: LandmarkTracker<LandmarkResult>,
    lm: LandmarkResult,
    roi: RotatedRect,
}

/// Tracks up to a configurable number of hands in a video stream.
///
/// Each call to [`HandTracker::track`] first follows the hands that are already being tracked.
/// Palm detection only runs while fewer hands than the configured maximum are tracked.
pub struct HandTracker {
    palm: Detector,
    network: LandmarkNetwork,
    hands: Vec<TrackedHand>,
    next_id: u64,
    max_hands: usize,
    tracking_thresh: f32,
    t_track: Timer,
    t_detect: Timer,
}

impl HandTracker {
    pub const DEFAULT_MAX_HANDS: usize = 2;

    /// Detected palms whose hand RoI overlaps a tracked hand's RoI this much are discarded.
    pub const OVERLAP_IOU_THRESH: f32 = 0.3;

    pub fn new(palm: PalmNetwork, landmarks: LandmarkNetwork) -> Self {
        Self {
            palm: Detector::new(palm),
            network: landmarks,
            hands: Vec::new(),
            next_id: 0,
            max_hands: Self::DEFAULT_MAX_HANDS,
            tracking_thresh: LandmarkTracker::<LandmarkResult>::DEFAULT_LOSS_THRESHOLD,
            t_track: Timer::new("track"),
            t_detect: Timer::new("palm"),
        }
    }

    /// Sets the maximum number of hands to track at once.
    pub fn set_max_hands(&mut self, max_hands: usize) {
        self.max_hands = max_hands;
        self.hands.truncate(max_hands);
    }

    /// Sets the minimum palm detection confidence for a hand to start being tracked.
    pub fn set_detection_threshold(&mut self, thresh: f32) {
        self.palm.set_threshold(thresh);
    }

    /// Sets the minimum hand presence score below which a tracked hand is dropped.
    pub fn set_tracking_threshold(&mut self, thresh: f32) {
        self.tracking_thresh = thresh;
        for hand in &mut self.hands {
            hand.tracker.set_loss_threshold(thresh);
        }
    }

    /// Selects how overlapping palm detections are merged.
    pub fn set_nms_mode(&mut self, mode: SuppressionMode) {
        self.palm.nms_mut().set_mode(mode);
    }

    /// Returns the landmarks of the currently tracked hands, oldest hand first.
    pub fn hands(&self) -> impl Iterator<Item = &LandmarkResult> {
        self.hands.iter().map(|hand| &hand.lm)
    }

    /// Processes the next frame of the video stream.
    pub fn track(&mut self, image: &Image) -> anyhow::Result<()> {
        self.track_existing(image)?;

        if self.hands.len() < self.max_hands {
            self.detect_new(image)?;
        }

        Ok(())
    }

    fn track_existing(&mut self, image: &Image) -> anyhow::Result<()> {
        let _guard = self.t_track.start();

        let mut kept = Vec::with_capacity(self.hands.len());
        for mut hand in std::mem::take(&mut self.hands) {
            match hand.tracker.track(image)?.map(tracking_state) {
                Some((lm, roi)) => {
                    hand.lm = lm;
                    hand.roi = roi;
                    kept.push(hand);
                }
                None => log::debug!("lost track of hand {:?}", hand.id),
            }
        }

        // Two trackers can converge onto the same hand. Keep the older one.
        let mut rois = Vec::with_capacity(kept.len());
        kept.retain(|hand| {
            if overlaps_any(&hand.roi, &rois, Self::OVERLAP_IOU_THRESH) {
                log::debug!("hand {:?} duplicates another tracked hand", hand.id);
                false
            } else {
                rois.push(hand.roi);
                true
            }
        });

        self.hands = kept;
        Ok(())
    }

    fn detect_new(&mut self, image: &Image) -> anyhow::Result<()> {
        let detections = self
            .t_detect
            .time(|| self.palm.detect(image).map(<[Detection]>::to_vec))?;

        for det in &detections {
            if self.hands.len() >= self.max_hands {
                break;
            }

            let roi = hand_roi_from_palm(det);
            let tracked = self.hands.iter().map(|hand| hand.roi).collect::<Vec<_>>();
            if overlaps_any(&roi, &tracked, Self::OVERLAP_IOU_THRESH) {
                continue;
            }

            let mut tracker = LandmarkTracker::new(Estimator::new(self.network.clone()));
            tracker.set_loss_threshold(self.tracking_thresh);
            tracker.set_roi(roi);

            let Some((lm, roi)) = tracker.track(image)?.map(tracking_state) else {
                log::trace!("palm at {:?} is not a hand", det.bounding_rect());
                continue;
            };

            let id = HandId(self.next_id);
            self.next_id += 1;
            log::debug!("tracking new hand {:?} at {:?}", id, roi);

            self.hands.push(TrackedHand {
                id,
                tracker,
                lm,
                roi,
            });
        }

        Ok(())
    }
}

impl HandDetector for HandTracker {
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<LandmarkResult>> {
        self.track(image)?;
        Ok(self.hands().cloned().collect())
    }

    fn timers(&self) -> Vec<&Timer> {
        let mut timers = vec![&self.t_detect, &self.t_track];
        timers.extend(self.palm.timers());
        if let Some(hand) = self.hands.first() {
            timers.extend(hand.tracker.timers());
        }
        timers
    }
}

fn tracking_state(res: TrackingResult<'_, LandmarkResult>) -> (LandmarkResult, RotatedRect) {
    (res.estimate().clone(), res.updated_roi())
}

/// Computes the region of interest containing the whole hand from a palm detection.
///
/// The palm box is rotated upright, shifted towards the fingers, squared to its longer side and
/// enlarged so that the fingers fit.
fn hand_roi_from_palm(det: &Detection) -> RotatedRect {
    let rect = det.bounding_rect();
    let angle = det.angle();

    let shift = Rotation2::new(angle) * Vector2::new(0.0, PALM_TO_HAND_SHIFT * rect.height());
    let center = rect.center() + shift;
    let side = rect.width().max(rect.height()) * PALM_TO_HAND_SCALE;

    RotatedRect::new(Rect::from_center(center.x, center.y, side, side), angle)
}

fn overlaps_any(roi: &RotatedRect, others: &[RotatedRect], iou_thresh: f32) -> bool {
    let rect = roi.bounding_rect();
    others
        .iter()
        .any(|other| rect.iou(&other.bounding_rect()) >= iou_thresh)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn upright_palm_roi() {
        let mut det = Detection::new(0.9, Rect::from_center(100.0, 100.0, 20.0, 20.0));
        det.set_angle(0.0);

        let roi = hand_roi_from_palm(&det);
        assert_abs_diff_eq!(roi.center(), Vector2::new(100.0, 90.0), epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().width(), 52.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().height(), 52.0, epsilon = 1e-4);
        assert_eq!(roi.rotation_radians(), 0.0);
    }

    #[test]
    fn rotated_palm_roi() {
        let mut det = Detection::new(0.9, Rect::from_center(100.0, 100.0, 10.0, 20.0));
        det.set_angle(FRAC_PI_2);

        // Fingers point to the right, so the RoI moves to the right.
        let roi = hand_roi_from_palm(&det);
        assert_abs_diff_eq!(roi.center(), Vector2::new(110.0, 100.0), epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rect().width(), 52.0, epsilon = 1e-4);
        assert_abs_diff_eq!(roi.rotation_radians(), FRAC_PI_2);
    }

    #[test]
    fn overlapping_rois() {
        let a = RotatedRect::from(Rect::from_center(50.0, 50.0, 40.0, 40.0));
        let b = RotatedRect::from(Rect::from_center(55.0, 50.0, 40.0, 40.0));
        let far = RotatedRect::from(Rect::from_center(300.0, 50.0, 40.0, 40.0));

        assert!(overlaps_any(&a, &[b], 0.3));
        assert!(overlaps_any(&a, &[far, b], 0.3));
        assert!(!overlaps_any(&a, &[far], 0.3));
        assert!(!overlaps_any(&a, &[], 0.3));
    }

    #[test]
    fn hand_id_debug() {
        assert_eq!(format!("{:?}", HandId(7)), "#7");
    }
}
