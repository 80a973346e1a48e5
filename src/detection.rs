//! Common functionality for object detection.
//!
//! The functionality defined in this module (and submodules) is meant to be reusable across
//! different detectors.

pub mod nms;
pub mod ssd;

use crate::image::{Image, Rect, Resolution};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

use self::nms::NonMaxSuppression;

/// Trait implemented by neural networks that detect objects in an input image.
pub trait Network: Send + 'static {
    /// Returns the [`Cnn`] to use for detection.
    fn cnn(&self) -> &Cnn;

    /// Extracts all detections with confidence above `threshold` from the network's output.
    ///
    /// Keypoint and detection positions are expected to be in the coordinate system of the
    /// network's input.
    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()>;
}

/// A generic single-class object detector.
///
/// This type wraps a [`Network`] and takes care of aspect ratio correction, non-maximum
/// suppression and mapping detections back into input image coordinates.
pub struct Detector {
    network: Box<dyn Network>,
    detections: Vec<Detection>,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
    thresh: f32,
    nms: NonMaxSuppression,
}

impl Detector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    pub fn new<N: Network>(network: N) -> Self {
        Self {
            network: Box::new(network),
            detections: Vec::new(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
            t_nms: Timer::new("nms"),
            thresh: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
        }
    }

    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Sets the minimum confidence a detection needs to be reported.
    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    /// Gives access to the non-maximum suppression stage, to change its mode.
    pub fn nms_mut(&mut self) -> &mut NonMaxSuppression {
        &mut self.nms
    }

    /// Runs the network on `image` and returns the detected objects, in image coordinates.
    pub fn detect(&mut self, image: &Image) -> anyhow::Result<&[Detection]> {
        self.detections.clear();

        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            anyhow::bail!("network input resolution {input_res} is empty");
        };

        // If the input image's aspect ratio doesn't match the CNN's input, create an oversized view
        // that does.
        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract.time(|| {
            self.network
                .extract(&outputs, self.thresh, &mut self.detections)
        })?;

        self.t_nms.time(|| {
            let filtered: Vec<_> = self.nms.process(&mut self.detections).collect();
            self.detections = filtered;
        });

        let scale = rect.width() / input_res.width() as f32;
        for det in &mut self.detections {
            det.map_from_network(scale, rect);
        }

        Ok(&self.detections)
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object, a confidence value, an
/// optional rotation angle of the object, and a possibly empty set of located keypoints.
///
/// Per convention, the confidence value lies between 0.0 and 1.0, which can be achieved by passing
/// the raw network output through [`crate::num::sigmoid`]. The confidence value is used when
/// performing non-maximum suppression with [`nms::SuppressionMode::Average`], so it has to have
/// the expected range when making use of that.
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    angle: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            angle: 0.0,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the angle of the detected object, in radians, clockwise.
    ///
    /// Networks that do not compute an object angle leave this at 0.0.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Sets the angle of the detected object, in radians, clockwise.
    pub fn set_angle(&mut self, angle: f32) {
        self.angle = angle;
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Maps coordinates from the network input to the image area covered by `rect`.
    fn map_from_network(&mut self, scale: f32, rect: Rect) {
        let center = self.rect.center() * scale + rect.top_left();
        let size = self.rect.size() * scale;
        self.rect = Rect::from_center(center.x, center.y, size.x, size.y);
        for kp in &mut self.keypoints {
            kp.x = kp.x * scale + rect.x();
            kp.y = kp.y * scale + rect.y();
        }
    }
}

/// A 2D keypoint produced as part of a [`Detection`].
///
/// The meaning of a keypoint depends on the specific detector and on its index in the keypoint
/// list. Typically keypoints are used to crop/rotate a detected object for further processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::image::AspectRatio;

    use super::*;

    #[test]
    fn maps_back_into_image() {
        let mut det = Detection::with_keypoints(
            0.9,
            Rect::from_center(96.0, 96.0, 32.0, 16.0),
            vec![Keypoint::new(0.0, 0.0), Keypoint::new(192.0, 192.0)],
        );

        // A 640x480 image is padded to 640x640 for a square 192x192 network.
        let rect =
            Rect::from_top_left(0.0, 0.0, 640.0, 480.0).grow_to_fit_aspect(AspectRatio::SQUARE);
        assert_eq!(rect.y(), -80.0);

        det.map_from_network(rect.width() / 192.0, rect);
        let mapped = det.bounding_rect();
        assert_abs_diff_eq!(mapped.center().x, 320.0, epsilon = 1e-3);
        assert_abs_diff_eq!(mapped.center().y, 240.0, epsilon = 1e-3);
        assert_abs_diff_eq!(mapped.width(), 32.0 * 640.0 / 192.0, epsilon = 1e-3);
        assert_abs_diff_eq!(mapped.height(), 16.0 * 640.0 / 192.0, epsilon = 1e-3);

        let [a, b] = [det.keypoints()[0], det.keypoints()[1]];
        assert_abs_diff_eq!(a.x(), 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(a.y(), -80.0, epsilon = 1e-3);
        assert_abs_diff_eq!(b.x(), 640.0, epsilon = 1e-3);
        assert_abs_diff_eq!(b.y(), 560.0, epsilon = 1e-3);
    }
}
