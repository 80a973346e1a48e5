//! Common code for visual landmark estimation.

use crate::image::{AsImageView, AspectRatio, ImageView, Resolution, RotatedRect};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

type Position = [f32; 3];

/// A fixed-size list of 3D landmark positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    positions: Box<[Position]>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` preallocated landmarks.
    ///
    /// All landmarks will start with all coordinates at `0.0`.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0, 0.0]; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        self.positions.iter().map(|&pos| Landmark::new(pos))
    }

    pub fn get(&self, index: usize) -> Landmark {
        Landmark::new(self.positions[index])
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn map_positions(&mut self, mut f: impl FnMut(Position) -> Position) {
        for pos in self.positions_mut() {
            *pos = f(*pos);
        }
    }
}

/// A landmark in 3D space.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Landmark {
    pos: Position,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self { pos: position }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }
}

/// Trait for landmark estimation results returned by [`Estimator::estimate`].
pub trait Estimate: Send + 'static {
    fn landmarks(&self) -> &Landmarks;

    fn landmarks_mut(&mut self) -> &mut Landmarks;

    /// Returns the estimated clockwise object rotation in radians.
    ///
    /// [`LandmarkTracker`] uses this to rotate its region of interest along with the object.
    ///
    /// If this returns [`None`], the RoI will not follow the rotation of the tracked object.
    fn angle_radians(&self) -> Option<f32> {
        None
    }
}

/// Trait for network inference results that contain a confidence value.
///
/// [`LandmarkTracker`] uses it to decide when to stop tracking a region of interest.
pub trait Confidence {
    /// Confidence value indicating whether the tracked object is in view.
    ///
    /// By convention, this is in range 0.0 to 1.0, with anything above 0.5 indicating that the
    /// tracked object is probably still in view.
    fn confidence(&self) -> f32;
}

/// Trait implemented by wrapper types around neural networks that estimate landmarks.
pub trait Network: Send + 'static {
    /// Type representing the predicted landmarks.
    type Output: Estimate;

    /// Returns the [`Cnn`] to use for landmark estimation.
    fn cnn(&self) -> &Cnn;

    /// Extracts the network outputs and writes them to `estimate`.
    ///
    /// The landmark positions are expected to be in the coordinate system of the network's input.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()>;
}

/// Neural-network based landmark estimator.
///
/// This estimator processes an input image and yields an [`Estimate`] of type `E`, containing the
/// derived [`Landmarks`] and other data (depending on the network).
pub struct Estimator<E: Estimate> {
    network: Box<dyn Network<Output = E>>,
    estimate: E,
    t_infer: Timer,
    t_extract: Timer,
}

impl<E: Estimate + Default> Estimator<E> {
    pub fn new<N: Network<Output = E>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            estimate: E::default(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
        }
    }
}

impl<E: Estimate> Estimator<E> {
    /// Returns the expected input resolution of the internal neural network.
    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Returns profiling timers for this landmark estimator.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract].into_iter()
    }

    /// Performs landmark estimation on `image`, returning the [`Estimate`].
    ///
    /// If the aspect ratio of `image` does not match the aspect ratio of the network's input, an
    /// enlarged view of the right aspect ratio is created first. Landmark positions are returned
    /// in the coordinate system of `image`.
    pub fn estimate<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&mut E> {
        self.estimate_impl(image.as_view())
    }

    fn estimate_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&mut E> {
        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            anyhow::bail!("network input resolution {input_res} is empty");
        };

        // If the input image's aspect ratio doesn't match the CNN's input, create an oversized view
        // that does.
        let rect = image.bounds().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract
            .time(|| self.network.extract(&outputs, &mut self.estimate))?;

        // Map landmark coordinates back into the input image: scale from network input to `rect`,
        // then remove the offset added by the oversized rectangle.
        let scale = rect.width() / input_res.width() as f32;
        self.estimate.landmarks_mut().map_positions(|pos| {
            let [x, y, z] = pos.map(|t| t * scale);
            [x + rect.x(), y + rect.y(), z]
        });

        Ok(&mut self.estimate)
    }
}

/// Tracks a region of interest (RoI) across subsequent frames by tracking the movement of estimated
/// landmarks.
///
/// Once seeded with a region of interest, the tracker will adjust its RoI based on the bounding
/// rectangle of the estimated landmarks. If the estimate provides an angle, the RoI also follows
/// the object's rotation.
pub struct LandmarkTracker<E: Estimate + Confidence> {
    aspect_ratio: AspectRatio,
    estimator: Estimator<E>,
    roi: Option<RotatedRect>,
    loss_thresh: f32,
}

impl<E: Estimate + Confidence> LandmarkTracker<E> {
    pub const DEFAULT_LOSS_THRESHOLD: f32 = 0.5;

    /// Padding added to each side of the landmark bounding box, relative to its size.
    pub const ROI_PADDING: f32 = 0.3;

    /// Creates a new [`LandmarkTracker`].
    pub fn new(estimator: Estimator<E>) -> Self {
        Self {
            aspect_ratio: estimator
                .input_resolution()
                .aspect_ratio()
                .unwrap_or(AspectRatio::SQUARE),
            estimator,
            roi: None,
            loss_thresh: Self::DEFAULT_LOSS_THRESHOLD,
        }
    }

    /// Returns profiling timers of the internal [`Estimator`].
    pub fn timers(&self) -> impl Iterator<Item = &Timer> {
        self.estimator.timers()
    }

    /// Sets the tracking loss threshold.
    ///
    /// If the confidence value of the predicted landmarks falls below this value, tracking is
    /// considered lost: the RoI is cleared and [`LandmarkTracker::track`] returns [`None`] until
    /// it is re-seeded with [`LandmarkTracker::set_roi`].
    pub fn set_loss_threshold(&mut self, threshold: f32) {
        self.loss_thresh = threshold;
    }

    /// Sets the region of interest.
    ///
    /// Note that this does not apply RoI padding. The rectangle is used as-is.
    pub fn set_roi(&mut self, roi: impl Into<RotatedRect>) {
        self.roi = Some(roi.into());
    }

    /// Performs landmark tracking on `full_image`.
    ///
    /// Returns `Ok(None)` if no RoI is set or if tracking was lost during this call. Otherwise the
    /// RoI is updated for the next frame, and the landmarks are returned in `full_image`
    /// coordinates.
    pub fn track<V>(&mut self, full_image: &V) -> anyhow::Result<Option<TrackingResult<'_, E>>>
    where
        V: AsImageView,
    {
        self.track_impl(full_image.as_view())
    }

    fn track_impl(
        &mut self,
        full_image: ImageView<'_>,
    ) -> anyhow::Result<Option<TrackingResult<'_, E>>> {
        let Some(roi) = self.roi else {
            return Ok(None);
        };
        let view_rect = roi.map(|rect| rect.grow_to_fit_aspect(self.aspect_ratio));
        let view = full_image.view(view_rect);
        let estimate = self.estimator.estimate(&view)?;
        if estimate.confidence() < self.loss_thresh {
            log::trace!(
                "LandmarkTracker: confidence {}, loss threshold {} -> LOST",
                estimate.confidence(),
                self.loss_thresh,
            );

            self.roi = None;
            return Ok(None);
        }

        let angle = roi.rotation_radians() + estimate.angle_radians().unwrap_or(0.0);

        // Map all landmarks to the image coordinate system.
        estimate.landmarks_mut().map_positions(|[x, y, z]| {
            let p = view_rect.transform_out([x, y]);
            [p.x, p.y, z]
        });

        let Some(updated_roi) = RotatedRect::bounding(
            angle,
            estimate.landmarks().iter().map(|lm| [lm.x(), lm.y()]),
        ) else {
            // Networks without landmarks cannot be tracked.
            self.roi = None;
            return Ok(None);
        };
        let updated_roi = updated_roi.grow_rel(Self::ROI_PADDING);
        self.roi = Some(updated_roi);

        Ok(Some(TrackingResult {
            estimate,
            updated_roi,
        }))
    }
}

/// The result returned by [`LandmarkTracker::track`].
pub struct TrackingResult<'a, E: Estimate> {
    estimate: &'a E,
    updated_roi: RotatedRect,
}

impl<'a, E: Estimate> TrackingResult<'a, E> {
    /// Returns the estimation result, including landmarks in full image coordinates.
    pub fn estimate(&self) -> &'a E {
        self.estimate
    }

    /// Returns the RoI that will be used in the next call to [`LandmarkTracker::track`].
    pub fn updated_roi(&self) -> RotatedRect {
        self.updated_roi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmarks_storage() {
        let mut lms = Landmarks::new(3);
        assert_eq!(lms.len(), 3);
        assert!(!lms.is_empty());
        assert_eq!(lms.get(2).position(), [0.0; 3]);

        lms.positions_mut()[0] = [3.0, 0.0, 3.0];
        lms.positions_mut()[1] = [0.0, 6.0, 0.0];
        assert_eq!(lms.positions()[1], [0.0, 6.0, 0.0]);

        lms.map_positions(|[x, y, z]| [x + 1.0, y, z * 2.0]);
        let first = lms.get(0);
        assert_eq!((first.x(), first.y(), first.z()), (4.0, 0.0, 6.0));
        assert_eq!(lms.iter().count(), 3);
    }
}
