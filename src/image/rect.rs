//! Rectangle types.
//!
//! These are used for image views, object detections and regions of interest.

use std::fmt;

use nalgebra::{Rotation2, Vector2};

use super::AspectRatio;

/// An axis-aligned rectangle.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: Vector2<f32>,
    size: Vector2<f32>,
}

impl Rect {
    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: Vector2::new(x_center, y_center),
            size: Vector2::new(width, height),
        }
    }

    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self::from_center(
            top_left_x + width * 0.5,
            top_left_y + height * 0.5,
            width,
            height,
        )
    }

    /// Computes the (axis-aligned) bounding rectangle that encompasses `points`.
    ///
    /// Returns [`None`] if `points` is an empty iterator.
    pub fn bounding<I, T>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Vector2<f32>>,
    {
        let mut iter = points.into_iter();

        let first: Vector2<f32> = iter.next()?.into();
        let (mut min, mut max) = (first, first);

        for pt in iter {
            let pt = pt.into();
            min = min.inf(&pt);
            max = max.sup(&pt);
        }

        Some(Self::span_inner(min.x, min.y, max.x, max.y))
    }

    fn span_inner(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        assert!(x_min <= x_max, "x_min={}, x_max={}", x_min, x_max);
        assert!(y_min <= y_max, "y_min={}, y_max={}", y_min, y_max);
        Self::from_top_left(x_min, y_min, x_max - x_min, y_max - y_min)
    }

    /// Scales the width and height of this [`Rect`] by the given amount.
    ///
    /// The center position of the [`Rect`] remains the same.
    #[must_use]
    pub fn scale(&self, scale: f32) -> Self {
        Self {
            center: self.center,
            size: self.size * scale,
        }
    }

    /// Grows this rectangle by adding a margin relative to width and height.
    ///
    /// `amount` is the relative amount of the rectangles width and height to add to each side.
    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        Self {
            center: self.center,
            size: self.size * (1.0 + 2.0 * amount),
        }
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        let mut res = *self;
        let target_width = self.height() * target_aspect.as_f32();
        if target_width >= self.width() {
            res.size.x = target_width;
        } else {
            res.size.y = self.width() / target_aspect.as_f32();
        }

        res
    }

    #[inline]
    pub fn top_left(&self) -> Vector2<f32> {
        self.center - self.size * 0.5
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.top_left().x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.top_left().y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    #[inline]
    pub fn center(&self) -> Vector2<f32> {
        self.center
    }

    #[inline]
    pub fn size(&self) -> Vector2<f32> {
        self.size
    }

    #[must_use]
    pub fn move_to(&self, x: f32, y: f32) -> Rect {
        Rect::from_top_left(x, y, self.width(), self.height())
    }

    /// Computes the intersection of `self` and `other`.
    ///
    /// Returns [`None`] when the intersection is empty (ie. the rectangles do not overlap).
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let min = self.top_left().sup(&other.top_left());
        let max = (self.top_left() + self.size()).inf(&(other.top_left() + other.size()));
        if min.x > max.x || min.y > max.y {
            return None;
        }

        Some(Rect::span_inner(min.x, min.y, max.x, max.y))
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        self.intersection(other).map_or(0.0, |rect| rect.area())
    }

    fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    ///
    /// Two empty rectangles have an IOU of 0.
    pub fn iou(&self, other: &Self) -> f32 {
        let union = self.union_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }

    pub fn contains_point(&self, point: impl Into<Vector2<f32>>) -> bool {
        let p: Vector2<f32> = point.into();
        self.x() <= p.x
            && self.y() <= p.y
            && self.x() + self.width() >= p.x
            && self.y() + self.height() >= p.y
    }

    /// Returns the corners in order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Vector2<f32>; 4] {
        let [x, y] = [self.x(), self.y()];
        let [w, h] = [self.width(), self.height()];
        [
            Vector2::new(x, y),
            Vector2::new(x + w, y),
            Vector2::new(x + w, y + h),
            Vector2::new(x, y + h),
        ]
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.center.x, self.center.y, self.size.x, self.size.y,
        )
    }
}

/// A [`Rect`], rotated around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    /// Creates a new rotated rectangle.
    ///
    /// `radians` is the clockwise rotation to apply to the [`Rect`].
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// Approximates the rotated bounding rectangle that encompasses `points`.
    ///
    /// Returns [`None`] if `points` is an empty iterator.
    pub fn bounding<I, T>(radians: f32, points: I) -> Option<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<Vector2<f32>>,
    {
        let mut points = points.into_iter().peekable();
        points.peek()?;

        // Rotate all points into the rectangle's frame (around the origin), take the axis-aligned
        // bounds there, then rotate the center back.
        let to_rect = Rotation2::new(-radians);
        let mut min = Vector2::repeat(f32::MAX);
        let mut max = Vector2::repeat(f32::MIN);
        for point in points {
            let p = to_rect * point.into();
            min = min.inf(&p);
            max = max.sup(&p);
        }

        let center = Rotation2::new(radians) * ((min + max) * 0.5);
        let size = max - min;

        Some(Self::new(
            Rect::from_center(center.x, center.y, size.x, size.y),
            radians,
        ))
    }

    /// Returns the rectangle's clockwise rotation in radians.
    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// Returns a reference to the underlying non-rotated rectangle.
    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Applies a closure to the underlying non-rotated [`Rect`].
    #[must_use]
    pub fn map(mut self, f: impl FnOnce(Rect) -> Rect) -> Self {
        self.rect = f(self.rect);
        self
    }

    #[inline]
    pub fn center(&self) -> Vector2<f32> {
        self.rect.center()
    }

    /// Grows this rectangle by adding a margin relative to width and height.
    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        self.map(|rect| rect.grow_rel(amount))
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        self.map(|rect| rect.grow_to_fit_aspect(target_aspect))
    }

    /// Returns the rotated rectangle's corners in the parent's coordinate system.
    ///
    /// The order is: top-left, top-right, bottom-right, bottom-left, as seen from the non-rotated
    /// rect.
    pub fn rotated_corners(&self) -> [Vector2<f32>; 4] {
        let rot = Rotation2::new(self.radians);
        let center = self.rect.center();
        self.rect.corners().map(|p| center + rot * (p - center))
    }

    /// Returns the axis-aligned bounding [`Rect`] of the rotated rectangle.
    pub fn bounding_rect(&self) -> Rect {
        // `corners` is never empty
        Rect::bounding(self.rotated_corners()).unwrap_or(self.rect)
    }

    pub fn contains_point(&self, point: impl Into<Vector2<f32>>) -> bool {
        let pt = self.transform_in(point);

        // The rect offset was already compensated for by the transform.
        self.rect.move_to(0.0, 0.0).contains_point(pt)
    }

    /// Transforms a point from the parent coordinate system into the [`RotatedRect`]'s system.
    ///
    /// The origin of the inner coordinate system is formed by the top left corner of the rectangle.
    pub fn transform_in(&self, pt: impl Into<Vector2<f32>>) -> Vector2<f32> {
        let half = self.rect.size() * 0.5;
        let rel = pt.into() - self.rect.center();
        Rotation2::new(-self.radians) * rel + half
    }

    /// Transforms a point from the [`RotatedRect`]'s coordinate system to the parent system.
    ///
    /// The origin of the inner coordinate system is formed by the top left corner of the rectangle.
    pub fn transform_out(&self, pt: impl Into<Vector2<f32>>) -> Vector2<f32> {
        let half = self.rect.size() * 0.5;
        Rotation2::new(self.radians) * (pt.into() - half) + self.rect.center()
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}
