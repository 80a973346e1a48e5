//! Image manipulation.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image.
//! - [`ImageView`], a borrowed view of a (possibly rotated) rectangle of an [`Image`].
//! - A variety of freestanding `draw_*` functions to annotate images.
//! - [`Rect`] and [`RotatedRect`], float-valued rectangles used for views, detections and regions
//!   of interest.
//! - [`Resolution`] and [`AspectRatio`].

mod draw;
mod jpeg;
mod rect;
mod resolution;


use std::{fmt, ops::Index};

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{ImageBuffer, Rgba, RgbaImage};

pub use draw::*;
pub use rect::*;
pub use resolution::*;

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    // Same memory layout as `Rgba8UnormSrgb` textures, so this can be uploaded to the GPU as-is.
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image from a buffer of RGBA pixels, row by row.
    ///
    /// # Panics
    ///
    /// Panics if `buf` does not contain exactly `res.num_pixels() * 4` bytes.
    pub fn from_rgba8(res: Resolution, buf: &[u8]) -> Self {
        let expected_size = res.num_pixels() as usize * 4;
        assert_eq!(
            expected_size,
            buf.len(),
            "incorrect buffer size {} for {} image (expected {} bytes)",
            buf.len(),
            res,
            expected_size,
        );

        let mut image = Self::new(res.width(), res.height());
        image.buf.copy_from_slice(buf);
        image
    }

    /// Decodes a JFIF JPEG or Motion JPEG from a byte slice.
    ///
    /// The decoder backend is selected with the `HANDCAM_JPEG_BACKEND` environment variable.
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        jpeg::decode_jpeg(data)
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns a [`Rect`] covering this image.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Creates an immutable view into an area of this image, specified by `rect`.
    ///
    /// If `rect` lies partially outside of `self`, the pixels that are outside of `self` will have
    /// the value [`Color::NULL`].
    pub fn view(&self, rect: impl Into<RotatedRect>) -> ImageView<'_> {
        ImageView {
            image: self,
            rect: rect.into(),
        }
    }

    pub fn flip_horizontal_in_place(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns the raw RGBA bytes of this image, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An immutable view of a rotated rectangular section of an [`Image`].
///
/// Pixels are fetched with nearest-neighbor sampling.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    /// Rectangle in the root image's coordinates.
    rect: RotatedRect,
}

impl<'a> ImageView<'a> {
    /// Returns the width of this view, in pixels.
    pub fn width(&self) -> u32 {
        self.rect.rect().width().round().max(0.0) as u32
    }

    /// Returns the height of this view, in pixels.
    pub fn height(&self) -> u32 {
        self.rect.rect().height().round().max(0.0) as u32
    }

    /// Returns the size of this view.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the area of the underlying image covered by this view.
    #[inline]
    pub fn rect(&self) -> RotatedRect {
        self.rect
    }

    /// Returns a [`Rect`] of the size of this view, positioned at `(0, 0)`.
    ///
    /// This is the view's extent in its own coordinate system.
    #[inline]
    pub fn bounds(&self) -> Rect {
        let size = self.rect.rect().size();
        Rect::from_top_left(0.0, 0.0, size.x, size.y)
    }

    /// Gets the image color at the given pixel coordinates of the view.
    ///
    /// Coordinates outside of the underlying image yield [`Color::NULL`].
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.get_at(x as f32 + 0.5, y as f32 + 0.5)
    }

    /// Samples the view at normalized coordinates.
    ///
    /// `(0.0, 0.0)` is the top left corner of the view, `(1.0, 1.0)` the bottom right one.
    pub fn sample(&self, u: f32, v: f32) -> Color {
        let rect = self.rect.rect();
        self.get_at(u * rect.width(), v * rect.height())
    }

    fn get_at(&self, x: f32, y: f32) -> Color {
        let pt = self.rect.transform_out([x, y]);
        let (x, y) = (pt.x.floor(), pt.y.floor());
        if x < 0.0 || y < 0.0 {
            return Color::NULL;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.image.width() || y >= self.image.height() {
            return Color::NULL;
        }
        self.image.get(x, y)
    }

    /// Creates an immutable subview into an area of this view, specified by `rect`.
    ///
    /// `rect` is given in the coordinate system of `self`, and its rotation is added to the
    /// rotation of `self`.
    pub fn view(&self, rect: impl Into<RotatedRect>) -> ImageView<'a> {
        let rect: RotatedRect = rect.into();
        let center = self.rect.transform_out(rect.center());
        let size = rect.rect().size();
        ImageView {
            image: self.image,
            rect: RotatedRect::new(
                Rect::from_center(center.x, center.y, size.x, size.y),
                self.rect.rotation_radians() + rect.rotation_radians(),
            ),
        }
    }

    /// Copies the contents of this view into a new [`Image`].
    pub fn to_image(&self) -> Image {
        let mut image = Image::new(self.width(), self.height());
        for (x, y, pixel) in image.buf.enumerate_pixels_mut() {
            pixel.0 = self.get(x, y).0;
        }
        image
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageView", self.width(), self.height())
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);
    pub const MAGENTA: Self = Self([255, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

/// Trait for types that can be treated as read-only views of image data.
///
/// This allows abstracting over [`Image`] and [`ImageView`] and should be used by any code that
/// takes immutable image data as input.
pub trait AsImageView {
    /// Returns an [`ImageView`] covering `self`.
    fn as_view(&self) -> ImageView<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(self.rect())
    }
}

impl<'a> AsImageView for ImageView<'a> {
    fn as_view(&self) -> ImageView<'_> {
        *self
    }
}

impl<'a, V: AsImageView> AsImageView for &'a V {
    fn as_view(&self) -> ImageView<'_> {
        (*self).as_view()
    }
}
