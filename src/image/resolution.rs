//! Frame and network input sizes.

use std::fmt;

/// Size of a camera frame, image or network input, in pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels in a frame of this size. Never overflows.
    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns the reduced `width:height` ratio, or [`None`] for an empty resolution.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A `width:height` ratio in lowest terms.
///
/// Network inputs are compared to camera frames through this type, so `1920x1080` and `1280x720`
/// yield the same value.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Both nonzero and coprime.
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// The palm and landmark networks take square inputs.
    pub const SQUARE: Self = Self {
        width: 1,
        height: 1,
    };

    /// Reduces `width:height`. Returns [`None`] if either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let divisor = gcd(width, height);
        Some(Self {
            width: width / divisor,
            height: height / divisor,
        })
    }

    /// Width divided by height.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_divisor() {
        assert_eq!(gcd(640, 480), 160);
        assert_eq!(gcd(192, 192), 192);
        assert_eq!(gcd(17, 5), 1);
        assert_eq!(gcd(0, 9), 9);
        assert_eq!(gcd(9, 0), 9);
    }

    #[test]
    fn camera_aspect_ratios() {
        let hd = Resolution::new(1280, 720).aspect_ratio().unwrap();
        assert_eq!(hd, Resolution::new(1920, 1080).aspect_ratio().unwrap());
        assert_eq!(hd.to_string(), "16:9");
        assert_eq!(format!("{:?}", Resolution::new(640, 480)), "640x480");
        assert_eq!(
            Resolution::new(640, 480).aspect_ratio().unwrap().to_string(),
            "4:3"
        );
        assert_eq!(
            Resolution::new(192, 192).aspect_ratio(),
            Some(AspectRatio::SQUARE)
        );
        assert_eq!(Resolution::new(0, 480).aspect_ratio(), None);
        assert_eq!(Resolution::new(3, 2).num_pixels(), 6);
    }
}
