//! Anchor grids of single-shot detectors.
//!
//! The palm network predicts one box per anchor, as an offset from the anchor's center. Its two
//! output layers are a 24x24 grid with 2 anchors per cell (stride 8 on the 192x192 input),
//! followed by a 12x12 grid with 6 anchors per cell (stride 16). That gives
//! `24 * 24 * 2 + 12 * 12 * 6 = 2016` anchors. All anchors have unit size, so only their centers
//! are stored.

use std::ops::Index;

/// Center of an anchor, normalized to the network input (0.0 to 1.0 on both axes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    x: f32,
    y: f32,
}

impl Anchor {
    pub fn x_center(&self) -> f32 {
        self.x
    }

    pub fn y_center(&self) -> f32 {
        self.y
    }
}

/// One output layer: a `width` x `height` grid with `per_cell` anchors on each cell center.
#[derive(Debug, Clone, Copy)]
pub struct LayerInfo {
    per_cell: u32,
    width: u32,
    height: u32,
}

impl LayerInfo {
    /// # Panics
    ///
    /// Panics if `per_cell` is zero.
    pub const fn new(per_cell: u32, width: u32, height: u32) -> Self {
        assert!(per_cell != 0);
        Self {
            per_cell,
            width,
            height,
        }
    }

    /// Anchors of this layer in output order: row by row, all boxes of a cell next to each other.
    fn anchors(self) -> impl Iterator<Item = Anchor> {
        let (w, h) = (self.width, self.height);
        (0..h).flat_map(move |row| {
            (0..w).flat_map(move |col| {
                let anchor = Anchor {
                    x: (col as f32 + 0.5) / w as f32,
                    y: (row as f32 + 0.5) / h as f32,
                };
                (0..self.per_cell).map(move |_| anchor)
            })
        })
    }
}

/// All anchors of a network, indexed like its output rows.
#[derive(Debug)]
pub struct Anchors {
    anchors: Vec<Anchor>,
}

impl Anchors {
    /// Lays out the anchors of `layers`, in the order the network emits them.
    pub fn calculate(layers: &[LayerInfo]) -> Self {
        Self {
            anchors: layers.iter().flat_map(|layer| layer.anchors()).collect(),
        }
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl Index<usize> for Anchors {
    type Output = Anchor;

    fn index(&self, index: usize) -> &Anchor {
        &self.anchors[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_layout() {
        let anchors = Anchors::calculate(&[LayerInfo::new(2, 2, 2), LayerInfo::new(1, 1, 1)]);
        assert_eq!(anchors.anchor_count(), 9);

        // Boxes of one cell are adjacent.
        assert_eq!(anchors[0], anchors[1]);
        assert_eq!(anchors[0].x_center(), 0.25);
        assert_eq!(anchors[0].y_center(), 0.25);
        assert_eq!(anchors[2].x_center(), 0.75);
        assert_eq!(anchors[2].y_center(), 0.25);
        assert_eq!(anchors[4].y_center(), 0.75);
        assert_eq!(anchors[8].x_center(), 0.5);
        assert_eq!(anchors[8].y_center(), 0.5);
    }

    #[test]
    fn palm_anchor_count() {
        let anchors = Anchors::calculate(&[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)]);
        assert_eq!(anchors.anchor_count(), 2016);

        // The second layer starts after the 24x24x2 grid, on its first 16px cell center.
        let first_coarse = anchors[24 * 24 * 2];
        assert_eq!(first_coarse.x_center(), 0.5 / 12.0);
        assert_eq!(first_coarse.y_center(), 0.5 / 12.0);
        assert_eq!(anchors[2015].x_center(), 11.5 / 12.0);
    }
}
