//! Frame annotations: hand skeletons, the highlighted landmark and the frame rate.

use crate::hand::landmark::{LandmarkIdx, LandmarkResult, CONNECTIVITY};
use crate::image::{draw_circle, draw_line, draw_text, Color, Image};

pub const CONNECTION_COLOR: Color = Color::from_rgb8(224, 224, 224);
pub const LANDMARK_COLOR: Color = Color::RED;
pub const HIGHLIGHT_COLOR: Color = Color::MAGENTA;
pub const FPS_COLOR: Color = Color::GREEN;

const CONNECTION_WIDTH: u32 = 2;
const LANDMARK_DIAMETER: u32 = 5;
const HIGHLIGHT_DIAMETER: u32 = 50;

/// Position of the FPS readout's baseline origin.
const FPS_POS: (f32, f32) = (10.0, 30.0);

/// Draws a hand's connections and landmarks.
pub fn draw_hand(image: &mut Image, hand: &LandmarkResult) {
    for &(a, b) in CONNECTIVITY {
        let [ax, ay, _] = hand.landmark_position(a as usize);
        let [bx, by, _] = hand.landmark_position(b as usize);
        draw_line(image, ax, ay, bx, by)
            .color(CONNECTION_COLOR)
            .stroke_width(CONNECTION_WIDTH);
    }

    for [x, y, _] in hand.landmark_positions() {
        draw_circle(image, x, y, LANDMARK_DIAMETER)
            .color(LANDMARK_COLOR)
            .filled();
    }
}

/// Draws a filled disk on one landmark of a hand.
pub fn draw_highlight(image: &mut Image, hand: &LandmarkResult, landmark: LandmarkIdx) {
    let [x, y, _] = hand.landmark_position(landmark as usize);
    draw_circle(image, x, y, HIGHLIGHT_DIAMETER)
        .color(HIGHLIGHT_COLOR)
        .filled();
}

/// Annotates all `hands`, placing the highlight below the skeleton.
pub fn draw_hands(image: &mut Image, hands: &[LandmarkResult], highlight: LandmarkIdx) {
    for hand in hands {
        draw_highlight(image, hand, highlight);
        draw_hand(image, hand);
    }
}

/// Draws the frame rate readout in the top left corner.
pub fn draw_fps(image: &mut Image, rate: f64) {
    let text = format_fps(rate);
    draw_text(image, FPS_POS.0, FPS_POS.1, &text)
        .color(FPS_COLOR)
        .align_left()
        .align_baseline();
}

fn format_fps(rate: f64) -> String {
    format!("FPS: {rate:.2}")
}

#[cfg(test)]
mod tests {
    use crate::hand::landmark::NUM_LANDMARKS;

    use super::*;

    fn hand() -> LandmarkResult {
        let mut positions = [[50.0, 50.0, 0.0]; NUM_LANDMARKS];
        positions[LandmarkIdx::PinkyTip as usize] = [150.0, 60.0, 0.0];
        LandmarkResult::new(positions, 1.0, 0.0)
    }

    fn count(image: &Image, color: Color) -> usize {
        let mut n = 0;
        for y in 0..image.height() {
            for x in 0..image.width() {
                if image.get(x, y) == color {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn fps_text() {
        assert_eq!(format_fps(4.166666), "FPS: 4.17");
        assert_eq!(format_fps(30.0), "FPS: 30.00");

        let mut image = Image::new(200, 60);
        draw_fps(&mut image, 29.97);
        assert!(count(&image, FPS_COLOR) > 0);

        // The baseline sits at y=30. Glyphs extend upwards from there.
        for y in 34..60 {
            for x in 0..200 {
                assert_ne!(image.get(x, y), FPS_COLOR, "({x}, {y})");
            }
        }
        for x in 0..10 {
            for y in 0..60 {
                assert_ne!(image.get(x, y), FPS_COLOR, "({x}, {y})");
            }
        }
    }

    #[test]
    fn highlight_below_skeleton() {
        let mut image = Image::new(200, 120);
        draw_hands(&mut image, &[hand()], LandmarkIdx::PinkyTip);

        // Off to the side of the pinky tip, only the highlight is visible.
        assert_eq!(image.get(165, 60), HIGHLIGHT_COLOR);
        assert_eq!(image.get(150, 80), HIGHLIGHT_COLOR);
        // The landmark dot is drawn on top.
        assert_eq!(image.get(150, 60), LANDMARK_COLOR);
        // A connection between the pinky tip and the other landmarks.
        assert_eq!(image.get(100, 55), CONNECTION_COLOR);
        assert_eq!(image.get(5, 5), Color::NULL);
    }

    #[test]
    fn highlight_other_landmark() {
        let mut image = Image::new(200, 120);
        draw_highlight(&mut image, &hand(), LandmarkIdx::Wrist);
        assert_eq!(image.get(50, 70), HIGHLIGHT_COLOR);
        assert_eq!(image.get(150, 60), Color::NULL);
    }

    #[test]
    fn no_hands() {
        let mut image = Image::new(64, 64);
        draw_hands(&mut image, &[], LandmarkIdx::PinkyTip);
        assert_eq!(count(&image, Color::NULL), 64 * 64);
    }
}
