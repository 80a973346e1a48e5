//! Palm detection.

use std::path::Path;

use anyhow::ensure;
use itertools::Itertools;
use nalgebra::{Rotation2, Vector2};
use once_cell::sync::Lazy;

use crate::detection::{
    self,
    ssd::{Anchor, Anchors, LayerInfo},
    Detection, Network,
};
use crate::image::{Rect, Resolution};
use crate::nn::{Cnn, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

const NUM_KEYPOINTS: usize = 7;

/// Values per anchor: box center offset, box size, and 7 keypoint offsets.
const BOX_PARAMS: usize = 4 + NUM_KEYPOINTS * 2;

static ANCHORS: Lazy<Anchors> =
    Lazy::new(|| Anchors::calculate(&[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)]));

/// The full-range palm detection network.
///
/// Expects a 192x192 RGB input and produces 2016 candidate boxes.
#[derive(Clone)]
pub struct PalmNetwork {
    cnn: Cnn,
}

impl PalmNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?.load()?;
        Ok(Self {
            cnn: Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?,
        })
    }
}

impl Network for PalmNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()> {
        let num_anchors = ANCHORS.anchor_count();
        ensure!(
            outputs.len() >= 2,
            "palm detection network produced {} outputs, expected 2",
            outputs.len()
        );
        ensure!(
            outputs.shape(0)? == [1, num_anchors, BOX_PARAMS],
            "unexpected palm box output shape {:?}",
            outputs.shape(0)?
        );
        ensure!(
            outputs.shape(1)? == [1, num_anchors, 1],
            "unexpected palm score output shape {:?}",
            outputs.shape(1)?
        );

        decode(
            &ANCHORS,
            self.cnn.input_resolution(),
            outputs.data(0)?,
            outputs.data(1)?,
            threshold,
            detections,
        )
    }
}

/// Decodes raw network outputs into detections with a confidence of at least `thresh`.
///
/// `boxes` holds [`BOX_PARAMS`] values per anchor, `scores` one raw logit per anchor.
fn decode(
    anchors: &Anchors,
    input_res: Resolution,
    boxes: &[f32],
    scores: &[f32],
    thresh: f32,
    detections: &mut Vec<Detection>,
) -> anyhow::Result<()> {
    ensure!(
        scores.len() == anchors.anchor_count() && boxes.len() == scores.len() * BOX_PARAMS,
        "palm output sizes do not match {} anchors",
        anchors.anchor_count()
    );

    for (index, (&score, box_params)) in scores
        .iter()
        .zip_eq(boxes.chunks_exact(BOX_PARAMS))
        .enumerate()
    {
        let conf = sigmoid(score);
        if conf < thresh {
            continue;
        }

        detections.push(extract_detection(&anchors[index], input_res, box_params, conf));
    }

    Ok(())
}

fn extract_detection(
    anchor: &Anchor,
    input_res: Resolution,
    box_params: &[f32],
    confidence: f32,
) -> Detection {
    let input_w = input_res.width() as f32;
    let input_h = input_res.height() as f32;
    let (ax, ay) = (anchor.x_center() * input_w, anchor.y_center() * input_h);

    let xc = box_params[0] + ax;
    let yc = box_params[1] + ay;
    let w = box_params[2];
    let h = box_params[3];
    let keypoints = box_params[4..]
        .chunks_exact(2)
        .map(|xy| detection::Keypoint::new(xy[0] + ax, xy[1] + ay))
        .collect();

    let mut det = Detection::with_keypoints(confidence, Rect::from_center(xc, yc, w, h), keypoints);

    let finger = det.keypoints()[Keypoint::MiddleFingerMcp as usize];
    let wrist = det.keypoints()[Keypoint::Wrist as usize];
    let rel = Vector2::new(wrist.x() - finger.x(), wrist.y() - finger.y());
    det.set_angle(Rotation2::rotation_between(&Vector2::y(), &rel).angle());

    det
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    /// Box parameters with the wrist and middle finger MCP at the given offsets from the anchor.
    fn params(wrist: [f32; 2], middle: [f32; 2]) -> [f32; BOX_PARAMS] {
        let mut p = [0.0; BOX_PARAMS];
        p[2] = 20.0;
        p[3] = 30.0;
        p[4..6].copy_from_slice(&wrist);
        p[8..10].copy_from_slice(&middle);
        p
    }

    #[test]
    fn decodes_confident_boxes() {
        let anchors = Anchors::calculate(&[LayerInfo::new(1, 2, 1)]);
        let res = Resolution::new(192, 192);

        let mut boxes = params([0.0, 10.0], [0.0, -10.0]).to_vec();
        boxes.extend(params([0.0, 10.0], [0.0, -10.0]));
        let scores = [-5.0, 5.0];

        let mut dets = Vec::new();
        decode(&anchors, res, &boxes, &scores, 0.5, &mut dets).unwrap();
        assert_eq!(dets.len(), 1);

        let det = &dets[0];
        assert_abs_diff_eq!(det.confidence(), sigmoid(5.0));
        assert_eq!(det.bounding_rect(), Rect::from_center(144.0, 96.0, 20.0, 30.0));
        assert_eq!(det.keypoints().len(), NUM_KEYPOINTS);
        assert_eq!(
            det.keypoints()[Keypoint::Wrist as usize],
            detection::Keypoint::new(144.0, 106.0)
        );
        // Upright hand: fingers above the wrist.
        assert_abs_diff_eq!(det.angle(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn angle_is_clockwise() {
        let anchors = Anchors::calculate(&[LayerInfo::new(1, 1, 1)]);
        let res = Resolution::new(192, 192);

        // Fingers point to the right: rotated clockwise by 90°.
        let boxes = params([-10.0, 0.0], [10.0, 0.0]);
        let mut dets = Vec::new();
        decode(&anchors, res, &boxes, &[10.0], 0.5, &mut dets).unwrap();
        assert_abs_diff_eq!(dets[0].angle(), FRAC_PI_2, epsilon = 1e-6);

        // Fingers point to the left.
        let boxes = params([10.0, 0.0], [-10.0, 0.0]);
        dets.clear();
        decode(&anchors, res, &boxes, &[10.0], 0.5, &mut dets).unwrap();
        assert_abs_diff_eq!(dets[0].angle(), -FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn rejects_mismatched_outputs() {
        let anchors = Anchors::calculate(&[LayerInfo::new(1, 2, 1)]);
        let mut dets = Vec::new();
        let result = decode(
            &anchors,
            Resolution::new(192, 192),
            &[0.0; BOX_PARAMS],
            &[0.0, 0.0],
            0.5,
            &mut dets,
        );
        assert!(result.is_err());
    }

    #[test]
    fn palm_anchors() {
        assert_eq!(ANCHORS.anchor_count(), 2016);
    }
}
