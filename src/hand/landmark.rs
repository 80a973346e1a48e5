//! Hand landmark prediction.

use std::path::Path;

use anyhow::ensure;
use itertools::Itertools;
use nalgebra::{Rotation2, Vector2};

use crate::landmark::{Confidence, Estimate, Landmarks, Network};
use crate::nn::{Cnn, ColorMapper, NeuralNetwork, Outputs};

/// Number of landmarks the hand landmark network estimates.
pub const NUM_LANDMARKS: usize = 21;

/// Landmark results estimated by [`LandmarkNetwork`].
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    presence: f32,
    raw_handedness: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        LandmarkResult {
            landmarks: Landmarks::new(NUM_LANDMARKS),
            presence: 0.0,
            raw_handedness: 0.0,
        }
    }
}

impl LandmarkResult {
    /// Creates a landmark result from known positions.
    pub fn new(positions: [[f32; 3]; NUM_LANDMARKS], presence: f32, raw_handedness: f32) -> Self {
        let mut result = Self {
            presence,
            raw_handedness,
            ..Self::default()
        };
        result.landmarks.positions_mut().copy_from_slice(&positions);
        result
    }

    /// Returns the 3D landmark positions in the input image's coordinate system.
    pub fn landmark_positions(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.landmarks.positions().iter().copied()
    }

    /// Returns a landmark's position in the input image's coordinate system.
    pub fn landmark_position(&self, index: usize) -> [f32; 3] {
        self.landmarks.positions()[index]
    }

    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that fingers are pointed upwards.
    pub fn rotation_radians(&self) -> f32 {
        let [fx, fy, _] = self.landmark_position(LandmarkIdx::MiddleFingerMcp as usize);
        let [wx, wy, _] = self.landmark_position(LandmarkIdx::Wrist as usize);

        let rel = Vector2::new(wx - fx, wy - fy);
        Rotation2::rotation_between(&Vector2::y(), &rel).angle()
    }

    /// Returns the hand presence score, between 0.0 and 1.0.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated handedness of the hand in the image.
    ///
    /// This assumes that the camera image is passed in as-is (not mirrored), and should only be
    /// relied on when the presence is over some threshold.
    pub fn handedness(&self) -> Handedness {
        if self.raw_handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}

impl Estimate for LandmarkResult {
    #[inline]
    fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    #[inline]
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }

    fn angle_radians(&self) -> Option<f32> {
        Some(self.rotation_radians())
    }
}

impl Confidence for LandmarkResult {
    #[inline]
    fn confidence(&self) -> f32 {
        self.presence
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// All landmarks, in network output order.
    pub const ALL: [LandmarkIdx; NUM_LANDMARKS] = {
        use LandmarkIdx::*;
        [
            Wrist,
            ThumbCmc,
            ThumbMcp,
            ThumbIp,
            ThumbTip,
            IndexFingerMcp,
            IndexFingerPip,
            IndexFingerDip,
            IndexFingerTip,
            MiddleFingerMcp,
            MiddleFingerPip,
            MiddleFingerDip,
            MiddleFingerTip,
            RingFingerMcp,
            RingFingerPip,
            RingFingerDip,
            RingFingerTip,
            PinkyMcp,
            PinkyPip,
            PinkyDip,
            PinkyTip,
        ]
    };

    /// Returns the landmark with the given network output index.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Pairs of landmarks that form the hand skeleton.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// The full hand landmark estimation network.
///
/// Outputs screen landmarks (`[1, 63]`), hand presence (`[1, 1]`), handedness (`[1, 1]`) and
/// world landmarks (`[1, 63]`). World landmarks are not used and not computed.
#[derive(Clone)]
pub struct LandmarkNetwork {
    cnn: Cnn,
}

impl LandmarkNetwork {
    /// Loads the network from an ONNX file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let nn = NeuralNetwork::from_path(path)?
            .with_output_selection([0, 1, 2])
            .load()?;
        Ok(Self {
            cnn: Cnn::new(nn, ColorMapper::linear(0.0..=1.0))?,
        })
    }
}

impl Network for LandmarkNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
        ensure!(
            outputs.len() == 3,
            "hand landmark network produced {} outputs, expected 3",
            outputs.len()
        );
        ensure!(
            outputs.shape(0)? == [1, NUM_LANDMARKS * 3],
            "unexpected landmark output shape {:?}",
            outputs.shape(0)?
        );
        for index in [1, 2] {
            ensure!(
                outputs.shape(index)? == [1, 1],
                "unexpected shape {:?} for output #{index}",
                outputs.shape(index)?
            );
        }

        decode(
            outputs.data(0)?,
            outputs.data(1)?[0],
            outputs.data(2)?[0],
            estimate,
        )
    }
}

fn decode(
    screen_landmarks: &[f32],
    presence: f32,
    handedness: f32,
    estimate: &mut LandmarkResult,
) -> anyhow::Result<()> {
    ensure!(
        screen_landmarks.len() == NUM_LANDMARKS * 3,
        "expected {} landmark coordinates, got {}",
        NUM_LANDMARKS * 3,
        screen_landmarks.len()
    );

    estimate.presence = presence;
    estimate.raw_handedness = handedness;
    for (xyz, out) in screen_landmarks
        .chunks_exact(3)
        .zip_eq(estimate.landmarks.positions_mut())
    {
        out.copy_from_slice(xyz);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use approx::assert_abs_diff_eq;

    use super::*;

    fn upright_hand() -> [[f32; 3]; NUM_LANDMARKS] {
        let mut positions = [[0.0; 3]; NUM_LANDMARKS];
        for (i, pos) in positions.iter_mut().enumerate() {
            *pos = [i as f32, 0.0, 0.0];
        }
        positions[LandmarkIdx::Wrist as usize] = [50.0, 100.0, 0.0];
        positions[LandmarkIdx::MiddleFingerMcp as usize] = [50.0, 60.0, 0.0];
        positions
    }

    #[test]
    fn landmark_indices() {
        assert_eq!(LandmarkIdx::PinkyTip as usize, 20);
        assert_eq!(LandmarkIdx::from_index(20), Some(LandmarkIdx::PinkyTip));
        assert_eq!(LandmarkIdx::from_index(21), None);
        for (i, idx) in LandmarkIdx::ALL.iter().enumerate() {
            assert_eq!(*idx as usize, i);
        }
        assert_eq!(CONNECTIVITY.len(), 21);
    }

    #[test]
    fn decode_outputs() {
        let coords = (0..63).map(|i| i as f32).collect::<Vec<_>>();
        let mut result = LandmarkResult::default();
        decode(&coords, 0.9, 0.8, &mut result).unwrap();

        assert_eq!(result.presence(), 0.9);
        assert_eq!(result.confidence(), 0.9);
        assert_eq!(result.handedness(), Handedness::Right);
        assert_eq!(result.landmark_position(0), [0.0, 1.0, 2.0]);
        assert_eq!(
            result.landmark_position(LandmarkIdx::PinkyTip as usize),
            [60.0, 61.0, 62.0]
        );

        assert!(decode(&coords[..60], 0.9, 0.8, &mut result).is_err());
    }

    #[test]
    fn rotation() {
        let result = LandmarkResult::new(upright_hand(), 1.0, 0.0);
        assert_eq!(result.handedness(), Handedness::Left);
        assert_abs_diff_eq!(result.rotation_radians(), 0.0, epsilon = 1e-6);
        assert_eq!(result.angle_radians(), Some(result.rotation_radians()));

        let mut upside_down = upright_hand();
        upside_down[LandmarkIdx::MiddleFingerMcp as usize] = [50.0, 140.0, 0.0];
        let result = LandmarkResult::new(upside_down, 1.0, 0.0);
        assert_abs_diff_eq!(result.rotation_radians().abs(), PI, epsilon = 1e-6);
    }
}
