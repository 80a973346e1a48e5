//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::detection::nms::SuppressionMode;
use crate::hand::LandmarkIdx;
use crate::video::webcam::ParamPreference;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Index of the camera to use (`/dev/video<CAMERA>`). Prompts for one if omitted.
    #[arg(allow_negative_numbers = true)]
    pub camera: Option<String>,

    /// Palm detection model (ONNX)
    #[arg(
        long,
        env = "HANDCAM_PALM_MODEL",
        default_value = "models/palm_detection_full.onnx"
    )]
    pub palm_model: PathBuf,

    /// Hand landmark model (ONNX)
    #[arg(
        long,
        env = "HANDCAM_LANDMARK_MODEL",
        default_value = "models/hand_landmark_full.onnx"
    )]
    pub landmark_model: PathBuf,

    /// Maximum number of hands to track
    #[arg(long, default_value_t = 2)]
    pub max_hands: usize,

    /// Minimum palm detection confidence for a new hand
    #[arg(long, default_value_t = 0.5, value_parser = parse_confidence)]
    pub min_detection_confidence: f32,

    /// Minimum hand presence score to keep tracking a hand
    #[arg(long, default_value_t = 0.5, value_parser = parse_confidence)]
    pub min_tracking_confidence: f32,

    /// Landmark to highlight (0 = wrist, 20 = pinky tip)
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(0..=20))]
    pub highlight: u8,

    /// Requested capture frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Which capture parameter to keep when the camera cannot deliver both
    #[arg(long, value_enum, default_value_t = PreferOpt::Resolution)]
    pub prefer: PreferOpt,

    /// How overlapping palm detections are merged
    #[arg(long, value_enum, default_value_t = NmsOpt::Average)]
    pub nms: NmsOpt,

    /// Show the camera image as-is instead of mirrored
    #[arg(long)]
    pub no_mirror: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreferOpt {
    Resolution,
    Framerate,
}

impl From<PreferOpt> for ParamPreference {
    fn from(v: PreferOpt) -> Self {
        match v {
            PreferOpt::Resolution => ParamPreference::Resolution,
            PreferOpt::Framerate => ParamPreference::Framerate,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NmsOpt {
    /// Confidence-weighted average of overlapping detections
    Average,
    /// Keep only the most confident of overlapping detections
    Remove,
}

impl From<NmsOpt> for SuppressionMode {
    fn from(v: NmsOpt) -> Self {
        match v {
            NmsOpt::Average => SuppressionMode::Average,
            NmsOpt::Remove => SuppressionMode::Remove,
        }
    }
}

/// How the camera to use is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraChoice {
    Index(u32),
    /// No camera given, ask the user.
    Prompt,
}

impl Args {
    pub fn camera_choice(&self) -> CameraChoice {
        match &self.camera {
            None => CameraChoice::Prompt,
            Some(arg) => match arg.trim().parse::<u32>() {
                Ok(index) => CameraChoice::Index(index),
                Err(_) => {
                    log::warn!("Invalid camera index. Using default camera 0.");
                    CameraChoice::Index(0)
                }
            },
        }
    }

    pub fn highlight(&self) -> LandmarkIdx {
        LandmarkIdx::from_index(self.highlight.into()).unwrap_or(LandmarkIdx::PinkyTip)
    }
}

fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not between 0.0 and 1.0"))
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("handcam").chain(args.iter().copied()))
    }

    #[test]
    fn verify_command() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.camera_choice(), CameraChoice::Prompt);
        assert_eq!(args.max_hands, 2);
        assert_eq!(args.min_detection_confidence, 0.5);
        assert_eq!(args.min_tracking_confidence, 0.5);
        assert_eq!(args.highlight(), LandmarkIdx::PinkyTip);
        assert_eq!(args.prefer, PreferOpt::Resolution);
        assert_eq!(args.fps, None);
        assert_eq!(SuppressionMode::from(args.nms), SuppressionMode::Average);
        assert!(!args.no_mirror);
    }

    #[test]
    fn camera_index() {
        assert_eq!(parse(&["2"]).unwrap().camera_choice(), CameraChoice::Index(2));
        assert_eq!(
            parse(&["front"]).unwrap().camera_choice(),
            CameraChoice::Index(0)
        );
        assert_eq!(parse(&["-1"]).unwrap().camera_choice(), CameraChoice::Index(0));
        assert_eq!(
            parse(&["-3", "--fps", "30"]).unwrap().camera_choice(),
            CameraChoice::Index(0)
        );
    }

    #[test]
    fn options() {
        let args = parse(&[
            "1",
            "--highlight",
            "8",
            "--max-hands",
            "1",
            "--min-detection-confidence",
            "0.7",
            "--prefer",
            "framerate",
            "--fps",
            "60",
            "--nms",
            "remove",
            "--no-mirror",
        ])
        .unwrap();
        assert_eq!(args.highlight(), LandmarkIdx::IndexFingerTip);
        assert_eq!(args.max_hands, 1);
        assert_eq!(args.min_detection_confidence, 0.7);
        assert_eq!(
            ParamPreference::from(args.prefer),
            ParamPreference::Framerate
        );
        assert_eq!(args.fps, Some(60));
        assert_eq!(SuppressionMode::from(args.nms), SuppressionMode::Remove);
        assert!(args.no_mirror);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(parse(&["--highlight", "21"]).is_err());
        assert!(parse(&["--min-tracking-confidence", "1.5"]).is_err());
        assert!(parse(&["--min-tracking-confidence", "abc"]).is_err());
        assert!(parse(&["--nms", "median"]).is_err());
    }
}
