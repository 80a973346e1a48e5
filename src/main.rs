use anyhow::Context;
use clap::Parser;
use itertools::Itertools;

use handcam::cli::{Args, CameraChoice};
use handcam::gui;
use handcam::hand::detection::PalmNetwork;
use handcam::hand::landmark::LandmarkNetwork;
use handcam::hand::HandTracker;
use handcam::session::Session;
use handcam::video::names::default_resolver;
use handcam::video::select::select_camera;
use handcam::video::webcam::{Webcam, WebcamOptions};

fn main() -> anyhow::Result<()> {
    handcam::init_logger();
    let args = Args::parse();

    let camera = match args.camera_choice() {
        CameraChoice::Index(index) => index,
        CameraChoice::Prompt => {
            println!("No camera index provided as argument.");
            select_camera(&*default_resolver())?
        }
    };

    gui::run(move || run(args, camera))
}

fn run(args: Args, camera: u32) -> anyhow::Result<()> {
    let mut options = WebcamOptions::default().prefer(args.prefer.into());
    if let Some(fps) = args.fps {
        options = options.fps(fps);
    }
    let webcam = Webcam::open(camera, options)?;
    log::info!("Initialized Camera {camera}");

    let palm = PalmNetwork::load(&args.palm_model).with_context(|| {
        format!(
            "failed to load palm detection model from '{}'",
            args.palm_model.display()
        )
    })?;
    let landmarks = LandmarkNetwork::load(&args.landmark_model).with_context(|| {
        format!(
            "failed to load hand landmark model from '{}'",
            args.landmark_model.display()
        )
    })?;

    let mut tracker = HandTracker::new(palm, landmarks);
    tracker.set_max_hands(args.max_hands);
    tracker.set_detection_threshold(args.min_detection_confidence);
    tracker.set_tracking_threshold(args.min_tracking_confidence);
    tracker.set_nms_mode(args.nms.into());

    let window = gui::Window::open("Video")?;

    let mut session = Session::new(webcam, tracker, window)
        .mirror(!args.no_mirror)
        .highlight(args.highlight());
    session.run()?;

    let (webcam, _, _) = session.into_parts();
    log::debug!("capture: {}", webcam.timers().format(", "));
    Ok(())
}
