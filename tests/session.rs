use std::time::{Duration, Instant};

use anyhow::anyhow;
use approx::assert_relative_eq;
use handcam::gui::InputEvent;
use handcam::hand::landmark::NUM_LANDMARKS;
use handcam::hand::{HandDetector, LandmarkIdx, LandmarkResult};
use handcam::image::{Color, Image};
use handcam::overlay::{FPS_COLOR, HIGHLIGHT_COLOR};
use handcam::session::{Session, StopReason, Viewer};

const WIDTH: u32 = 200;
const HEIGHT: u32 = 120;

fn frame() -> Image {
    let mut image = Image::new(WIDTH, HEIGHT);
    image.clear(Color::BLACK);
    image
}

fn frames(n: usize) -> impl Iterator<Item = anyhow::Result<Image>> {
    (0..n).map(|_| Ok(frame()))
}

/// Reports the same hand in every frame.
#[derive(Default)]
struct FakeDetector {
    hands: Vec<LandmarkResult>,
    calls: usize,
}

impl FakeDetector {
    fn with_hand() -> Self {
        let mut positions = [[40.0, 80.0, 0.0]; NUM_LANDMARKS];
        positions[LandmarkIdx::PinkyTip as usize] = [150.0, 70.0, 0.0];
        Self {
            hands: vec![LandmarkResult::new(positions, 1.0, 0.0)],
            calls: 0,
        }
    }
}

impl HandDetector for FakeDetector {
    fn detect(&mut self, _image: &Image) -> anyhow::Result<Vec<LandmarkResult>> {
        self.calls += 1;
        Ok(self.hands.clone())
    }
}

/// Records shown frames and emits scripted input after a given number of frames.
#[derive(Default)]
struct FakeViewer {
    shown: Vec<Image>,
    script: Vec<(usize, InputEvent)>,
}

impl FakeViewer {
    fn with_event(after_frames: usize, event: InputEvent) -> Self {
        Self {
            shown: Vec::new(),
            script: vec![(after_frames, event)],
        }
    }
}

impl Viewer for FakeViewer {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        self.shown.push(image.clone());
        Ok(())
    }

    fn poll_event(&mut self) -> Option<InputEvent> {
        let shown = self.shown.len();
        let pos = self.script.iter().position(|(after, _)| *after <= shown)?;
        Some(self.script.remove(pos).1)
    }
}

/// A clock that advances by `step_secs` on every call, starting at a fixed instant.
fn stepping_clock(step_secs: f64) -> impl FnMut() -> Instant {
    let start = Instant::now();
    let mut calls = 0u32;
    move || {
        let now = start + Duration::from_secs_f64(step_secs * f64::from(calls));
        calls += 1;
        now
    }
}

fn contains(image: &Image, color: Color) -> bool {
    (0..image.height()).any(|y| (0..image.width()).any(|x| image.get(x, y) == color))
}

#[test]
fn stops_at_end_of_stream() {
    let mut session = Session::new(frames(3), FakeDetector::default(), FakeViewer::default());
    assert_eq!(session.run().unwrap(), StopReason::EndOfStream);
    assert_eq!(session.detector().calls, 3);
    assert_eq!(session.viewer().shown.len(), 3);
}

#[test]
fn stops_on_capture_failure() {
    let source = vec![Ok(frame()), Err(anyhow!("device unplugged")), Ok(frame())].into_iter();
    let mut session = Session::new(source, FakeDetector::default(), FakeViewer::default());
    assert_eq!(session.run().unwrap(), StopReason::CaptureFailed);
    assert_eq!(session.viewer().shown.len(), 1);
    assert_eq!(session.detector().calls, 1);
}

#[test]
fn stops_on_quit_key() {
    let source = std::iter::repeat_with(|| Ok(frame()));
    let viewer = FakeViewer::with_event(2, InputEvent::Quit);
    let mut session = Session::new(source, FakeDetector::default(), viewer);
    assert_eq!(session.run().unwrap(), StopReason::QuitKey);
    assert_eq!(session.viewer().shown.len(), 2);
}

#[test]
fn stops_when_window_closed() {
    let source = std::iter::repeat_with(|| Ok(frame()));
    let viewer = FakeViewer::with_event(5, InputEvent::Closed);
    let mut session = Session::new(source, FakeDetector::default(), viewer);
    assert_eq!(session.run().unwrap(), StopReason::WindowClosed);
    assert_eq!(session.viewer().shown.len(), 5);
}

#[test]
fn capture_failure_wins_over_pending_input() {
    let source = vec![Ok(frame()), Err(anyhow!("timeout"))].into_iter();
    let viewer = FakeViewer::with_event(2, InputEvent::Quit);
    let mut session = Session::new(source, FakeDetector::default(), viewer);
    assert_eq!(session.run().unwrap(), StopReason::CaptureFailed);
}

#[test]
fn detector_errors_propagate() {
    struct Broken;

    impl HandDetector for Broken {
        fn detect(&mut self, _image: &Image) -> anyhow::Result<Vec<LandmarkResult>> {
            Err(anyhow!("inference failed"))
        }
    }

    let mut session = Session::new(frames(3), Broken, FakeViewer::default());
    assert!(session.run().is_err());
    assert!(session.viewer().shown.is_empty());
}

#[test]
fn draws_highlight() {
    let mut session = Session::new(frames(1), FakeDetector::with_hand(), FakeViewer::default())
        .mirror(false);
    session.run().unwrap();

    let shown = &session.viewer().shown[0];
    assert_eq!(shown.get(165, 70), HIGHLIGHT_COLOR);
    assert_eq!(shown.get(150, 90), HIGHLIGHT_COLOR);
    assert_eq!(shown.get(5, 5), Color::BLACK);
}

#[test]
fn highlight_follows_option() {
    let mut session = Session::new(frames(1), FakeDetector::with_hand(), FakeViewer::default())
        .mirror(false)
        .highlight(LandmarkIdx::Wrist);
    session.run().unwrap();

    let shown = &session.viewer().shown[0];
    assert_eq!(shown.get(165, 70), Color::BLACK);
    assert_eq!(shown.get(40, 100), HIGHLIGHT_COLOR);
}

#[test]
fn mirrors_frames() {
    let mut image = frame();
    image.set(10, 10, Color::BLUE);
    let source = vec![Ok(image.clone()), Ok(image)].into_iter();

    let mut session = Session::new(source, FakeDetector::default(), FakeViewer::default());
    session.run().unwrap();
    let shown = &session.viewer().shown[0];
    assert_eq!(shown.get(WIDTH - 11, 10), Color::BLUE);
    assert_eq!(shown.get(10, 10), Color::BLACK);

    let mut image = frame();
    image.set(10, 10, Color::BLUE);
    let mut session = Session::new(
        std::iter::once(Ok(image)),
        FakeDetector::default(),
        FakeViewer::default(),
    )
    .mirror(false);
    session.run().unwrap();
    assert_eq!(session.viewer().shown[0].get(10, 10), Color::BLUE);
}

#[test]
fn fps_appears_after_first_window() {
    // Frames are processed at t = 0.3, 0.6, 0.9, 1.2, 1.5.
    let mut session = Session::new(frames(5), FakeDetector::default(), FakeViewer::default())
        .with_clock(stepping_clock(0.3));
    assert_eq!(session.run().unwrap(), StopReason::EndOfStream);

    let shown = &session.viewer().shown;
    for image in &shown[..3] {
        assert!(!contains(image, FPS_COLOR));
    }
    assert!(contains(&shown[3], FPS_COLOR));
    assert!(contains(&shown[4], FPS_COLOR));

    let rate = session.frame_rate().unwrap();
    assert_relative_eq!(rate, 4.0 / 1.2, max_relative = 1e-6);
}

#[test]
fn no_fps_for_short_runs() {
    let mut session = Session::new(frames(4), FakeDetector::default(), FakeViewer::default())
        .with_clock(stepping_clock(0.1));
    session.run().unwrap();
    assert_eq!(session.frame_rate(), None);
    assert!(session
        .viewer()
        .shown
        .iter()
        .all(|image| !contains(image, FPS_COLOR)));
}
