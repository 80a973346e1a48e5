//! The capture, detect, annotate and display loop.

use std::time::Instant;

use itertools::Itertools;

use crate::fps::FrameRateEstimator;
use crate::gui::{self, InputEvent};
use crate::hand::{HandDetector, LandmarkIdx};
use crate::image::Image;
use crate::overlay;

/// Why [`Session::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user pressed Escape or `Q`.
    QuitKey,
    /// The user closed the window.
    WindowClosed,
    /// Reading a frame from the camera failed.
    CaptureFailed,
    /// The frame source has no more frames.
    EndOfStream,
}

/// Displays annotated frames and reports user input.
pub trait Viewer {
    fn show(&mut self, image: &Image) -> anyhow::Result<()>;

    /// Returns the next pending input event, if any.
    fn poll_event(&mut self) -> Option<InputEvent>;
}

impl Viewer for gui::Window {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        gui::Window::show(self, image)
    }

    fn poll_event(&mut self) -> Option<InputEvent> {
        gui::Window::poll_event(self)
    }
}

/// Owns everything the frame loop needs.
///
/// `S` is any source of frames, typically a [`crate::video::webcam::Webcam`].
pub struct Session<S, D, V> {
    source: S,
    detector: D,
    viewer: V,
    fps: FrameRateEstimator,
    clock: Box<dyn FnMut() -> Instant>,
    mirror: bool,
    highlight: LandmarkIdx,
}

impl<S, D, V> Session<S, D, V>
where
    S: Iterator<Item = anyhow::Result<Image>>,
    D: HandDetector,
    V: Viewer,
{
    pub fn new(source: S, detector: D, viewer: V) -> Self {
        Self {
            source,
            detector,
            viewer,
            fps: FrameRateEstimator::new(Instant::now()),
            clock: Box::new(Instant::now),
            mirror: true,
            highlight: LandmarkIdx::PinkyTip,
        }
    }

    /// Replaces the clock used to timestamp processed frames.
    ///
    /// This restarts frame rate measurement at the clock's current time.
    pub fn with_clock(mut self, mut clock: impl FnMut() -> Instant + 'static) -> Self {
        self.fps = FrameRateEstimator::new(clock());
        self.clock = Box::new(clock);
        self
    }

    /// Sets whether frames are flipped horizontally before processing. Enabled by default.
    pub fn mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Sets the landmark to highlight on every hand.
    pub fn highlight(mut self, landmark: LandmarkIdx) -> Self {
        self.highlight = landmark;
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    /// Takes the session apart, returning the frame source, detector and viewer.
    pub fn into_parts(self) -> (S, D, V) {
        (self.source, self.detector, self.viewer)
    }

    /// Returns the frame rate of the last completed measurement window.
    pub fn frame_rate(&self) -> Option<f64> {
        self.fps.current_rate()
    }

    /// Processes frames until the stream ends or the user quits.
    pub fn run(&mut self) -> anyhow::Result<StopReason> {
        let result = self.run_loop();
        log::info!("Exited main loop and closed window.");
        let reason = result?;
        log::debug!("stopped: {:?}", reason);
        Ok(reason)
    }

    fn run_loop(&mut self) -> anyhow::Result<StopReason> {
        loop {
            if let Some(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    /// Processes a single frame.
    ///
    /// Returns the reason to stop, or [`None`] if the loop should continue.
    pub fn step(&mut self) -> anyhow::Result<Option<StopReason>> {
        let mut image = match self.source.next() {
            Some(Ok(image)) => image,
            Some(Err(e)) => {
                log::error!("{:#}", e);
                log::error!("Failed to read from camera. Exiting loop.");
                return Ok(Some(StopReason::CaptureFailed));
            }
            None => {
                log::info!("end of video stream");
                return Ok(Some(StopReason::EndOfStream));
            }
        };

        if self.mirror {
            image.flip_horizontal_in_place();
        }

        let hands = self.detector.detect(&image)?;
        overlay::draw_hands(&mut image, &hands, self.highlight);

        let now = (self.clock)();
        if let Some(rate) = self.fps.on_frame_processed(now) {
            log::debug!(
                "{:.2} FPS, {} hands ({})",
                rate,
                hands.len(),
                self.detector.timers().into_iter().format(", "),
            );
        }
        if let Some(rate) = self.fps.current_rate() {
            overlay::draw_fps(&mut image, rate);
        }

        self.viewer.show(&image)?;

        while let Some(event) = self.viewer.poll_event() {
            match event {
                InputEvent::Quit => return Ok(Some(StopReason::QuitKey)),
                InputEvent::Closed => return Ok(Some(StopReason::WindowClosed)),
            }
        }

        Ok(None)
    }
}
