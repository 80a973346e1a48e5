//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::cmp::Reverse;

use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::image::{Image, Resolution};
use crate::timer::Timer;

use super::device_path;

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

/// Format negotiation options.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebcamOptions {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

impl WebcamOptions {
    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    ///
    /// When the camera cannot deliver both, this controls which one is kept. Otherwise it controls
    /// which one is maximized.
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.pref = pref;
        self
    }

    /// Drops the parameter that is not preferred, then the preferred one.
    ///
    /// Returns `false` if there is nothing left to drop.
    fn relax(&mut self) -> bool {
        match self.pref {
            ParamPreference::Resolution => {
                self.fps.take().is_some() || self.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                self.resolution.take().is_some() || self.fps.take().is_some()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, prefs: WebcamOptions) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let fmt = pick_format(&formats, prefs).context("failed to negotiate a webcam format")?;
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks the best format, relaxing `prefs` until something matches.
fn pick_format(formats: &[FrameFormat], mut prefs: WebcamOptions) -> Option<FrameFormat> {
    loop {
        if let Some(fmt) = pick_format_step(formats, prefs) {
            return Some(fmt);
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        if !prefs.relax() {
            return None;
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }
}

fn pick_format_step(formats: &[FrameFormat], prefs: WebcamOptions) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| {
                (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
            })
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            eligible.sort_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)))
        }
        ParamPreference::Framerate => {
            eligible.sort_by_key(|fmt| (Reverse(fmt.frame_interval), fmt.resolution.num_pixels()))
        }
    }
    eligible.last().copied()
}

/// A webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the camera with the given index (`/dev/video{index}`).
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(index: u32, options: WebcamOptions) -> anyhow::Result<Self> {
        Self::open_impl(index, options).with_context(|| format!("Camera {index} is not open"))
    }

    fn open_impl(index: u32, options: WebcamOptions) -> anyhow::Result<Self> {
        let path = device_path(index);
        let dev = Device::open(&path)?;
        let caps = dev.capabilities()?;
        let cap_flags = caps.device_capabilities();
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            bail!("{} is not a video capture device", path.display());
        }

        let (pixfmt, fract) = negotiate_format(&dev, options)?;
        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream(2)?;

        Ok(Self {
            stream,
            width,
            height,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        })
    }

    /// Returns the size of the frames produced by this webcam.
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let image = match self.t_decode.time(|| Image::decode_jpeg(&buf)) {
                    Ok(image) => image,
                    Err(e) => {
                        // Webcams occasionally produce corrupted MJPG frames. A blank frame keeps
                        // the stream going without a latency spike.
                        log::error!("webcam decode error: {:#}", e);
                        Image::new(self.width, self.height)
                    }
                };
                Ok(image)
            })
            .map_err(Into::into)
    }

    /// Returns profiling timers for webcam access and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

impl Iterator for Webcam {
    type Item = anyhow::Result<Image>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(w: u32, h: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(w, h),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(640, 480, 30),
            fmt(640, 480, 60),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 15),
        ]
    }

    #[test]
    fn prefers_resolution() {
        let picked = pick_format(&formats(), WebcamOptions::default());
        assert_eq!(picked, Some(fmt(1920, 1080, 15)));

        let picked = pick_format(&formats(), WebcamOptions::default().fps(30));
        assert_eq!(picked, Some(fmt(1280, 720, 30)));
    }

    #[test]
    fn prefers_framerate() {
        let opts = WebcamOptions::default().prefer(ParamPreference::Framerate);
        assert_eq!(pick_format(&formats(), opts), Some(fmt(640, 480, 60)));

        let opts = opts.resolution(Resolution::new(1280, 720));
        assert_eq!(pick_format(&formats(), opts), Some(fmt(1280, 720, 30)));
    }

    #[test]
    fn relaxes_preferences() {
        // Nothing delivers 1080p at 60 FPS. The resolution preference keeps the resolution.
        let opts = WebcamOptions::default()
            .resolution(Resolution::new(1920, 1080))
            .fps(60);
        assert_eq!(pick_format(&formats(), opts), Some(fmt(1920, 1080, 15)));

        let opts = opts.prefer(ParamPreference::Framerate);
        assert_eq!(pick_format(&formats(), opts), Some(fmt(640, 480, 60)));

        assert_eq!(pick_format(&[], WebcamOptions::default()), None);
    }
}
