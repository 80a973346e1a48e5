//! Human-readable camera names.

use linuxvideo::Device;

use super::device_path;

/// Name shown for cameras whose name cannot be determined.
pub const UNKNOWN_CAMERA: &str = "Unknown Camera";

/// Maps camera indices to display names.
pub trait CameraNameResolver {
    /// Returns the name of the camera with the given index, if known.
    fn camera_name(&self, index: u32) -> Option<String>;

    /// Returns the name of the camera, or [`UNKNOWN_CAMERA`].
    fn display_name(&self, index: u32) -> String {
        self.camera_name(index)
            .unwrap_or_else(|| UNKNOWN_CAMERA.to_string())
    }
}

/// Reads the card name reported by the V4L2 driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Names;

impl CameraNameResolver for V4l2Names {
    fn camera_name(&self, index: u32) -> Option<String> {
        let path = device_path(index);
        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                log::trace!("cannot open {}: {}", path.display(), e);
                return None;
            }
        };
        let caps = device.capabilities().ok()?;
        let name = caps.card().trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Resolver for platforms where camera names are unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNames;

impl CameraNameResolver for NoNames {
    fn camera_name(&self, _index: u32) -> Option<String> {
        None
    }
}

/// Returns the best resolver available on this platform.
pub fn default_resolver() -> Box<dyn CameraNameResolver> {
    if cfg!(target_os = "linux") {
        Box::new(V4l2Names)
    } else {
        Box::new(NoNames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl CameraNameResolver for Fixed {
        fn camera_name(&self, index: u32) -> Option<String> {
            (index == 1).then(|| "Integrated Webcam".to_string())
        }
    }

    #[test]
    fn fallback_name() {
        assert_eq!(NoNames.camera_name(0), None);
        assert_eq!(NoNames.display_name(0), "Unknown Camera");
        assert_eq!(Fixed.display_name(1), "Integrated Webcam");
        assert_eq!(Fixed.display_name(2), UNKNOWN_CAMERA);
    }
}
