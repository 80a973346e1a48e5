//! Interactive camera selection.

use std::io::{self, Write};

use inquire::CustomType;
use linuxvideo::{CapabilityFlags, Device};

use super::{device_path, names::CameraNameResolver};

/// Number of camera indices probed when listing cameras.
pub const PROBED_CAMERAS: u32 = 5;

/// Returns whether a capture device with the given index exists.
pub fn probe_camera(index: u32) -> bool {
    let Ok(device) = Device::open(&device_path(index)) else {
        return false;
    };
    match device.capabilities() {
        Ok(caps) => caps
            .device_capabilities()
            .contains(CapabilityFlags::VIDEO_CAPTURE),
        Err(e) => {
            log::debug!("failed to query camera {}: {}", index, e);
            false
        }
    }
}

/// Writes the availability of the first [`PROBED_CAMERAS`] camera indices to `out`.
pub fn list_cameras<W: Write>(
    out: &mut W,
    probe: impl Fn(u32) -> bool,
    names: &dyn CameraNameResolver,
) -> io::Result<()> {
    writeln!(out, "Available camera indices (try 0, 1, 2, ...):")?;
    for index in 0..PROBED_CAMERAS {
        if probe(index) {
            writeln!(
                out,
                "  Camera {}: Available - {}",
                index,
                names.display_name(index)
            )?;
        } else {
            writeln!(out, "  Camera {}: Not available", index)?;
        }
    }
    Ok(())
}

/// Lists the available cameras on stdout and asks the user to pick one.
pub fn select_camera(names: &dyn CameraNameResolver) -> anyhow::Result<u32> {
    list_cameras(&mut io::stdout().lock(), probe_camera, names)?;

    let index = CustomType::<u32>::new("Enter camera index to use")
        .with_default(0)
        .with_error_message("Please enter a non-negative integer")
        .prompt()?;
    Ok(index)
}
