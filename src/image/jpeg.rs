use std::{
    env::{self, VarError},
    panic::catch_unwind,
    process,
};

use anyhow::{bail, Context};
use image::{ImageBuffer, RgbaImage};
use once_cell::sync::Lazy;

use super::Image;

const BACKEND_VAR: &str = "HANDCAM_JPEG_BACKEND";

/// The JPEG decoders that can be selected with `HANDCAM_JPEG_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JpegBackend {
    /// Uses the `jpeg-decoder` crate (via `image`), a robust but slow pure-Rust JPEG decoder.
    JpegDecoder,
    /// Uses the `mozjpeg` crate, a wrapper around Mozilla's libjpeg fork. Robust and fast-ish, but
    /// C.
    MozJpeg,
    /// Uses the `zune-jpeg` crate, a pure-Rust JPEG decoder somewhat faster than `jpeg-decoder`.
    ZuneJpeg,
}

const DEFAULT_BACKEND: JpegBackend = JpegBackend::MozJpeg;

impl JpegBackend {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "mozjpeg" => Some(Self::MozJpeg),
            "zune-jpeg" => Some(Self::ZuneJpeg),
            "jpeg-decoder" => Some(Self::JpegDecoder),
            _ => None,
        }
    }
}

static JPEG_BACKEND: Lazy<JpegBackend> = Lazy::new(|| {
    let backend = match env::var(BACKEND_VAR) {
        Ok(v) => match JpegBackend::from_name(&v) {
            Some(backend) => backend,
            None => {
                eprintln!("invalid value set for `{BACKEND_VAR}` variable: '{v}'; exiting");
                process::exit(1);
            }
        },
        Err(VarError::NotPresent) => DEFAULT_BACKEND,
        Err(VarError::NotUnicode(s)) => {
            eprintln!(
                "invalid value set for `{BACKEND_VAR}` variable: {}; exiting",
                s.to_string_lossy()
            );
            process::exit(1);
        }
    };
    log::debug!("using JPEG decode backend: {:?}", backend);
    backend
});

pub(super) fn decode_jpeg(data: &[u8]) -> anyhow::Result<Image> {
    let buf = match *JPEG_BACKEND {
        JpegBackend::JpegDecoder => decode_jpeg_decoder(data)?,
        JpegBackend::MozJpeg => decode_mozjpeg(data)?,
        JpegBackend::ZuneJpeg => decode_zune(data)?,
    };

    Ok(Image { buf })
}

fn decode_jpeg_decoder(data: &[u8]) -> anyhow::Result<RgbaImage> {
    Ok(image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgba8())
}

fn decode_mozjpeg(data: &[u8]) -> anyhow::Result<RgbaImage> {
    // mozjpeg reports some errors only via unwinding
    let (buf, width, height) = catch_unwind(|| -> anyhow::Result<_> {
        let mut decompress = mozjpeg::Decompress::new_mem(data)?;

        // Tune settings for decode performance.
        decompress.do_fancy_upsampling(false);
        decompress.dct_method(mozjpeg::DctMethod::IntegerFast);

        let mut decompress = decompress.rgba()?;
        let buf = decompress
            .read_scanlines_flat()
            .context("failed to decode image")?;
        Ok((buf, decompress.width(), decompress.height()))
    })
    .map_err(|payload| match payload.downcast::<String>() {
        Ok(string) => anyhow::Error::msg(string),
        Err(_) => anyhow::anyhow!("<unknown panic message>"),
    })??;

    ImageBuffer::from_raw(width.try_into()?, height.try_into()?, buf)
        .context("decoded buffer does not match image size")
}

fn decode_zune(data: &[u8]) -> anyhow::Result<RgbaImage> {
    use zune_jpeg::zune_core::colorspace::ColorSpace;
    use zune_jpeg::zune_core::options::DecoderOptions;

    let mut decomp = zune_jpeg::JpegDecoder::new_with_options(
        DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGBA),
        data,
    );
    decomp.decode_headers()?;
    let colorspace = decomp
        .get_output_colorspace()
        .context("missing output colorspace")?;
    if colorspace != ColorSpace::RGBA {
        bail!("unsupported colorspace {colorspace:?} (expected RGBA)");
    }

    let mut buf = vec![0; decomp.output_buffer_size().context("missing image size")?];
    decomp.decode_into(&mut buf)?;
    let (width, height) = decomp.dimensions().context("missing image size")?;
    ImageBuffer::from_raw(width.into(), height.into(), buf)
        .context("decoded buffer does not match image size")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names() {
        assert_eq!(JpegBackend::from_name("mozjpeg"), Some(JpegBackend::MozJpeg));
        assert_eq!(JpegBackend::from_name("zune-jpeg"), Some(JpegBackend::ZuneJpeg));
        assert_eq!(
            JpegBackend::from_name("jpeg-decoder"),
            Some(JpegBackend::JpegDecoder)
        );
        assert_eq!(JpegBackend::from_name("turbojpeg"), None);
    }

    #[test]
    fn garbage_is_an_error() {
        let data = b"definitely not a jpeg";
        assert!(decode_jpeg_decoder(data).is_err());
        assert!(decode_zune(data).is_err());
    }
}
