//! Background decoding and grayscale conversion.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, TIFF, WebP) for the
//! scan-table background and reduces any [`Raster`] to the single
//! 8-bit luminance channel that detection runs on.

use image::GrayImage;

use crate::raster::{Raster, ReferenceRaster, Sample, Samples};
use crate::types::EngineError;

/// Decode raw background bytes into a [`ReferenceRaster`].
///
/// The decoded bit depth and channel count are kept; detection
/// converts to 8-bit gray on its own.
///
/// # Errors
///
/// Returns [`EngineError::EmptyInput`] if `bytes` is empty.
/// Returns [`EngineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded background"]
pub fn decode_reference(bytes: &[u8]) -> Result<ReferenceRaster, EngineError> {
    if bytes.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    let (raster, _, _) = Raster::from_dynamic(img);
    Ok(ReferenceRaster::new(raster))
}

/// Convert a raster to 8-bit grayscale.
///
/// One- and two-channel rasters use channel 0 directly. Three or more
/// channels are treated as RGB and weighted `0.299*R + 0.587*G +
/// 0.114*B`; any further channels (alpha) are ignored. 16-bit samples
/// are scaled down by 257, float samples by 255 with clamping.
#[must_use = "returns the grayscale image"]
pub fn to_gray8(raster: &Raster) -> GrayImage {
    match raster.samples() {
        Samples::U8(v) => gray_from(raster, v),
        Samples::U16(v) => gray_from(raster, v),
        Samples::F32(v) => gray_from(raster, v),
    }
}

fn gray_from<T: Sample>(raster: &Raster, samples: &[T]) -> GrayImage {
    let channels = raster.channels();
    let luma: Vec<u8> = samples
        .chunks_exact(channels)
        .map(|px| {
            let unit = if channels >= 3 {
                0.299f64.mul_add(
                    px[0].to_unit(),
                    0.587f64.mul_add(px[1].to_unit(), 0.114 * px[2].to_unit()),
                )
            } else {
                px[0].to_unit()
            };
            u8::from_unit(unit)
        })
        .collect();
    GrayImage::from_raw(raster.width(), raster.height(), luma)
        .unwrap_or_else(|| GrayImage::new(raster.width(), raster.height()))
}
