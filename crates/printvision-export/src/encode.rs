//! TIFF encoding on top of `tiff::encoder`.
//!
//! Writes one directory holding a single uncompressed, chunky
//! (interleaved) strip with any channel count and 8-bit, 16-bit or
//! 32-bit float samples. Files whose payload would overflow 32-bit
//! offsets are written as BigTIFF.
//!
//! This is a pure function with no I/O -- it returns a `Vec<u8>`.

use std::io::{Cursor, Seek, Write};

use printvision_engine::{Canvas, Raster, SampleType, Samples};
use tiff::encoder::{DirectoryEncoder, Rational, TiffEncoder, TiffKind};
use tiff::tags::{
    CompressionMethod, PhotometricInterpretation, PlanarConfiguration, ResolutionUnit,
    SampleFormat, Tag,
};

use crate::ExportError;
use crate::tags::{OutputTags, Photometric, ink_names_payload};

/// `InkSet` tag id.
pub const TAG_INK_SET: u16 = 332;
/// `InkNames` tag id.
pub const TAG_INK_NAMES: u16 = 333;
/// `NumberOfInks` tag id.
pub const TAG_NUMBER_OF_INKS: u16 = 334;
/// ICC profile tag id.
pub const TAG_ICC_PROFILE: u16 = 34675;

/// Denominator used when writing resolution rationals.
const RESOLUTION_DENOMINATOR: u32 = 10_000;

/// Room reserved for the header, the directory and small tag values.
const DIRECTORY_HEADROOM: u64 = 64 * 1024;

/// Encode a canvas as TIFF using the tags derived from its metadata.
///
/// # Errors
///
/// See [`encode_tiff_with`].
pub fn encode_tiff(canvas: &Canvas) -> Result<Vec<u8>, ExportError> {
    encode_tiff_with(&canvas.raster, &OutputTags::from_canvas(canvas))
}

/// Encode a raster with explicit output tags.
///
/// # Errors
///
/// Returns [`ExportError::EmptyRaster`] for a raster without pixels,
/// [`ExportError::TooManyChannels`] when the channel count does not fit
/// a TIFF short and [`ExportError::Tiff`] when the encoder fails.
pub fn encode_tiff_with(raster: &Raster, tags: &OutputTags) -> Result<Vec<u8>, ExportError> {
    if raster.is_empty() {
        return Err(ExportError::EmptyRaster);
    }
    let channels = raster.channels();
    let samples_per_pixel =
        u16::try_from(channels).map_err(|_| ExportError::TooManyChannels(channels))?;

    let payload = payload_bytes(raster, tags);
    let mut out = Cursor::new(Vec::new());
    if needs_big_tiff(payload) {
        tracing::debug!(payload, "writing BigTIFF");
        let mut encoder = TiffEncoder::new_big(&mut out)?;
        write_directory(&mut encoder, raster, samples_per_pixel, tags)?;
    } else {
        let mut encoder = TiffEncoder::new(&mut out)?;
        write_directory(&mut encoder, raster, samples_per_pixel, tags)?;
    }
    Ok(out.into_inner())
}

/// Whether a file carrying `payload` bytes of pixels and tag values
/// must use 64-bit offsets.
#[must_use]
pub const fn needs_big_tiff(payload: u64) -> bool {
    payload.saturating_add(DIRECTORY_HEADROOM) > u32::MAX as u64
}

/// Bytes of strip data plus out-of-line tag payloads.
fn payload_bytes(raster: &Raster, tags: &OutputTags) -> u64 {
    let bytes_per_sample: u64 = match raster.sample_type() {
        SampleType::U8 => 1,
        SampleType::U16 => 2,
        SampleType::F32 => 4,
    };
    let strip = u64::from(raster.width())
        * u64::from(raster.height())
        * raster.channels() as u64
        * bytes_per_sample;
    let icc = tags.icc_profile.as_ref().map_or(0, Vec::len) as u64;
    let names: usize = tags
        .ink_names
        .iter()
        .flatten()
        .map(|n| n.len() + 1)
        .sum();
    strip + icc + names as u64
}

fn write_directory<W: Write + Seek, K: TiffKind>(
    encoder: &mut TiffEncoder<W, K>,
    raster: &Raster,
    samples_per_pixel: u16,
    tags: &OutputTags,
) -> Result<(), ExportError> {
    let channels = raster.channels();
    let (bits, format) = match raster.sample_type() {
        SampleType::U8 => (8u16, SampleFormat::Uint),
        SampleType::U16 => (16, SampleFormat::Uint),
        SampleType::F32 => (32, SampleFormat::IEEEFP),
    };
    let photometric = match tags.photometric {
        Photometric::MinIsBlack => PhotometricInterpretation::BlackIsZero,
        Photometric::Rgb => PhotometricInterpretation::RGB,
        Photometric::Separated => PhotometricInterpretation::CMYK,
    };

    let mut dir = encoder.image_directory()?;
    let (offset, length) = write_strip(&mut dir, raster.samples())?;

    dir.write_tag(Tag::ImageWidth, raster.width())?;
    dir.write_tag(Tag::ImageLength, raster.height())?;
    dir.write_tag(Tag::BitsPerSample, &vec![bits; channels][..])?;
    dir.write_tag(Tag::Compression, CompressionMethod::None.to_u16())?;
    dir.write_tag(Tag::PhotometricInterpretation, photometric.to_u16())?;
    dir.write_tag(Tag::StripOffsets, K::convert_offset(offset)?)?;
    dir.write_tag(Tag::SamplesPerPixel, samples_per_pixel)?;
    dir.write_tag(Tag::RowsPerStrip, raster.height())?;
    dir.write_tag(Tag::StripByteCounts, K::convert_offset(length)?)?;
    dir.write_tag(
        Tag::PlanarConfiguration,
        PlanarConfiguration::Chunky.to_u16(),
    )?;
    dir.write_tag(Tag::SampleFormat, &vec![format.to_u16(); channels][..])?;

    if let Some(res) = tags.resolution {
        dir.write_tag(Tag::XResolution, dpi_rational(res.x))?;
        dir.write_tag(Tag::YResolution, dpi_rational(res.y))?;
        dir.write_tag(Tag::ResolutionUnit, ResolutionUnit::Inch.to_u16())?;
    }
    if !tags.extra_samples.is_empty() {
        dir.write_tag(Tag::ExtraSamples, &tags.extra_samples[..])?;
    }
    if let Some(ink_set) = tags.ink_set {
        dir.write_tag(Tag::Unknown(TAG_INK_SET), ink_set)?;
    }
    if let Some(names) = tags.ink_names.as_deref().filter(|n| !n.is_empty()) {
        dir.write_tag(Tag::Unknown(TAG_INK_NAMES), &ink_names_payload(names)[..])?;
    }
    if let Some(inks) = tags.number_of_inks {
        dir.write_tag(Tag::Unknown(TAG_NUMBER_OF_INKS), inks)?;
    }
    if let Some(icc) = tags.icc_profile.as_ref().filter(|p| !p.is_empty()) {
        dir.write_tag(Tag::Unknown(TAG_ICC_PROFILE), &icc[..])?;
    }
    dir.finish()?;
    Ok(())
}

/// Write the pixel strip, returning its offset and length in bytes.
fn write_strip<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    samples: &Samples,
) -> Result<(u64, u64), ExportError> {
    let (offset, length) = match samples {
        Samples::U8(v) => (dir.write_data(&v[..])?, v.len()),
        Samples::U16(v) => (dir.write_data(&v[..])?, v.len() * 2),
        Samples::F32(v) => (dir.write_data(&v[..])?, v.len() * 4),
    };
    Ok((offset, length as u64))
}

/// Resolution as a rational over [`RESOLUTION_DENOMINATOR`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dpi_rational(dpi: f64) -> Rational {
    let n = (dpi * f64::from(RESOLUTION_DENOMINATOR))
        .round()
        .clamp(0.0, f64::from(u32::MAX)) as u32;
    Rational {
        n,
        d: RESOLUTION_DENOMINATOR,
    }
}
