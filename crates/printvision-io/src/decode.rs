//! Tile decoding with full metadata.
//!
//! TIFF tiles keep their native bit depth, channel count, resolution,
//! ICC profile, ink names and alpha position. Other formats go through
//! `image` and carry only what it reports.

use std::io::Cursor;

use printvision_engine::raster::cmyk_order_from_ink_names;
use printvision_engine::{
    ColorModel, Dimensions, Raster, RasterMetadata, Resolution, Samples, TileImage,
};
use tiff::decoder::{Decoder, DecodingResult, ifd::Value};
use tiff::TiffError;
use tiff::tags::Tag;

use crate::IoError;

/// Centimeters per inch.
const CM_PER_INCH: f64 = 2.54;

const TAG_INK_NAMES: u16 = 333;
const TAG_ICC_PROFILE: u16 = 34675;

/// `ResolutionUnit` values. `1` means no absolute unit.
const UNIT_INCH: u16 = 2;
const UNIT_CENTIMETER: u16 = 3;

/// Gray stored inverted; the decoder flips it back on read.
const PHOTOMETRIC_WHITE_IS_ZERO: u32 = 0;

/// Returns `true` if `bytes` start with a TIFF header of either byte order.
#[must_use]
pub fn is_tiff(bytes: &[u8]) -> bool {
    bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*")
}

/// Decode a tile from any supported format.
///
/// # Errors
///
/// Returns [`IoError::Tiff`] or [`IoError::Image`] for undecodable
/// data and [`IoError::Unsupported`] for layouts the engine cannot hold.
pub fn decode_tile(bytes: &[u8]) -> Result<TileImage, IoError> {
    if is_tiff(bytes) {
        return decode_tiff(bytes);
    }
    let image = image::load_from_memory(bytes)?;
    let (raster, color_model, alpha_index) = Raster::from_dynamic(image);
    Ok(TileImage::new(
        raster,
        RasterMetadata {
            color_model,
            alpha_index,
            ..RasterMetadata::default()
        },
    ))
}

/// Decode a TIFF tile.
///
/// # Errors
///
/// Returns [`IoError::Tiff`] for malformed files and
/// [`IoError::Unsupported`] for photometric interpretations, sample
/// formats or bit depths the engine cannot represent.
pub fn decode_tiff(bytes: &[u8]) -> Result<TileImage, IoError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let channels = usize::from(find_u16(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1));
    let photometric = decoder.get_tag_u32(Tag::PhotometricInterpretation)?;

    let color_model = match photometric {
        PHOTOMETRIC_WHITE_IS_ZERO if channels > 1 => {
            return Err(IoError::Unsupported(
                "white-is-zero with extra samples".to_owned(),
            ));
        }
        PHOTOMETRIC_WHITE_IS_ZERO | 1 => ColorModel::Gray,
        2 => ColorModel::Rgb,
        5 => ColorModel::Separated,
        other => {
            return Err(IoError::Unsupported(format!(
                "photometric interpretation {other}"
            )));
        }
    };

    let samples = read_samples(&mut decoder)?;
    let raster = Raster::new(Dimensions { width, height }, channels, samples)?;

    let resolution = read_resolution(&mut decoder)?;
    let icc_profile = find_bytes(&mut decoder, TAG_ICC_PROFILE)?;
    let ink_names = read_ink_names(&mut decoder)?;
    let extra = find_vec_u16(&mut decoder, Tag::ExtraSamples)?;
    let alpha_index = alpha_from_extra_samples(extra.as_deref(), channels);

    let cmyk_order = match color_model {
        ColorModel::Separated => ink_names
            .as_deref()
            .and_then(cmyk_order_from_ink_names)
            .or_else(|| (channels - usize::from(alpha_index.is_some()) == 4).then_some([0, 1, 2, 3])),
        ColorModel::Gray | ColorModel::Rgb => None,
    };

    tracing::debug!(
        width,
        height,
        channels,
        ?color_model,
        ?resolution,
        ?alpha_index,
        "decoded TIFF tile"
    );

    Ok(TileImage::new(
        raster,
        RasterMetadata {
            resolution,
            color_model,
            cmyk_order,
            alpha_index,
            icc_profile,
            ink_names,
        },
    ))
}

/// The alpha channel is the last one when the file declares an extra
/// sample that is associated or unassociated alpha.
#[must_use]
pub fn alpha_from_extra_samples(extra: Option<&[u16]>, channels: usize) -> Option<usize> {
    let last = *extra?.last()?;
    (last != 0 && channels > 0).then(|| channels - 1)
}

/// Convert raw resolution values to dots per inch.
///
/// Centimeter values are scaled by 2.54; a "no unit" file has no
/// physical resolution. A missing unit means inches.
#[must_use]
pub fn resolution_to_dpi(x: f64, y: f64, unit: Option<u16>) -> Option<Resolution> {
    let factor = match unit.unwrap_or(UNIT_INCH) {
        UNIT_INCH => 1.0,
        UNIT_CENTIMETER => CM_PER_INCH,
        _ => return None,
    };
    let (x, y) = (x * factor, y * factor);
    (x.is_finite() && y.is_finite() && x > 0.0 && y > 0.0).then(|| Resolution::new(x, y))
}

fn read_resolution<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<Resolution>, IoError> {
    let x = decoder.find_tag(Tag::XResolution)?.and_then(rational);
    let y = decoder.find_tag(Tag::YResolution)?.and_then(rational);
    let unit = find_u16(decoder, Tag::ResolutionUnit)?;
    Ok(match (x, y) {
        (Some(x), Some(y)) => resolution_to_dpi(x, y, unit),
        (Some(x), None) => resolution_to_dpi(x, x, unit),
        _ => None,
    })
}

fn rational(value: Value) -> Option<f64> {
    match value {
        Value::Rational(n, d) if d != 0 => Some(f64::from(n) / f64::from(d)),
        Value::List(values) => values.into_iter().next().and_then(rational),
        _ => None,
    }
}

fn read_ink_names<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<Vec<String>>, IoError> {
    let Some(value) = decoder.find_tag(Tag::from_u16_exhaustive(TAG_INK_NAMES))? else {
        return Ok(None);
    };
    let text = match value {
        Value::Ascii(s) => s,
        other => String::from_utf8_lossy(&other.into_u8_vec()?).into_owned(),
    };
    let names: Vec<String> = text
        .split('\0')
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .collect();
    Ok((!names.is_empty()).then_some(names))
}

fn find_u16<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<u16>, IoError> {
    Ok(decoder.find_tag(tag)?.map(Value::into_u16).transpose()?)
}

fn find_vec_u16<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<u16>>, IoError> {
    Ok(decoder.find_tag(tag)?.map(Value::into_u16_vec).transpose()?)
}

fn find_bytes<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    tag: u16,
) -> Result<Option<Vec<u8>>, IoError> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(tag))?
        .map(Value::into_u8_vec)
        .transpose()?)
}

/// Read pixel data, preserving sample type and channel count.
///
/// The decoder undoes `WhiteIsZero` on gray samples, so the result
/// always reads as black-is-zero.
fn read_samples<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Samples, IoError> {
    let image = decoder.read_image().map_err(|err| match err {
        TiffError::UnsupportedError(unsupported) => IoError::Unsupported(unsupported.to_string()),
        other => IoError::Tiff(other),
    })?;
    match image {
        DecodingResult::U8(v) => Ok(Samples::U8(v)),
        DecodingResult::U16(v) => Ok(Samples::U16(v)),
        DecodingResult::F32(v) => Ok(Samples::F32(v)),
        _ => Err(IoError::Unsupported(
            "samples other than 8-bit, 16-bit or 32-bit float".to_owned(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use printvision_engine::Canvas;
    use tiff::encoder::TiffEncoder;

    use super::*;

    fn cmyk_alpha_tile() -> Canvas {
        let values: Vec<u16> = (0..3 * 2 * 5).map(|v| v * 1000).collect();
        Canvas {
            raster: Raster::from_vec::<u16>(3, 2, 5, values).unwrap(),
            metadata: RasterMetadata {
                resolution: Some(Resolution::new(300.0, 600.0)),
                color_model: ColorModel::Separated,
                alpha_index: Some(4),
                ink_names: Some(
                    ["Black", "Cyan", "Magenta", "Yellow", "Alpha"]
                        .map(String::from)
                        .to_vec(),
                ),
                icc_profile: Some(vec![9; 16]),
                cmyk_order: None,
            },
        }
    }

    #[test]
    fn detects_tiff_magic() {
        assert!(is_tiff(b"II*\0rest"));
        assert!(is_tiff(b"MM\0*rest"));
        assert!(!is_tiff(b"\x89PNG"));
    }

    #[test]
    fn five_channel_sixteen_bit_tile_keeps_everything() {
        let canvas = cmyk_alpha_tile();
        let bytes = printvision_export::encode_tiff(&canvas).unwrap();
        let tile = decode_tiff(&bytes).unwrap();

        assert_eq!(tile.raster, canvas.raster);
        let meta = &tile.metadata;
        assert_eq!(meta.color_model, ColorModel::Separated);
        assert_eq!(meta.alpha_index, Some(4));
        let res = meta.resolution.unwrap();
        assert!((res.x - 300.0).abs() < 1e-9);
        assert!((res.y - 600.0).abs() < 1e-9);
        assert_eq!(meta.icc_profile.as_deref(), Some(&[9u8; 16][..]));
        // The alpha entry is not written as an ink name.
        assert_eq!(meta.ink_names.as_ref().unwrap().len(), 4);
        assert_eq!(meta.cmyk_order, Some([1, 2, 3, 0]));
    }

    #[test]
    fn centimeter_resolution_is_converted() {
        let res = resolution_to_dpi(118.110_236, 118.110_236, Some(UNIT_CENTIMETER)).unwrap();
        assert!((res.x - 300.0).abs() < 1e-3);
        assert!(resolution_to_dpi(72.0, 72.0, Some(1)).is_none());
        assert_eq!(
            resolution_to_dpi(72.0, 72.0, None),
            Some(Resolution::uniform(72.0))
        );
    }

    #[test]
    fn unspecified_extra_sample_is_not_alpha() {
        assert_eq!(alpha_from_extra_samples(Some(&[2]), 5), Some(4));
        assert_eq!(alpha_from_extra_samples(Some(&[1]), 2), Some(1));
        assert_eq!(alpha_from_extra_samples(Some(&[0]), 2), None);
        assert_eq!(alpha_from_extra_samples(None, 4), None);
    }

    /// One gray row stored with photometric `WhiteIsZero`.
    fn white_is_zero_tiff(row: &[u8]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        let mut encoder = TiffEncoder::new(&mut out).unwrap();
        let mut dir = encoder.image_directory().unwrap();
        let offset = dir.write_data(row).unwrap();
        dir.write_tag(Tag::ImageWidth, u32::try_from(row.len()).unwrap()).unwrap();
        dir.write_tag(Tag::ImageLength, 1u32).unwrap();
        dir.write_tag(Tag::BitsPerSample, 8u16).unwrap();
        dir.write_tag(Tag::Compression, 1u16).unwrap();
        dir.write_tag(Tag::PhotometricInterpretation, 0u16).unwrap();
        dir.write_tag(Tag::StripOffsets, u32::try_from(offset).unwrap()).unwrap();
        dir.write_tag(Tag::SamplesPerPixel, 1u16).unwrap();
        dir.write_tag(Tag::RowsPerStrip, 1u32).unwrap();
        dir.write_tag(Tag::StripByteCounts, u32::try_from(row.len()).unwrap()).unwrap();
        dir.finish().unwrap();
        out.into_inner()
    }

    #[test]
    fn white_is_zero_loads_as_black_is_zero() {
        let tile = decode_tiff(&white_is_zero_tiff(&[0, 55, 255])).unwrap();
        assert_eq!(tile.metadata.color_model, ColorModel::Gray);
        assert_eq!(tile.raster.samples(), &Samples::U8(vec![255, 200, 0]));
    }

    #[test]
    fn eight_bit_gray_round_trips_through_the_decoder() {
        let canvas = Canvas {
            raster: Raster::from_vec::<u8>(2, 2, 1, vec![0, 64, 128, 255]).unwrap(),
            metadata: RasterMetadata {
                color_model: ColorModel::Gray,
                ..RasterMetadata::default()
            },
        };
        let bytes = printvision_export::encode_tiff(&canvas).unwrap();
        let tile = decode_tiff(&bytes).unwrap();
        assert_eq!(tile.raster, canvas.raster);
        assert_eq!(tile.metadata.color_model, ColorModel::Gray);
    }

    #[test]
    fn png_tile_has_no_resolution() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 4]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let tile = decode_tile(&buf).unwrap();
        assert_eq!(tile.raster.channels(), 4);
        assert_eq!(tile.metadata.alpha_index, Some(3));
        assert!(tile.metadata.resolution.is_none());
    }
}
