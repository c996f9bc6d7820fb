//! Multi-channel rasters with native sample types and color metadata.
//!
//! Tiles arrive as 8-bit, 16-bit or float data with any number of
//! channels (gray, RGB, CMYK plus spot inks, optional alpha). Nothing
//! here normalizes to 8-bit: a [`Raster`] keeps the samples exactly as
//! loaded and the compositor writes output in the same sample type.
//!
//! Samples are stored interleaved (`HxWxC`) in a single buffer.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, EngineError, MM_PER_INCH, MmPerPixel, Resolution};

/// Storage type of each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// 32-bit float, nominal range `0.0..=1.0`.
    F32,
}

/// Owned, interleaved sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// 8-bit samples.
    U8(Vec<u8>),
    /// 16-bit samples.
    U16(Vec<u16>),
    /// Float samples.
    F32(Vec<f32>),
}

impl Samples {
    /// Number of samples in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    /// Returns `true` if the buffer holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The storage type of the buffer.
    #[must_use]
    pub const fn sample_type(&self) -> SampleType {
        match self {
            Self::U8(_) => SampleType::U8,
            Self::U16(_) => SampleType::U16,
            Self::F32(_) => SampleType::F32,
        }
    }
}

/// A numeric sample type the engine can warp and composite.
pub trait Sample: Copy + PartialOrd + Send + Sync + 'static {
    /// Matching [`SampleType`] tag.
    const TYPE: SampleType;
    /// "No signal" value.
    const ZERO: Self;
    /// Full-scale value (white in additive color models).
    const FULL: Self;

    /// Convert to `f64` without normalization.
    fn to_f64(self) -> f64;

    /// Convert from `f64`, rounding and clamping integers to range.
    fn from_f64(value: f64) -> Self;

    /// Normalize to `0.0..=1.0` (floats are passed through).
    fn to_unit(self) -> f64 {
        self.to_f64() / Self::FULL.to_f64()
    }

    /// Inverse of [`to_unit`](Self::to_unit).
    fn from_unit(value: f64) -> Self {
        Self::from_f64(value * Self::FULL.to_f64())
    }

    /// Wrap an owned vector in the matching [`Samples`] variant.
    fn wrap(values: Vec<Self>) -> Samples;

    /// Borrow the buffer when it holds this sample type.
    fn view(samples: &Samples) -> Option<&[Self]>;

    /// Mutably borrow the buffer when it holds this sample type.
    fn view_mut(samples: &mut Samples) -> Option<&mut [Self]>;
}

impl Sample for u8 {
    const TYPE: SampleType = SampleType::U8;
    const ZERO: Self = 0;
    const FULL: Self = Self::MAX;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, f64::from(Self::MAX)) as Self
    }

    fn wrap(values: Vec<Self>) -> Samples {
        Samples::U8(values)
    }

    fn view(samples: &Samples) -> Option<&[Self]> {
        match samples {
            Samples::U8(v) => Some(v),
            _ => None,
        }
    }

    fn view_mut(samples: &mut Samples) -> Option<&mut [Self]> {
        match samples {
            Samples::U8(v) => Some(v),
            _ => None,
        }
    }
}

impl Sample for u16 {
    const TYPE: SampleType = SampleType::U16;
    const ZERO: Self = 0;
    const FULL: Self = Self::MAX;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, f64::from(Self::MAX)) as Self
    }

    fn wrap(values: Vec<Self>) -> Samples {
        Samples::U16(values)
    }

    fn view(samples: &Samples) -> Option<&[Self]> {
        match samples {
            Samples::U16(v) => Some(v),
            _ => None,
        }
    }

    fn view_mut(samples: &mut Samples) -> Option<&mut [Self]> {
        match samples {
            Samples::U16(v) => Some(v),
            _ => None,
        }
    }
}

impl Sample for f32 {
    const TYPE: SampleType = SampleType::F32;
    const ZERO: Self = 0.0;
    const FULL: Self = 1.0;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as Self
    }

    fn wrap(values: Vec<Self>) -> Samples {
        Samples::F32(values)
    }

    fn view(samples: &Samples) -> Option<&[Self]> {
        match samples {
            Samples::F32(v) => Some(v),
            _ => None,
        }
    }

    fn view_mut(samples: &mut Samples) -> Option<&mut [Self]> {
        match samples {
            Samples::F32(v) => Some(v),
            _ => None,
        }
    }
}

/// An `HxWxC` pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    dimensions: Dimensions,
    channels: usize,
    samples: Samples,
}

impl Raster {
    /// Build a raster, checking that the buffer matches its shape.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unsupported`] when `channels` is zero and
    /// [`EngineError::BufferSize`] when the buffer length is not
    /// `width * height * channels`.
    pub fn new(
        dimensions: Dimensions,
        channels: usize,
        samples: Samples,
    ) -> Result<Self, EngineError> {
        if channels == 0 {
            return Err(EngineError::Unsupported(
                "raster must have at least one channel".to_string(),
            ));
        }
        let expected = dimensions.pixel_count() * channels;
        if samples.len() != expected {
            return Err(EngineError::BufferSize {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            dimensions,
            channels,
            samples,
        })
    }

    /// Build a raster from a typed sample vector.
    ///
    /// # Errors
    ///
    /// Same as [`Raster::new`].
    pub fn from_vec<T: Sample>(
        width: u32,
        height: u32,
        channels: usize,
        values: Vec<T>,
    ) -> Result<Self, EngineError> {
        Self::new(Dimensions { width, height }, channels, T::wrap(values))
    }

    /// Assemble a raster whose shape is correct by construction.
    pub(crate) const fn from_parts(dimensions: Dimensions, channels: usize, samples: Samples) -> Self {
        Self {
            dimensions,
            channels,
            samples,
        }
    }

    /// A raster where every pixel holds `pixel` (one value per channel).
    #[must_use]
    pub fn filled<T: Sample>(dimensions: Dimensions, pixel: &[T]) -> Self {
        let mut values = Vec::with_capacity(dimensions.pixel_count() * pixel.len());
        for _ in 0..dimensions.pixel_count() {
            values.extend_from_slice(pixel);
        }
        Self {
            dimensions,
            channels: pixel.len().max(1),
            samples: T::wrap(values),
        }
    }

    /// Pixel dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Number of interleaved channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Native sample type.
    #[must_use]
    pub const fn sample_type(&self) -> SampleType {
        self.samples.sample_type()
    }

    /// The raw sample buffer.
    #[must_use]
    pub const fn samples(&self) -> &Samples {
        &self.samples
    }

    /// Typed view of the sample buffer, `None` if `T` is not the
    /// native sample type.
    #[must_use]
    pub fn as_slice<T: Sample>(&self) -> Option<&[T]> {
        T::view(&self.samples)
    }

    /// Mutable typed view of the sample buffer.
    pub fn as_mut_slice<T: Sample>(&mut self) -> Option<&mut [T]> {
        T::view_mut(&mut self.samples)
    }

    /// Returns `true` if the raster has no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Normalized (`0.0..=1.0`) value of one sample.
    ///
    /// Out-of-range coordinates return `0.0`.
    #[must_use]
    pub fn unit_sample(&self, x: u32, y: u32, channel: usize) -> f64 {
        if x >= self.width() || y >= self.height() || channel >= self.channels {
            return 0.0;
        }
        let idx = (y as usize * self.width() as usize + x as usize) * self.channels + channel;
        match &self.samples {
            Samples::U8(v) => v[idx].to_unit(),
            Samples::U16(v) => v[idx].to_unit(),
            Samples::F32(v) => v[idx].to_unit(),
        }
    }

    /// Convert a decoded `image` buffer, keeping its bit depth and
    /// channel count.
    ///
    /// Returns the raster, its color model and the alpha channel index
    /// when the source has one.
    #[must_use]
    pub fn from_dynamic(image: DynamicImage) -> (Self, ColorModel, Option<usize>) {
        let dimensions = Dimensions {
            width: image.width(),
            height: image.height(),
        };
        let (channels, samples, model, alpha) = match image {
            DynamicImage::ImageLuma8(img) => (1, Samples::U8(img.into_raw()), ColorModel::Gray, None),
            DynamicImage::ImageLumaA8(img) => {
                (2, Samples::U8(img.into_raw()), ColorModel::Gray, Some(1))
            }
            DynamicImage::ImageRgb8(img) => (3, Samples::U8(img.into_raw()), ColorModel::Rgb, None),
            DynamicImage::ImageRgba8(img) => {
                (4, Samples::U8(img.into_raw()), ColorModel::Rgb, Some(3))
            }
            DynamicImage::ImageLuma16(img) => {
                (1, Samples::U16(img.into_raw()), ColorModel::Gray, None)
            }
            DynamicImage::ImageLumaA16(img) => {
                (2, Samples::U16(img.into_raw()), ColorModel::Gray, Some(1))
            }
            DynamicImage::ImageRgb16(img) => {
                (3, Samples::U16(img.into_raw()), ColorModel::Rgb, None)
            }
            DynamicImage::ImageRgba16(img) => {
                (4, Samples::U16(img.into_raw()), ColorModel::Rgb, Some(3))
            }
            DynamicImage::ImageRgb32F(img) => {
                (3, Samples::F32(img.into_raw()), ColorModel::Rgb, None)
            }
            DynamicImage::ImageRgba32F(img) => {
                (4, Samples::F32(img.into_raw()), ColorModel::Rgb, Some(3))
            }
            other => (
                4,
                Samples::U8(other.to_rgba8().into_raw()),
                ColorModel::Rgb,
                Some(3),
            ),
        };
        let raster = Self {
            dimensions,
            channels,
            samples,
        };
        (raster, model, alpha)
    }
}

/// How the channels of a raster encode color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorModel {
    /// Single luminance channel (TIFF `MinIsBlack`).
    Gray,
    /// Additive red/green/blue.
    #[default]
    Rgb,
    /// Subtractive ink separations: CMYK plus optional spot inks.
    /// A zero sample means "no ink".
    Separated,
}

impl ColorModel {
    /// Whether zero means "no ink" (paper white) in this model.
    #[must_use]
    pub const fn is_subtractive(self) -> bool {
        matches!(self, Self::Separated)
    }
}

/// What a single channel carries, which decides its blank value and
/// how overlapping tiles merge into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelRole {
    /// Ink amount: blank is 0, more ink is a larger value.
    Ink,
    /// Light intensity: blank is full scale (white), ink lowers it.
    Light,
    /// Coverage: blank is 0 (transparent).
    Alpha,
}

impl ChannelRole {
    /// The value this channel holds where nothing has been placed.
    #[must_use]
    pub fn blank<T: Sample>(self) -> T {
        match self {
            Self::Ink | Self::Alpha => T::ZERO,
            Self::Light => T::FULL,
        }
    }

    /// Merge a tile sample into the canvas, keeping the larger amount
    /// of ink (or coverage).
    ///
    /// Ink and alpha channels keep the numerically larger sample. Light
    /// channels keep the numerically smaller one, since a darker value
    /// there is more ink.
    #[must_use]
    pub fn merge<T: Sample>(self, canvas: T, tile: T) -> T {
        let take_tile = match self {
            Self::Ink | Self::Alpha => tile > canvas,
            Self::Light => tile < canvas,
        };
        if take_tile { tile } else { canvas }
    }
}

/// Physical and color metadata carried alongside a raster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RasterMetadata {
    /// Native resolution, when the file declares one.
    pub resolution: Option<Resolution>,
    /// Color model of the channels.
    pub color_model: ColorModel,
    /// Channel indices of cyan, magenta, yellow and black for
    /// separated data, when they could be identified.
    pub cmyk_order: Option<[usize; 4]>,
    /// Index of the alpha channel, if any.
    pub alpha_index: Option<usize>,
    /// Embedded ICC profile.
    pub icc_profile: Option<Vec<u8>>,
    /// Ink names, one per ink channel.
    pub ink_names: Option<Vec<String>>,
}

impl RasterMetadata {
    /// Role of channel `index`.
    #[must_use]
    pub fn channel_role(&self, index: usize) -> ChannelRole {
        if self.alpha_index == Some(index) {
            ChannelRole::Alpha
        } else if self.color_model.is_subtractive() {
            ChannelRole::Ink
        } else {
            ChannelRole::Light
        }
    }

    /// Physical scale derived from the declared resolution.
    #[must_use]
    pub fn mm_per_pixel(&self) -> Option<MmPerPixel> {
        let res = self.resolution?;
        (res.x > 0.0 && res.y > 0.0).then(|| MmPerPixel::new(MM_PER_INCH / res.x, MM_PER_INCH / res.y))
    }
}

/// Locate the C, M, Y and K channels from a list of ink names.
///
/// Matching is a case-insensitive substring search (`cyan`, `magenta`,
/// `yellow`, `black` or `key`). Returns `None` unless all four inks are
/// found.
#[must_use]
pub fn cmyk_order_from_ink_names(names: &[String]) -> Option<[usize; 4]> {
    let find = |needle: &str| {
        names
            .iter()
            .position(|n| n.trim().to_lowercase().contains(needle))
    };
    let black = find("black").or_else(|| find("key"))?;
    Some([find("cyan")?, find("magenta")?, find("yellow")?, black])
}

/// A printable tile: pixels plus metadata. Immutable once loaded and
/// shared between placed copies through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileImage {
    /// Pixel data in native sample type and channel count.
    pub raster: Raster,
    /// Resolution and color metadata.
    pub metadata: RasterMetadata,
}

impl TileImage {
    /// Bundle a raster with its metadata.
    #[must_use]
    pub const fn new(raster: Raster, metadata: RasterMetadata) -> Self {
        Self { raster, metadata }
    }

    /// Physical size `(width_mm, height_mm)` when the resolution is known.
    #[must_use]
    pub fn size_mm(&self) -> Option<(f64, f64)> {
        let mmpp = self.metadata.mm_per_pixel()?;
        Some((
            f64::from(self.raster.width()) * mmpp.x,
            f64::from(self.raster.height()) * mmpp.y,
        ))
    }
}

/// The scan-table background image used for detection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRaster {
    /// Pixel data, usually 8-bit RGB.
    pub raster: Raster,
    /// Declared resolution, if known.
    pub resolution: Option<Resolution>,
}

impl ReferenceRaster {
    /// Wrap a raster without resolution metadata.
    #[must_use]
    pub const fn new(raster: Raster) -> Self {
        Self {
            raster,
            resolution: None,
        }
    }

    /// Pixel dimensions of the background.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.raster.dimensions()
    }
}
