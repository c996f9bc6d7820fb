//! Shared types for the printvision placement and compositing engine.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for preview rasters.
pub use image::RgbImage;

/// Millimeters per inch, used for every DPI conversion.
pub const MM_PER_INCH: f64 = 25.4;

/// A 2D point in scene coordinates (background pixels, y axis down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Rotate this vector by `degrees` about the origin.
    ///
    /// Uses the standard rotation matrix. With the y axis pointing down,
    /// positive angles turn clockwise on screen.
    #[must_use]
    pub fn rotated(self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(
            self.x.mul_add(cos, -(self.y * sin)),
            self.x.mul_add(sin, self.y * cos),
        )
    }

    /// Rotate this point by `degrees` about `center`.
    #[must_use]
    pub fn rotated_about(self, center: Self, degrees: f64) -> Self {
        (self - center).rotated(degrees) + center
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

/// A sequence of connected points forming a path segment.
///
/// Detected contours are stored as closed polylines: the last point
/// connects back to the first without being repeated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Perimeter of the closed polygon through these points.
    #[must_use]
    pub fn closed_length(&self) -> f64 {
        let n = self.0.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.0[i].distance(self.0[(i + 1) % n]))
            .sum()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` when either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Physical size of the print bed in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Bed width in millimeters.
    pub width_mm: f64,
    /// Bed height in millimeters.
    pub height_mm: f64,
}

impl Workspace {
    /// Default bed width (mm).
    pub const DEFAULT_WIDTH_MM: f64 = 480.0;
    /// Default bed height (mm).
    pub const DEFAULT_HEIGHT_MM: f64 = 600.0;

    /// Create a workspace of the given physical size.
    #[must_use]
    pub const fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WIDTH_MM, Self::DEFAULT_HEIGHT_MM)
    }
}

/// Physical scale of a raster: millimeters covered by one pixel per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MmPerPixel {
    /// Millimeters per pixel along x.
    pub x: f64,
    /// Millimeters per pixel along y.
    pub y: f64,
}

impl MmPerPixel {
    /// Create a new scale.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Non-uniform scale factors `(sx, sy)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    /// Horizontal factor.
    pub sx: f64,
    /// Vertical factor.
    pub sy: f64,
}

impl ScaleFactor {
    /// The identity scale.
    pub const IDENTITY: Self = Self { sx: 1.0, sy: 1.0 };

    /// Create new scale factors.
    #[must_use]
    pub const fn new(sx: f64, sy: f64) -> Self {
        Self { sx, sy }
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Print resolution in dots per inch per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Horizontal dots per inch.
    pub x: f64,
    /// Vertical dots per inch.
    pub y: f64,
}

impl Resolution {
    /// Create a resolution with independent axes.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Create a resolution with the same DPI on both axes.
    #[must_use]
    pub const fn uniform(dpi: f64) -> Self {
        Self { x: dpi, y: dpi }
    }
}

/// Contour detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Contours whose polygon area (pixels²) is below this are discarded.
    pub min_area: f64,

    /// Sigma of the Gaussian blur applied before thresholding. The
    /// default matches a 5×5 kernel.
    pub blur_sigma: f32,
}

impl DetectionConfig {
    /// Minimum area used when detecting in scene space.
    pub const DEFAULT_MIN_AREA: f64 = 40_000.0;
    /// Minimum area used by the raw-pixel detection path.
    pub const RAW_PIXEL_MIN_AREA: f64 = 50.0;
    /// Sigma equivalent of a 5×5 Gaussian kernel.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.1;

    /// Preset for detecting small blobs directly in raw pixels.
    #[must_use]
    pub const fn raw_pixel() -> Self {
        Self {
            min_area: Self::RAW_PIXEL_MIN_AREA,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_area: Self::DEFAULT_MIN_AREA,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
        }
    }
}

/// Configuration consumed by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Physical size of the print bed.
    pub workspace: Workspace,

    /// Contour detection parameters.
    pub detection: DetectionConfig,

    /// Output resolution override. When `None`, the render DPI is
    /// inherited from the tile's metadata.
    pub render_dpi: Option<f64>,
}

impl EngineConfig {
    /// Check the configuration for values that cannot produce a
    /// meaningful session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for non-finite or
    /// non-positive workspace dimensions, a negative minimum area, a
    /// negative blur sigma, or a non-positive DPI override.
    pub fn validate(&self) -> Result<(), EngineError> {
        let Workspace {
            width_mm,
            height_mm,
        } = self.workspace;
        if !(width_mm.is_finite() && height_mm.is_finite() && width_mm > 0.0 && height_mm > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "workspace must be positive, got {width_mm}x{height_mm} mm"
            )));
        }
        if self.detection.min_area.is_nan() || self.detection.min_area < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "min_area must be non-negative, got {}",
                self.detection.min_area
            )));
        }
        if self.detection.blur_sigma.is_nan() || self.detection.blur_sigma < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "blur_sigma must be non-negative, got {}",
                self.detection.blur_sigma
            )));
        }
        if let Some(dpi) = self.render_dpi
            && !(dpi.is_finite() && dpi > 0.0)
        {
            return Err(EngineError::InvalidConfig(format!(
                "render_dpi must be positive, got {dpi}"
            )));
        }
        Ok(())
    }
}

/// Errors raised by the engine outside of session bookkeeping.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to decode an in-memory image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sample buffer length does not match `width * height * channels`.
    #[error("sample buffer holds {actual} samples, expected {expected}")]
    BufferSize {
        /// Samples required by the declared shape.
        expected: usize,
        /// Samples actually supplied.
        actual: usize,
    },

    /// The raster layout is not supported by this operation.
    #[error("unsupported raster: {0}")]
    Unsupported(String),
}

/// Serde-compatible proxy for `EngineError`.
#[derive(Serialize, Deserialize)]
enum EngineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    BufferSize { expected: usize, actual: usize },
    Unsupported(String),
}

impl Serialize for EngineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => EngineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => EngineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => EngineErrorProxy::InvalidConfig(s.clone()),
            Self::BufferSize { expected, actual } => EngineErrorProxy::BufferSize {
                expected: *expected,
                actual: *actual,
            },
            Self::Unsupported(s) => EngineErrorProxy::Unsupported(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EngineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = EngineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            EngineErrorProxy::ImageDecode(msg) => Self::Unsupported(format!("image decode error: {msg}")),
            EngineErrorProxy::EmptyInput => Self::EmptyInput,
            EngineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            EngineErrorProxy::BufferSize { expected, actual } => {
                Self::BufferSize { expected, actual }
            }
            EngineErrorProxy::Unsupported(s) => Self::Unsupported(s),
        })
    }
}
