//! printvision-engine: tile placement and compositing core (sans-IO).
//!
//! Finds objects lying on a scan table, works out where each one sits
//! and how it is turned, places copies of a printable tile on top of
//! them at true physical scale, and composites the result into one
//! print-ready canvas:
//! grayscale -> blur -> Otsu threshold -> contour tracing ->
//! oriented geometry -> template placement -> compositing.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and rasters. Reading and writing files lives in
//! `printvision-io` behind the [`RasterStore`] trait; TIFF encoding
//! lives in `printvision-export`.

pub mod blur;
pub mod compose;
pub mod contour;
pub mod detect;
pub mod diagnostics;
pub mod geometry;
pub mod grayscale;
pub mod placement;
pub mod preview;
pub mod raster;
pub mod scale;
pub mod session;
pub mod simplify;
pub mod store;
pub mod threshold;
pub mod types;

pub use compose::{Canvas, RenderError, RenderOutcome};
pub use contour::{ContourTracer, ContourTracerKind};
pub use detect::{DetectedObject, Detection};
pub use diagnostics::{Clock, RunDiagnostics, StageMetrics, Stopwatch};
pub use geometry::{ContourGeometry, Heading, OrientedRect};
pub use placement::{ContourId, PlacedTile, TemplateBinding, TemplateState, TileId, TileKind};
pub use raster::{
    ChannelRole, ColorModel, Raster, RasterMetadata, ReferenceRaster, SampleType, Samples,
    TileImage,
};
pub use session::{ChangeKind, Session, SessionError, SessionEvent};
pub use store::RasterStore;
pub use types::{
    DetectionConfig, Dimensions, EngineConfig, EngineError, MmPerPixel, Point, Polyline,
    Resolution, ScaleFactor, Workspace,
};

/// Decode a background image and locate the objects on it.
///
/// Takes raw image bytes (PNG, JPEG, BMP, TIFF, WebP) and detection
/// parameters and returns every object above the minimum area, with
/// its outer contour, area and centroid.
///
/// # Errors
///
/// Returns [`EngineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`EngineError::ImageDecode`] if the image format is unrecognized.
pub fn detect_centroids(
    image_bytes: &[u8],
    config: &DetectionConfig,
) -> Result<Detection, EngineError> {
    let background = grayscale::decode_reference(image_bytes)?;
    Ok(detect::detect(&background.raster, config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Encode an RGB PNG of a light table with dark squares at the given
    /// top-left corners.
    fn table_png(width: u32, height: u32, squares: &[(u32, u32)], side: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            let inside = squares
                .iter()
                .any(|&(sx, sy)| (sx..sx + side).contains(&x) && (sy..sy + side).contains(&y));
            if inside {
                image::Rgb([15, 15, 15])
            } else {
                image::Rgb([235, 235, 235])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn detect_empty_input() {
        let result = detect_centroids(&[], &DetectionConfig::default());
        assert!(matches!(result, Err(EngineError::EmptyInput)));
    }

    #[test]
    fn detect_corrupt_input() {
        let result = detect_centroids(&[0xFF, 0x00], &DetectionConfig::default());
        assert!(matches!(result, Err(EngineError::ImageDecode(_))));
    }

    #[test]
    fn detect_uniform_image_finds_nothing() {
        let png = table_png(30, 30, &[], 0);
        let detection = detect_centroids(&png, &DetectionConfig::raw_pixel()).unwrap();
        assert!(detection.is_empty());
    }

    #[test]
    fn detect_finds_each_square() {
        let png = table_png(120, 120, &[(10, 10), (70, 10), (40, 70)], 30);
        let detection = detect_centroids(&png, &DetectionConfig::raw_pixel()).unwrap();
        assert_eq!(detection.len(), 3);
        for (expected, got) in [(25.0, 25.0), (85.0, 25.0), (55.0, 85.0)]
            .iter()
            .zip(sorted(detection.centroids()))
        {
            assert!((got.x - expected.0).abs() < 1.5, "x {} vs {}", got.x, expected.0);
            assert!((got.y - expected.1).abs() < 1.5, "y {} vs {}", got.y, expected.1);
        }
    }

    #[test]
    fn default_min_area_drops_small_objects() {
        let png = table_png(120, 120, &[(10, 10)], 30);
        let detection = detect_centroids(&png, &DetectionConfig::default()).unwrap();
        assert!(detection.is_empty());
        assert_eq!(detection.rejected, 1);
    }

    fn sorted(mut points: Vec<Point>) -> Vec<Point> {
        points.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
        points
    }
}
