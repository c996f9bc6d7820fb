//! Object detection on the scan-table background.
//!
//! Grayscale, blur, Otsu threshold (inverted so objects are white),
//! external contour tracing, then an area filter. Each surviving
//! contour yields a centroid.

use geo::{Area, Centroid, LineString, Polygon};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::blur::gaussian_blur;
use crate::contour::{ContourTracer, ContourTracerKind};
use crate::grayscale::to_gray8;
use crate::raster::Raster;
use crate::threshold::otsu_binarize;
use crate::types::{DetectionConfig, Point, Polyline};

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Outer boundary in background pixel coordinates.
    pub contour: Polyline,
    /// Center of mass of the enclosed area.
    pub centroid: Point,
    /// Enclosed area in pixels².
    pub area: f64,
}

/// Result of a detection pass.
///
/// An empty `objects` list is a valid result; whether it is an error
/// is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Objects above the area threshold, in tracing order.
    pub objects: Vec<DetectedObject>,
    /// Threshold chosen by Otsu's method.
    pub otsu_level: u8,
    /// Whether the binary mask was inverted.
    pub inverted: bool,
    /// Contours dropped for being smaller than the minimum area.
    pub rejected: usize,
    /// Contours skipped because their geometry was degenerate.
    pub degenerate: usize,
}

impl Detection {
    /// Returns `true` when no object passed the filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of detected objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Centroids of all detected objects, in tracing order.
    #[must_use]
    pub fn centroids(&self) -> Vec<Point> {
        self.objects.iter().map(|o| o.centroid).collect()
    }
}

/// Detect objects in a background raster of any channel count or
/// sample type.
#[must_use = "returns the detection result"]
pub fn detect(raster: &Raster, config: &DetectionConfig) -> Detection {
    detect_gray(&to_gray8(raster), config)
}

/// Detect objects in an 8-bit grayscale image.
#[must_use = "returns the detection result"]
pub fn detect_gray(gray: &GrayImage, config: &DetectionConfig) -> Detection {
    let blurred = gaussian_blur(gray, config.blur_sigma);
    let binary = otsu_binarize(&blurred);
    let traced = ContourTracerKind::default().trace_external(&binary.mask);
    let traced_count = traced.len();

    let mut objects = Vec::new();
    let mut rejected = 0;
    let mut degenerate = 0;

    for contour in traced {
        let Some((area, centroid)) = area_and_centroid(&contour) else {
            tracing::warn!(points = contour.len(), "skipping degenerate contour");
            degenerate += 1;
            continue;
        };
        if area < config.min_area {
            rejected += 1;
            continue;
        }
        objects.push(DetectedObject {
            contour,
            centroid,
            area,
        });
    }

    tracing::info!(
        otsu_level = binary.level,
        inverted = binary.inverted,
        traced = traced_count,
        kept = objects.len(),
        rejected,
        degenerate,
        min_area = config.min_area,
        "detection finished"
    );

    Detection {
        objects,
        otsu_level: binary.level,
        inverted: binary.inverted,
        rejected,
        degenerate,
    }
}

/// Polygon area and centroid, or `None` for contours that enclose
/// nothing.
pub(crate) fn area_and_centroid(contour: &Polyline) -> Option<(f64, Point)> {
    if contour.len() < 3 {
        return None;
    }
    let polygon = to_geo_polygon(contour);
    let area = polygon.unsigned_area();
    if !(area.is_finite() && area > 0.0) {
        return None;
    }
    let c = polygon.centroid()?;
    Some((area, Point::new(c.x(), c.y())))
}

pub(crate) fn to_geo_polygon(contour: &Polyline) -> Polygon<f64> {
    let coords: Vec<(f64, f64)> = contour.points().iter().map(|p| (p.x, p.y)).collect();
    Polygon::new(LineString::from(coords), vec![])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn table_with_squares(squares: &[(u32, u32, u32)]) -> GrayImage {
        // Light table, dark square objects (x, y, side).
        GrayImage::from_fn(200, 200, |x, y| {
            let inside = squares
                .iter()
                .any(|&(sx, sy, side)| x >= sx && x < sx + side && y >= sy && y < sy + side);
            if inside {
                image::Luma([25])
            } else {
                image::Luma([235])
            }
        })
    }

    #[test]
    fn all_black_image_detects_nothing() {
        let gray = GrayImage::new(64, 64);
        let result = detect_gray(&gray, &DetectionConfig::raw_pixel());
        assert!(result.is_empty());
        assert!(result.centroids().is_empty());
    }

    #[test]
    fn finds_each_object_and_its_centroid() {
        let gray = table_with_squares(&[(20, 20, 40), (120, 100, 50)]);
        let result = detect_gray(&gray, &DetectionConfig::raw_pixel());
        assert!(result.inverted);
        assert_eq!(result.len(), 2);

        let mut centroids = result.centroids();
        centroids.sort_by(|a, b| a.x.total_cmp(&b.x));
        // Boundary pixels are traced through their centers, so the
        // polygon is one pixel smaller than the square.
        assert!((centroids[0].x - 39.5).abs() < 1.0);
        assert!((centroids[0].y - 39.5).abs() < 1.0);
        assert!((centroids[1].x - 144.5).abs() < 1.0);
        assert!((centroids[1].y - 124.5).abs() < 1.0);
    }

    #[test]
    fn small_objects_are_rejected() {
        let gray = table_with_squares(&[(20, 20, 40), (150, 150, 5)]);
        let config = DetectionConfig {
            min_area: 200.0,
            ..DetectionConfig::raw_pixel()
        };
        let result = detect_gray(&gray, &config);
        assert_eq!(result.len(), 1);
        assert_eq!(result.rejected, 1);
    }

    #[test]
    fn default_threshold_rejects_small_scene() {
        let gray = table_with_squares(&[(20, 20, 40)]);
        let result = detect_gray(&gray, &DetectionConfig::default());
        assert!(result.is_empty());
        assert_eq!(result.rejected, 1);
    }

    #[test]
    fn detect_accepts_rgb_rasters() {
        let gray = table_with_squares(&[(50, 50, 60)]);
        let rgb: Vec<u8> = gray.pixels().flat_map(|p| [p.0[0]; 3]).collect();
        let raster = Raster::from_vec::<u8>(200, 200, 3, rgb).unwrap();
        let result = detect(&raster, &DetectionConfig::raw_pixel());
        assert_eq!(result.len(), 1);
        assert!(result.objects[0].area > 3000.0);
    }

    #[test]
    fn degenerate_contours_have_no_centroid() {
        let line = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
        ]);
        assert!(area_and_centroid(&line).is_none());
        assert!(area_and_centroid(&Polyline::new(vec![Point::new(1.0, 1.0)])).is_none());
    }

    #[test]
    fn square_area_and_centroid() {
        let square = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
        ]);
        let (area, c) = area_and_centroid(&square).unwrap();
        assert!((area - 16.0).abs() < 1e-9);
        assert!((c.x - 2.0).abs() < 1e-9);
        assert!((c.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn detection_serializes_to_json() {
        let gray = table_with_squares(&[(20, 20, 40)]);
        let result = detect_gray(&gray, &DetectionConfig::raw_pixel());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("otsu_level"));
    }
}
