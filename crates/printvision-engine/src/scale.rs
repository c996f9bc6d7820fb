//! Millimeter ↔ pixel conversions.
//!
//! Every value here is recomputed from its inputs rather than adjusted
//! incrementally, so repeated reconfiguration never accumulates drift.

use crate::types::{Dimensions, MM_PER_INCH, MmPerPixel, Resolution, ScaleFactor, Workspace};

/// Physical size of one background pixel given the workspace it spans.
///
/// Returns `None` when either pixel dimension is zero.
#[must_use]
pub fn mm_per_pixel(workspace: Workspace, pixels: Dimensions) -> Option<MmPerPixel> {
    if pixels.is_empty() {
        return None;
    }
    Some(MmPerPixel::new(
        workspace.width_mm / f64::from(pixels.width),
        workspace.height_mm / f64::from(pixels.height),
    ))
}

/// Ratio `from / to` per axis.
///
/// With a tile's mm-per-pixel as `from` and the scene's as `to`, this is
/// how many scene pixels one tile pixel covers. Returns `None` if any
/// component of `to` is zero or the result is not finite.
#[must_use]
pub fn scale_factor(from: MmPerPixel, to: MmPerPixel) -> Option<ScaleFactor> {
    let sx = from.x / to.x;
    let sy = from.y / to.y;
    (sx.is_finite() && sy.is_finite()).then(|| ScaleFactor::new(sx, sy))
}

/// Millimeters per pixel at a given resolution.
///
/// Returns `None` for non-positive DPI.
#[must_use]
pub fn dpi_to_mm_per_pixel(resolution: Resolution) -> Option<MmPerPixel> {
    (resolution.x > 0.0 && resolution.y > 0.0)
        .then(|| MmPerPixel::new(MM_PER_INCH / resolution.x, MM_PER_INCH / resolution.y))
}

/// Resolution that gives the requested pixel size.
///
/// Returns `None` for non-positive input.
#[must_use]
pub fn mm_per_pixel_to_dpi(mmpp: MmPerPixel) -> Option<Resolution> {
    (mmpp.x > 0.0 && mmpp.y > 0.0)
        .then(|| Resolution::new(MM_PER_INCH / mmpp.x, MM_PER_INCH / mmpp.y))
}

/// Physical size `(width_mm, height_mm)` of a raster.
#[must_use]
pub fn size_mm(pixels: Dimensions, mmpp: MmPerPixel) -> (f64, f64) {
    (
        f64::from(pixels.width) * mmpp.x,
        f64::from(pixels.height) * mmpp.y,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    #[test]
    fn workspace_over_thousand_pixels() {
        let mmpp = mm_per_pixel(Workspace::new(480.0, 600.0), dims(1000, 1000)).unwrap();
        assert!((mmpp.x - 0.48).abs() < 1e-12);
        assert!((mmpp.y - 0.6).abs() < 1e-12);
    }

    #[test]
    fn zero_pixels_has_no_scale() {
        assert!(mm_per_pixel(Workspace::default(), dims(0, 100)).is_none());
        assert!(mm_per_pixel(Workspace::default(), dims(100, 0)).is_none());
    }

    #[test]
    fn background_over_tile_scale() {
        let bg = MmPerPixel::new(0.48, 0.6);
        let tile = dpi_to_mm_per_pixel(Resolution::uniform(300.0)).unwrap();
        assert!((tile.x - 0.084_666).abs() < 1e-5);
        let s = scale_factor(bg, tile).unwrap();
        assert!((s.sx - 5.67).abs() < 0.01);
        assert!((s.sy - 7.09).abs() < 0.01);
    }

    #[test]
    fn scale_factor_round_trips() {
        let img = MmPerPixel::new(0.0847, 0.0847);
        let target = MmPerPixel::new(0.48, 0.6);
        let s = scale_factor(img, target).unwrap();
        assert!((img.x / s.sx - target.x).abs() < 1e-12);
        assert!((img.y / s.sy - target.y).abs() < 1e-12);
    }

    #[test]
    fn scale_factor_rejects_zero_target() {
        assert!(scale_factor(MmPerPixel::new(1.0, 1.0), MmPerPixel::new(0.0, 1.0)).is_none());
    }

    #[test]
    fn dpi_conversions_are_inverse() {
        let res = Resolution::new(300.0, 600.0);
        let back = mm_per_pixel_to_dpi(dpi_to_mm_per_pixel(res).unwrap()).unwrap();
        assert!((back.x - 300.0).abs() < 1e-9);
        assert!((back.y - 600.0).abs() < 1e-9);
        assert!(dpi_to_mm_per_pixel(Resolution::uniform(0.0)).is_none());
        assert!(mm_per_pixel_to_dpi(MmPerPixel::new(-1.0, 1.0)).is_none());
    }

    #[test]
    fn size_of_three_hundred_dpi_inch() {
        let mmpp = dpi_to_mm_per_pixel(Resolution::uniform(300.0)).unwrap();
        let (w, h) = size_mm(dims(300, 600), mmpp);
        assert!((w - 25.4).abs() < 1e-9);
        assert!((h - 50.8).abs() < 1e-9);
    }
}
