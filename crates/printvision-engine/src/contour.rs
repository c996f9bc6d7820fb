//! Contour tracing: extract outer object boundaries from a binary mask.
//!
//! This module defines the [`ContourTracer`] trait for pluggable contour
//! tracing algorithms and the [`ContourTracerKind`] enum for selecting
//! which algorithm to use at runtime.
//!
//! Only external borders are returned. Holes and anything nested inside
//! another object are ignored, since a tile is placed per object.

use image::GrayImage;

use crate::types::{Point, Polyline};

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContourTracerKind {
    /// Suzuki-Abe border following via `imageproc::contours::find_contours`.
    #[default]
    BorderFollowing,
}

/// Trait for contour tracing strategies.
///
/// Input: a binary mask (white pixels = objects, black = table).
/// Output: one closed polyline per outermost object, in the order the
/// tracer discovers them. Callers must not assume a spatial order.
pub trait ContourTracer {
    /// Trace the external contours of the given mask.
    fn trace_external(&self, mask: &GrayImage) -> Vec<Polyline>;
}

impl ContourTracer for ContourTracerKind {
    fn trace_external(&self, mask: &GrayImage) -> Vec<Polyline> {
        match *self {
            Self::BorderFollowing => trace_border_following(mask),
        }
    }
}

/// Suzuki-Abe border following, keeping top-level outer borders.
fn trace_border_following(mask: &GrayImage) -> Vec<Polyline> {
    if mask.width() == 0 || mask.height() == 0 {
        return Vec::new();
    }

    let contours: Vec<imageproc::contours::Contour<i32>> =
        imageproc::contours::find_contours(mask);

    contours
        .into_iter()
        .filter(|c| c.border_type == imageproc::contours::BorderType::Outer && c.parent.is_none())
        .map(|c| {
            let points = c
                .points
                .into_iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect();
            Polyline::new(points)
        })
        .collect()
}
