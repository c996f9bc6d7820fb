//! Oriented geometry of a detected contour.
//!
//! A [`ContourGeometry`] is computed once from a polygon and never
//! mutated. It carries the minimum-area bounding rectangle and a
//! canonical orientation:
//!
//! 1. The rectangle's raw angle is the direction of its first edge.
//! 2. If that edge is the short one, 90° is added so the angle always
//!    follows the long axis.
//! 3. The polygon is rotated upright, simplified and rasterized; if the
//!    upper half holds strictly more foreground than the lower half the
//!    heading is [`Heading::Down`] and 180° is added. Ties stay
//!    [`Heading::Up`].
//!
//! Angles are degrees, clockwise on screen (y axis down).

use geo::{ConvexHull, LineString, Polygon};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::detect::area_and_centroid;
use crate::simplify::simplify_closed_relative;
use crate::types::{Point, Polyline};

/// Tolerance of the upright simplification, as a fraction of perimeter.
const UPRIGHT_SIMPLIFY_FRACTION: f64 = 0.01;

/// Normalize an angle in degrees to `[0, 360)`.
#[must_use]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if d >= 360.0 { 0.0 } else { d }
}

/// Minimum-area rectangle enclosing a point set.
///
/// Corners are ordered `p0 → p1 → p2 → p3`; the edge `p0 → p1` has
/// direction [`angle`](Self::angle) and length [`width`](Self::width),
/// the edge `p0 → p3` is perpendicular with length
/// [`height`](Self::height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedRect {
    /// Center of the rectangle.
    pub center: Point,
    /// Length of the first edge (`p0 → p1`).
    pub width: f64,
    /// Length of the adjacent edge (`p0 → p3`).
    pub height: f64,
    /// Direction of the first edge in `[0, 180)` degrees.
    pub angle: f64,
    /// The four corners.
    pub corners: [Point; 4],
}

impl OrientedRect {
    /// Area of the rectangle.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// The rectangle outline as a closed polyline.
    #[must_use]
    pub fn polygon(&self) -> Polyline {
        Polyline::new(self.corners.to_vec())
    }
}

/// Compute the minimum-area enclosing rectangle with rotating calipers
/// over the convex hull.
///
/// Returns `None` when the points do not span a two-dimensional area.
#[must_use]
pub fn min_area_rect(points: &[Point]) -> Option<OrientedRect> {
    if points.len() < 3 {
        return None;
    }
    let coords: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
    let hull = Polygon::new(LineString::from(coords), vec![]).convex_hull();
    let ring: Vec<Point> = hull
        .exterior()
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect();
    // The hull ring repeats its first point at the end.
    let hull_points = match ring.split_last() {
        Some((last, rest)) if rest.first() == Some(last) => rest,
        _ => ring.as_slice(),
    };
    if hull_points.len() < 3 {
        return None;
    }

    let mut best: Option<(f64, f64)> = None;
    for (i, &a) in hull_points.iter().enumerate() {
        let b = hull_points[(i + 1) % hull_points.len()];
        let edge = b - a;
        if edge.x == 0.0 && edge.y == 0.0 {
            continue;
        }
        let angle = edge.y.atan2(edge.x).to_degrees().rem_euclid(180.0);
        let (w, h, _, _) = project(hull_points, angle);
        let area = w * h;
        if best.is_none_or(|(best_area, _)| area < best_area) {
            best = Some((area, angle));
        }
    }

    let (area, angle) = best?;
    if !(area.is_finite() && area > 0.0) {
        return None;
    }
    let angle = if angle >= 180.0 { 0.0 } else { angle };
    let (width, height, min, max) = project(hull_points, angle);
    let u = Point::new(1.0, 0.0).rotated(angle);
    let v = Point::new(0.0, 1.0).rotated(angle);
    let at = |s: f64, t: f64| Point::new(u.x.mul_add(s, v.x * t), u.y.mul_add(s, v.y * t));
    let corners = [
        at(min.x, min.y),
        at(max.x, min.y),
        at(max.x, max.y),
        at(min.x, max.y),
    ];
    let center = at((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);

    Some(OrientedRect {
        center,
        width,
        height,
        angle,
        corners,
    })
}

/// Project points onto the axes rotated by `angle`.
///
/// Returns `(extent_u, extent_v, min, max)` where `min`/`max` hold the
/// per-axis projection bounds.
fn project(points: &[Point], angle: f64) -> (f64, f64, Point, Point) {
    let mut min = Point::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &p in points {
        let local = p.rotated(-angle);
        min.x = min.x.min(local.x);
        min.y = min.y.min(local.y);
        max.x = max.x.max(local.x);
        max.y = max.y.max(local.y);
    }
    (max.x - min.x, max.y - min.y, min, max)
}

/// Angle of the rectangle's long axis: the raw angle, plus 90° when the
/// first edge is shorter than its neighbor.
#[must_use]
pub fn long_axis_angle(rect: &OrientedRect) -> f64 {
    if rect.width < rect.height {
        rect.angle + 90.0
    } else {
        rect.angle
    }
}

/// Which way an object faces once its long axis is aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heading {
    /// No flip: the lower half holds at least as much mass.
    Up,
    /// Flipped by 180°: the upper half is heavier.
    Down,
}

/// Decide the heading of `polygon` after rotating it by `-angle` about
/// `center`.
///
/// The upright polygon is simplified, filled into a mask sized to its
/// bounding box and split at the vertical midpoint. With an odd number
/// of rows the middle row belongs to neither half.
#[must_use]
pub fn up_down_heading(polygon: &Polyline, center: Point, angle: f64) -> Heading {
    let upright = Polyline::new(
        polygon
            .points()
            .iter()
            .map(|p| p.rotated_about(center, -angle))
            .collect(),
    );
    let simplified = simplify_closed_relative(&upright, UPRIGHT_SIMPLIFY_FRACTION);
    let Some(mask) = rasterize(&simplified) else {
        return Heading::Up;
    };

    let h = mask.height();
    let mut upper = 0usize;
    let mut lower = 0usize;
    for (_, y, px) in mask.enumerate_pixels() {
        if px.0[0] == 0 {
            continue;
        }
        if y < h / 2 {
            upper += 1;
        } else if y >= h.div_ceil(2) {
            lower += 1;
        }
    }

    if upper > lower {
        Heading::Down
    } else {
        Heading::Up
    }
}

/// Fill a polygon into a mask covering its bounding box.
///
/// Returns `None` when fewer than three distinct vertices remain after
/// snapping to the pixel grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rasterize(polygon: &Polyline) -> Option<GrayImage> {
    let points = polygon.points();
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }

    let mut grid: Vec<imageproc::point::Point<i32>> = Vec::with_capacity(points.len());
    for p in points {
        let q = imageproc::point::Point::new(
            (p.x - min_x).round() as i32,
            (p.y - min_y).round() as i32,
        );
        if grid.last() != Some(&q) {
            grid.push(q);
        }
    }
    // The fill routine rejects rings that repeat their first vertex.
    while grid.len() > 1 && grid.first() == grid.last() {
        grid.pop();
    }
    if grid.len() < 3 {
        return None;
    }

    let width = (max_x - min_x).round() as u32 + 1;
    let height = (max_y - min_y).round() as u32 + 1;
    let mut mask = GrayImage::new(width, height);
    imageproc::drawing::draw_polygon_mut(&mut mask, &grid, Luma([255]));
    Some(mask)
}

/// Oriented geometry of one contour. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContourGeometry {
    polygon: Polyline,
    rect: OrientedRect,
    centroid: Point,
    angle: f64,
    heading: Heading,
}

impl ContourGeometry {
    /// Build the geometry of a closed polygon (scene coordinates).
    ///
    /// Returns `None` for degenerate input: fewer than three points,
    /// zero enclosed area or a zero-area bounding rectangle.
    #[must_use]
    pub fn from_polygon(polygon: Polyline) -> Option<Self> {
        let (_, centroid) = area_and_centroid(&polygon)?;
        let rect = min_area_rect(polygon.points())?;
        let long_axis = long_axis_angle(&rect);
        let heading = up_down_heading(&polygon, rect.center, long_axis);
        let angle = match heading {
            Heading::Up => normalize_degrees(long_axis),
            Heading::Down => normalize_degrees(long_axis + 180.0),
        };
        Some(Self {
            polygon,
            rect,
            centroid,
            angle,
            heading,
        })
    }

    /// Center of the bounding rectangle.
    #[must_use]
    pub const fn center(&self) -> Point {
        self.rect.center
    }

    /// Area centroid of the contour polygon.
    #[must_use]
    pub const fn centroid(&self) -> Point {
        self.centroid
    }

    /// Rectangle edge lengths `(width, height)` as found, first edge
    /// first.
    #[must_use]
    pub const fn extent(&self) -> (f64, f64) {
        (self.rect.width, self.rect.height)
    }

    /// Length of the long side.
    #[must_use]
    pub fn long_side(&self) -> f64 {
        self.rect.width.max(self.rect.height)
    }

    /// Length of the short side.
    #[must_use]
    pub fn short_side(&self) -> f64 {
        self.rect.width.min(self.rect.height)
    }

    /// Raw rectangle angle in `[0, 180)`.
    #[must_use]
    pub const fn raw_angle(&self) -> f64 {
        self.rect.angle
    }

    /// Canonical orientation in `[0, 360)`.
    #[must_use]
    pub const fn angle(&self) -> f64 {
        self.angle
    }

    /// Result of the up/down heuristic.
    #[must_use]
    pub const fn heading(&self) -> Heading {
        self.heading
    }

    /// The bounding rectangle.
    #[must_use]
    pub const fn rect(&self) -> &OrientedRect {
        &self.rect
    }

    /// The contour polygon the geometry was computed from.
    #[must_use]
    pub const fn polygon(&self) -> &Polyline {
        &self.polygon
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rect_polygon(cx: f64, cy: f64, w: f64, h: f64, angle: f64) -> Polyline {
        let c = Point::new(cx, cy);
        let corners = [
            Point::new(-w / 2.0, -h / 2.0),
            Point::new(w / 2.0, -h / 2.0),
            Point::new(w / 2.0, h / 2.0),
            Point::new(-w / 2.0, h / 2.0),
        ];
        Polyline::new(corners.iter().map(|p| p.rotated(angle) + c).collect())
    }

    /// Angular distance modulo 180°.
    fn axis_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(180.0);
        d.min(180.0 - d)
    }

    #[test]
    fn normalize_wraps_into_range() {
        assert!((normalize_degrees(370.0) - 10.0).abs() < 1e-12);
        assert!((normalize_degrees(-90.0) - 270.0).abs() < 1e-12);
        assert!(normalize_degrees(360.0).abs() < 1e-12);
        assert!(normalize_degrees(-1e-20) < 360.0);
    }

    #[test]
    fn axis_aligned_rect() {
        let poly = rect_polygon(50.0, 30.0, 100.0, 40.0, 0.0);
        let rect = min_area_rect(poly.points()).unwrap();
        assert!((rect.area() - 4000.0).abs() < 1e-6);
        assert!((rect.center.x - 50.0).abs() < 1e-9);
        assert!((rect.center.y - 30.0).abs() < 1e-9);
        assert!(axis_diff(long_axis_angle(&rect), 0.0) < 1e-9);
    }

    #[test]
    fn short_first_edge_adds_ninety() {
        // Tall rectangle: the first edge runs along x and is the short one.
        let poly = rect_polygon(0.0, 0.0, 40.0, 100.0, 0.0);
        let rect = min_area_rect(poly.points()).unwrap();
        let (first, second) = if axis_diff(rect.angle, 0.0) < 1e-9 {
            (rect.width, rect.height)
        } else {
            (rect.height, rect.width)
        };
        assert!((first - 40.0).abs() < 1e-9);
        assert!((second - 100.0).abs() < 1e-9);
        assert!(axis_diff(long_axis_angle(&rect), 90.0) < 1e-9);
    }

    #[test]
    fn long_axis_follows_rotation() {
        for angle in [15.0, 30.0, 75.0, 120.0, 160.0] {
            let poly = rect_polygon(200.0, 150.0, 120.0, 50.0, angle);
            let geom = ContourGeometry::from_polygon(poly).unwrap();
            assert!(
                axis_diff(geom.angle(), angle) < 1e-6,
                "angle {angle}: got {}",
                geom.angle()
            );
            assert!((geom.long_side() - 120.0).abs() < 1e-6);
            assert!((geom.short_side() - 50.0).abs() < 1e-6);
        }
    }

    #[test]
    fn hull_ignores_concave_points() {
        let poly = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(50.0, 10.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 40.0),
            Point::new(0.0, 40.0),
        ]);
        let rect = min_area_rect(poly.points()).unwrap();
        assert!((rect.area() - 4000.0).abs() < 1e-6);
    }

    #[test]
    fn heavier_top_flips_heading() {
        // Wide top edge, narrow bottom edge.
        let poly = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(70.0, 30.0),
            Point::new(30.0, 30.0),
        ]);
        let geom = ContourGeometry::from_polygon(poly).unwrap();
        assert_eq!(geom.heading(), Heading::Down);
        assert!((geom.angle() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn heavier_bottom_keeps_heading() {
        let poly = Polyline::new(vec![
            Point::new(30.0, 0.0),
            Point::new(70.0, 0.0),
            Point::new(100.0, 30.0),
            Point::new(0.0, 30.0),
        ]);
        let geom = ContourGeometry::from_polygon(poly).unwrap();
        assert_eq!(geom.heading(), Heading::Up);
        assert!(geom.angle().abs() < 1e-9);
    }

    #[test]
    fn symmetric_shape_ties_to_up() {
        let poly = rect_polygon(60.0, 60.0, 80.0, 30.0, 0.0);
        let geom = ContourGeometry::from_polygon(poly).unwrap();
        assert_eq!(geom.heading(), Heading::Up);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let line = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ]);
        assert!(min_area_rect(line.points()).is_none());
        assert!(ContourGeometry::from_polygon(line).is_none());
    }

    #[test]
    fn too_few_points_are_degenerate() {
        let poly = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert!(ContourGeometry::from_polygon(poly).is_none());
    }

    #[test]
    fn rect_polygon_has_four_corners() {
        let poly = rect_polygon(10.0, 10.0, 8.0, 4.0, 0.0);
        let rect = min_area_rect(poly.points()).unwrap();
        assert_eq!(rect.polygon().len(), 4);
        let e01 = rect.corners[0].distance(rect.corners[1]);
        let e03 = rect.corners[0].distance(rect.corners[3]);
        assert!((e01 - rect.width).abs() < 1e-9);
        assert!((e03 - rect.height).abs() < 1e-9);
    }

    #[test]
    fn rasterize_rejects_degenerate_ring() {
        let poly = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(0.2, 0.1),
            Point::new(0.0, 0.0),
        ]);
        assert!(rasterize(&poly).is_none());
    }
}
