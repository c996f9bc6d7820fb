//! Polygon approximation for traced contours.
//!
//! Traced outlines carry one vertex per boundary pixel. Before the
//! bounding rectangle is measured they are reduced with Douglas-Peucker,
//! treating the outline as a closed ring.

use crate::types::{Point, Polyline};

/// Approximate a closed ring, dropping vertices within `tolerance`
/// pixels of the chord between their kept neighbors.
///
/// The ring is cut at its first vertex and at the vertex farthest from
/// it, so both halves are anchored on points that survive any
/// tolerance. Rings with fewer than four vertices come back unchanged.
#[must_use = "returns the approximated ring"]
pub fn simplify_closed(ring: &Polyline, tolerance: f64) -> Polyline {
    let points = ring.points();
    let n = points.len();
    if n < 4 {
        return ring.clone();
    }

    let origin = points[0];
    let far = farthest_from(points, origin);

    // Index `n` stands for the origin again, closing the ring.
    let at = |i: usize| if i == n { origin } else { points[i] };
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[far] = true;

    let mut spans = vec![(0, far), (far, n)];
    while let Some((first, last)) = spans.pop() {
        if last <= first + 1 {
            continue;
        }
        let (a, b) = (at(first), at(last));
        let (split, deviation) = ((first + 1)..last)
            .map(|i| (i, chord_distance(at(i), a, b)))
            .fold((first, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if deviation > tolerance {
            keep[split] = true;
            spans.push((first, split));
            spans.push((split, last));
        }
    }

    Polyline::new(
        points
            .iter()
            .zip(keep)
            .filter_map(|(&p, k)| k.then_some(p))
            .collect(),
    )
}

/// Approximate a closed ring with a tolerance given as a fraction of
/// its perimeter.
#[must_use = "returns the approximated ring"]
pub fn simplify_closed_relative(ring: &Polyline, fraction: f64) -> Polyline {
    simplify_closed(ring, fraction * ring.closed_length())
}

fn farthest_from(points: &[Point], origin: Point) -> usize {
    let mut best = (1, f64::NEG_INFINITY);
    for (i, p) in points.iter().enumerate().skip(1) {
        let d = p.distance_squared(origin);
        if d > best.1 {
            best = (i, d);
        }
    }
    best.0
}

/// Distance from `p` to the line through `a` and `b`, or to `a` when
/// the two coincide.
fn chord_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let length = dx.hypot(dy);
    if length == 0.0 {
        return p.distance(a);
    }
    (dx * (p.y - a.y) - dy * (p.x - a.x)).abs() / length
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Outline of an axis-aligned rectangle with a vertex every unit,
    /// starting part way along the top edge like a raster trace does.
    fn traced_rect(width: i32, height: i32, start: usize) -> Polyline {
        let mut ring = Vec::new();
        for x in 0..width {
            ring.push(Point::new(f64::from(x), 0.0));
        }
        for y in 0..height {
            ring.push(Point::new(f64::from(width), f64::from(y)));
        }
        for x in (1..=width).rev() {
            ring.push(Point::new(f64::from(x), f64::from(height)));
        }
        for y in (1..=height).rev() {
            ring.push(Point::new(0.0, f64::from(y)));
        }
        ring.rotate_left(start);
        Polyline::new(ring)
    }

    fn has(ring: &Polyline, x: f64, y: f64) -> bool {
        ring.points().contains(&Point::new(x, y))
    }

    #[test]
    fn traced_rectangle_reduces_to_corners() {
        let result = simplify_closed(&traced_rect(40, 20, 7), 0.5);
        for (x, y) in [(0.0, 0.0), (40.0, 0.0), (40.0, 20.0), (0.0, 20.0)] {
            assert!(has(&result, x, y), "missing corner ({x}, {y})");
        }
        // Four corners plus the start vertex on the top edge.
        assert_eq!(result.len(), 5);
        assert!(has(&result, 7.0, 0.0));
    }

    #[test]
    fn result_keeps_ring_order() {
        let ring = traced_rect(10, 10, 3);
        let result = simplify_closed(&ring, 0.5);
        let positions: Vec<usize> = result
            .points()
            .iter()
            .map(|p| ring.points().iter().position(|q| q == p).unwrap_or(usize::MAX))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_tolerance_keeps_bends_only_when_they_deviate() {
        let ring = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.5),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
        ]);
        assert_eq!(simplify_closed(&ring, 0.0).len(), 5);
        assert_eq!(simplify_closed(&ring, 1.0).len(), 4);
    }

    #[test]
    fn small_rings_are_unchanged() {
        let tri = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(0.0, 3.0),
        ]);
        assert_eq!(simplify_closed(&tri, 100.0), tri);
        assert!(simplify_closed(&Polyline::new(vec![]), 1.0).is_empty());
    }

    #[test]
    fn relative_tolerance_follows_perimeter() {
        // 2% of a 240-unit perimeter is 4.8: a 3-unit notch disappears.
        let mut ring = traced_rect(80, 40, 0).into_points();
        ring[40] = Point::new(40.0, 3.0);
        let result = simplify_closed_relative(&Polyline::new(ring), 0.02);
        assert!(!has(&result, 40.0, 3.0));
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn chord_distance_measures_perpendicular_offset() {
        let d = chord_distance(
            Point::new(2.0, -1.0),
            Point::new(0.0, 0.0),
            Point::new(4.0, 2.0),
        );
        assert!((d - 8.0 / 20.0_f64.sqrt()).abs() < 1e-10);

        let same = chord_distance(Point::new(3.0, 4.0), Point::new(0.0, 0.0), Point::new(0.0, 0.0));
        assert!((same - 5.0).abs() < 1e-10);
    }
}
