//! Displayable RGB previews of rasters and of a whole session.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_circle_mut, draw_line_segment_mut};

use crate::raster::{ColorModel, Raster, RasterMetadata};
use crate::session::Session;
use crate::types::Point;

/// Ring radius around each centroid, in preview pixels.
pub const CENTROID_RING_RADIUS: i32 = 12;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);

/// Convert any raster to 8-bit RGB for display.
///
/// Separated data is mapped with `R = 1 - min(1, C + K)` (and likewise
/// for G and B) using the CMYK channel order from `metadata`, falling
/// back to the first four channels. Alpha is composited over white.
#[must_use]
pub fn to_preview_rgb8(raster: &Raster, metadata: &RasterMetadata) -> RgbImage {
    let channels = raster.channels();
    let alpha = metadata.alpha_index.filter(|&a| a < channels);
    let colors = channels - usize::from(alpha.is_some());
    let cmyk = metadata.cmyk_order.unwrap_or([0, 1, 2, 3]);

    RgbImage::from_fn(raster.width(), raster.height(), |x, y| {
        let u = |c: usize| raster.unit_sample(x, y, c);
        let rgb = match metadata.color_model {
            ColorModel::Separated if colors >= 4 => {
                let k = u(cmyk[3]);
                [
                    1.0 - (u(cmyk[0]) + k).min(1.0),
                    1.0 - (u(cmyk[1]) + k).min(1.0),
                    1.0 - (u(cmyk[2]) + k).min(1.0),
                ]
            }
            ColorModel::Separated => {
                let v = 1.0 - u(0);
                [v, v, v]
            }
            ColorModel::Rgb if colors >= 3 => [u(0), u(1), u(2)],
            ColorModel::Rgb | ColorModel::Gray => {
                let v = u(0);
                [v, v, v]
            }
        };
        let a = alpha.map_or(1.0, u);
        Rgb(rgb.map(|v| to_byte(a.mul_add(v, 1.0 - a))))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_byte(unit: f64) -> u8 {
    (unit.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Metadata for a background photograph, inferred from its channel
/// count.
fn reference_metadata(raster: &Raster) -> RasterMetadata {
    let channels = raster.channels();
    RasterMetadata {
        color_model: if channels >= 3 {
            ColorModel::Rgb
        } else {
            ColorModel::Gray
        },
        alpha_index: matches!(channels, 2 | 4).then(|| channels - 1),
        ..RasterMetadata::default()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn mark_centroids(image: &mut RgbImage, centroids: &[Point]) {
    for c in centroids {
        let (x, y) = (c.x.round() as i32, c.y.round() as i32);
        draw_hollow_circle_mut(image, (x, y), CENTROID_RING_RADIUS, GREEN);
        draw_cross_mut(image, GREEN, x, y);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn draw_closed(image: &mut RgbImage, points: &[Point], color: Rgb<u8>) {
    let Some(&last) = points.last() else {
        return;
    };
    let mut prev = last;
    for &p in points {
        draw_line_segment_mut(
            image,
            (prev.x as f32, prev.y as f32),
            (p.x as f32, p.y as f32),
            color,
        );
        prev = p;
    }
}

/// A preview of the background with a ring on every centroid.
#[must_use]
pub fn centroid_overlay(background: &Raster, centroids: &[Point]) -> RgbImage {
    let mut image = to_preview_rgb8(background, &reference_metadata(background));
    mark_centroids(&mut image, centroids);
    image
}

/// A preview of the whole session: background, contour outlines and
/// oriented boxes, centroids and the footprint of every placed tile.
///
/// Returns `None` when no background is loaded.
#[must_use]
pub fn session_overlay(session: &Session) -> Option<RgbImage> {
    let background = &session.current_background()?.raster;
    let mut image = to_preview_rgb8(background, &reference_metadata(background));

    for contour in session.contours() {
        draw_closed(&mut image, contour.geometry.polygon().points(), RED);
        draw_closed(&mut image, &contour.geometry.rect().corners, YELLOW);
    }
    for (_, tile) in session.tiles().iter() {
        draw_closed(&mut image, &tile.footprint(), MAGENTA);
    }
    let centroids: Vec<Point> = session.contours().iter().map(|c| c.centroid).collect();
    mark_centroids(&mut image, &centroids);
    Some(image)
}
