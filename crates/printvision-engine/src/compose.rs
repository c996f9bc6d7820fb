//! Canvas compositing at physical scale.
//!
//! The canvas covers the whole workspace at the render DPI. Its channel
//! count, sample type and color metadata come from the first tile.
//! Each tile is scaled to the canvas resolution, rotated into an
//! expanded bounding box and merged so that ink only ever accumulates:
//! ink and alpha channels keep the maximum, additive color channels keep
//! the minimum (darker is more ink). Blank areas of a tile never erase
//! what is already on the canvas.

use serde::{Deserialize, Serialize};

use crate::placement::PlacedTile;
use crate::raster::{ChannelRole, Raster, RasterMetadata, Sample, SampleType, Samples};
use crate::scale::dpi_to_mm_per_pixel;
use crate::types::{Dimensions, MM_PER_INCH, Point, Resolution, ScaleFactor, Workspace};

/// Rounding slack so exact right angles do not grow the box by a pixel.
const EXPANSION_EPSILON: f64 = 1e-9;

/// Errors raised while rendering a canvas.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum RenderError {
    /// No tiles were supplied.
    #[error("nothing to render: no tiles placed")]
    NoTiles,

    /// A tile has no pixel data.
    #[error("tile has no pixel data")]
    EmptyTile,

    /// The render resolution is zero, negative or not finite.
    #[error("render resolution must be positive, got {x}x{y} dpi")]
    InvalidDpi {
        /// Horizontal DPI.
        x: f64,
        /// Vertical DPI.
        y: f64,
    },

    /// The canvas would have no pixels.
    #[error("canvas size must be positive, got {width}x{height} px")]
    InvalidCanvasSize {
        /// Computed width before truncation.
        width: f64,
        /// Computed height before truncation.
        height: f64,
    },
}

/// A rendered raster plus the metadata it inherited.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    /// Pixels.
    pub raster: Raster,
    /// Color metadata of the first tile, with the render resolution.
    pub metadata: RasterMetadata,
}

/// Result of [`render`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    /// The composited canvas.
    pub canvas: Canvas,
    /// Tiles that touched the canvas.
    pub composited: usize,
    /// Tiles skipped because they fell outside the canvas.
    pub skipped: usize,
}

/// Pixel size of a canvas covering `workspace` at `dpi`.
///
/// # Errors
///
/// Returns [`RenderError::InvalidCanvasSize`] when either axis rounds
/// to zero or less (or overflows `u32`).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn canvas_size(workspace: Workspace, dpi: Resolution) -> Result<Dimensions, RenderError> {
    let width = (workspace.width_mm * dpi.x / MM_PER_INCH).round();
    let height = (workspace.height_mm * dpi.y / MM_PER_INCH).round();
    let valid = 1.0..=f64::from(u32::MAX);
    if !(valid.contains(&width) && valid.contains(&height)) {
        return Err(RenderError::InvalidCanvasSize { width, height });
    }
    Ok(Dimensions {
        width: width as u32,
        height: height as u32,
    })
}

/// A canvas filled with each channel's blank value.
#[must_use]
pub fn blank_canvas(
    dimensions: Dimensions,
    channels: usize,
    sample_type: SampleType,
    metadata: &RasterMetadata,
) -> Raster {
    match sample_type {
        SampleType::U8 => Raster::filled(dimensions, &blank_pixel::<u8>(metadata, channels)),
        SampleType::U16 => Raster::filled(dimensions, &blank_pixel::<u16>(metadata, channels)),
        SampleType::F32 => Raster::filled(dimensions, &blank_pixel::<f32>(metadata, channels)),
    }
}

fn blank_pixel<T: Sample>(metadata: &RasterMetadata, channels: usize) -> Vec<T> {
    (0..channels)
        .map(|c| metadata.channel_role(c).blank())
        .collect()
}

/// Bounding box of a `width × height` rectangle rotated by `rotation`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn expanded_size(width: f64, height: f64, rotation: f64) -> (u32, u32) {
    let (sin, cos) = rotation.to_radians().sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    let w = (height.mul_add(sin, width * cos) - EXPANSION_EPSILON).ceil();
    let h = (height.mul_add(cos, width * sin) - EXPANSION_EPSILON).ceil();
    (w.max(1.0) as u32, h.max(1.0) as u32)
}

/// Scale a raster by `scale` and rotate it clockwise by `rotation`
/// degrees about its center, into a box large enough to hold every
/// corner.
///
/// Sampling is bilinear. Output pixels that map outside the source are
/// set to the blank value of their channel.
#[must_use]
pub fn rotate_expanded(
    raster: &Raster,
    metadata: &RasterMetadata,
    rotation: f64,
    scale: ScaleFactor,
) -> Raster {
    let channels = raster.channels();
    let (samples, dims) = match raster.samples() {
        Samples::U8(v) => warp(raster, v, &blank_pixel(metadata, channels), rotation, scale),
        Samples::U16(v) => warp(raster, v, &blank_pixel(metadata, channels), rotation, scale),
        Samples::F32(v) => warp(raster, v, &blank_pixel(metadata, channels), rotation, scale),
    };
    Raster::from_parts(dims, channels, samples)
}

fn warp<T: Sample>(
    raster: &Raster,
    src: &[T],
    blank: &[T],
    rotation: f64,
    scale: ScaleFactor,
) -> (Samples, Dimensions) {
    let (width, height) = (raster.width(), raster.height());
    let channels = raster.channels();
    let (src_w, src_h) = (f64::from(width), f64::from(height));
    let (out_w, out_h) = expanded_size(src_w * scale.sx, src_h * scale.sy, rotation);
    let half_out = Point::new(f64::from(out_w) / 2.0, f64::from(out_h) / 2.0);

    let mut out = Vec::with_capacity(out_w as usize * out_h as usize * channels);
    let mut px = vec![T::ZERO; channels];
    for oy in 0..out_h {
        for ox in 0..out_w {
            let d = Point::new(f64::from(ox) + 0.5, f64::from(oy) + 0.5) - half_out;
            let local = d.rotated(-rotation);
            let sx = local.x / scale.sx + src_w / 2.0;
            let sy = local.y / scale.sy + src_h / 2.0;
            if sx >= 0.0 && sy >= 0.0 && sx < src_w && sy < src_h {
                bilinear(src, width, height, channels, sx - 0.5, sy - 0.5, &mut px);
                out.extend_from_slice(&px);
            } else {
                out.extend_from_slice(blank);
            }
        }
    }

    (
        T::wrap(out),
        Dimensions {
            width: out_w,
            height: out_h,
        },
    )
}

/// Sample all channels at continuous pixel-center coordinates, clamping
/// neighbors to the raster edge.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bilinear<T: Sample>(
    src: &[T],
    width: u32,
    height: u32,
    channels: usize,
    x: f64,
    y: f64,
    out: &mut [T],
) {
    let (xf, yf) = (x.floor(), y.floor());
    let (fx, fy) = (x - xf, y - yf);
    let clamp = |v: f64, len: u32| v.clamp(0.0, f64::from(len - 1)) as usize;
    let (x0, x1) = (clamp(xf, width), clamp(xf + 1.0, width));
    let (y0, y1) = (clamp(yf, height), clamp(yf + 1.0, height));
    let stride = width as usize;
    for (c, slot) in out.iter_mut().enumerate().take(channels) {
        let at = |x: usize, y: usize| src[(y * stride + x) * channels + c].to_f64();
        let top = at(x0, y0).mul_add(1.0 - fx, at(x1, y0) * fx);
        let bottom = at(x0, y1).mul_add(1.0 - fx, at(x1, y1) * fx);
        *slot = T::from_f64(top.mul_add(1.0 - fy, bottom * fy));
    }
}

/// Re-encode a raster in another sample type through the unit range.
#[must_use]
pub fn convert_samples(raster: &Raster, target: SampleType) -> Raster {
    if raster.sample_type() == target {
        return raster.clone();
    }
    let samples = match raster.samples() {
        Samples::U8(v) => convert_to(v, target),
        Samples::U16(v) => convert_to(v, target),
        Samples::F32(v) => convert_to(v, target),
    };
    Raster::from_parts(raster.dimensions(), raster.channels(), samples)
}

fn convert_to<T: Sample>(src: &[T], target: SampleType) -> Samples {
    fn map<T: Sample, U: Sample>(src: &[T]) -> Samples {
        U::wrap(src.iter().map(|&v| U::from_unit(v.to_unit())).collect())
    }
    match target {
        SampleType::U8 => map::<T, u8>(src),
        SampleType::U16 => map::<T, u16>(src),
        SampleType::F32 => map::<T, f32>(src),
    }
}

/// Merge `tile` into `canvas` with its top-left corner at `origin`
/// (canvas pixels, may be negative).
///
/// The overlap is clipped to the canvas. Tile pixels whose alpha is zero
/// are skipped. When channel counts differ, canvas channels beyond the
/// tile's last channel reuse that last channel and surplus tile channels
/// are ignored. Returns `false` when the tile does not overlap the
/// canvas at all.
pub fn composite(
    canvas: &mut Canvas,
    tile: &Raster,
    tile_alpha: Option<usize>,
    origin: (i64, i64),
) -> bool {
    let converted;
    let tile = if tile.sample_type() == canvas.raster.sample_type() {
        tile
    } else {
        converted = convert_samples(tile, canvas.raster.sample_type());
        &converted
    };

    let Some(region) = overlap(canvas.raster.dimensions(), tile.dimensions(), origin) else {
        return false;
    };
    let roles: Vec<ChannelRole> = (0..canvas.raster.channels())
        .map(|c| canvas.metadata.channel_role(c))
        .collect();
    let layout = Layout {
        canvas_width: canvas.raster.width() as usize,
        tile_width: tile.width() as usize,
        tile_channels: tile.channels(),
        tile_alpha: tile_alpha.filter(|&a| a < tile.channels()),
        origin,
        region,
    };

    match canvas.raster.sample_type() {
        SampleType::U8 => merge_typed::<u8>(canvas, tile, &roles, &layout),
        SampleType::U16 => merge_typed::<u16>(canvas, tile, &roles, &layout),
        SampleType::F32 => merge_typed::<f32>(canvas, tile, &roles, &layout),
    }
    true
}

/// Canvas-space rectangle `[x0, x1) × [y0, y1)` covered by both rasters.
struct Region {
    x0: usize,
    x1: usize,
    y0: usize,
    y1: usize,
}

struct Layout {
    canvas_width: usize,
    tile_width: usize,
    tile_channels: usize,
    tile_alpha: Option<usize>,
    origin: (i64, i64),
    region: Region,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn overlap(canvas: Dimensions, tile: Dimensions, origin: (i64, i64)) -> Option<Region> {
    let x0 = origin.0.max(0);
    let y0 = origin.1.max(0);
    let x1 = (origin.0 + i64::from(tile.width)).min(i64::from(canvas.width));
    let y1 = (origin.1 + i64::from(tile.height)).min(i64::from(canvas.height));
    (x0 < x1 && y0 < y1).then(|| Region {
        x0: x0 as usize,
        x1: x1 as usize,
        y0: y0 as usize,
        y1: y1 as usize,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn merge_typed<T: Sample>(canvas: &mut Canvas, tile: &Raster, roles: &[ChannelRole], layout: &Layout) {
    let canvas_channels = roles.len();
    let (Some(src), Some(dst)) = (tile.as_slice::<T>(), canvas.raster.as_mut_slice::<T>()) else {
        return;
    };
    let last = layout.tile_channels - 1;
    let r = &layout.region;
    for y in r.y0..r.y1 {
        let ty = (y as i64 - layout.origin.1) as usize;
        for x in r.x0..r.x1 {
            let tx = (x as i64 - layout.origin.0) as usize;
            let t = (ty * layout.tile_width + tx) * layout.tile_channels;
            if let Some(a) = layout.tile_alpha
                && src[t + a] <= T::ZERO
            {
                continue;
            }
            let d = (y * layout.canvas_width + x) * canvas_channels;
            for (c, role) in roles.iter().enumerate() {
                dst[d + c] = role.merge(dst[d + c], src[t + c.min(last)]);
            }
        }
    }
}

/// Render every tile onto a canvas covering `workspace` at `dpi`.
///
/// Tiles are drawn in the order given. A tile's scene center is mapped
/// to millimeters through the background scale it was placed with
/// (`tile.mm_per_pixel / tile.scale`) and from there to canvas pixels.
///
/// # Errors
///
/// Fails before allocating the canvas if there are no tiles, a tile has
/// no pixels, the DPI is not positive or the canvas would be empty.
#[allow(clippy::cast_possible_truncation)]
pub fn render<'a, I>(workspace: Workspace, dpi: Resolution, tiles: I) -> Result<RenderOutcome, RenderError>
where
    I: IntoIterator<Item = &'a PlacedTile>,
{
    let tiles: Vec<&PlacedTile> = tiles.into_iter().collect();
    let first = tiles.first().ok_or(RenderError::NoTiles)?;
    if tiles.iter().any(|t| t.source.raster.is_empty()) {
        return Err(RenderError::EmptyTile);
    }
    let canvas_mmpp = dpi_to_mm_per_pixel(dpi)
        .filter(|m| m.x.is_finite() && m.y.is_finite())
        .ok_or(RenderError::InvalidDpi { x: dpi.x, y: dpi.y })?;
    let dimensions = canvas_size(workspace, dpi)?;

    let format = &first.source;
    let metadata = RasterMetadata {
        resolution: Some(dpi),
        ..format.metadata.clone()
    };
    let raster = blank_canvas(
        dimensions,
        format.raster.channels(),
        format.raster.sample_type(),
        &metadata,
    );
    let mut canvas = Canvas { raster, metadata };

    let mut composited = 0;
    let mut skipped = 0;
    for (index, tile) in tiles.iter().enumerate() {
        if !(tile.scale.sx > 0.0 && tile.scale.sy > 0.0) {
            tracing::warn!(index, "skipping tile with non-positive scale");
            skipped += 1;
            continue;
        }
        let scene = tile.scene_center();
        let center = Point::new(
            scene.x * tile.mm_per_pixel.x / (tile.scale.sx * canvas_mmpp.x),
            scene.y * tile.mm_per_pixel.y / (tile.scale.sy * canvas_mmpp.y),
        );
        let k = ScaleFactor::new(
            tile.mm_per_pixel.x / canvas_mmpp.x,
            tile.mm_per_pixel.y / canvas_mmpp.y,
        );
        let raster = &tile.source.raster;
        let (w, h) = expanded_size(
            f64::from(raster.width()) * k.sx,
            f64::from(raster.height()) * k.sy,
            tile.rotation,
        );
        let origin = (
            (center.x - f64::from(w) / 2.0).round() as i64,
            (center.y - f64::from(h) / 2.0).round() as i64,
        );
        let footprint = Dimensions {
            width: w,
            height: h,
        };
        if overlap(dimensions, footprint, origin).is_none() {
            tracing::debug!(index, ?origin, "tile lies outside the canvas");
            skipped += 1;
            continue;
        }

        let warped = rotate_expanded(raster, &tile.source.metadata, tile.rotation, k);
        composite(&mut canvas, &warped, tile.source.metadata.alpha_index, origin);
        composited += 1;
    }

    tracing::info!(
        width = dimensions.width,
        height = dimensions.height,
        channels = canvas.raster.channels(),
        composited,
        skipped,
        "canvas rendered"
    );

    Ok(RenderOutcome {
        canvas,
        composited,
        skipped,
    })
}
