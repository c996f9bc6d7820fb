//! printvision-export: Pure TIFF serializer (sans-IO)
//!
//! Converts a rendered canvas and its inherited metadata into TIFF
//! bytes. Tag selection lives in [`tags`], directory writing in [`encode`].

pub mod encode;
pub mod tags;

pub use encode::{encode_tiff, encode_tiff_with};
pub use tags::{OutputTags, Photometric};

/// Errors that can occur while serializing a canvas.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The raster has no pixels.
    #[error("cannot encode an empty raster")]
    EmptyRaster,

    /// TIFF stores the channel count in 16 bits.
    #[error("{0} channels do not fit a TIFF SamplesPerPixel field")]
    TooManyChannels(usize),

    /// The TIFF encoder rejected the directory or the strip.
    #[error("TIFF encoding failed: {0}")]
    Tiff(#[from] tiff::TiffError),
}
