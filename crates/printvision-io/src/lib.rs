//! printvision-io: Filesystem I/O for printvision.
//!
//! Reads background photographs and tiles from disk, writes rendered
//! canvases as TIFF and previews as PNG. All decoding and encoding is
//! delegated to the engine and export crates; this crate only adds the
//! file handling and error context.

pub mod decode;
pub mod store;

pub use decode::{decode_tiff, decode_tile, is_tiff};
pub use store::{FsStore, save_preview_png};

use std::path::PathBuf;

use printvision_engine::EngineError;
use printvision_export::ExportError;

/// Errors from reading or writing rasters on disk.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that was being written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The engine rejected the decoded data.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Malformed TIFF.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The canvas could not be serialized.
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    /// Non-TIFF decode or PNG encode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// A layout the engine cannot hold.
    #[error("unsupported: {0}")]
    Unsupported(String),
}
