//! [`RasterStore`] backed by the local filesystem.

use std::fs;
use std::path::Path;

use image::RgbImage;
use printvision_engine::grayscale::decode_reference;
use printvision_engine::{Canvas, RasterStore, ReferenceRaster, TileImage};

use crate::IoError;
use crate::decode::decode_tile;

/// Reads and writes rasters as plain files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
    fn read(path: &Path) -> Result<Vec<u8>, IoError> {
        fs::read(path).map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
        fs::write(path, bytes).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl RasterStore for FsStore {
    type Location = Path;
    type Error = IoError;

    fn load_reference(&self, location: &Path) -> Result<ReferenceRaster, IoError> {
        let bytes = Self::read(location)?;
        let reference = decode_reference(&bytes)?;
        tracing::info!(
            path = %location.display(),
            width = reference.dimensions().width,
            height = reference.dimensions().height,
            "loaded background"
        );
        Ok(reference)
    }

    fn load_tile(&self, location: &Path) -> Result<TileImage, IoError> {
        let bytes = Self::read(location)?;
        let tile = decode_tile(&bytes)?;
        if tile.metadata.resolution.is_none() {
            tracing::warn!(path = %location.display(), "tile carries no resolution");
        }
        tracing::info!(
            path = %location.display(),
            width = tile.raster.width(),
            height = tile.raster.height(),
            channels = tile.raster.channels(),
            "loaded tile"
        );
        Ok(tile)
    }

    fn save_canvas(&self, canvas: &Canvas, location: &Path) -> Result<u64, IoError> {
        let bytes = printvision_export::encode_tiff(canvas)?;
        Self::write(location, &bytes)?;
        tracing::info!(path = %location.display(), bytes = bytes.len(), "wrote canvas");
        Ok(bytes.len() as u64)
    }
}

/// Write an RGB preview as PNG.
///
/// # Errors
///
/// Returns [`IoError::Image`] if encoding fails and [`IoError::Write`]
/// if the file cannot be written.
pub fn save_preview_png(image: &RgbImage, path: &Path) -> Result<(), IoError> {
    let mut bytes = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    FsStore::write(path, &bytes)
}
