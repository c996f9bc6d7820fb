//! Seam between the engine and wherever rasters are kept.
//!
//! The engine only ever sees decoded rasters. Implementations decide how
//! references and tiles are located, decoded and written; a failed load
//! or save must not have touched any session state, which holds as long
//! as callers pass the decoded value into the session only on success.

use crate::compose::Canvas;
use crate::raster::{ReferenceRaster, TileImage};

/// Loads references and tiles, and persists rendered canvases.
pub trait RasterStore {
    /// Location of a stored raster (a path, a key, ...).
    type Location: ?Sized;

    /// Failure to read, decode or write.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load a background photograph.
    ///
    /// # Errors
    ///
    /// Implementation-defined read and decode failures.
    fn load_reference(&self, location: &Self::Location) -> Result<ReferenceRaster, Self::Error>;

    /// Load a tile with its color and resolution metadata.
    ///
    /// # Errors
    ///
    /// Implementation-defined read and decode failures.
    fn load_tile(&self, location: &Self::Location) -> Result<TileImage, Self::Error>;

    /// Write a rendered canvas, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Implementation-defined encode and write failures.
    fn save_canvas(&self, canvas: &Canvas, location: &Self::Location) -> Result<u64, Self::Error>;
}
