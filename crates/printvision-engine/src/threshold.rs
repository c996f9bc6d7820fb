//! Automatic binarization of the scan-table background.
//!
//! Otsu's method picks the threshold; the mask is then inverted when
//! needed so that objects, assumed to be the minority class, end up
//! white.

use image::GrayImage;

/// A binary mask (0 or 255) plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binarized {
    /// Foreground pixels are 255, background pixels are 0.
    pub mask: GrayImage,
    /// Threshold chosen by Otsu's method.
    pub level: u8,
    /// Whether the thresholded image was inverted.
    pub inverted: bool,
}

/// Threshold `gray` at its Otsu level, then invert if white pixels
/// outnumber black ones.
///
/// Pixels strictly above the level become 255.
#[must_use = "returns the binary mask"]
pub fn otsu_binarize(gray: &GrayImage) -> Binarized {
    if gray.width() == 0 || gray.height() == 0 {
        return Binarized {
            mask: gray.clone(),
            level: 0,
            inverted: false,
        };
    }

    let level = imageproc::contrast::otsu_level(gray);
    let mut mask = GrayImage::new(gray.width(), gray.height());
    let mut white = 0usize;
    for (dst, src) in mask.pixels_mut().zip(gray.pixels()) {
        if src.0[0] > level {
            dst.0[0] = 255;
            white += 1;
        }
    }

    let black = gray.len() - white;
    let inverted = white > black;
    if inverted {
        for px in mask.pixels_mut() {
            px.0[0] = 255 - px.0[0];
        }
    }

    Binarized {
        mask,
        level,
        inverted,
    }
}
