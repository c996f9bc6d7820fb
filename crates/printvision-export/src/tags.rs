//! Which TIFF tags a rendered canvas is written with.
//!
//! The policy follows the canvas metadata inherited from the first
//! tile: the photometric interpretation comes from the color model, an
//! alpha channel is tagged as unassociated alpha only when it is still
//! the last channel after compositing, and separated output declares
//! its inks when every channel has a name.

use printvision_engine::{Canvas, ColorModel, Resolution};

/// `ExtraSamples` value for unspecified data.
pub const EXTRA_UNSPECIFIED: u16 = 0;
/// `ExtraSamples` value for unassociated alpha.
pub const EXTRA_UNASSOCIATED_ALPHA: u16 = 2;
/// `InkSet` value for CMYK inks.
pub const INK_SET_CMYK: u16 = 1;

/// TIFF photometric interpretation of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    /// Single gray channel, zero is black.
    MinIsBlack,
    /// Red, green, blue.
    Rgb,
    /// Ink separations.
    Separated,
}

impl Photometric {
    /// Color channels the interpretation itself accounts for, before any
    /// extra samples.
    #[must_use]
    pub const fn base_channels(self, channels: usize, has_alpha: bool) -> usize {
        match self {
            Self::MinIsBlack => 1,
            Self::Rgb => 3,
            Self::Separated => {
                if has_alpha {
                    channels.saturating_sub(1)
                } else {
                    channels
                }
            }
        }
    }
}

/// Tags derived from a canvas's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTags {
    /// Photometric interpretation.
    pub photometric: Photometric,
    /// Resolution in dots per inch, when known.
    pub resolution: Option<Resolution>,
    /// One entry per channel beyond the photometric's own.
    pub extra_samples: Vec<u16>,
    /// `NumberOfInks`, for fully named separated output.
    pub number_of_inks: Option<u16>,
    /// `InkSet`, written with `number_of_inks`.
    pub ink_set: Option<u16>,
    /// Ink names with any alpha entry removed.
    pub ink_names: Option<Vec<String>>,
    /// Embedded ICC profile.
    pub icc_profile: Option<Vec<u8>>,
}

impl OutputTags {
    /// Derive the output tags for `canvas`.
    #[must_use]
    pub fn from_canvas(canvas: &Canvas) -> Self {
        let meta = &canvas.metadata;
        let channels = canvas.raster.channels();

        let photometric = match meta.color_model {
            ColorModel::Rgb if channels >= 3 => Photometric::Rgb,
            ColorModel::Rgb | ColorModel::Gray => Photometric::MinIsBlack,
            ColorModel::Separated => Photometric::Separated,
        };

        let alpha = meta.alpha_index.filter(|&a| a + 1 == channels);
        let base = photometric.base_channels(channels, alpha.is_some()).min(channels);
        let mut extra_samples = vec![EXTRA_UNSPECIFIED; channels - base];
        if alpha.is_some()
            && let Some(last) = extra_samples.last_mut()
        {
            *last = EXTRA_UNASSOCIATED_ALPHA;
        }

        let mut ink_names = meta.ink_names.clone();
        let mut number_of_inks = None;
        let mut ink_set = None;
        if let Some(a) = alpha {
            if let Some(names) = ink_names.as_mut()
                && a < names.len()
            {
                names.remove(a);
            }
        } else if photometric == Photometric::Separated
            && ink_names.as_ref().is_some_and(|n| n.len() == channels)
        {
            number_of_inks = u16::try_from(channels).ok();
            ink_set = number_of_inks.map(|_| INK_SET_CMYK);
        }

        Self {
            photometric,
            resolution: meta.resolution,
            extra_samples,
            number_of_inks,
            ink_set,
            ink_names,
            icc_profile: meta.icc_profile.clone(),
        }
    }
}

/// Ink names as one NUL-separated, NUL-terminated payload.
#[must_use]
pub fn ink_names_payload(names: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use printvision_engine::{Raster, RasterMetadata};

    use super::*;

    fn canvas(channels: usize, metadata: RasterMetadata) -> Canvas {
        Canvas {
            raster: Raster::from_vec::<u8>(2, 2, channels, vec![0; 4 * channels]).unwrap(),
            metadata,
        }
    }

    fn names(list: &[&str]) -> Option<Vec<String>> {
        Some(list.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn named_cmyk_declares_inks() {
        let tags = OutputTags::from_canvas(&canvas(
            4,
            RasterMetadata {
                color_model: ColorModel::Separated,
                resolution: Some(Resolution::uniform(300.0)),
                ink_names: names(&["Cyan", "Magenta", "Yellow", "Black"]),
                ..RasterMetadata::default()
            },
        ));
        assert_eq!(tags.photometric, Photometric::Separated);
        assert!(tags.extra_samples.is_empty());
        assert_eq!(tags.number_of_inks, Some(4));
        assert_eq!(tags.ink_set, Some(INK_SET_CMYK));
        assert_eq!(tags.resolution, Some(Resolution::uniform(300.0)));
    }

    #[test]
    fn surviving_alpha_is_tagged_and_unnamed() {
        let tags = OutputTags::from_canvas(&canvas(
            5,
            RasterMetadata {
                color_model: ColorModel::Separated,
                alpha_index: Some(4),
                ink_names: names(&["Cyan", "Magenta", "Yellow", "Black", "Alpha"]),
                ..RasterMetadata::default()
            },
        ));
        assert_eq!(tags.extra_samples, vec![EXTRA_UNASSOCIATED_ALPHA]);
        assert_eq!(tags.number_of_inks, None);
        assert_eq!(tags.ink_names.unwrap().len(), 4);
    }

    #[test]
    fn alpha_not_last_is_treated_as_ink() {
        let tags = OutputTags::from_canvas(&canvas(
            4,
            RasterMetadata {
                color_model: ColorModel::Separated,
                alpha_index: Some(4),
                ..RasterMetadata::default()
            },
        ));
        assert!(tags.extra_samples.is_empty());
        assert_eq!(tags.number_of_inks, None);
    }

    #[test]
    fn partial_ink_names_skip_ink_count() {
        let tags = OutputTags::from_canvas(&canvas(
            5,
            RasterMetadata {
                color_model: ColorModel::Separated,
                ink_names: names(&["Cyan", "Magenta", "Yellow", "Black"]),
                ..RasterMetadata::default()
            },
        ));
        assert_eq!(tags.number_of_inks, None);
        assert_eq!(tags.ink_set, None);
    }

    #[test]
    fn rgba_has_one_alpha_extra_sample() {
        let tags = OutputTags::from_canvas(&canvas(
            4,
            RasterMetadata {
                alpha_index: Some(3),
                ..RasterMetadata::default()
            },
        ));
        assert_eq!(tags.photometric, Photometric::Rgb);
        assert_eq!(tags.extra_samples, vec![EXTRA_UNASSOCIATED_ALPHA]);
    }

    #[test]
    fn gray_with_unknown_extra_channel() {
        let tags = OutputTags::from_canvas(&canvas(
            2,
            RasterMetadata {
                color_model: ColorModel::Gray,
                ..RasterMetadata::default()
            },
        ));
        assert_eq!(tags.photometric, Photometric::MinIsBlack);
        assert_eq!(tags.extra_samples, vec![EXTRA_UNSPECIFIED]);
    }

    #[test]
    fn ink_names_are_nul_terminated() {
        let payload = ink_names_payload(&["Cyan".to_string(), "Spot".to_string()]);
        assert_eq!(payload, b"Cyan\0Spot\0");
    }
}
