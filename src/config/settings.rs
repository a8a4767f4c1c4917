use crate::cli::{Args, CompressionLevel};
use crate::error::{CompressError, Result};

use super::defaults::*;

/// Knobs for one compression job
///
/// This is the raw record handed over by the front end. Nothing about its
/// construction guarantees the values are in range, so [`validate`] must run
/// before any output is produced.
///
/// [`validate`]: CompressionSettings::validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionSettings {
    /// JPEG quality 10-95, or 100 to copy pages verbatim
    pub quality: u32,
    /// Rasterization resolution, one of [`DPI_PRESETS`]
    pub dpi: u32,
    /// Longest side of a rasterized page, one of [`MAX_IMAGE_DIMENSION_PRESETS`]
    pub max_image_dimension: u32,
    pub compression_level: CompressionLevel,
    pub remove_images: bool,
    pub remove_annotations: bool,
    pub compress_fonts: bool,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            dpi: DEFAULT_DPI,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            compression_level: CompressionLevel::default(),
            remove_images: false,
            remove_annotations: false,
            compress_fonts: true,
        }
    }
}

impl CompressionSettings {
    /// Create settings from CLI arguments
    pub fn from_args(args: &Args) -> Self {
        Self {
            quality: args.quality,
            dpi: args.dpi,
            max_image_dimension: args.max_image_size,
            compression_level: args.level,
            remove_images: args.remove_images,
            remove_annotations: args.remove_annotations,
            compress_fonts: args.compress_fonts(),
        }
    }

    /// Reject any field outside its enumerated domain
    pub fn validate(&self) -> Result<()> {
        let quality_ok =
            (MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) || self.quality == LOSSLESS_QUALITY;
        if !quality_ok {
            return Err(CompressError::InvalidSettings(format!(
                "quality {} is outside {}-{} (or {} for lossless)",
                self.quality, MIN_QUALITY, MAX_QUALITY, LOSSLESS_QUALITY
            )));
        }

        if !DPI_PRESETS.contains(&self.dpi) {
            return Err(CompressError::InvalidSettings(format!(
                "dpi {} is not one of {:?}",
                self.dpi, DPI_PRESETS
            )));
        }

        if !MAX_IMAGE_DIMENSION_PRESETS.contains(&self.max_image_dimension) {
            return Err(CompressError::InvalidSettings(format!(
                "max image dimension {} is not one of {:?}",
                self.max_image_dimension, MAX_IMAGE_DIMENSION_PRESETS
            )));
        }

        Ok(())
    }

    /// Base scale from user space to device pixels
    pub fn dpi_scale(&self) -> f32 {
        self.dpi as f32 / POINTS_PER_INCH
    }
}
