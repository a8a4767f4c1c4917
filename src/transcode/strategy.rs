use crate::config::defaults::LOSSLESS_QUALITY;
use crate::config::CompressionSettings;

/// How a page's content is carried into the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    /// Keep the content stream and resources untouched
    VerbatimCopy,
    /// Render the page and replace it with one JPEG
    RasterRecompress,
    /// Keep only the positioned text runs
    TextOnlyExtract,
}

impl PageStrategy {
    /// Pick the strategy for every page of a job; the first matching rule wins
    pub fn select(settings: &CompressionSettings) -> Self {
        if settings.remove_images {
            PageStrategy::TextOnlyExtract
        } else if settings.quality < LOSSLESS_QUALITY {
            PageStrategy::RasterRecompress
        } else {
            PageStrategy::VerbatimCopy
        }
    }
}

impl std::fmt::Display for PageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageStrategy::VerbatimCopy => "verbatim copy",
            PageStrategy::RasterRecompress => "raster recompress",
            PageStrategy::TextOnlyExtract => "text only",
        };
        f.write_str(name)
    }
}
