use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::defaults::{
    DEFAULT_DPI, DEFAULT_MAX_IMAGE_DIMENSION, DEFAULT_QUALITY,
};

#[derive(Parser, Debug)]
#[command(name = "pdf-compress")]
#[command(
    author,
    version,
    about = "Shrink PDF files by recompressing page imagery and compacting the document container"
)]
pub struct Args {
    /// Input PDF files, processed in the order given
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory that receives the `<name>_compressed.pdf` outputs
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// JPEG quality for rasterized pages (10-95), or 100 to keep page content as-is
    #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
    pub quality: u32,

    /// Rasterization resolution (72, 96, 150, 200 or 300)
    #[arg(short, long, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// Longest side of a rasterized page in pixels (800, 1200, 1600, 2000 or 2800)
    #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_IMAGE_DIMENSION)]
    pub max_image_size: u32,

    /// Container compaction level
    #[arg(short = 'l', long, value_enum, default_value = "high")]
    pub level: CompressionLevel,

    /// Drop all imagery and keep only the text of each page
    #[arg(long)]
    pub remove_images: bool,

    /// Delete every annotation from the output
    #[arg(long)]
    pub remove_annotations: bool,

    /// Leave embedded font programs uncompressed (ignored at max level)
    #[arg(long)]
    pub no_compress_fonts: bool,

    /// Page rasterizer backend
    #[arg(short = 'r', long, value_enum, default_value = "auto")]
    pub renderer: RendererKind,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// How hard the document container is compacted on save
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, ValueEnum, Default)]
pub enum CompressionLevel {
    /// Smallest output: aggressive object removal, object streams, linearized
    Max,
    /// Recommended balance of size and write time
    #[default]
    High,
    /// Fastest save with light compaction
    Normal,
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CompressionLevel::Max => "max",
            CompressionLevel::High => "high",
            CompressionLevel::Normal => "normal",
        };
        f.write_str(name)
    }
}

/// Page rasterizer selection
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum RendererKind {
    /// pdfium when it can be loaded, otherwise the builtin renderer
    #[default]
    Auto,
    /// Pure-Rust compositor of the images placed on each page; refuses pages
    /// with visible text or vector art
    Builtin,
    /// libpdfium, when built with the `pdfium` feature
    Pdfium,
}

impl Args {
    /// Check if embedded fonts should be deflated
    pub fn compress_fonts(&self) -> bool {
        !self.no_compress_fonts
    }
}
