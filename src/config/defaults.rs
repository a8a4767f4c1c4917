/// Default JPEG quality for rasterized pages
pub const DEFAULT_QUALITY: u32 = 50;

/// Quality value that keeps page content untouched instead of rasterizing
pub const LOSSLESS_QUALITY: u32 = 100;

/// Lowest accepted lossy quality
pub const MIN_QUALITY: u32 = 10;

/// Highest accepted lossy quality
pub const MAX_QUALITY: u32 = 95;

/// Default rasterization resolution in dots per inch
pub const DEFAULT_DPI: u32 = 96;

/// Accepted rasterization resolutions
pub const DPI_PRESETS: [u32; 5] = [72, 96, 150, 200, 300];

/// Default longest side of a rasterized page in pixels
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1600;

/// Accepted longest-side limits in pixels
pub const MAX_IMAGE_DIMENSION_PRESETS: [u32; 5] = [800, 1200, 1600, 2000, 2800];

/// PDF user space units per inch
pub const POINTS_PER_INCH: f32 = 72.0;

/// Sources above this size get their render matrix pre-shrunk (30 MB)
pub const PRESHRINK_THRESHOLD_BYTES: u64 = 30 * 1024 * 1024;

/// Sources above this size get an advisory log line (50 MB)
pub const ADVISORY_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;

/// Suffix appended to the input base name for the output file
pub const OUTPUT_SUFFIX: &str = "_compressed";

/// Extension of every output file
pub const OUTPUT_EXTENSION: &str = "pdf";
