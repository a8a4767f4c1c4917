/// Size comparison for one transcoded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileResult {
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
}

impl FileResult {
    pub fn new(original_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        Self {
            original_size_bytes,
            compressed_size_bytes,
        }
    }

    /// Percentage saved; negative when the output grew
    pub fn reduction_percent(&self) -> f64 {
        if self.original_size_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size_bytes as f64 / self.original_size_bytes as f64) * 100.0
    }

    /// Summary lines emitted once a file is written
    pub fn summary_lines(&self, file_name: &str) -> Vec<String> {
        vec![
            format!("\u{2713} Completed: {}", file_name),
            format!("  Original size: {}", format_size(self.original_size_bytes)),
            format!("  Compressed size: {}", format_size(self.compressed_size_bytes)),
            format!("  Size reduction: {:.1}%", self.reduction_percent()),
            "-".repeat(60),
        ]
    }
}

/// Render a byte count with one decimal in 1024-based units
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}
