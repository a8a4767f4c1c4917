pub mod events;
pub mod job;
pub mod stats;

pub use events::{CompletionEvent, JobEvent, LogEvent, ProgressEvent};
pub use job::{output_paths, CompressionJob};
pub use stats::{format_size, FileResult};
