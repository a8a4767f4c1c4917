pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod pdf;
pub mod transcode;

pub use cli::{CompressionLevel, RendererKind};
pub use config::CompressionSettings;
pub use error::{CompressError, ErrorKind};
pub use model::{CompressionJob, FileResult, JobEvent};
pub use orchestrator::{CancelToken, JobHandle, JobState, Orchestrator};
pub use transcode::{
    select_renderer, PageRenderer, PageStrategy, RenderSession, SaveProfile, XObjectRenderer,
};

/// Compress `inputs` into `output_dir` on the calling thread.
///
/// This is the simplest entry point for library consumers: it validates the
/// job, runs it with the best available rasterizer (pdfium when it can be
/// loaded, the builtin one otherwise), and returns every event the job
/// produced, ending with its completion event.
///
/// # Example
///
/// ```no_run
/// use pdf_compress::{compress_files, CompressionSettings, JobEvent};
///
/// let events = compress_files(
///     vec!["scan.pdf".into()],
///     "out",
///     CompressionSettings::default(),
/// )
/// .unwrap();
///
/// if let Some(JobEvent::Completion(done)) = events.last() {
///     println!("{}", done.message);
/// }
/// ```
pub fn compress_files(
    inputs: Vec<std::path::PathBuf>,
    output_dir: impl Into<std::path::PathBuf>,
    settings: CompressionSettings,
) -> Result<Vec<JobEvent>, CompressError> {
    let job = CompressionJob::new(inputs, output_dir, settings)?;
    let renderer = select_renderer(RendererKind::Auto)?;
    let (sender, receiver) = crossbeam_channel::unbounded();
    Orchestrator::new(job, renderer, sender).run_to_completion();
    Ok(receiver.try_iter().collect())
}
