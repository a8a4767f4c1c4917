//! Job state machine: runs files one after another on a background worker
//! and reports through a channel of [`JobEvent`]s.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::defaults::ADVISORY_THRESHOLD_BYTES;
use crate::error::{CompressError, Result};
use crate::model::{format_size, CompressionJob, FileResult, JobEvent};
use crate::transcode::{DocumentAssembler, PageRenderer, SourceDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Shared flag that asks a running job to stop at the next file or page
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CompressError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Overall percent after page `page` of `pages` in file `file` of `files`.
///
/// Each file owns an equal slice of 0-100; pages fill at most 95% of that
/// slice so the save step always has room left.
pub fn page_progress(file: usize, files: usize, page: usize, pages: usize) -> u8 {
    let files = files.max(1);
    let pages = pages.max(1);
    let base = file * 100 / files;
    let within = ((page + 1) * 100 / (pages * files)).min(95 / files);
    (base + within).min(100) as u8
}

/// Overall percent once file `file` of `files` is written
pub fn file_progress(file: usize, files: usize) -> u8 {
    ((file + 1) * 100 / files.max(1)).min(100) as u8
}

/// Keeps the progress stream non-decreasing
struct ProgressReporter {
    events: Sender<JobEvent>,
    last: u8,
}

impl ProgressReporter {
    fn report(&mut self, percent: u8) {
        if percent > self.last {
            self.last = percent;
            let _ = self.events.send(JobEvent::progress(percent));
        }
    }
}

/// Runs one [`CompressionJob`] from start to finish
pub struct Orchestrator {
    job: CompressionJob,
    renderer: Box<dyn PageRenderer>,
    events: Sender<JobEvent>,
    progress: ProgressReporter,
    cancel: CancelToken,
    state: JobState,
}

impl Orchestrator {
    pub fn new(
        job: CompressionJob,
        renderer: Box<dyn PageRenderer>,
        events: Sender<JobEvent>,
    ) -> Self {
        Self {
            job,
            renderer,
            progress: ProgressReporter {
                events: events.clone(),
                last: 0,
            },
            events,
            cancel: CancelToken::new(),
            state: JobState::Idle,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Start the job on a named worker thread
    pub fn spawn(job: CompressionJob, renderer: Box<dyn PageRenderer>) -> Result<JobHandle> {
        let (sender, receiver) = unbounded();
        let cancel = CancelToken::new();
        let output_dir = job.output_dir().to_path_buf();
        let orchestrator = Orchestrator::new(job, renderer, sender).with_cancel_token(cancel.clone());

        let thread = thread::Builder::new()
            .name("pdf-compress-worker".to_string())
            .spawn(move || orchestrator.run_to_completion())
            .map_err(|e| CompressError::io(output_dir, e))?;

        Ok(JobHandle {
            events: receiver,
            cancel,
            thread,
        })
    }

    /// Process every input in order and emit exactly one completion event
    pub fn run(mut self) -> JobState {
        self.state = JobState::Running;
        log::info!(
            "Starting job: {} file(s), renderer {}",
            self.job.len(),
            self.renderer.name()
        );

        let outcome = (0..self.job.len()).try_for_each(|index| self.process_file(index));
        match outcome {
            Ok(()) => {
                self.progress.report(100);
                self.state = JobState::Completed;
                let message = format!("All {} file(s) compressed successfully!", self.job.len());
                log::info!("{}", message);
                self.send(JobEvent::completion(true, message));
            }
            Err(e) => {
                self.state = JobState::Failed;
                log::error!("Job failed: {}", e);
                self.send(JobEvent::completion(false, format!("Error: {}", e)));
            }
        }
        self.state
    }

    /// [`run`](Self::run), turning a panic in the pipeline into a failed
    /// completion so listeners still see exactly one terminal event
    pub fn run_to_completion(self) -> JobState {
        let events = self.events.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(state) => state,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                log::error!("Worker panicked: {}", reason);
                let message = format!("Error: internal failure: {}", reason);
                let _ = events.send(JobEvent::completion(false, message));
                JobState::Failed
            }
        }
    }

    fn process_file(&mut self, index: usize) -> Result<()> {
        self.cancel.check()?;

        let total_files = self.job.len();
        let input = self.job.inputs()[index].clone();
        let output = self
            .job
            .output_path(index)
            .map(Path::to_path_buf)
            .ok_or_else(|| CompressError::InvalidJob(format!("no output planned for input {}", index)))?;
        let name = display_name(&input);

        let size = std::fs::metadata(&input)
            .map_err(|e| CompressError::io(&input, e))?
            .len();
        self.log(format!("Processing: {}", name));
        self.log(format!("File size: {}", format_size(size)));
        if size > ADVISORY_THRESHOLD_BYTES {
            self.log("Large file detected, applying large-file compression...");
        }

        let mut source = SourceDocument::open(&input)?;
        self.log(format!("Total pages: {}", source.page_count()));

        let assembler = DocumentAssembler::new(self.job.settings(), self.renderer.as_ref());
        log::debug!("{}: strategy {}", name, assembler.strategy());
        let progress = &mut self.progress;
        let cancel = &self.cancel;
        let report = assembler.assemble(&mut source, |page, pages| {
            progress.report(page_progress(index, total_files, page, pages));
            cancel.check()
        })?;
        log::debug!("{}: {:?}", name, report);

        assembler.write(source, &output)?;

        let written = std::fs::metadata(&output)
            .map_err(|e| CompressError::io(&output, e))?
            .len();
        let result = FileResult::new(size, written);
        for line in result.summary_lines(&name) {
            self.log(line);
        }
        self.progress.report(file_progress(index, total_files));
        Ok(())
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.send(JobEvent::log(message));
    }

    /// Listeners may have gone away; the job still runs to completion
    fn send(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Caller side of a spawned job
pub struct JobHandle {
    events: Receiver<JobEvent>,
    cancel: CancelToken,
    thread: JoinHandle<JobState>,
}

impl JobHandle {
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Ask the job to stop; it fails with a cancellation completion event
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker to finish
    pub fn join(self) -> JobState {
        self.thread.join().unwrap_or(JobState::Failed)
    }
}
