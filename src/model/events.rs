//! Typed events pushed from a running job to whoever is listening.

/// Overall job progress, 0-100, non-decreasing within one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
}

/// Free-form status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub message: String,
}

/// Terminal event; exactly one is sent per job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Progress(ProgressEvent),
    Log(LogEvent),
    Completion(CompletionEvent),
}

impl JobEvent {
    pub fn progress(percent: u8) -> Self {
        JobEvent::Progress(ProgressEvent {
            percent: percent.min(100),
        })
    }

    pub fn log(message: impl Into<String>) -> Self {
        JobEvent::Log(LogEvent {
            message: message.into(),
        })
    }

    pub fn completion(success: bool, message: impl Into<String>) -> Self {
        JobEvent::Completion(CompletionEvent {
            success,
            message: message.into(),
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completion(_))
    }
}
