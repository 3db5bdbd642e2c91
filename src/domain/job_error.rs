use std::fmt;
use std::str::FromStr;

/// Structured failure reason recorded on a terminal `FAILED` job.
///
/// The kind tells an operator what to do next: fix the schema
/// (`MalformedSchema`), check the external record system (`SyncFailed`), or
/// simply resubmit (the retryable extraction kinds, which only reach a
/// terminal job once the attempt limit is exhausted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobErrorKind {
    ExtractionTimeout,
    BackendUnavailable,
    MalformedSchema,
    SyncFailed,
}

impl JobErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobErrorKind::ExtractionTimeout => "extraction_timeout",
            JobErrorKind::BackendUnavailable => "backend_unavailable",
            JobErrorKind::MalformedSchema => "malformed_schema",
            JobErrorKind::SyncFailed => "sync_failed",
        }
    }
}

impl FromStr for JobErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extraction_timeout" => Ok(JobErrorKind::ExtractionTimeout),
            "backend_unavailable" => Ok(JobErrorKind::BackendUnavailable),
            "malformed_schema" => Ok(JobErrorKind::MalformedSchema),
            "sync_failed" => Ok(JobErrorKind::SyncFailed),
            _ => Err(format!("Invalid job error kind: {}", s)),
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
