use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("md5 sums do not match: {}", files.join(", "))]
    ChecksumMismatch { files: Vec<String> },

    #[error("not compressed and not a recognised read file extension: {0}")]
    UnsupportedFormat(String),

    #[error("no read files attached")]
    NoFilesProvided,

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("datastore error: {0}")]
    Persistence(String),

    #[error("unknown upload field: {0}")]
    UnknownField(String),

    #[error("invalid upload field: {0}")]
    InvalidField(String),

    #[error("duplicate upload field: {0}")]
    DuplicateField(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("quality report failed: {0}")]
    QcFailed(String),
}

/// An ingestion error together with whatever went wrong while cleaning up
/// after it. The originating error always wins on display.
#[derive(Debug)]
pub struct IngestFailure {
    error: IngestError,
    cleanup: Option<IngestError>,
}

impl IngestFailure {
    pub fn new(error: IngestError, cleanup: Option<IngestError>) -> Self {
        Self { error, cleanup }
    }

    pub fn error(&self) -> &IngestError {
        &self.error
    }

    pub fn cleanup(&self) -> Option<&IngestError> {
        self.cleanup.as_ref()
    }

    pub fn into_error(self) -> IngestError {
        self.error
    }
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(cleanup) = &self.cleanup {
            write!(f, " (cleanup also failed: {cleanup})")?;
        }
        Ok(())
    }
}

impl std::error::Error for IngestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl Diagnostic for IngestFailure {}

impl From<IngestError> for IngestFailure {
    fn from(error: IngestError) -> Self {
        Self::new(error, None)
    }
}
