use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their specific errors into this type. Collaborator
/// failures that the dispatcher must degrade gracefully have their own types
/// below so the caller can tell them apart in logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Contact store write failure.
///
/// Filesystem unavailable, permission denied and disk full all collapse into
/// this single kind; the message keeps the underlying cause for operators.
#[derive(Debug, thiserror::Error)]
#[error("contact store write failed: {0}")]
pub struct StoreError(pub String);

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

/// Document conversion failure.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("converter binary not found: {0}")]
    BinaryNotFound(String),

    #[error("converter exited with status {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    #[error("converter timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("converter produced no output (or an empty file)")]
    OutputMissing,

    #[error("converter output is not a valid workbook: {0}")]
    CorruptOutput(String),

    #[error("conversion i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Stable label for operational logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::BinaryNotFound(_) => "binary_not_found",
            ConversionError::NonZeroExit { .. } => "nonzero_exit",
            ConversionError::Timeout { .. } => "timeout",
            ConversionError::OutputMissing => "output_missing",
            ConversionError::CorruptOutput(_) => "corrupt_output",
            ConversionError::Io(_) => "io",
        }
    }
}

/// Failure fetching an uploaded file from the messaging platform.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("file is too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("file download failed: {0}")]
    External(String),
}
