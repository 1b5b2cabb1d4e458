//! Error types for shard fetching and pipeline runs

use crate::stream::StreamError;

/// Error from fetching and decoding a single shard.
#[derive(Debug)]
pub enum FetchError {
    /// Connection-level failure; the same shard may be retried
    Transient(StreamError),
    /// Provider rejection or corrupt data; the shard is dropped
    Fatal(StreamError),
    /// The run was cancelled while the shard was being read
    Cancelled,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "transient: {e}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transient(e) | Self::Fatal(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

impl From<StreamError> for FetchError {
    fn from(e: StreamError) -> Self {
        if e.is_transient() {
            Self::Transient(e)
        } else {
            Self::Fatal(e)
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Io(e).into()
    }
}

/// Error that fails a whole pipeline run.
#[derive(Debug)]
pub enum PipelineError {
    /// Output file could not be opened or the header could not be written
    Open(std::io::Error),
    /// A worker or writer thread could not be started
    Spawn(std::io::Error),
    /// Writing a row failed; the output file is incomplete
    Write(std::io::Error),
    /// The writer thread panicked
    WriterPanicked,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "cannot open output: {e}"),
            Self::Spawn(e) => write!(f, "cannot spawn thread: {e}"),
            Self::Write(e) => write!(f, "row write failed: {e}"),
            Self::WriterPanicked => f.write_str("row writer panicked"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(e) | Self::Spawn(e) | Self::Write(e) => Some(e),
            Self::WriterPanicked => None,
        }
    }
}
