//! Per-archive error kinds

use crate::stream::StreamError;

/// Why a single archive did not reach completion.
///
/// None of these stop the overall run; the orchestrator counts them and
/// moves on to the next archive.
#[derive(Debug)]
pub enum ArchiveError {
    /// Listing, metadata probe or download failed
    Network(StreamError),
    /// Payload could not be decoded (bad gzip, truncated stream, bad path)
    Format(String),
    /// Too many consecutive malformed WARC records
    Framing { consecutive: u32 },
    /// The corpus output rejected a write
    Write(std::io::Error),
    /// Local I/O failure outside the output sink
    Io(std::io::Error),
    /// Stopped early because shutdown was requested
    Cancelled,
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Format(msg) => write!(f, "format: {msg}"),
            Self::Framing { consecutive } => {
                write!(f, "framing: {consecutive} consecutive malformed records")
            }
            Self::Write(e) => write!(f, "write: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            Self::Write(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StreamError> for ArchiveError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Cancelled => Self::Cancelled,
            other => Self::Network(other),
        }
    }
}

impl ArchiveError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label for summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Format(_) => "format",
            Self::Framing { .. } => "framing",
            Self::Write(_) => "write",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
        }
    }
}
