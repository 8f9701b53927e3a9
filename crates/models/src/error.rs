use thiserror::Error;

use crate::cursor::StreamCursor;

/// A cursor token that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid cursor token: {0}")]
pub struct CursorParseError(pub String);

/// Failures a stream source can report from one fetch.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Stream transport unreachable: {0}")]
    Connection(String),

    #[error("Cursor {cursor} no longer available, stream was trimmed")]
    InvalidCursor {
        cursor: StreamCursor,
        /// Oldest position still held by the source, when known.
        earliest: Option<StreamCursor>,
    },
}

impl SourceError {
    pub fn connection(err: impl std::fmt::Display) -> Self {
        SourceError::Connection(err.to_string())
    }
}

/// Failures from cursor persistence. Best-effort: a failed save is
/// reported but never blocks delivery.
#[derive(Error, Debug)]
pub enum CursorError {
    #[error("Checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint backend error: {0}")]
    Backend(String),

    #[error("Stored cursor is corrupt: {0}")]
    Corrupt(#[from] CursorParseError),
}

/// Fatal consumer errors. Everything else is retried in place.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to load saved cursor: {0}")]
    CursorLoad(#[from] CursorError),
}
