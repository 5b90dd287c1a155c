use std::path::PathBuf;

use thiserror::Error;

use crate::header::HeaderError;

/// Errors raised by timeline writers and readers.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Timeline header is invalid or names another container kind.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// Failed to open or create a timeline file.
    #[error("Failed to open {path}: {source}")]
    Open {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to move a finished timeline into place.
    #[error("Failed to persist {path}: {source}")]
    Persist {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Stream-level I/O failure.
    #[error("Timeline I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The writer was already closed.
    #[error("Timeline writer is closed")]
    ClosedTimeline,
    /// A datagram was fed at a rate other than the timeline's.
    #[error("Timeline runs at {expected} Hz, datagram was fed at {found} Hz")]
    SampleRateMismatch {
        /// Timeline sample rate.
        expected: u32,
        /// Rate given by the producer.
        found: u32,
    },
    /// Sample rates must be positive and fit in `i32`.
    #[error("Invalid sample rate {0}")]
    InvalidSampleRate(i64),
    /// Frame skip hint must be finite and non-negative.
    #[error("Invalid frame skip {0} s")]
    InvalidFrameSkip(f64),
    /// Processing header keys and values must be single-line text.
    #[error("Invalid processing header entry: {0}")]
    InvalidProcessingHeader(String),
    /// Datagram payload does not fit behind a `u32` length prefix.
    #[error("Datagram payload of {0} bytes is too large")]
    PayloadTooLarge(usize),
    /// Cumulative time or byte offset no longer fits in `i64`.
    #[error("Timeline {0} overflows 64-bit storage")]
    Overflow(&'static str),
    /// Index and data region disagree; the file is unusable.
    #[error("Corrupt timeline: {0}")]
    CorruptTimeline(String),
    /// A time lookup lies beyond the end of the timeline.
    #[error("Time {time} is beyond the timeline end {total} (timeline samples)")]
    OutOfRange {
        /// Requested time in timeline samples.
        time: u64,
        /// Total timeline duration in samples.
        total: u64,
    },
    /// A datagram position is outside the index.
    #[error("Datagram {index} out of range (0..{count})")]
    DatagramIndexOutOfRange {
        /// Requested position.
        index: usize,
        /// Number of datagrams.
        count: usize,
    },
    /// No datagram starts at the given data-region offset.
    #[error("No datagram starts at byte offset {0}")]
    NoDatagramAtOffset(u64),
}
