//! Sequential timeline construction.
//!
//! Payloads are spooled to an anonymous temporary file while the index grows in
//! memory. [`TimelineWriter::close`] writes header, index and spooled data into a
//! temporary file next to the destination and persists it in one rename.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use tracing::{debug, info, warn};

use super::datagram::Datagram;
use super::error::TimelineError;
use super::index::TimelineIndex;
use super::processing_header::ProcessingHeader;
use crate::header::{FileKind, TimelineKind, write_header};

/// Outcome of a successful [`TimelineWriter::close`].
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineSummary {
    pub path: PathBuf,
    pub kind: TimelineKind,
    pub sample_rate: u32,
    pub num_datagrams: usize,
    /// Total duration in samples.
    pub total_duration: u64,
    /// Bytes in the data region.
    pub data_len: u64,
}

enum WriterState {
    Feeding { spool: BufWriter<File> },
    Closed,
}

/// Append-only timeline writer for one output file.
pub struct TimelineWriter {
    path: PathBuf,
    kind: TimelineKind,
    sample_rate: u32,
    frame_skip_seconds: f64,
    processing: ProcessingHeader,
    index: TimelineIndex,
    state: WriterState,
}

impl TimelineWriter {
    /// Start a timeline that will be written to `path` on close.
    pub fn create(
        path: &Path,
        kind: TimelineKind,
        sample_rate: u32,
        frame_skip_seconds: f64,
        processing: ProcessingHeader,
    ) -> Result<Self, TimelineError> {
        if sample_rate == 0 || i32::try_from(sample_rate).is_err() {
            return Err(TimelineError::InvalidSampleRate(i64::from(sample_rate)));
        }
        if !frame_skip_seconds.is_finite() || frame_skip_seconds < 0.0 {
            return Err(TimelineError::InvalidFrameSkip(frame_skip_seconds));
        }
        let spool = tempfile::tempfile().map_err(|source| TimelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            "Feeding {kind:?} timeline at {sample_rate} Hz into {}",
            path.display()
        );
        Ok(TimelineWriter {
            path: path.to_path_buf(),
            kind,
            sample_rate,
            frame_skip_seconds,
            processing,
            index: TimelineIndex::new(),
            state: WriterState::Feeding {
                spool: BufWriter::new(spool),
            },
        })
    }

    /// Append one datagram recorded at `sample_rate`.
    ///
    /// A failed spool write closes the writer, since the spool may hold a partial record.
    pub fn feed(&mut self, datagram: &Datagram, sample_rate: u32) -> Result<(), TimelineError> {
        let WriterState::Feeding { spool } = &mut self.state else {
            return Err(TimelineError::ClosedTimeline);
        };
        if sample_rate != self.sample_rate {
            return Err(TimelineError::SampleRateMismatch {
                expected: self.sample_rate,
                found: sample_rate,
            });
        }
        let len = datagram.check_len()?;
        self.index.push(datagram.duration(), datagram.encoded_len())?;
        if let Err(err) = datagram.write_record(spool, len) {
            self.index.pop();
            self.state = WriterState::Closed;
            warn!(
                "Spool write failed for {}; writer closed: {err}",
                self.path.display()
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Append every datagram of `datagrams` in order.
    pub fn feed_all<'a, I>(&mut self, datagrams: I, sample_rate: u32) -> Result<(), TimelineError>
    where
        I: IntoIterator<Item = &'a Datagram>,
    {
        for datagram in datagrams {
            self.feed(datagram, sample_rate)?;
        }
        Ok(())
    }

    /// Index built so far.
    pub fn index(&self) -> &TimelineIndex {
        &self.index
    }

    pub fn num_datagrams(&self) -> usize {
        self.index.len()
    }

    /// Cumulative duration fed so far, in samples.
    pub fn total_duration(&self) -> u64 {
        self.index.total_duration()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WriterState::Closed)
    }

    /// Write the finished timeline to its destination.
    ///
    /// The writer is closed afterwards even if writing fails.
    pub fn close(&mut self) -> Result<TimelineSummary, TimelineError> {
        let WriterState::Feeding { spool } = std::mem::replace(&mut self.state, WriterState::Closed)
        else {
            return Err(TimelineError::ClosedTimeline);
        };
        let mut spool = spool
            .into_inner()
            .map_err(|err| TimelineError::Io(err.into_error()))?;
        spool.seek(SeekFrom::Start(0))?;

        let mut temp = create_tempfile(&self.path)?;
        {
            let mut out = BufWriter::new(temp.as_file_mut());
            write_header(&mut out, FileKind::Timeline(self.kind))?;
            self.processing.write_to(&mut out)?;
            out.write_i32::<BigEndian>(self.sample_rate as i32)?;
            out.write_f64::<BigEndian>(self.frame_skip_seconds)?;
            self.index.write_to(&mut out)?;
            let copied = io::copy(&mut spool, &mut out)?;
            if copied != self.index.data_len() {
                return Err(TimelineError::CorruptTimeline(format!(
                    "spooled {copied} bytes but the index covers {}",
                    self.index.data_len()
                )));
            }
            out.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|err| TimelineError::Persist {
                path: self.path.clone(),
                source: err.error,
            })?;

        let summary = TimelineSummary {
            path: self.path.clone(),
            kind: self.kind,
            sample_rate: self.sample_rate,
            num_datagrams: self.index.len(),
            total_duration: self.index.total_duration(),
            data_len: self.index.data_len(),
        };
        info!(
            "Wrote {} datagrams ({} samples) to {}",
            summary.num_datagrams,
            summary.total_duration,
            summary.path.display()
        );
        Ok(summary)
    }
}

impl Drop for TimelineWriter {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!(
                "Timeline writer for {} dropped without close; {} datagrams discarded",
                self.path.display(),
                self.index.len()
            );
        }
    }
}

fn create_tempfile(path: &Path) -> Result<tempfile::NamedTempFile, TimelineError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".voxfile_timeline")
        .tempfile_in(dir)
        .map_err(|source| TimelineError::Open {
            path: path.to_path_buf(),
            source,
        })
}
