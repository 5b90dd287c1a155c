//! Random-access timeline reader.
//!
//! The whole index is loaded on open; datagram payloads are read on demand.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use byteorder::{BigEndian, ReadBytesExt};
use tracing::debug;

use super::datagram::{DATAGRAM_PREFIX_LEN, Datagram};
use super::error::TimelineError;
use super::index::TimelineIndex;
use super::processing_header::ProcessingHeader;
use crate::header::{FileKind, HEADER_LEN, HeaderError, TimelineKind, read_header};
use crate::units::Unit;

/// Read-only view of a timeline file.
///
/// Lookups take `&self`; file access is serialized internally so one reader can
/// be shared across threads.
#[derive(Debug)]
pub struct TimelineReader {
    path: PathBuf,
    kind: TimelineKind,
    processing: ProcessingHeader,
    sample_rate: u32,
    frame_skip_seconds: f64,
    index: TimelineIndex,
    data_start: u64,
    file: Mutex<File>,
}

/// Datagrams returned by a span lookup together with the lead-in before the requested start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanLookup {
    pub datagrams: Vec<Datagram>,
    /// Samples between the first datagram's start and the requested start, in the caller's rate.
    pub offset: u64,
}

impl TimelineReader {
    /// Open a timeline and load its index.
    ///
    /// Only the last record's length prefix is checked here, against the data
    /// section length. The other prefixes are checked as each datagram is read,
    /// and a mismatch there fails with [`TimelineError::CorruptTimeline`].
    pub fn open(path: &Path) -> Result<Self, TimelineError> {
        let file = File::open(path).map_err(|source| TimelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let file_len = file.metadata()?.len();
        let mut input = BufReader::new(file);

        let kind = match read_header(&mut input)? {
            FileKind::Timeline(kind) => kind,
            other => {
                return Err(HeaderError::WrongKind {
                    expected: FileKind::Timeline(TimelineKind::Generic),
                    found: other,
                }
                .into());
            }
        };
        let processing = ProcessingHeader::read_from(&mut input, file_len - HEADER_LEN)?;
        let rate = input.read_i32::<BigEndian>().map_err(|_| cut_off("sample rate"))?;
        let sample_rate = u32::try_from(rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or(TimelineError::InvalidSampleRate(i64::from(rate)))?;
        let frame_skip_seconds = input
            .read_f64::<BigEndian>()
            .map_err(|_| cut_off("frame skip"))?;
        let position = input.stream_position()?;
        let index = TimelineIndex::read_from(&mut input, file_len.saturating_sub(position))?;
        let data_start = input.stream_position()?;

        let reader = TimelineReader {
            path: path.to_path_buf(),
            kind,
            processing,
            sample_rate,
            frame_skip_seconds,
            index,
            data_start,
            file: Mutex::new(input.into_inner()),
        };
        reader.check_last_record()?;
        debug!(
            "Opened {kind:?} timeline {} with {} datagrams",
            path.display(),
            reader.index.len()
        );
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> TimelineKind {
        self.kind
    }

    pub fn processing_header(&self) -> &ProcessingHeader {
        &self.processing
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Nominal frame skip hint in seconds.
    pub fn frame_skip_seconds(&self) -> f64 {
        self.frame_skip_seconds
    }

    pub fn index(&self) -> &TimelineIndex {
        &self.index
    }

    pub fn num_datagrams(&self) -> usize {
        self.index.len()
    }

    /// Total duration in timeline samples.
    pub fn total_duration(&self) -> u64 {
        self.index.total_duration()
    }

    /// Datagram at position `k`.
    pub fn datagram(&self, k: usize) -> Result<Datagram, TimelineError> {
        let mut file = self.lock();
        self.read_record(&mut file, k)
    }

    /// Datagram whose span contains `time` (timeline samples).
    pub fn datagram_at(&self, time: u64) -> Result<Datagram, TimelineError> {
        let k = self.index.locate(time).ok_or(TimelineError::OutOfRange {
            time,
            total: self.total_duration(),
        })?;
        self.datagram(k)
    }

    /// Datagram whose record starts at `offset` bytes into the data region.
    pub fn datagram_at_byte_offset(&self, offset: u64) -> Result<Datagram, TimelineError> {
        let k = self
            .index
            .position_of_offset(offset)
            .ok_or(TimelineError::NoDatagramAtOffset(offset))?;
        self.datagram(k)
    }

    /// Datagrams intersecting `[start, start + span)`, times given at `rate`.
    pub fn datagrams_in_span(
        &self,
        start: u64,
        span: u64,
        rate: u32,
    ) -> Result<Vec<Datagram>, TimelineError> {
        self.datagrams_in_span_with_offset(start, span, rate)
            .map(|lookup| lookup.datagrams)
    }

    /// Like [`datagrams_in_span`](Self::datagrams_in_span), also reporting the lead-in offset.
    pub fn datagrams_in_span_with_offset(
        &self,
        start: u64,
        span: u64,
        rate: u32,
    ) -> Result<SpanLookup, TimelineError> {
        let end = start.checked_add(span).ok_or(TimelineError::Overflow("span"))?;
        let start_tl = self.to_timeline(start, rate)?;
        let end_tl = self.to_timeline(end, rate)?;
        let Some(first) = self.first_for(start_tl)? else {
            return Ok(SpanLookup {
                datagrams: Vec::new(),
                offset: 0,
            });
        };
        if end_tl <= start_tl {
            return Ok(SpanLookup {
                datagrams: Vec::new(),
                offset: 0,
            });
        }
        let mut file = self.lock();
        let mut datagrams = Vec::new();
        let mut k = first;
        while k < self.index.len() && self.start_of(k) < end_tl {
            datagrams.push(self.read_record(&mut file, k)?);
            k += 1;
        }
        drop(file);
        let offset = self.from_timeline(start_tl - self.start_of(first), rate);
        Ok(SpanLookup {
            datagrams: self.rescale(datagrams, rate),
            offset,
        })
    }

    /// Up to `count` consecutive datagrams starting with the one containing `start` (at `rate`).
    pub fn datagrams_by_count(
        &self,
        start: u64,
        count: usize,
        rate: u32,
    ) -> Result<Vec<Datagram>, TimelineError> {
        self.datagrams_by_count_with_offset(start, count, rate)
            .map(|lookup| lookup.datagrams)
    }

    /// Like [`datagrams_by_count`](Self::datagrams_by_count), also reporting the lead-in offset.
    pub fn datagrams_by_count_with_offset(
        &self,
        start: u64,
        count: usize,
        rate: u32,
    ) -> Result<SpanLookup, TimelineError> {
        let start_tl = self.to_timeline(start, rate)?;
        let Some(first) = self.first_for(start_tl)? else {
            return Ok(SpanLookup {
                datagrams: Vec::new(),
                offset: 0,
            });
        };
        let last = first.saturating_add(count).min(self.index.len());
        let mut file = self.lock();
        let datagrams = (first..last)
            .map(|k| self.read_record(&mut file, k))
            .collect::<Result<Vec<_>, _>>()?;
        drop(file);
        let offset = self.from_timeline(start_tl - self.start_of(first), rate);
        Ok(SpanLookup {
            datagrams: self.rescale(datagrams, rate),
            offset,
        })
    }

    /// Datagrams covering `unit`, whose times are given at `unit_rate`.
    pub fn datagrams_for_unit(
        &self,
        unit: &Unit,
        unit_rate: u32,
    ) -> Result<Vec<Datagram>, TimelineError> {
        self.datagrams_in_span(unit.start, u64::from(unit.duration), unit_rate)
    }

    /// Like [`datagrams_for_unit`](Self::datagrams_for_unit), also reporting the lead-in offset.
    pub fn datagrams_for_unit_with_offset(
        &self,
        unit: &Unit,
        unit_rate: u32,
    ) -> Result<SpanLookup, TimelineError> {
        self.datagrams_in_span_with_offset(unit.start, u64::from(unit.duration), unit_rate)
    }

    /// Sequential scan over every datagram.
    pub fn iter(&self) -> Datagrams<'_> {
        Datagrams {
            reader: self,
            next: 0,
        }
    }

    /// Datagram containing `start_tl`, `None` at exactly the end of the timeline.
    fn first_for(&self, start_tl: u64) -> Result<Option<usize>, TimelineError> {
        let total = self.total_duration();
        if start_tl > total {
            return Err(TimelineError::OutOfRange {
                time: start_tl,
                total,
            });
        }
        Ok(self.index.locate(start_tl))
    }

    fn start_of(&self, k: usize) -> u64 {
        self.index.start_time(k).unwrap_or(0)
    }

    fn to_timeline(&self, time: u64, rate: u32) -> Result<u64, TimelineError> {
        if rate == 0 {
            return Err(TimelineError::InvalidSampleRate(0));
        }
        scale_time(time, rate, self.sample_rate).ok_or(TimelineError::Overflow("time"))
    }

    fn from_timeline(&self, time: u64, rate: u32) -> u64 {
        scale_time(time, self.sample_rate, rate).unwrap_or(u64::MAX)
    }

    fn rescale(&self, datagrams: Vec<Datagram>, rate: u32) -> Vec<Datagram> {
        if rate == self.sample_rate {
            return datagrams;
        }
        datagrams
            .into_iter()
            .map(|datagram| {
                let duration = self.from_timeline(datagram.duration(), rate);
                datagram.with_duration(duration)
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_record(&self, file: &mut File, k: usize) -> Result<Datagram, TimelineError> {
        let count = self.index.len();
        let out_of_range = TimelineError::DatagramIndexOutOfRange { index: k, count };
        let entry = *self.index.entries().get(k).ok_or(out_of_range)?;
        let record_len = self.index.record_len(k).unwrap_or(DATAGRAM_PREFIX_LEN);
        let duration = self.index.duration(k).unwrap_or(0);
        file.seek(SeekFrom::Start(self.data_start + entry.offset))?;
        let len = file
            .read_u32::<BigEndian>()
            .map_err(|_| TimelineError::CorruptTimeline(format!("datagram {k} is cut off")))?;
        if u64::from(len) + DATAGRAM_PREFIX_LEN != record_len {
            return Err(TimelineError::CorruptTimeline(format!(
                "datagram {k} claims {len} bytes but the index leaves {}",
                record_len - DATAGRAM_PREFIX_LEN
            )));
        }
        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data)
            .map_err(|_| TimelineError::CorruptTimeline(format!("datagram {k} is cut off")))?;
        Ok(Datagram::new(duration, data))
    }

    fn check_last_record(&self) -> Result<(), TimelineError> {
        match self.index.len() {
            0 => Ok(()),
            count => {
                let k = count - 1;
                let entry = self.index.entries()[k];
                let mut file = self.lock();
                file.seek(SeekFrom::Start(self.data_start + entry.offset))?;
                let len = file.read_u32::<BigEndian>().map_err(|_| {
                    TimelineError::CorruptTimeline("last datagram is cut off".to_string())
                })?;
                let expected = self.index.record_len(k).unwrap_or(0);
                if u64::from(len) + DATAGRAM_PREFIX_LEN != expected {
                    return Err(TimelineError::CorruptTimeline(format!(
                        "last datagram claims {len} bytes but the file leaves {}",
                        expected.saturating_sub(DATAGRAM_PREFIX_LEN)
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Iterator returned by [`TimelineReader::iter`].
pub struct Datagrams<'a> {
    reader: &'a TimelineReader,
    next: usize,
}

impl Iterator for Datagrams<'_> {
    type Item = Result<Datagram, TimelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.num_datagrams() {
            return None;
        }
        let k = self.next;
        self.next += 1;
        Some(self.reader.datagram(k))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.reader.num_datagrams().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Convert a sample count between rates with round-half-up integer arithmetic.
pub fn scale_time(time: u64, from_rate: u32, to_rate: u32) -> Option<u64> {
    if from_rate == to_rate {
        return Some(time);
    }
    if from_rate == 0 {
        return None;
    }
    let from = u128::from(from_rate);
    let scaled = (u128::from(time) * u128::from(to_rate) + from / 2) / from;
    u64::try_from(scaled).ok()
}

fn cut_off(what: &str) -> TimelineError {
    TimelineError::CorruptTimeline(format!("file ends inside the {what}"))
}
