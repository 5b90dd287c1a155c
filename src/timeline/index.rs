//! In-memory datagram index: one `(cumulative end time, byte offset)` entry per datagram.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::datagram::DATAGRAM_PREFIX_LEN;
use super::error::TimelineError;

/// Bytes of one on-disk index entry.
pub const INDEX_ENTRY_LEN: u64 = 8 + 8;

/// Index entry for one datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Sum of the durations of this and every earlier datagram.
    pub end_time: u64,
    /// Offset of the length prefix, relative to the data region start.
    pub offset: u64,
}

/// Ordered index over a timeline's datagrams.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimelineIndex {
    entries: Vec<IndexEntry>,
    data_len: u64,
}

impl TimelineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a datagram of `duration` samples taking `record_len` bytes.
    pub fn push(&mut self, duration: u64, record_len: u64) -> Result<(), TimelineError> {
        let end_time = self
            .total_duration()
            .checked_add(duration)
            .filter(|end| i64::try_from(*end).is_ok())
            .ok_or(TimelineError::Overflow("duration"))?;
        let data_len = self
            .data_len
            .checked_add(record_len)
            .filter(|len| i64::try_from(*len).is_ok())
            .ok_or(TimelineError::Overflow("data region"))?;
        self.entries.push(IndexEntry {
            end_time,
            offset: self.data_len,
        });
        self.data_len = data_len;
        Ok(())
    }

    /// Undo the last [`push`](Self::push).
    pub(crate) fn pop(&mut self) -> Option<IndexEntry> {
        let entry = self.entries.pop()?;
        self.data_len = entry.offset;
        Some(entry)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total duration in samples.
    pub fn total_duration(&self) -> u64 {
        self.entries.last().map_or(0, |entry| entry.end_time)
    }

    /// Length of the data region in bytes.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Start time of datagram `k`.
    pub fn start_time(&self, k: usize) -> Option<u64> {
        match k {
            0 if !self.entries.is_empty() => Some(0),
            _ => {
                self.entries.get(k)?;
                Some(self.entries[k - 1].end_time)
            }
        }
    }

    /// Duration of datagram `k`.
    pub fn duration(&self, k: usize) -> Option<u64> {
        let end = self.entries.get(k)?.end_time;
        Some(end - self.start_time(k)?)
    }

    /// Bytes of datagram `k`'s record, prefix included.
    pub fn record_len(&self, k: usize) -> Option<u64> {
        let offset = self.entries.get(k)?.offset;
        let next = self
            .entries
            .get(k + 1)
            .map_or(self.data_len, |entry| entry.offset);
        Some(next - offset)
    }

    /// Datagram whose span `[start, end)` contains `time`.
    pub fn locate(&self, time: u64) -> Option<usize> {
        let k = self.entries.partition_point(|entry| entry.end_time <= time);
        (k < self.entries.len()).then_some(k)
    }

    /// Datagram whose record starts at data-region `offset`.
    pub fn position_of_offset(&self, offset: u64) -> Option<usize> {
        self.entries
            .binary_search_by_key(&offset, |entry| entry.offset)
            .ok()
    }

    pub(crate) fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_i64::<BigEndian>(self.entries.len() as i64)?;
        for entry in &self.entries {
            out.write_i64::<BigEndian>(entry.end_time as i64)?;
            out.write_i64::<BigEndian>(entry.offset as i64)?;
        }
        Ok(())
    }

    /// Byte length of the serialized index.
    #[cfg(test)]
    pub(crate) fn encoded_len(&self) -> u64 {
        8 + INDEX_ENTRY_LEN * self.entries.len() as u64
    }

    /// Read the index, given how many bytes remain in the file after it starts.
    pub(crate) fn read_from<R: Read + ?Sized>(
        input: &mut R,
        remaining: u64,
    ) -> Result<Self, TimelineError> {
        let count = input.read_i64::<BigEndian>().map_err(corrupt_read)?;
        let count = u64::try_from(count)
            .map_err(|_| TimelineError::CorruptTimeline(format!("negative index count {count}")))?;
        let index_bytes = count
            .checked_mul(INDEX_ENTRY_LEN)
            .and_then(|bytes| bytes.checked_add(8))
            .filter(|bytes| *bytes <= remaining)
            .ok_or_else(|| {
                TimelineError::CorruptTimeline(format!(
                    "index of {count} entries does not fit in the file"
                ))
            })?;
        let mut entries = Vec::with_capacity(count as usize);
        for k in 0..count {
            let end_time = input.read_i64::<BigEndian>().map_err(corrupt_read)?;
            let offset = input.read_i64::<BigEndian>().map_err(corrupt_read)?;
            let (Ok(end_time), Ok(offset)) = (u64::try_from(end_time), u64::try_from(offset))
            else {
                return Err(TimelineError::CorruptTimeline(format!(
                    "index entry {k} has negative fields"
                )));
            };
            entries.push(IndexEntry { end_time, offset });
        }
        Self::from_entries(entries, remaining - index_bytes)
    }

    /// Validate entries against a data region of `data_len` bytes.
    pub(crate) fn from_entries(
        entries: Vec<IndexEntry>,
        data_len: u64,
    ) -> Result<Self, TimelineError> {
        if let Some(first) = entries.first()
            && first.offset != 0
        {
            return Err(TimelineError::CorruptTimeline(format!(
                "first datagram starts at offset {}, expected 0",
                first.offset
            )));
        }
        for (k, pair) in entries.windows(2).enumerate() {
            if pair[1].offset < pair[0].offset + DATAGRAM_PREFIX_LEN {
                return Err(TimelineError::CorruptTimeline(format!(
                    "offset of datagram {} does not advance past datagram {k}",
                    k + 1
                )));
            }
            if pair[1].end_time < pair[0].end_time {
                return Err(TimelineError::CorruptTimeline(format!(
                    "cumulative time decreases at datagram {}",
                    k + 1
                )));
            }
        }
        match entries.last() {
            Some(last) if last.offset + DATAGRAM_PREFIX_LEN > data_len => {
                return Err(TimelineError::CorruptTimeline(format!(
                    "data region of {data_len} bytes is shorter than the index promises"
                )));
            }
            None if data_len != 0 => {
                return Err(TimelineError::CorruptTimeline(format!(
                    "empty index but {data_len} bytes of data"
                )));
            }
            _ => {}
        }
        Ok(TimelineIndex { entries, data_len })
    }
}

fn corrupt_read(err: io::Error) -> TimelineError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TimelineError::CorruptTimeline("index ends early".to_string())
    } else {
        TimelineError::Io(err)
    }
}
