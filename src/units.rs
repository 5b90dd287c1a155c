//! Unit files: fixed-width `(start, duration)` records over one sample rate.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::header::{FileKind, HEADER_LEN, HeaderError, expect_header, write_header};

/// Bytes of sample rate plus unit count after the common header.
const UNIT_PREAMBLE_LEN: u64 = 4 + 4;
/// Bytes of one `(i64 start, i32 duration)` record.
pub const UNIT_RECORD_LEN: u64 = 8 + 4;

/// One selection unit: a `[start, start + duration)` interval in samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Unit {
    /// Position in the unit file.
    pub index: usize,
    /// Start time in samples.
    pub start: u64,
    /// Duration in samples.
    pub duration: u32,
}

impl Unit {
    pub fn new(index: usize, start: u64, duration: u32) -> Self {
        Unit {
            index,
            start,
            duration,
        }
    }

    /// Zero-length boundary marker.
    pub fn is_null(&self) -> bool {
        self.duration == 0
    }

    /// First sample after the unit.
    pub fn end(&self) -> u64 {
        self.start + u64::from(self.duration)
    }
}

/// Errors raised by unit file reading and writing.
#[derive(Debug, Error)]
pub enum UnitFileError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("Failed to open {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("Failed to persist {path}: {source}")]
    Persist { path: PathBuf, source: std::io::Error },
    #[error("Unit file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(i64),
    #[error("Unit count {0} is negative or too large")]
    InvalidCount(i64),
    #[error("Unit {index} has an invalid record (start {start}, duration {duration})")]
    InvalidRecord { index: usize, start: i64, duration: i64 },
    #[error("Unit {index} starts at {start}, before the previous start {previous}")]
    OutOfOrder { index: usize, start: u64, previous: u64 },
    #[error("Declared {declared} units but wrote {written}")]
    UnitCountMismatch { declared: usize, written: usize },
    #[error("Unit index {index} out of range (0..{count})")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("Unit file is {actual} bytes, expected {expected}")]
    Truncated { expected: u64, actual: u64 },
}

/// Writes a unit file record by record.
pub struct UnitFileWriter {
    path: PathBuf,
    out: BufWriter<NamedTempFile>,
    declared: usize,
    written: usize,
    last_start: Option<u64>,
}

impl UnitFileWriter {
    /// Write the header for `unit_count` units at `sample_rate`.
    pub fn create(path: &Path, sample_rate: u32, unit_count: usize) -> Result<Self, UnitFileError> {
        let rate = i32::try_from(sample_rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or(UnitFileError::InvalidSampleRate(i64::from(sample_rate)))?;
        let count = i32::try_from(unit_count)
            .map_err(|_| UnitFileError::InvalidCount(unit_count as i64))?;
        let temp = create_tempfile(path)?;
        let mut out = BufWriter::new(temp);
        write_header(&mut out, FileKind::Units)?;
        out.write_i32::<BigEndian>(rate)?;
        out.write_i32::<BigEndian>(count)?;
        Ok(UnitFileWriter {
            path: path.to_path_buf(),
            out,
            declared: unit_count,
            written: 0,
            last_start: None,
        })
    }

    /// Append the next unit; starts must not decrease.
    pub fn write_unit(&mut self, start: u64, duration: u32) -> Result<(), UnitFileError> {
        if self.written >= self.declared {
            return Err(UnitFileError::UnitCountMismatch {
                declared: self.declared,
                written: self.written + 1,
            });
        }
        if let Some(previous) = self.last_start
            && start < previous
        {
            return Err(UnitFileError::OutOfOrder {
                index: self.written,
                start,
                previous,
            });
        }
        let start_raw = i64::try_from(start).map_err(|_| UnitFileError::InvalidRecord {
            index: self.written,
            start: i64::MAX,
            duration: i64::from(duration),
        })?;
        let duration_raw = i32::try_from(duration).map_err(|_| UnitFileError::InvalidRecord {
            index: self.written,
            start: start_raw,
            duration: i64::from(duration),
        })?;
        self.out.write_i64::<BigEndian>(start_raw)?;
        self.out.write_i32::<BigEndian>(duration_raw)?;
        self.last_start = Some(start);
        self.written += 1;
        Ok(())
    }

    /// Check the declared count and move the file into place.
    pub fn finish(self) -> Result<(), UnitFileError> {
        if self.written != self.declared {
            return Err(UnitFileError::UnitCountMismatch {
                declared: self.declared,
                written: self.written,
            });
        }
        let mut temp = self
            .out
            .into_inner()
            .map_err(|err| UnitFileError::Io(err.into_error()))?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|err| UnitFileError::Persist {
                path: self.path.clone(),
                source: err.error,
            })?;
        info!("Wrote {} units to {}", self.written, self.path.display());
        Ok(())
    }
}

/// Write `units` (in order) as a complete unit file.
pub fn write_unit_file(path: &Path, sample_rate: u32, units: &[Unit]) -> Result<(), UnitFileError> {
    let mut writer = UnitFileWriter::create(path, sample_rate, units.len())?;
    for unit in units {
        writer.write_unit(unit.start, unit.duration)?;
    }
    writer.finish()
}

/// Unit file loaded into memory.
#[derive(Clone, Debug)]
pub struct UnitFileReader {
    sample_rate: u32,
    units: Vec<Unit>,
}

impl UnitFileReader {
    pub fn open(path: &Path) -> Result<Self, UnitFileError> {
        let file = File::open(path).map_err(|source| UnitFileError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let actual = file.metadata()?.len();
        let reader = Self::from_reader(&mut BufReader::new(file), actual)?;
        debug!("Loaded {} units from {}", reader.units.len(), path.display());
        Ok(reader)
    }

    /// Decode a unit file of `total_len` bytes from `input`.
    pub fn from_reader<R: Read + ?Sized>(input: &mut R, total_len: u64) -> Result<Self, UnitFileError> {
        expect_header(input, FileKind::Units)?;
        let preamble_end = HEADER_LEN + UNIT_PREAMBLE_LEN;
        let truncated = |expected| UnitFileError::Truncated {
            expected,
            actual: total_len,
        };
        let rate = input
            .read_i32::<BigEndian>()
            .map_err(|_| truncated(preamble_end))?;
        let sample_rate = u32::try_from(rate)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or(UnitFileError::InvalidSampleRate(i64::from(rate)))?;
        let count = input
            .read_i32::<BigEndian>()
            .map_err(|_| truncated(preamble_end))?;
        let count = usize::try_from(count).map_err(|_| UnitFileError::InvalidCount(i64::from(count)))?;
        let expected = preamble_end + count as u64 * UNIT_RECORD_LEN;
        if total_len != expected {
            return Err(truncated(expected));
        }
        let mut units = Vec::with_capacity(count);
        for index in 0..count {
            let start = input.read_i64::<BigEndian>()?;
            let duration = input.read_i32::<BigEndian>()?;
            let (Ok(start), Ok(duration)) = (u64::try_from(start), u32::try_from(duration)) else {
                return Err(UnitFileError::InvalidRecord {
                    index,
                    start,
                    duration: i64::from(duration),
                });
            };
            units.push(Unit::new(index, start, duration));
        }
        Ok(UnitFileReader { sample_rate, units })
    }

    pub fn number_of_units(&self) -> usize {
        self.units.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Unit at position `index`.
    pub fn unit(&self, index: usize) -> Result<Unit, UnitFileError> {
        self.units
            .get(index)
            .copied()
            .ok_or(UnitFileError::IndexOutOfRange {
                index,
                count: self.units.len(),
            })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Whether unit `index` is a zero-length boundary marker.
    pub fn is_null(&self, index: usize) -> Result<bool, UnitFileError> {
        self.unit(index).map(|unit| unit.is_null())
    }
}

fn create_tempfile(path: &Path) -> Result<NamedTempFile, UnitFileError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".voxfile_units")
        .tempfile_in(dir)
        .map_err(|source| UnitFileError::Open {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip_including_null_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halfphones.units");
        let units = [Unit::new(0, 0, 0), Unit::new(1, 0, 800), Unit::new(2, 800, 0)];
        write_unit_file(&path, 16_000, &units).unwrap();
        let reader = UnitFileReader::open(&path).unwrap();
        assert_eq!(reader.sample_rate(), 16_000);
        assert_eq!(reader.units(), &units);
        assert!(reader.is_null(2).unwrap());
        assert!(!reader.is_null(1).unwrap());
    }

    #[test]
    fn file_size_is_pure_arithmetic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sized.units");
        write_unit_file(&path, 22_050, &[Unit::new(0, 5, 10), Unit::new(1, 15, 1)]).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, HEADER_LEN + UNIT_PREAMBLE_LEN + 2 * UNIT_RECORD_LEN);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.units");
        write_unit_file(&path, 16_000, &[Unit::new(0, 0, 10)]).unwrap();
        let reader = UnitFileReader::open(&path).unwrap();
        assert!(matches!(
            reader.unit(1),
            Err(UnitFileError::IndexOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn decreasing_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = UnitFileWriter::create(&dir.path().join("x.units"), 16_000, 2).unwrap();
        writer.write_unit(100, 5).unwrap();
        assert!(matches!(
            writer.write_unit(50, 5),
            Err(UnitFileError::OutOfOrder { index: 1, .. })
        ));
    }

    #[test]
    fn short_write_is_a_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.units");
        let mut writer = UnitFileWriter::create(&path, 16_000, 2).unwrap();
        writer.write_unit(0, 5).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(UnitFileError::UnitCountMismatch { declared: 2, written: 1 })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn truncated_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.units");
        write_unit_file(&path, 16_000, &[Unit::new(0, 0, 10), Unit::new(1, 10, 10)]).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let cut = &bytes[..bytes.len() - 4];
        let err = UnitFileReader::from_reader(&mut &cut[..], cut.len() as u64).unwrap_err();
        assert!(matches!(err, UnitFileError::Truncated { .. }));
    }

    #[test]
    fn finished_file_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("only.units");
        write_unit_file(&path, 16_000, &[Unit::new(0, 0, 10)]).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("only.units")]);
        assert_eq!(UnitFileReader::open(&path).unwrap().number_of_units(), 1);
    }
}
