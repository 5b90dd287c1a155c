use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use super::error::TimelineError;

/// Bytes of the `u32` length prefix in front of every payload.
pub const DATAGRAM_PREFIX_LEN: u64 = 4;

/// One opaque payload with a duration in timeline samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    duration: u64,
    data: Vec<u8>,
}

impl Datagram {
    pub fn new(duration: u64, data: Vec<u8>) -> Self {
        Datagram { duration, data }
    }

    /// Duration in samples.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes the datagram takes in the data region, prefix included.
    pub fn encoded_len(&self) -> u64 {
        DATAGRAM_PREFIX_LEN + self.data.len() as u64
    }

    pub(crate) fn with_duration(self, duration: u64) -> Self {
        Datagram { duration, ..self }
    }

    pub(crate) fn check_len(&self) -> Result<u32, TimelineError> {
        u32::try_from(self.data.len()).map_err(|_| TimelineError::PayloadTooLarge(self.data.len()))
    }

    /// Write the length prefix and payload.
    pub(crate) fn write_record<W: Write + ?Sized>(&self, out: &mut W, len: u32) -> io::Result<()> {
        out.write_u32::<BigEndian>(len)?;
        out.write_all(&self.data)
    }
}
