//! Big-endian primitives shared by every voxfile layout.
//!
//! Strings are stored as a `u16` byte length followed by UTF-8 bytes.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Longest string that fits behind a `u16` length prefix.
pub const MAX_WIRE_STRING_LEN: usize = u16::MAX as usize;

/// Write a length-prefixed UTF-8 string.
pub fn write_string<W: Write + ?Sized>(out: &mut W, value: &str) -> io::Result<()> {
    let bytes = value.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "string of {} bytes exceeds the {MAX_WIRE_STRING_LEN} byte limit",
                bytes.len()
            ),
        )
    })?;
    out.write_u16::<BigEndian>(len)?;
    out.write_all(bytes)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string<R: Read + ?Sized>(input: &mut R) -> io::Result<String> {
    let len = input.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Read a non-negative `i32` count.
pub fn read_count<R: Read + ?Sized>(input: &mut R) -> io::Result<usize> {
    let raw = input.read_i32::<BigEndian>()?;
    usize::try_from(raw).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidData, format!("negative count {raw}"))
    })
}

/// Write a count as `i32`, rejecting values that do not fit.
pub fn write_count<W: Write + ?Sized>(out: &mut W, count: usize) -> io::Result<()> {
    let raw = i32::try_from(count).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("count {count} does not fit in i32"),
        )
    })?;
    out.write_i32::<BigEndian>(raw)
}

/// Byte length of `value` once written with [`write_string`].
pub fn string_len(value: &str) -> usize {
    2 + value.len()
}
