//! Provenance block stored near the top of a timeline: `key=value` lines.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use super::error::TimelineError;

/// Analysis parameters recorded for humans and debugging tools.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessingHeader {
    entries: BTreeMap<String, String>,
}

impl ProcessingHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one property.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TimelineError> {
        let key = key.into();
        let value = value.into();
        if key.trim().is_empty()
            || key.contains(['=', '\n', '\r'])
            || key.trim() != key
            || key.starts_with('#')
        {
            return Err(TimelineError::InvalidProcessingHeader(format!(
                "key '{key}' must be non-empty, trimmed, not start with '#', and be free of '=' and line breaks"
            )));
        }
        // parse() trims each line, so trailing whitespace would not survive a round trip.
        if value.contains(['\n', '\r']) || value.trim_end() != value {
            return Err(TimelineError::InvalidProcessingHeader(format!(
                "value of '{key}' must not contain line breaks or trailing whitespace"
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Chainable [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self, TimelineError> {
        self.insert(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text form, one sorted `key=value` line per property.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }

    /// Parse the text form. Blank lines, `#` comments and lines without `=` are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    entries.insert(key.trim().to_string(), value.to_string());
                }
                _ => debug!("Skipping processing header line '{line}'"),
            }
        }
        ProcessingHeader { entries }
    }

    #[cfg(test)]
    pub(crate) fn encoded_len(&self) -> u64 {
        4 + self.to_text().len() as u64
    }

    pub(crate) fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let text = self.to_text();
        let len = u32::try_from(text.len()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "processing header too large")
        })?;
        out.write_u32::<BigEndian>(len)?;
        out.write_all(text.as_bytes())
    }

    pub(crate) fn read_from<R: Read + ?Sized>(
        input: &mut R,
        remaining: u64,
    ) -> Result<Self, TimelineError> {
        let len = input
            .read_u32::<BigEndian>()
            .map_err(|_| TimelineError::CorruptTimeline("processing header is cut off".into()))?;
        if u64::from(len) + 4 > remaining {
            return Err(TimelineError::CorruptTimeline(format!(
                "processing header of {len} bytes does not fit in the file"
            )));
        }
        let mut buf = vec![0u8; len as usize];
        input.read_exact(&mut buf)?;
        let text = String::from_utf8(buf).map_err(|err| {
            TimelineError::CorruptTimeline(format!("processing header is not UTF-8: {err}"))
        })?;
        Ok(Self::parse(&text))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProcessingHeader {
    /// Collects pairs, dropping any that [`insert`](ProcessingHeader::insert) would reject.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = ProcessingHeader::new();
        for (key, value) in iter {
            if let Err(err) = header.insert(key, value) {
                debug!("Dropping processing header entry: {err}");
            }
        }
        header
    }
}
