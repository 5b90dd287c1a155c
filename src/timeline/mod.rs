//! Indexed datagram timelines.
//!
//! Layout after the common header: processing header, sample rate, frame skip
//! hint, index, then the length-prefixed datagram payloads.

mod datagram;
mod error;
/// Datagram index and lookups by time or offset.
pub mod index;
mod processing_header;
mod reader;
/// Waveform timelines built from WAV audio.
pub mod waveform;
mod writer;

pub use crate::header::TimelineKind;
pub use datagram::{DATAGRAM_PREFIX_LEN, Datagram};
pub use error::TimelineError;
pub use index::{IndexEntry, TimelineIndex};
pub use processing_header::ProcessingHeader;
pub use reader::{Datagrams, SpanLookup, TimelineReader, scale_time};
pub use writer::{TimelineSummary, TimelineWriter};
