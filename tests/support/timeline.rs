use std::path::{Path, PathBuf};

use voxfile::timeline::{Datagram, ProcessingHeader, TimelineKind, TimelineWriter};

pub const RATE: u32 = 16_000;

/// Payload that encodes the datagram's position, so reads can be matched back.
pub fn payload(k: usize) -> Vec<u8> {
    vec![k as u8; k + 1]
}

/// Write a generic timeline with one datagram per duration.
pub fn write_timeline(dir: &Path, name: &str, durations: &[u64]) -> PathBuf {
    let path = dir.join(name);
    let processing = ProcessingHeader::new()
        .with("producer", "integration-test")
        .expect("processing header");
    let mut writer =
        TimelineWriter::create(&path, TimelineKind::Generic, RATE, 0.005, processing)
            .expect("create timeline writer");
    for (k, duration) in durations.iter().enumerate() {
        writer
            .feed(&Datagram::new(*duration, payload(k)), RATE)
            .expect("feed datagram");
    }
    writer.close().expect("close timeline");
    path
}
