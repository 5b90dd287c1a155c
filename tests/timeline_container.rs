//! Integration tests for timeline writing, reopening, and lookups.

mod support;

use support::timeline::{RATE, payload, write_timeline};
use voxfile::header::HeaderError;
use voxfile::timeline::{TimelineError, TimelineKind, TimelineReader};
use voxfile::units::{Unit, write_unit_file};

const DURATIONS: [u64; 3] = [100, 150, 75];

#[test]
fn reopened_timeline_reports_index_and_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    assert_eq!(reader.kind(), TimelineKind::Generic);
    assert_eq!(reader.sample_rate(), RATE);
    assert_eq!(reader.frame_skip_seconds(), 0.005);
    assert_eq!(reader.num_datagrams(), 3);
    assert_eq!(reader.total_duration(), 325);
    assert_eq!(
        reader.processing_header().get("producer"),
        Some("integration-test")
    );
    let ends: Vec<u64> = reader.index().entries().iter().map(|e| e.end_time).collect();
    assert_eq!(ends, vec![100, 250, 325]);
}

#[test]
fn datagram_at_boundary_time_is_the_next_datagram() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    let second = reader.datagram_at(100).expect("lookup at 100");
    assert_eq!(second.data(), payload(1).as_slice());
    assert_eq!(second.duration(), 150);
    assert_eq!(reader.datagram_at(99).expect("lookup at 99").data(), payload(0));
    assert!(matches!(
        reader.datagram_at(325),
        Err(TimelineError::OutOfRange { time: 325, total: 325 })
    ));
}

#[test]
fn unit_lookup_returns_datagrams_intersecting_its_span() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    let unit = Unit::new(0, 0, 250);
    let datagrams = reader.datagrams_for_unit(&unit, RATE).expect("unit lookup");
    let payloads: Vec<&[u8]> = datagrams.iter().map(|d| d.data()).collect();
    assert_eq!(payloads, vec![payload(0).as_slice(), payload(1).as_slice()]);
}

#[test]
fn span_lookups_match_interval_intersection() {
    let durations = [30u64, 5, 120, 64, 1, 80];
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "many.timeline", &durations);
    let reader = TimelineReader::open(&path).expect("open timeline");
    let total: u64 = durations.iter().sum();

    let mut spans = Vec::new();
    let mut start_time = 0;
    for duration in durations {
        spans.push((start_time, start_time + duration));
        start_time += duration;
    }
    for start in (0..total).step_by(7) {
        for span in [1u64, 4, 29, 100, total - start] {
            if start + span > total {
                continue;
            }
            let end = start + span;
            let expected: Vec<usize> = spans
                .iter()
                .enumerate()
                .filter(|(_, (s, e))| *s < end && *e > start)
                .map(|(k, _)| k)
                .collect();
            let found = reader
                .datagrams_in_span(start, span, RATE)
                .expect("span lookup");
            let found_ids: Vec<usize> = found.iter().map(|d| d.data().len() - 1).collect();
            assert_eq!(found_ids, expected, "span [{start}, {end})");
            let covered: u64 = found.iter().map(|d| d.duration()).sum();
            assert!(covered >= span);
        }
    }
}

#[test]
fn span_edges_follow_timeline_extent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    assert!(reader.datagrams_in_span(10, 0, RATE).expect("empty span").is_empty());
    assert!(reader.datagrams_in_span(325, 10, RATE).expect("at end").is_empty());
    assert!(matches!(
        reader.datagrams_in_span(326, 10, RATE),
        Err(TimelineError::OutOfRange { time: 326, .. })
    ));
    let tail = reader.datagrams_in_span(300, 1_000, RATE).expect("past end");
    assert_eq!(tail.len(), 1);
}

#[test]
fn lookups_at_another_rate_are_rescaled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    let unit = Unit::new(3, 0, 125);
    let datagrams = reader.datagrams_for_unit(&unit, RATE / 2).expect("half-rate lookup");
    let durations: Vec<u64> = datagrams.iter().map(|d| d.duration()).collect();
    assert_eq!(durations, vec![50, 75]);
}

#[test]
fn offset_variants_report_lead_in() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    let lookup = reader
        .datagrams_in_span_with_offset(120, 10, RATE)
        .expect("span with offset");
    assert_eq!(lookup.offset, 20);
    assert_eq!(lookup.datagrams.len(), 1);

    let lookup = reader
        .datagrams_by_count_with_offset(260, 2, RATE)
        .expect("count with offset");
    assert_eq!(lookup.offset, 10);
    assert_eq!(lookup.datagrams.len(), 1);

    let by_count = reader.datagrams_by_count(0, 2, RATE).expect("by count");
    assert_eq!(by_count.len(), 2);
}

#[test]
fn byte_offsets_address_datagram_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    let offsets: Vec<u64> = reader.index().entries().iter().map(|e| e.offset).collect();
    assert_eq!(offsets, vec![0, 5, 11]);
    assert_eq!(reader.datagram_at_byte_offset(5).expect("offset 5").data(), payload(1));
    assert!(matches!(
        reader.datagram_at_byte_offset(6),
        Err(TimelineError::NoDatagramAtOffset(6))
    ));
}

#[test]
fn iterator_scans_every_datagram_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let reader = TimelineReader::open(&path).expect("open timeline");

    let all = reader
        .iter()
        .collect::<Result<Vec<_>, _>>()
        .expect("scan timeline");
    let durations: Vec<u64> = all.iter().map(|d| d.duration()).collect();
    assert_eq!(durations, DURATIONS.to_vec());
}

#[test]
fn zero_duration_datagrams_are_kept_but_not_located() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "zero.timeline", &[100, 0, 50]);
    let reader = TimelineReader::open(&path).expect("open timeline");

    assert_eq!(reader.num_datagrams(), 3);
    assert_eq!(reader.datagram(1).expect("zero datagram").duration(), 0);
    assert_eq!(reader.datagram_at(100).expect("lookup").data(), payload(2));
    let span = reader.datagrams_in_span(50, 100, RATE).expect("span over zero");
    assert_eq!(span.len(), 3);
}

#[test]
fn empty_timeline_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "empty.timeline", &[]);
    let reader = TimelineReader::open(&path).expect("open timeline");
    assert_eq!(reader.num_datagrams(), 0);
    assert_eq!(reader.total_duration(), 0);
    assert!(reader.datagrams_in_span(0, 10, RATE).expect("span").is_empty());
}

#[test]
fn reopening_yields_identical_indices() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let first = TimelineReader::open(&path).expect("first open");
    let second = TimelineReader::open(&path).expect("second open");
    assert_eq!(first.index(), second.index());
}

#[test]
fn shared_reader_serves_concurrent_lookups() {
    let dir = tempfile::tempdir().expect("tempdir");
    let durations: Vec<u64> = (1..=64).collect();
    let path = write_timeline(dir.path(), "shared.timeline", &durations);
    let reader = TimelineReader::open(&path).expect("open timeline");

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let reader = &reader;
            scope.spawn(move || {
                for k in (worker..64).step_by(4) {
                    let datagram = reader.datagram(k).expect("threaded read");
                    assert_eq!(datagram.data(), payload(k).as_slice());
                    assert_eq!(datagram.duration(), k as u64 + 1);
                }
            });
        }
    });
}

#[test]
fn truncated_data_region_is_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let mut bytes = std::fs::read(&path).expect("read timeline");
    bytes.pop();
    std::fs::write(&path, bytes).expect("rewrite timeline");
    assert!(matches!(
        TimelineReader::open(&path),
        Err(TimelineError::CorruptTimeline(_))
    ));
}

#[test]
fn tampered_inner_prefix_fails_when_its_datagram_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_timeline(dir.path(), "three.timeline", &DURATIONS);
    let data_len = TimelineReader::open(&path)
        .expect("open timeline")
        .index()
        .data_len();
    let mut bytes = std::fs::read(&path).expect("read timeline");
    let data_start = bytes.len() - data_len as usize;
    bytes[data_start + 3] = 9;
    std::fs::write(&path, bytes).expect("rewrite timeline");

    let reader = TimelineReader::open(&path).expect("last record still intact");
    assert!(matches!(reader.datagram(0), Err(TimelineError::CorruptTimeline(_))));
    assert_eq!(reader.datagram(2).expect("untouched datagram").data(), payload(2));
}

#[test]
fn other_container_kinds_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("plain.units");
    write_unit_file(&path, RATE, &[Unit::new(0, 0, 10)]).expect("write units");
    assert!(matches!(
        TimelineReader::open(&path),
        Err(TimelineError::Header(HeaderError::WrongKind { .. }))
    ));

    let garbage = dir.path().join("garbage.timeline");
    std::fs::write(&garbage, b"RIFF0000WAVEfmt ").expect("write garbage");
    assert!(matches!(
        TimelineReader::open(&garbage),
        Err(TimelineError::Header(HeaderError::BadMagic { .. }))
    ));
}
