//! Waveform timelines: one datagram per frame or pitch period of a WAV file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::datagram::Datagram;
use super::error::TimelineError;
use super::writer::TimelineWriter;
use crate::units::Unit;

/// How a waveform is cut into datagrams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Framing {
    /// Consecutive frames of a fixed sample count; the last may be shorter.
    Fixed { frame_samples: u32 },
    /// Periods between strictly increasing pitchmark sample positions.
    Pitchmarks(Vec<u64>),
}

/// Errors raised while turning audio into waveform datagrams.
#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("Failed to read WAV {path}: {source}")]
    Read {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("WAV {path} has {channels} channels; only mono is supported")]
    NotMono { path: PathBuf, channels: u16 },
    #[error("Frame length must be positive")]
    ZeroFrameLength,
    #[error("Invalid pitchmarks: {0}")]
    InvalidPitchmarks(String),
    #[error("Waveform payload has odd length {0}")]
    OddPayload(usize),
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// Decoded mono audio.
#[derive(Clone, Debug, PartialEq)]
pub struct MonoAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

/// Read a mono WAV file as 16-bit samples.
pub fn read_mono_wav(path: &Path) -> Result<MonoAudio, WaveformError> {
    let read_err = |source| WaveformError::Read {
        path: path.to_path_buf(),
        source,
    };
    let reader = hound::WavReader::open(path).map_err(read_err)?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(WaveformError::NotMono {
            path: path.to_path_buf(),
            channels: spec.channels,
        });
    }
    let samples = match spec.sample_format {
        hound::SampleFormat::Int => {
            let shift = i32::from(spec.bits_per_sample) - 16;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| to_i16(value, shift)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(read_err)?
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|sample| {
                sample.map(|value| (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?,
    };
    Ok(MonoAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Split `samples` into frame ranges according to `framing`.
pub fn frame_ranges(
    total: usize,
    framing: &Framing,
) -> Result<Vec<std::ops::Range<usize>>, WaveformError> {
    match framing {
        Framing::Fixed { frame_samples } => {
            if *frame_samples == 0 {
                return Err(WaveformError::ZeroFrameLength);
            }
            let step = *frame_samples as usize;
            Ok((0..total)
                .step_by(step)
                .map(|start| start..(start + step).min(total))
                .collect())
        }
        Framing::Pitchmarks(marks) => {
            let mut ranges = Vec::with_capacity(marks.len() + 1);
            let mut previous = 0usize;
            for (i, mark) in marks.iter().enumerate() {
                let mark = usize::try_from(*mark)
                    .ok()
                    .filter(|mark| *mark <= total)
                    .ok_or_else(|| {
                        WaveformError::InvalidPitchmarks(format!(
                            "pitchmark {i} at {mark} lies beyond {total} samples"
                        ))
                    })?;
                if i > 0 && mark <= previous {
                    return Err(WaveformError::InvalidPitchmarks(format!(
                        "pitchmark {i} at {mark} does not follow {previous}"
                    )));
                }
                if mark > previous {
                    ranges.push(previous..mark);
                }
                previous = mark;
            }
            if previous < total {
                ranges.push(previous..total);
            }
            Ok(ranges)
        }
    }
}

/// Big-endian `i16` payload for a frame of samples.
pub fn encode_waveform_payload(samples: &[i16]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|sample| sample.to_be_bytes())
        .collect()
}

/// Inverse of [`encode_waveform_payload`].
pub fn decode_waveform_payload(payload: &[u8]) -> Result<Vec<i16>, WaveformError> {
    if payload.len() % 2 != 0 {
        return Err(WaveformError::OddPayload(payload.len()));
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Feed `audio` into `writer` and return the unit it occupies.
pub fn feed_audio(
    writer: &mut TimelineWriter,
    audio: &MonoAudio,
    framing: &Framing,
    unit_index: usize,
) -> Result<Unit, WaveformError> {
    let start = writer.total_duration();
    let ranges = frame_ranges(audio.samples.len(), framing)?;
    for range in &ranges {
        let frame = &audio.samples[range.clone()];
        let datagram = Datagram::new(frame.len() as u64, encode_waveform_payload(frame));
        writer.feed(&datagram, audio.sample_rate)?;
    }
    let duration = u32::try_from(writer.total_duration() - start)
        .map_err(|_| TimelineError::Overflow("unit duration"))?;
    debug!("Fed {} frames for unit {unit_index}", ranges.len());
    Ok(Unit::new(unit_index, start, duration))
}

/// Read a WAV file and feed it into `writer`.
pub fn feed_wav(
    writer: &mut TimelineWriter,
    path: &Path,
    framing: &Framing,
    unit_index: usize,
) -> Result<Unit, WaveformError> {
    let audio = read_mono_wav(path)?;
    feed_audio(writer, &audio, framing, unit_index)
}

fn to_i16(value: i32, shift: i32) -> i16 {
    let scaled = if shift >= 0 {
        value >> shift
    } else {
        value << -shift
    };
    scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_frames_keep_the_short_tail() {
        let ranges = frame_ranges(10, &Framing::Fixed { frame_samples: 4 }).unwrap();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn pitchmarks_cover_the_whole_signal() {
        let ranges = frame_ranges(10, &Framing::Pitchmarks(vec![3, 7])).unwrap();
        assert_eq!(ranges, vec![0..3, 3..7, 7..10]);
        let ranges = frame_ranges(10, &Framing::Pitchmarks(vec![0, 10])).unwrap();
        assert_eq!(ranges, vec![0..10]);
    }

    #[test]
    fn decreasing_pitchmarks_are_rejected() {
        let err = frame_ranges(10, &Framing::Pitchmarks(vec![5, 5])).unwrap_err();
        assert!(matches!(err, WaveformError::InvalidPitchmarks(_)));
        let err = frame_ranges(10, &Framing::Pitchmarks(vec![11])).unwrap_err();
        assert!(matches!(err, WaveformError::InvalidPitchmarks(_)));
    }

    #[test]
    fn payload_is_big_endian_samples() {
        let payload = encode_waveform_payload(&[1, -2]);
        assert_eq!(payload, vec![0, 1, 0xff, 0xfe]);
        assert_eq!(decode_waveform_payload(&payload).unwrap(), vec![1, -2]);
        assert!(decode_waveform_payload(&[1]).is_err());
    }

    #[test]
    fn bit_depth_is_normalized_to_16_bits() {
        assert_eq!(to_i16(0x7fff00, 8), 0x7fff);
        assert_eq!(to_i16(-128, -8), i16::MIN);
        assert_eq!(to_i16(12, 0), 12);
    }
}
