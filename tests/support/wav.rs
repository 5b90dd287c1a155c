use std::path::Path;

/// Write a mono 16-bit PCM WAV file.
pub fn write_test_wav(path: &Path, sample_rate: u32, samples: &[i16]) {
    write_wav(path, sample_rate, 1, samples);
}

/// Write a 16-bit PCM WAV with interleaved `samples` over `channels`.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create wav parent dirs");
    }
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav writer");
    for &sample in samples {
        writer.write_sample(sample).expect("write wav sample");
    }
    writer.finalize().expect("finalize wav");
}

/// A short ramp that makes frame boundaries easy to check.
pub fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i as i16).wrapping_mul(7)).collect()
}
