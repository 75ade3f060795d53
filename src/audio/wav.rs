//! WAV file reading for the training pipeline.

use std::path::Path;

use crate::{Error, Result};

/// Read a WAV file as mono f32 samples in [-1, 1].
///
/// Multi-channel files are mixed down by averaging channels. The file's
/// sample rate must match `expected_rate`; resampling belongs to an
/// external preprocessing step, so a mismatch is an error here.
pub fn read_wav_mono(path: impl AsRef<Path>, expected_rate: u32) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate != expected_rate {
        return Err(Error::Audio(format!(
            "{}: sample rate {} != expected {expected_rate}",
            path.display(),
            spec.sample_rate
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let channels = spec.channels as usize;
    if channels == 1 {
        return Ok(interleaved);
    }

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(channels) {
        mono.push(frame.iter().sum::<f32>() / channels as f32);
    }
    Ok(mono)
}

/// Probe a WAV file's duration in seconds from its header, without decoding
/// samples. Used to filter over-long clips during dataset enumeration.
pub fn wav_duration(path: impl AsRef<Path>) -> Result<f32> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    Ok(reader.duration() as f32 / spec.sample_rate as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &std::path::Path, samples: &[f32], rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn read_mono_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let original = vec![0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25];
        write_test_wav(&path, &original, 22050, 1);

        let loaded = read_wav_mono(&path, 22050).unwrap();
        assert_eq!(loaded.len(), original.len());
        for (a, b) in loaded.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn stereo_mixdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Two frames: (1.0, 0.0) and (-0.5, 0.5).
        write_test_wav(&path, &[1.0, 0.0, -0.5, 0.5], 22050, 2);

        let loaded = read_wav_mono(&path, 22050).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!((loaded[0] - 0.5).abs() < 1e-6);
        assert!(loaded[1].abs() < 1e-6);
    }

    #[test]
    fn sample_rate_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrong_rate.wav");
        write_test_wav(&path, &[0.0; 8], 44100, 1);

        assert!(read_wav_mono(&path, 22050).is_err());
    }

    #[test]
    fn duration_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one_second.wav");
        write_test_wav(&path, &vec![0.0f32; 22050], 22050, 1);

        let duration = wav_duration(&path).unwrap();
        assert!((duration - 1.0).abs() < 1e-4);
    }
}
