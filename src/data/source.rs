//! Sample enumeration and the deterministic train/validation split.
//!
//! Two dataset layouts are supported:
//! - **KSS**: `transcript.v.1.3.txt` with pipe-delimited lines
//!   `filename|_|_|text|duration|_`; audio under `<root>/kss/`.
//! - **Blizzard**: `prompts.gui` as triplets of lines (filename, sentence,
//!   blank); audio under `<root>/wavn/`, duration probed from the WAV header.
//!
//! A malformed line or unreadable file skips that sample with a warning; the
//! rest of the list keeps its order. Unsupported layouts are rejected at
//! configuration time by [`DatasetKind::from_str`](crate::DatasetKind).

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::audio::wav_duration;
use crate::config::DatasetKind;
use crate::{Error, Result};

/// One enumerated (audio, text) pair. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub audio_path: PathBuf,
    pub text: Option<String>,
    /// Clip duration in seconds, known at enumeration time.
    pub duration: f32,
}

/// Which side of the 95/5 partition to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
}

/// Enumerate all samples under `root` for the given dataset layout.
///
/// Samples with `duration >= max_duration` are filtered out. The returned
/// order is the transcript order (before any shuffling).
pub fn enumerate(root: &Path, kind: DatasetKind, max_duration: f32) -> Result<Vec<Sample>> {
    match kind {
        DatasetKind::Kss => enumerate_kss(root, max_duration),
        DatasetKind::Blizzard => enumerate_blizzard(root, max_duration),
    }
}

fn enumerate_kss(root: &Path, max_duration: f32) -> Result<Vec<Sample>> {
    let transcript = root.join("transcript.v.1.3.txt");
    let contents = std::fs::read_to_string(&transcript).map_err(|e| {
        Error::Dataset(format!("cannot read {}: {e}", transcript.display()))
    })?;

    let mut samples = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 5 {
            tracing::warn!(line = line_no + 1, "malformed transcript line, skipping");
            continue;
        }
        let duration: f32 = match fields[4].parse() {
            Ok(d) => d,
            Err(_) => {
                tracing::warn!(line = line_no + 1, "unparseable duration, skipping");
                continue;
            }
        };
        if duration >= max_duration {
            continue;
        }
        samples.push(Sample {
            audio_path: root.join("kss").join(fields[0]),
            text: Some(fields[3].to_string()),
            duration,
        });
    }
    Ok(samples)
}

fn enumerate_blizzard(root: &Path, max_duration: f32) -> Result<Vec<Sample>> {
    let prompts = root.join("prompts.gui");
    let contents = std::fs::read_to_string(&prompts)
        .map_err(|e| Error::Dataset(format!("cannot read {}: {e}", prompts.display())))?;

    let lines: Vec<&str> = contents.lines().collect();
    let mut samples = Vec::new();
    // Triplets: filename, sentence, blank separator.
    for chunk in lines.chunks(3) {
        let (filename, sentence) = match chunk {
            [f, s, ..] => (f.trim(), *s),
            _ => break,
        };
        if filename.is_empty() {
            continue;
        }
        let audio_path = root.join("wavn").join(format!("{filename}.wav"));
        let duration = match wav_duration(&audio_path) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(file = %audio_path.display(), error = %e, "skipping sample");
                continue;
            }
        };
        if duration >= max_duration {
            continue;
        }
        samples.push(Sample {
            audio_path,
            text: Some(sentence.to_string()),
            duration,
        });
    }
    Ok(samples)
}

/// Apply the reproducible shuffle and positional 95/5 split.
///
/// Two calls with the same seed and sample list produce bit-identical
/// partitions; train and validation never overlap and together cover the
/// whole list.
pub fn split(mut samples: Vec<Sample>, which: Split, seed: u64) -> Vec<Sample> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let boundary = (samples.len() as f64 * 0.95) as usize;
    match which {
        Split::Train => samples.truncate(boundary),
        Split::Validation => {
            samples.drain(..boundary);
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                audio_path: PathBuf::from(format!("{i}.wav")),
                text: Some(format!("sentence {i}")),
                duration: 1.0,
            })
            .collect()
    }

    #[test]
    fn split_is_deterministic() {
        let train_a = split(fake_samples(100), Split::Train, 123);
        let train_b = split(fake_samples(100), Split::Train, 123);
        assert_eq!(train_a, train_b);
    }

    #[test]
    fn split_partitions_without_overlap() {
        let train = split(fake_samples(100), Split::Train, 123);
        let val = split(fake_samples(100), Split::Validation, 123);
        assert_eq!(train.len(), 95);
        assert_eq!(val.len(), 5);
        for v in &val {
            assert!(!train.contains(v), "{v:?} in both partitions");
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = split(fake_samples(100), Split::Train, 123);
        let b = split(fake_samples(100), Split::Train, 456);
        assert_ne!(a, b);
    }

    #[test]
    fn kss_enumeration_filters_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("transcript.v.1.3.txt"),
            "1/1_0000.wav|a|b|text one|2.5|c\n\
             garbage line\n\
             1/1_0001.wav|a|b|text two|11.0|c\n\
             1/1_0002.wav|a|b|text three|3.0|c\n",
        )
        .unwrap();

        let samples = enumerate(dir.path(), DatasetKind::Kss, 10.0).unwrap();
        // Malformed line skipped, 11.0s clip filtered by duration.
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].text.as_deref(), Some("text one"));
        assert_eq!(samples[1].text.as_deref(), Some("text three"));
        assert!(samples[0].audio_path.ends_with("kss/1/1_0000.wav"));
    }

    #[test]
    fn blizzard_enumeration_reads_durations() {
        let dir = tempfile::tempdir().unwrap();
        let wavn = dir.path().join("wavn");
        std::fs::create_dir(&wavn).unwrap();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(wavn.join("utt1.wav"), spec).unwrap();
        for _ in 0..22050 {
            writer.write_sample(0.0f32).unwrap();
        }
        writer.finalize().unwrap();

        std::fs::write(
            dir.path().join("prompts.gui"),
            "utt1\nA test sentence.\n\nmissing\nAnother sentence.\n\n",
        )
        .unwrap();

        let samples = enumerate(dir.path(), DatasetKind::Blizzard, 10.0).unwrap();
        // utt1 exists (1s), "missing" has no wav and is skipped.
        assert_eq!(samples.len(), 1);
        assert!((samples[0].duration - 1.0).abs() < 1e-4);
        assert_eq!(samples[0].text.as_deref(), Some("A test sentence."));
    }

    #[test]
    fn missing_transcript_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enumerate(dir.path(), DatasetKind::Kss, 10.0).is_err());
    }
}
