//! Per-sample feature extraction: waveform -> normalized mel -> tier pair.

use crate::audio::{read_wav_mono, MelGen};
use crate::config::{AudioConfig, DatasetKind, ModelConfig};
use crate::data::source::Sample;
use crate::data::tier::{Spectrogram, TierUtil};
use crate::text;
use crate::Result;

/// Features extracted from one sample.
///
/// `source` is the conditioning tier and `target` the tier to be predicted,
/// both shaped `[n_mels][frames]` and time-aligned frame-for-frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeaturePair {
    pub tokens: Option<Vec<u32>>,
    pub source: Spectrogram,
    pub target: Spectrogram,
}

/// Stateless extraction pipeline.
///
/// Holds only read-only configuration and collaborators, so independent
/// instances can run in parallel across worker threads (each worker owns its
/// own pipeline).
pub struct FeaturePipeline {
    melgen: MelGen,
    tierutil: TierUtil,
    kind: DatasetKind,
    tier: usize,
    sample_rate: u32,
}

impl FeaturePipeline {
    pub fn new(audio: &AudioConfig, model: &ModelConfig, kind: DatasetKind) -> Result<Self> {
        if audio.win_length != audio.n_fft {
            return Err(crate::Error::Config(format!(
                "win_length {} must equal n_fft {}",
                audio.win_length, audio.n_fft
            )));
        }
        if audio.hop_length == 0 || audio.hop_length > audio.win_length {
            return Err(crate::Error::Config(format!(
                "hop_length {} must be in 1..={}",
                audio.hop_length, audio.win_length
            )));
        }
        Ok(Self {
            melgen: MelGen::new(audio.clone()),
            tierutil: TierUtil::new(model.n_tiers, audio.n_mels)?,
            kind,
            tier: model.tier,
            sample_rate: audio.sample_rate,
        })
    }

    /// Extract a [`FeaturePair`] from one sample.
    ///
    /// Pure function of the sample and configuration. A failure (unreadable
    /// audio, bad rate) affects only this sample.
    pub fn extract(&self, sample: &Sample) -> Result<FeaturePair> {
        let wav = read_wav_mono(&sample.audio_path, self.sample_rate)?;
        let mel = self.melgen.get_normalized_mel(&wav);
        let (source, target) = self.tierutil.cut_divide_tiers(&mel, self.tier)?;

        let tokens = sample
            .text
            .as_deref()
            .map(|t| text::text_to_sequence(t, self.kind));

        Ok(FeaturePair {
            tokens,
            source,
            target,
        })
    }
}
