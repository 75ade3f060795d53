//! Collation of variable-length feature pairs into padded batch tensors.

use candle_core::{Device, Tensor};

use crate::data::features::FeaturePair;
use crate::data::tier::Spectrogram;
use crate::{Error, Result};

/// One padded batch with per-sample true lengths.
///
/// Every position at or beyond a sample's length value is zero padding;
/// downstream consumers must exclude those positions from loss and alignment
/// computation via the length vectors.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[B, T_text]` U32 token ids, present only for text-bearing batches.
    pub tokens: Option<Tensor>,
    /// True token-axis length per sample.
    pub text_lengths: Option<Vec<usize>>,
    /// `[B, M, T]` conditioning tier.
    pub source: Tensor,
    /// `[B, M, T]` prediction-target tier.
    pub target: Tensor,
    /// True time-axis length per sample (both tiers are time-aligned).
    pub audio_lengths: Vec<usize>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.audio_lengths.len()
    }
}

/// Collate feature pairs into one padded [`Batch`].
///
/// For each tensor family independently: right-pad every sample with zeros
/// to the batch max along the variable axis, stack, and record true lengths.
/// Sample order is preserved exactly; inputs are not mutated. A batch mixing
/// text-bearing and audio-only samples is a shape error.
pub fn collate(pairs: &[FeaturePair], device: &Device) -> Result<Batch> {
    if pairs.is_empty() {
        return Err(Error::Shape("cannot collate an empty batch".into()));
    }

    let with_text = pairs.iter().filter(|p| p.tokens.is_some()).count();
    if with_text != 0 && with_text != pairs.len() {
        return Err(Error::Shape(format!(
            "batch mixes {with_text} text-bearing and {} audio-only samples",
            pairs.len() - with_text
        )));
    }

    let (tokens, text_lengths) = if with_text == pairs.len() {
        let seqs: Vec<&[u32]> = pairs
            .iter()
            .map(|p| p.tokens.as_deref().unwrap_or(&[]))
            .collect();
        let lengths: Vec<usize> = seqs.iter().map(|s| s.len()).collect();
        let max_len = *lengths.iter().max().unwrap_or(&0);

        let mut padded = vec![0u32; pairs.len() * max_len];
        for (i, seq) in seqs.iter().enumerate() {
            padded[i * max_len..i * max_len + seq.len()].copy_from_slice(seq);
        }
        let tokens = Tensor::from_vec(padded, (pairs.len(), max_len), device)?;
        (Some(tokens), Some(lengths))
    } else {
        (None, None)
    };

    let audio_lengths: Vec<usize> = pairs.iter().map(|p| p.target[0].len()).collect();
    let source = pad_stack(pairs.iter().map(|p| &p.source), &audio_lengths, device)?;
    let target = pad_stack(pairs.iter().map(|p| &p.target), &audio_lengths, device)?;

    Ok(Batch {
        tokens,
        text_lengths,
        source,
        target,
        audio_lengths,
    })
}

/// Stack spectrograms `[M][T_i]` into `[B, M, max T]` with zero padding.
fn pad_stack<'a>(
    specs: impl Iterator<Item = &'a Spectrogram>,
    lengths: &[usize],
    device: &Device,
) -> Result<Tensor> {
    let specs: Vec<&Spectrogram> = specs.collect();
    let n_mels = specs[0].len();
    if specs.iter().any(|s| s.len() != n_mels) {
        return Err(Error::Shape("inconsistent mel-bin count across batch".into()));
    }
    let max_len = *lengths.iter().max().unwrap_or(&0);

    let mut padded = vec![0f32; specs.len() * n_mels * max_len];
    for (b, spec) in specs.iter().enumerate() {
        for (m, row) in spec.iter().enumerate() {
            let offset = (b * n_mels + m) * max_len;
            padded[offset..offset + row.len()].copy_from_slice(row);
        }
    }
    Tensor::from_vec(padded, (specs.len(), n_mels, max_len), device).map_err(Into::into)
}
