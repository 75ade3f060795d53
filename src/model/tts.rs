//! The text-conditioned sequence model for the top tier.
//!
//! Training forward: teacher-forced. The input spectrogram is turned into
//! three causal views (time-shifted, frequency-shifted, and the attention
//! query view), the alignment engine runs once over the full sequence, the
//! DelayedRNN stack mixes the three streams, and a final projection produces
//! K (mean, scale, weight) triples per spectrogram bin. Positions past a
//! sample's true length are forced to a fixed (0, 1/sqrt(2*pi)) distribution
//! so padding contributes a constant, not garbage.
//!
//! Inference: strictly sequential along time. Each step re-runs the
//! teacher-forced pass over the generated prefix, takes the mixture mean
//! weighted by mixture probability as a point estimate for the next frame,
//! and stops once the termination probability passes [`STOP_THRESHOLD`].

use candle_core::{Module, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM};
use candle_nn::{ops, Embedding, Linear, VarBuilder};

use crate::config::ModelConfig;
use crate::model::attention::{gather_termination, AttentionOutput, GmmAttention};
use crate::model::rnn::{run_lstm_seq, DelayedRnn};
use crate::{Error, Result};

/// Scale forced onto masked positions: 1/sqrt(2*pi).
pub const MASKED_STD: f32 = 0.398_942_28;

/// Termination probability above which sampling stops.
pub const STOP_THRESHOLD: f32 = 0.5;

/// Output of one training forward pass.
pub struct TtsOutput {
    /// `[B, M, T, K]` mixture means (masked positions exactly 0).
    pub mu: Tensor,
    /// `[B, M, T, K]` mixture scales (masked positions exactly [`MASKED_STD`]).
    pub std: Tensor,
    /// `[B, M, T, K]` mixture weights, softmax over K, never masked.
    pub pi: Tensor,
    /// `[B, T, T_text]` alignment map from the attention engine.
    pub alignment: Tensor,
    /// `[B]` termination probability gathered at each sample's last real step.
    pub termination: Tensor,
}

/// The top-tier sequence model.
pub struct Tts {
    embedding: Embedding,
    encoder_rnn: LSTM,
    w_t0: Linear,
    w_f0: Linear,
    w_c0: Linear,
    layers: Vec<DelayedRnn>,
    w_theta: Linear,
    attention: GmmAttention,
    num_mixtures: usize,
    n_mels: usize,
}

impl Tts {
    /// Build the model. Only tier 1 is text-conditioned; any other tier is a
    /// configuration error.
    pub fn new(model: &ModelConfig, n_mels: usize, vocab: usize, vb: VarBuilder) -> Result<Self> {
        if model.tier != 1 {
            return Err(Error::Config(format!(
                "text-conditioned model requires tier 1, got {}",
                model.tier
            )));
        }
        if model.layers == 0 {
            return Err(Error::Config("layer count must be >= 1".into()));
        }
        let hidden = model.hidden;

        let embedding = candle_nn::embedding(vocab, hidden, vb.pp("embedding"))?;
        let encoder_rnn = lstm(hidden, hidden, LSTMConfig::default(), vb.pp("encoder_rnn"))?;

        let w_t0 = candle_nn::linear(1, hidden, vb.pp("w_t0"))?;
        let w_f0 = candle_nn::linear(1, hidden, vb.pp("w_f0"))?;
        let w_c0 = candle_nn::linear(n_mels, hidden, vb.pp("w_c0"))?;

        let mut layers = Vec::with_capacity(model.layers);
        for i in 0..model.layers {
            layers.push(DelayedRnn::new(hidden, vb.pp(format!("layers.{i}")))?);
        }

        let w_theta = candle_nn::linear(hidden, 3 * model.gmm, vb.pp("w_theta"))?;
        let attention = GmmAttention::new(hidden, model.gmm, vb.pp("attention"))?;

        Ok(Self {
            embedding,
            encoder_rnn,
            w_t0,
            w_f0,
            w_c0,
            layers,
            w_theta,
            attention,
            num_mixtures: model.gmm,
            n_mels,
        })
    }

    /// Encode token ids `[B, T_text]` into memory `[B, T_text, D]`.
    fn encode_text(&self, text: &Tensor) -> Result<Tensor> {
        let embedded = self.embedding.forward(text)?;
        run_lstm_seq(&self.encoder_rnn, &embedded)
    }

    /// Shared teacher-forced pass: causal views, attention, layer stack,
    /// mixture projection. Returns raw `theta [B, M, T, 3K]` plus the
    /// attention output.
    fn backbone(&self, x: &Tensor, memory: &Tensor) -> Result<(Tensor, AttentionOutput)> {
        let x_time = shift_right(x, 2)?;
        let x_freq = shift_right(x, 1)?;

        let mut h_t = self.w_t0.forward(&x_time.unsqueeze(3)?.contiguous()?)?;
        let mut h_f = self.w_f0.forward(&x_freq.unsqueeze(3)?.contiguous()?)?;
        let queries = self.w_c0.forward(&x_time.transpose(1, 2)?.contiguous()?)?;

        let att = self.attention.forward(&queries, memory)?;
        let mut h_c = att.contexts.clone();

        for layer in &self.layers {
            (h_t, h_f, h_c) = layer.forward(&h_t, &h_f, &h_c)?;
        }

        let theta = self.w_theta.forward(&h_f)?;
        Ok((theta, att))
    }

    /// Teacher-forced training pass.
    ///
    /// - `x`: `[B, M, T]` target-tier spectrogram (padded)
    /// - `text`: `[B, T_text]` token ids (padded)
    /// - `output_lengths`: true time-axis length per sample
    pub fn forward(&self, x: &Tensor, text: &Tensor, output_lengths: &[usize]) -> Result<TtsOutput> {
        let (batch, n_mels, t_steps) = x
            .dims3()
            .map_err(|_| Error::Shape("spectrogram must be [B, M, T]".into()))?;
        let (text_batch, _t_text) = text
            .dims2()
            .map_err(|_| Error::Shape("text must be [B, T_text]".into()))?;
        if text_batch != batch {
            return Err(Error::Shape(format!(
                "text batch {text_batch} != spectrogram batch {batch}"
            )));
        }
        if n_mels != self.n_mels {
            return Err(Error::Shape(format!(
                "{n_mels} mel bins, model expects {}",
                self.n_mels
            )));
        }
        if output_lengths.len() != batch {
            return Err(Error::Shape(format!(
                "{} lengths for batch of {batch}",
                output_lengths.len()
            )));
        }

        let memory = self.encode_text(text)?;
        let (theta, att) = self.backbone(x, &memory)?;

        let k = self.num_mixtures;
        let mu = theta.narrow(3, 0, k)?;
        let std = theta.narrow(3, k, k)?.exp()?;
        let pi = ops::softmax(&theta.narrow(3, 2 * k, k)?, 3)?;

        let termination = gather_termination(&att.termination, output_lengths)?;

        // Mask positions past each sample's true length: mean -> 0, scale ->
        // the fixed constant. Mixture weights stay untouched.
        let keep = keep_mask(output_lengths, batch, t_steps, x)?;
        let mu = mu.broadcast_mul(&keep)?;
        let std = std
            .broadcast_mul(&keep)?
            .broadcast_add(&keep.affine(-(MASKED_STD as f64), MASKED_STD as f64)?)?;

        Ok(TtsOutput {
            mu,
            std,
            pi,
            alignment: att.alignment,
            termination,
        })
    }

    /// Autoregressive generation for a single utterance.
    ///
    /// Returns `[M, frames]` with frames <= `num_frames` (early stop when the
    /// termination probability passes [`STOP_THRESHOLD`]). Inherently
    /// sequential: each step re-runs the pass over the generated prefix.
    pub fn sample(&self, text: &Tensor, num_frames: usize) -> Result<Tensor> {
        let (batch, _t_text) = text
            .dims2()
            .map_err(|_| Error::Shape("text must be [B, T_text]".into()))?;
        if batch != 1 {
            return Err(Error::Shape(format!("sampling expects batch 1, got {batch}")));
        }
        if num_frames == 0 {
            return Err(Error::Config("num_frames must be >= 1".into()));
        }

        let device = text.device();
        let memory = self.encode_text(text)?;
        let k = self.num_mixtures;

        // Host-side buffer of generated frames; column i is written at step i
        // and read (through the causal shifts) from step i+1 on.
        let mut generated = vec![0f32; self.n_mels * num_frames];
        let mut produced = num_frames;

        for i in 0..num_frames {
            let x = Tensor::from_vec(
                generated.clone(),
                (1, self.n_mels, num_frames),
                device,
            )?;
            let (theta, att) = self.backbone(&x, &memory)?;

            // Point estimate: mixture-probability-weighted mean.
            let mu = ops::sigmoid(&theta.narrow(3, 0, k)?)?;
            let pi = ops::softmax(&theta.narrow(3, 2 * k, k)?, 3)?;
            let frame = (mu * pi)?
                .sum(3)?
                .narrow(2, i, 1)?
                .flatten_all()?
                .to_vec1::<f32>()?;
            for (m, &v) in frame.iter().enumerate() {
                generated[m * num_frames + i] = v;
            }

            let termination = att
                .termination
                .narrow(1, i, 1)?
                .flatten_all()?
                .to_vec1::<f32>()?[0];
            if termination > STOP_THRESHOLD {
                produced = i + 1;
                break;
            }
        }

        // Trim to the produced prefix.
        let mut out = Vec::with_capacity(self.n_mels * produced);
        for m in 0..self.n_mels {
            out.extend_from_slice(&generated[m * num_frames..m * num_frames + produced]);
        }
        Ok(Tensor::from_vec(out, (self.n_mels, produced), device)?)
    }
}

/// Shift right by one along `dim` via pad-then-truncate, so position i sees
/// only strictly prior positions along that axis.
fn shift_right(x: &Tensor, dim: usize) -> Result<Tensor> {
    let len = x.dim(dim)?;
    Ok(x.pad_with_zeros(dim, 1, 0)?.narrow(dim, 0, len)?)
}

/// `[B, 1, T, 1]` mask: 1 inside each sample's true length, 0 beyond it.
fn keep_mask(lengths: &[usize], batch: usize, t_steps: usize, like: &Tensor) -> Result<Tensor> {
    let mut keep = vec![1f32; batch * t_steps];
    for (sample, &len) in lengths.iter().enumerate() {
        if len == 0 || len > t_steps {
            return Err(Error::Shape(format!(
                "sample {sample}: length {len} outside 1..={t_steps}"
            )));
        }
        for t in len..t_steps {
            keep[sample * t_steps + t] = 0.0;
        }
    }
    Ok(Tensor::from_vec(keep, (batch, 1, t_steps, 1), like.device())?)
}
