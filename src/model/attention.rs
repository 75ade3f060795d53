//! Recurrent Gaussian-mixture alignment engine.
//!
//! At each output step an LSTM cell consumes the current query concatenated
//! with the previous context vector. Its hidden state is projected to `3K`
//! raw values parameterizing K mixture components over memory positions:
//!
//! ```text
//! center = exp(raw[0..K])        strictly positive, independent per step
//! scale  = exp(raw[K..2K])       strictly positive spread
//! mix    = softmax(raw[2K..3K])  sums to 1
//! ```
//!
//! The weight assigned to memory slot u is the probability mass each
//! component places on the interval `[u - 0.5, u + 0.5]` under a logistic
//! CDF, summed with the mixture weights. Mass beyond the last slot's right
//! boundary is the termination probability: the signal that alignment has
//! moved past the end of the memory sequence.
//!
//! Weights are non-negative and total at most 1; the residual mass falls
//! outside `[0, T)` and is deliberately not renormalized.

use candle_core::{Module, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM, RNN};
use candle_nn::{ops, Linear, VarBuilder};

use crate::{Error, Result};

/// Everything one forward pass produces.
pub struct AttentionOutput {
    /// `[B, T_out, D]` context vector per output step.
    pub contexts: Tensor,
    /// `[B, T_out, T_text]` alignment weight map.
    pub alignment: Tensor,
    /// `[B, T_out]` termination probability per output step. Only the value
    /// at step (true output length − 1) is meaningful per sample; select it
    /// with [`gather_termination`].
    pub termination: Tensor,
}

/// The alignment engine. Holds no per-call state; the LSTM state lives on
/// the stack of [`GmmAttention::forward`] and is zero-initialized per call.
pub struct GmmAttention {
    cell: LSTM,
    w_g: Linear,
    num_mixtures: usize,
    hidden: usize,
}

impl GmmAttention {
    pub fn new(hidden: usize, num_mixtures: usize, vb: VarBuilder) -> Result<Self> {
        if num_mixtures == 0 {
            return Err(Error::Config("attention needs at least 1 mixture".into()));
        }
        if hidden == 0 {
            return Err(Error::Config("attention hidden size must be >= 1".into()));
        }
        let cell = lstm(2 * hidden, hidden, LSTMConfig::default(), vb.pp("rnn_cell"))?;
        let w_g = candle_nn::linear(hidden, 3 * num_mixtures, vb.pp("w_g"))?;
        Ok(Self {
            cell,
            w_g,
            num_mixtures,
            hidden,
        })
    }

    /// Drive the engine over a full query sequence.
    ///
    /// - `queries`: `[B, T_out, D]` per-step conditioning input
    /// - `memory`: `[B, T_text, D]` encoded text, read-only
    ///
    /// The step loop is strictly sequential along time: step i's LSTM state
    /// and context feed step i+1. Parallelism exists only across the batch.
    pub fn forward(&self, queries: &Tensor, memory: &Tensor) -> Result<AttentionOutput> {
        let (batch, t_out, query_dim) = queries
            .dims3()
            .map_err(|_| Error::Shape("queries must be [B, T_out, D]".into()))?;
        let (mem_batch, t_text, mem_dim) = memory
            .dims3()
            .map_err(|_| Error::Shape("memory must be [B, T_text, D]".into()))?;
        if mem_batch != batch {
            return Err(Error::Shape(format!(
                "memory batch {mem_batch} != query batch {batch}"
            )));
        }
        if query_dim != self.hidden || mem_dim != self.hidden {
            return Err(Error::Shape(format!(
                "query dim {query_dim} / memory dim {mem_dim} != hidden {}",
                self.hidden
            )));
        }
        if t_text == 0 {
            return Err(Error::Config("memory length must be >= 1".into()));
        }

        let mut state = self.cell.zero_state(batch)?;
        let mut context = Tensor::zeros((batch, self.hidden), queries.dtype(), queries.device())?;

        let mut contexts = Vec::with_capacity(t_out);
        let mut weights = Vec::with_capacity(t_out);
        let mut terminations = Vec::with_capacity(t_out);

        let k = self.num_mixtures;
        for i in 0..t_out {
            let x_i = queries.narrow(1, i, 1)?.squeeze(1)?;
            let input = Tensor::cat(&[&x_i, &context], 1)?;
            state = self.cell.step(&input, &state)?;

            let phi = self.w_g.forward(state.h())?;
            let center = phi.narrow(1, 0, k)?.exp()?;
            let scale = phi.narrow(1, k, k)?.exp()?;
            let mix = ops::softmax_last_dim(&phi.narrow(1, 2 * k, k)?.contiguous()?)?;

            let (weight, termination) = mixture_mass(&center, &scale, &mix, t_text)?;

            #[cfg(debug_assertions)]
            {
                let values = weight.flatten_all()?.to_vec1::<f32>()?;
                debug_assert!(
                    values.iter().all(|v| v.is_finite() && *v >= -1e-6),
                    "non-finite or negative alignment weight at step {i}"
                );
            }

            // Weighted pooling of memory rows: [B, 1, T] x [B, T, D].
            context = weight.unsqueeze(1)?.matmul(memory)?.squeeze(1)?;

            contexts.push(context.clone());
            weights.push(weight);
            terminations.push(termination);
        }

        Ok(AttentionOutput {
            contexts: Tensor::stack(&contexts, 1)?,
            alignment: Tensor::stack(&weights, 1)?,
            termination: Tensor::stack(&terminations, 1)?,
        })
    }
}

/// Probability mass each memory slot receives from a logistic mixture, plus
/// the mass past the final slot.
///
/// - `center`, `scale`, `mix_weight`: `[B, K]`, scale > 0, mix summing to 1
/// - returns `(weights [B, T], termination [B])`
///
/// The logistic CDF is evaluated as `sigmoid((z - center) / scale)`, which
/// stays finite for arbitrarily large magnitude arguments.
pub fn mixture_mass(
    center: &Tensor,
    scale: &Tensor,
    mix_weight: &Tensor,
    memory_len: usize,
) -> Result<(Tensor, Tensor)> {
    if memory_len == 0 {
        return Err(Error::Config("memory length must be >= 1".into()));
    }
    let (batch, k) = center.dims2()?;
    if scale.dims() != center.dims() || mix_weight.dims() != center.dims() {
        return Err(Error::Shape(format!(
            "mixture parameter shapes disagree: {:?} / {:?} / {:?}",
            center.dims(),
            scale.dims(),
            mix_weight.dims()
        )));
    }

    // Slot u owns the interval [u - 0.5, u + 0.5].
    let u = Tensor::arange(0f32, memory_len as f32, center.device())?;
    let u_r = (&u + 0.5)?.reshape((1, 1, memory_len))?;
    let u_l = (&u - 0.5)?.reshape((1, 1, memory_len))?;

    let center = center.reshape((batch, k, 1))?;
    let scale = scale.reshape((batch, k, 1))?;

    let cdf_r = ops::sigmoid(&u_r.broadcast_sub(&center)?.broadcast_div(&scale)?)?;
    let cdf_l = ops::sigmoid(&u_l.broadcast_sub(&center)?.broadcast_div(&scale)?)?;
    let mass = (cdf_r.clone() - cdf_l)?; // [B, K, T]

    let mix = mix_weight.reshape((batch, k, 1))?;
    let weights = mass.broadcast_mul(&mix)?.sum(1)?; // [B, T]

    // Mass that moved past the last slot's right boundary.
    let last_r = cdf_r.narrow(2, memory_len - 1, 1)?.squeeze(2)?; // [B, K]
    let termination = (mix_weight * &last_r)?.sum(1)?.affine(-1.0, 1.0)?;

    Ok((weights, termination))
}

/// Select each sample's termination value at step (true length − 1).
///
/// A gather by index, never an average or max over steps.
pub fn gather_termination(termination: &Tensor, lengths: &[usize]) -> Result<Tensor> {
    let (batch, t_out) = termination.dims2()?;
    if lengths.len() != batch {
        return Err(Error::Shape(format!(
            "{} lengths for batch of {batch}",
            lengths.len()
        )));
    }
    let mut indices = Vec::with_capacity(batch);
    for (sample, &len) in lengths.iter().enumerate() {
        if len == 0 || len > t_out {
            return Err(Error::Shape(format!(
                "sample {sample}: length {len} outside 1..={t_out}"
            )));
        }
        indices.push((len - 1) as u32);
    }
    let indices = Tensor::from_vec(indices, (batch, 1), termination.device())?;
    Ok(termination.gather(&indices, 1)?.squeeze(1)?)
}
