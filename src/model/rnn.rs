//! DelayedRNN: the multi-axis recurrent layer stack.
//!
//! One layer updates three hidden tensors in place of a single stream:
//!
//! - `h_t [B, M, T, D]` — time-delayed stack. Mixed by a forward LSTM along
//!   time (one run per mel row) plus a bidirectional LSTM along frequency
//!   (one run per time column); the three runs are concatenated and
//!   projected back to `D` with a residual connection.
//! - `h_c [B, T, D]` — centralized stack. A forward LSTM along time with a
//!   projection and residual.
//! - `h_f [B, M, T, D]` — frequency-delayed stack. Consumes
//!   `h_t' + h_f + broadcast(h_c')` and runs an LSTM upward along frequency,
//!   projected with a residual.
//!
//! The only recurrence along time is forward-directional, so a causally
//! shifted input stays causal through any number of layers.

use candle_core::{Module, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM, RNN};
use candle_nn::{Linear, VarBuilder};

use crate::{Error, Result};

/// Run an LSTM over `[N, L, D]`, returning the hidden states `[N, L, D]`.
pub(crate) fn run_lstm_seq(rnn: &LSTM, input: &Tensor) -> Result<Tensor> {
    let states = rnn.seq(input)?;
    let hs: Vec<Tensor> = states.iter().map(|s| s.h().clone()).collect();
    Ok(Tensor::stack(&hs, 1)?)
}

/// Reverse a tensor along one dimension.
fn reverse(t: &Tensor, dim: usize) -> Result<Tensor> {
    let len = t.dim(dim)?;
    let indices: Vec<u32> = (0..len as u32).rev().collect();
    let indices = Tensor::from_vec(indices, len, t.device())?;
    Ok(t.index_select(&indices, dim)?)
}

/// One DelayedRNN layer.
pub struct DelayedRnn {
    time_rnn: LSTM,
    freq_up_rnn: LSTM,
    freq_down_rnn: LSTM,
    cent_rnn: LSTM,
    fdelay_rnn: LSTM,
    w_t: Linear,
    w_c: Linear,
    w_f: Linear,
    hidden: usize,
}

impl DelayedRnn {
    pub fn new(hidden: usize, vb: VarBuilder) -> Result<Self> {
        let cfg = LSTMConfig::default;
        Ok(Self {
            time_rnn: lstm(hidden, hidden, cfg(), vb.pp("time_rnn"))?,
            freq_up_rnn: lstm(hidden, hidden, cfg(), vb.pp("freq_up_rnn"))?,
            freq_down_rnn: lstm(hidden, hidden, cfg(), vb.pp("freq_down_rnn"))?,
            cent_rnn: lstm(hidden, hidden, cfg(), vb.pp("cent_rnn"))?,
            fdelay_rnn: lstm(hidden, hidden, cfg(), vb.pp("fdelay_rnn"))?,
            w_t: candle_nn::linear(3 * hidden, hidden, vb.pp("w_t"))?,
            w_c: candle_nn::linear(hidden, hidden, vb.pp("w_c"))?,
            w_f: candle_nn::linear(hidden, hidden, vb.pp("w_f"))?,
            hidden,
        })
    }

    /// Update all three stacks. Shapes are preserved exactly.
    pub fn forward(
        &self,
        h_t: &Tensor,
        h_f: &Tensor,
        h_c: &Tensor,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let (b, m, t, d) = h_t.dims4()?;
        if h_f.dims() != h_t.dims() {
            return Err(Error::Shape(format!(
                "h_f {:?} != h_t {:?}",
                h_f.dims(),
                h_t.dims()
            )));
        }
        if h_c.dims() != [b, t, d] {
            return Err(Error::Shape(format!(
                "h_c {:?}, expected [{b}, {t}, {d}]",
                h_c.dims()
            )));
        }
        if d != self.hidden {
            return Err(Error::Shape(format!("hidden {d} != layer hidden {}", self.hidden)));
        }

        // --- time-delayed stack ---
        // Forward along time, one run per (batch, mel row).
        let rows = h_t.contiguous()?.reshape((b * m, t, d))?;
        let along_time = run_lstm_seq(&self.time_rnn, &rows)?.reshape((b, m, t, d))?;

        // Bidirectional along frequency, one run per (batch, time column).
        let cols = h_t.transpose(1, 2)?.contiguous()?.reshape((b * t, m, d))?;
        let up = run_lstm_seq(&self.freq_up_rnn, &cols)?;
        let down = reverse(
            &run_lstm_seq(&self.freq_down_rnn, &reverse(&cols, 1)?)?,
            1,
        )?;
        let up = up.reshape((b, t, m, d))?.transpose(1, 2)?.contiguous()?;
        let down = down.reshape((b, t, m, d))?.transpose(1, 2)?.contiguous()?;

        let mixed = Tensor::cat(&[&along_time, &up, &down], 3)?;
        let h_t_new = (h_t + self.w_t.forward(&mixed)?)?;

        // --- centralized stack ---
        let cent = run_lstm_seq(&self.cent_rnn, h_c)?;
        let h_c_new = (h_c + self.w_c.forward(&cent)?)?;

        // --- frequency-delayed stack ---
        let f_in = (h_t_new.clone() + h_f)?.broadcast_add(&h_c_new.unsqueeze(1)?)?;
        let f_cols = f_in.transpose(1, 2)?.contiguous()?.reshape((b * t, m, d))?;
        let f_mixed = run_lstm_seq(&self.fdelay_rnn, &f_cols)?
            .reshape((b, t, m, d))?
            .transpose(1, 2)?
            .contiguous()?;
        let h_f_new = (h_f + self.w_f.forward(&f_mixed)?)?;

        Ok((h_t_new, h_f_new, h_c_new))
    }
}
