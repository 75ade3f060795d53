//! MelNet hierarchical spectrogram TTS in pure Rust.
//!
//! A candle-based implementation of the MelNet training core: mel
//! spectrograms are decomposed into coarse-to-fine resolution tiers, and a
//! frequency-delayed recurrent model predicts each tier as a mixture of
//! logistic-like distributions per spectrogram bin. The text-conditioned top
//! tier aligns text to audio through a recurrent Gaussian-mixture attention
//! with an explicit termination signal.
//!
//! ## Pipeline
//!
//! ```text
//! dataset root → sample enumeration (seeded 95/5 split)
//!             → mel spectrogram (STFT + filterbank, normalized to [0,1])
//!             → tier decomposition (source/target pair)
//!             → padded batches with per-sample length vectors
//!             → TTS model (GMM attention + DelayedRNN stack)
//!             → mixture parameters + alignment map + termination
//! ```
//!
//! ## Modules
//!
//! - [`audio`] — WAV reading, mel spectrogram (STFT + filterbank)
//! - [`text`] — symbol table and per-dataset text encoding
//! - [`data`] — sample source, tier decomposition, collation, batch loader
//! - [`model`] — GMM attention, DelayedRNN stack, sequence model

pub mod audio;
pub mod config;
pub mod data;
pub mod model;
pub mod text;

mod error;

pub use config::{DatasetKind, MelNetConfig};
pub use error::{Error, Result};
