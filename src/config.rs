//! Configuration for the MelNet trainer core.
//!
//! Defaults match the published hyperparameters for the text-conditioned
//! top tier (6-tier hierarchy, 256 hidden units, 10 mixture components).

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Supported dataset layouts.
///
/// Resolved once at configuration time; an unsupported name is a hard
/// configuration error, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Pipe-delimited transcript (`transcript.v.1.3.txt`), Korean speech.
    Kss,
    /// Triplet-of-lines prompt file (`prompts.gui`), English speech.
    Blizzard,
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kss" | "KSS" => Ok(DatasetKind::Kss),
            "blizzard" | "Blizzard" => Ok(DatasetKind::Blizzard),
            other => Err(Error::Config(format!("unsupported dataset kind '{other}'"))),
        }
    }
}

/// Audio front-end parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub win_length: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f64,
    pub f_max: f64,
    /// Maximum clip duration in seconds. Samples at or above this are dropped.
    pub max_duration: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 2048,
            win_length: 2048,
            hop_length: 256,
            n_mels: 256,
            f_min: 0.0,
            f_max: 11025.0,
            max_duration: 10.0,
        }
    }
}

/// Model architecture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden size shared by the text encoder, attention, and layer stack.
    pub hidden: usize,
    /// Number of mixture components K, used by both the alignment engine and
    /// the output distribution head.
    pub gmm: usize,
    /// Number of DelayedRNN layers.
    pub layers: usize,
    /// Tier being trained. Tier 1 is the text-conditioned top tier.
    pub tier: usize,
    /// Total number of tiers in the hierarchy.
    pub n_tiers: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden: 256,
            gmm: 10,
            layers: 12,
            tier: 1,
            n_tiers: 6,
        }
    }
}

/// Dataset and loading parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub kind: DatasetKind,
    pub root: String,
    pub batch_size: usize,
    pub num_workers: usize,
    /// Seed for the reproducible train/validation shuffle.
    pub split_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            kind: DatasetKind::Kss,
            root: String::new(),
            batch_size: 16,
            num_workers: 4,
            split_seed: 123,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MelNetConfig {
    pub audio: AudioConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
}

impl MelNetConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation, run at setup before any batch is processed.
    pub fn validate(&self) -> Result<()> {
        if self.model.gmm == 0 {
            return Err(Error::Config("gmm (K) must be >= 1".into()));
        }
        if self.model.hidden == 0 {
            return Err(Error::Config("hidden size must be >= 1".into()));
        }
        if self.model.layers == 0 {
            return Err(Error::Config("layer count must be >= 1".into()));
        }
        if self.model.tier == 0 || self.model.tier > self.model.n_tiers {
            return Err(Error::Config(format!(
                "tier must be in 1..={}, got {}",
                self.model.n_tiers, self.model.tier
            )));
        }
        if self.data.batch_size == 0 {
            return Err(Error::Config("batch size must be >= 1".into()));
        }
        if self.audio.win_length != self.audio.n_fft {
            return Err(Error::Config(format!(
                "win_length {} must equal n_fft {}",
                self.audio.win_length, self.audio.n_fft
            )));
        }
        if self.audio.hop_length == 0 || self.audio.hop_length > self.audio.win_length {
            return Err(Error::Config(format!(
                "hop_length {} must be in 1..={}",
                self.audio.hop_length, self.audio.win_length
            )));
        }
        let freq_divisions = (self.model.n_tiers - 1) / 2;
        if self.audio.n_mels % (1 << freq_divisions) != 0 {
            return Err(Error::Config(format!(
                "n_mels {} not divisible by 2^{freq_divisions} (required by {} tiers)",
                self.audio.n_mels, self.model.n_tiers
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = MelNetConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.model.hidden, 256);
        assert_eq!(cfg.model.gmm, 10);
        assert_eq!(cfg.model.tier, 1);
    }

    #[test]
    fn zero_gmm_rejected() {
        let mut cfg = MelNetConfig::default();
        cfg.model.gmm = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn indivisible_mels_rejected() {
        let mut cfg = MelNetConfig::default();
        // 6 tiers -> 2 frequency divisions -> n_mels must divide by 4.
        cfg.audio.n_mels = 126;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn dataset_kind_parsing() {
        assert_eq!(DatasetKind::from_str("kss").unwrap(), DatasetKind::Kss);
        assert_eq!(
            DatasetKind::from_str("Blizzard").unwrap(),
            DatasetKind::Blizzard
        );
        assert!(DatasetKind::from_str("ljspeech").is_err());
    }

    #[test]
    fn tier_out_of_range_rejected() {
        let mut cfg = MelNetConfig::default();
        cfg.model.tier = 7;
        assert!(cfg.validate().is_err());
        cfg.model.tier = 0;
        assert!(cfg.validate().is_err());
    }
}
