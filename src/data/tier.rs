//! Interleaved tier decomposition of a mel spectrogram.
//!
//! The hierarchy is built by repeatedly splitting the spectrogram into
//! even-index (coarser union) and odd-index (finer tier) halves along
//! alternating axes, finest tier first: division 1 splits along time,
//! division 2 along frequency, and so on. After `n_tiers - 1` divisions the
//! remaining even half is tier 1, the coarsest representation.
//!
//! For tier g >= 2, [`TierUtil::cut_divide_tiers`] returns
//! `(union of tiers 1..g-1, tier g)`: two equally shaped, time-aligned
//! halves of the same tensor, the first being the conditioning input and the
//! second the prediction target. Tier 1 has no conditioning spectrogram and
//! is returned as both source and target.

use crate::{Error, Result};

/// Spectrogram shaped `[n_mels][frames]`.
pub type Spectrogram = Vec<Vec<f32>>;

/// Axis along which one division splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Time,
    Freq,
}

/// Division `d` (1-based, finest first) alternates time/frequency.
fn division_axis(d: usize) -> Axis {
    if d % 2 == 1 {
        Axis::Time
    } else {
        Axis::Freq
    }
}

/// Deterministic tier decomposition.
#[derive(Debug, Clone)]
pub struct TierUtil {
    n_tiers: usize,
}

impl TierUtil {
    /// Build a decomposer for a hierarchy of `n_tiers` levels over `n_mels`
    /// frequency bins.
    ///
    /// Fails fast if `n_mels` cannot survive every frequency division.
    pub fn new(n_tiers: usize, n_mels: usize) -> Result<Self> {
        if n_tiers == 0 {
            return Err(Error::Config("n_tiers must be >= 1".into()));
        }
        let freq_divisions = (n_tiers - 1) / 2;
        if n_mels % (1 << freq_divisions) != 0 {
            return Err(Error::Config(format!(
                "n_mels {n_mels} not divisible by 2^{freq_divisions} for {n_tiers} tiers"
            )));
        }
        Ok(Self { n_tiers })
    }

    /// Decompose `mel` and return the `(source, target)` pair for `tier`.
    ///
    /// The time axis is trimmed to a multiple of 2^(number of time divisions)
    /// before splitting, so every division is exact.
    pub fn cut_divide_tiers(&self, mel: &Spectrogram, tier: usize) -> Result<(Spectrogram, Spectrogram)> {
        if tier == 0 || tier > self.n_tiers {
            return Err(Error::Config(format!(
                "tier must be in 1..={}, got {tier}",
                self.n_tiers
            )));
        }
        if mel.is_empty() || mel[0].is_empty() {
            return Err(Error::Shape("empty spectrogram".into()));
        }

        let mut current = self.cut(mel);
        if current[0].is_empty() {
            return Err(Error::Shape(format!(
                "{} frames is too short for a {}-tier decomposition",
                mel[0].len(),
                self.n_tiers
            )));
        }

        // Divisions 1..=(n_tiers - g) peel off tiers n_tiers, n_tiers-1, ..., g+1.
        let g = tier;
        for d in 1..=(self.n_tiers - g) {
            let (even, _odd) = divide(&current, division_axis(d));
            current = even;
        }

        if g == 1 {
            return Ok((current.clone(), current));
        }

        // One more division separates the conditioning union from tier g.
        let (source, target) = divide(&current, division_axis(self.n_tiers - g + 1));
        Ok((source, target))
    }

    /// Trim the time axis so every time division divides exactly.
    fn cut(&self, mel: &Spectrogram) -> Spectrogram {
        let time_divisions = self.n_tiers / 2; // odd divisions among 1..n_tiers-1
        let unit = 1usize << time_divisions;
        let frames = mel[0].len() / unit * unit;
        mel.iter().map(|row| row[..frames].to_vec()).collect()
    }
}

/// Split into even-index and odd-index halves along the given axis.
fn divide(x: &Spectrogram, axis: Axis) -> (Spectrogram, Spectrogram) {
    match axis {
        Axis::Time => {
            let even = x
                .iter()
                .map(|row| row.iter().step_by(2).copied().collect())
                .collect();
            let odd = x
                .iter()
                .map(|row| row.iter().skip(1).step_by(2).copied().collect())
                .collect();
            (even, odd)
        }
        Axis::Freq => {
            let even = x.iter().step_by(2).cloned().collect();
            let odd = x.iter().skip(1).step_by(2).cloned().collect();
            (even, odd)
        }
    }
}

/// Reassemble the two halves of a division. Inverse of [`divide`].
#[cfg(test)]
fn interleave(even: &Spectrogram, odd: &Spectrogram, axis: Axis) -> Spectrogram {
    match axis {
        Axis::Time => even
            .iter()
            .zip(odd.iter())
            .map(|(e, o)| {
                let mut row = Vec::with_capacity(e.len() + o.len());
                for (a, b) in e.iter().zip(o.iter()) {
                    row.push(*a);
                    row.push(*b);
                }
                row
            })
            .collect(),
        Axis::Freq => {
            let mut out = Vec::with_capacity(even.len() + odd.len());
            for (e, o) in even.iter().zip(odd.iter()) {
                out.push(e.clone());
                out.push(o.clone());
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `[n_mels][frames]` ramp where cell (m, t) = m * 1000 + t.
    fn ramp(n_mels: usize, frames: usize) -> Spectrogram {
        (0..n_mels)
            .map(|m| (0..frames).map(|t| (m * 1000 + t) as f32).collect())
            .collect()
    }

    #[test]
    fn divide_interleave_roundtrip() {
        let mel = ramp(4, 8);
        for axis in [Axis::Time, Axis::Freq] {
            let (even, odd) = divide(&mel, axis);
            assert_eq!(interleave(&even, &odd, axis), mel);
        }
    }

    #[test]
    fn source_and_target_have_equal_shape() {
        let util = TierUtil::new(6, 8).unwrap();
        let mel = ramp(8, 64);
        for tier in 2..=6 {
            let (source, target) = util.cut_divide_tiers(&mel, tier).unwrap();
            assert_eq!(source.len(), target.len(), "tier {tier} mel bins");
            assert_eq!(source[0].len(), target[0].len(), "tier {tier} frames");
        }
    }

    #[test]
    fn tier_one_is_coarsest_pair() {
        let util = TierUtil::new(6, 8).unwrap();
        let mel = ramp(8, 64);
        let (source, target) = util.cut_divide_tiers(&mel, 1).unwrap();
        assert_eq!(source, target);
        // 6 tiers: 3 time divisions, 2 freq divisions.
        assert_eq!(target.len(), 8 / 4);
        assert_eq!(target[0].len(), 64 / 8);
    }

    #[test]
    fn top_division_reconstructs_input() {
        // With 2 tiers there is exactly one division (along time).
        let util = TierUtil::new(2, 4).unwrap();
        let mel = ramp(4, 10);
        let (source, target) = util.cut_divide_tiers(&mel, 2).unwrap();
        assert_eq!(interleave(&source, &target, Axis::Time), mel);
    }

    #[test]
    fn time_axis_is_trimmed() {
        let util = TierUtil::new(6, 8).unwrap();
        // 67 frames -> trimmed to 64 (multiple of 2^3).
        let mel = ramp(8, 67);
        let (_, target) = util.cut_divide_tiers(&mel, 1).unwrap();
        assert_eq!(target[0].len(), 8);
    }

    #[test]
    fn invalid_construction_rejected() {
        assert!(TierUtil::new(0, 8).is_err());
        // 6 tiers -> 2 freq divisions -> n_mels must divide by 4.
        assert!(TierUtil::new(6, 6).is_err());
        let util = TierUtil::new(6, 8).unwrap();
        assert!(util.cut_divide_tiers(&ramp(8, 64), 0).is_err());
        assert!(util.cut_divide_tiers(&ramp(8, 64), 7).is_err());
        assert!(util.cut_divide_tiers(&Vec::new(), 1).is_err());
    }
}
