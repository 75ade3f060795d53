//! Normalized mel spectrogram computation via STFT + mel filterbank.
//!
//! - Window: Hann, reflect padding applied manually
//! - Filterbank: Slaney scale/norm
//! - Compression: `ln(clamp(mel, min=1e-5))`
//! - Normalization: affine map of the `ln(1e-5)` floor to 0.0, clamped to [0, 1]
//!
//! The normalized range matters: the model's output head places a bounded
//! mixture distribution over spectrogram values, so every target bin must
//! land in [0, 1].

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::config::AudioConfig;

const LOG_FLOOR: f64 = -11.512925464970229; // ln(1e-5)

/// Mel spectrogram processor.
///
/// Pre-computes the Hann window, FFT plan, and mel filterbank on
/// construction. [`MelGen::get_normalized_mel`] is a deterministic, pure
/// function of the input samples.
pub struct MelGen {
    config: AudioConfig,
    window: Vec<f64>,
    filterbank: Vec<Vec<f64>>,
    fft: std::sync::Arc<dyn rustfft::Fft<f64>>,
}

impl MelGen {
    pub fn new(config: AudioConfig) -> Self {
        let window = hann_window(config.win_length);
        let filterbank = mel_filterbank(
            config.n_fft,
            config.n_mels,
            config.sample_rate,
            config.f_min,
            config.f_max,
        );
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Self {
            config,
            window,
            filterbank,
            fft,
        }
    }

    /// Compute a normalized log-mel spectrogram from raw mono audio.
    ///
    /// Input: mono samples at the configured sample rate.
    /// Output: `[n_mels][num_frames]`, every value in [0, 1].
    pub fn get_normalized_mel(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let samples_f64: Vec<f64> = samples.iter().map(|&s| s as f64).collect();

        let pad_left = (self.config.win_length - self.config.hop_length) / 2;
        let pad_right = (self.config.win_length - self.config.hop_length + 1) / 2;
        let padded = reflect_pad(&samples_f64, pad_left, pad_right);

        let magnitudes = self.stft(&padded);

        let num_frames = magnitudes.len();
        let mut mel_spec = vec![vec![0.0f32; num_frames]; self.config.n_mels];

        for (frame_idx, frame_magnitudes) in magnitudes.iter().enumerate() {
            for (mel_idx, filter) in self.filterbank.iter().enumerate() {
                let mut sum = 0.0;
                for (bin_idx, &weight) in filter.iter().enumerate() {
                    if weight > 0.0 {
                        sum += weight * frame_magnitudes[bin_idx];
                    }
                }
                let log_mel = sum.max(1e-5).ln();
                // Map [ln(1e-5), 0] onto [0, 1]; energies above unit clamp at 1.
                let normalized = (log_mel - LOG_FLOOR) / -LOG_FLOOR;
                mel_spec[mel_idx][frame_idx] = normalized.clamp(0.0, 1.0) as f32;
            }
        }

        mel_spec
    }

    /// Short-time Fourier transform. Returns magnitude spectra per frame,
    /// each with `n_fft/2 + 1` one-sided bins.
    fn stft(&self, padded: &[f64]) -> Vec<Vec<f64>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let num_bins = n_fft / 2 + 1;

        let num_frames = (padded.len().saturating_sub(n_fft)) / hop + 1;
        let mut frames = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;
            let end = start + n_fft;
            if end > padded.len() {
                break;
            }

            let mut buffer: Vec<Complex<f64>> = (0..n_fft)
                .map(|i| Complex::new(padded[start + i] * self.window[i], 0.0))
                .collect();

            self.fft.process(&mut buffer);

            let magnitudes: Vec<f64> = buffer[..num_bins]
                .iter()
                .map(|c| (c.re * c.re + c.im * c.im + 1e-6).sqrt())
                .collect();

            frames.push(magnitudes);
        }

        frames
    }
}

/// Generate a Hann window of the given length.
fn hann_window(length: usize) -> Vec<f64> {
    (0..length)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / length as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Reflect-pad a signal on both sides.
fn reflect_pad(signal: &[f64], pad_left: usize, pad_right: usize) -> Vec<f64> {
    let len = signal.len();
    let total = pad_left + len + pad_right;
    let mut padded = Vec::with_capacity(total);

    for i in (1..=pad_left).rev() {
        padded.push(signal[i.min(len - 1)]);
    }

    padded.extend_from_slice(signal);

    for i in 0..pad_right {
        let idx = len.saturating_sub(2 + i);
        padded.push(signal[idx]);
    }

    padded
}

/// Build a Slaney-normalized mel filterbank.
///
/// Returns `n_mels` filters, each with `n_fft/2 + 1` weights.
fn mel_filterbank(
    n_fft: usize,
    n_mels: usize,
    sample_rate: u32,
    f_min: f64,
    f_max: f64,
) -> Vec<Vec<f64>> {
    let num_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let mel_min = hz_to_mel_slaney(f_min);
    let mel_max = hz_to_mel_slaney(f_max);

    let mel_points: Vec<f64> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64)
        .collect();

    let hz_points: Vec<f64> = mel_points.iter().map(|&m| mel_to_hz_slaney(m)).collect();

    let bin_freqs: Vec<f64> = (0..num_bins)
        .map(|i| sr * i as f64 / n_fft as f64)
        .collect();

    let mut filters = Vec::with_capacity(n_mels);

    for i in 0..n_mels {
        let f_left = hz_points[i];
        let f_center = hz_points[i + 1];
        let f_right = hz_points[i + 2];

        // Slaney normalization: 2 / (f_right - f_left)
        let norm = 2.0 / (f_right - f_left);

        let filter: Vec<f64> = bin_freqs
            .iter()
            .map(|&f| {
                if f < f_left || f > f_right {
                    0.0
                } else if f <= f_center {
                    norm * (f - f_left) / (f_center - f_left)
                } else {
                    norm * (f_right - f) / (f_right - f_center)
                }
            })
            .collect();

        filters.push(filter);
    }

    filters
}

/// Convert frequency in Hz to Slaney mel scale.
///
/// Below 1000 Hz: linear (mel = 3 * f / 200).
/// Above 1000 Hz: logarithmic (mel = 15 + 27 * ln(f / 1000) / ln(6.4)).
fn hz_to_mel_slaney(hz: f64) -> f64 {
    if hz < 1000.0 {
        3.0 * hz / 200.0
    } else {
        15.0 + 27.0 * (hz / 1000.0).ln() / (6.4_f64).ln()
    }
}

/// Convert Slaney mel scale to frequency in Hz.
fn mel_to_hz_slaney(mel: f64) -> f64 {
    if mel < 15.0 {
        200.0 * mel / 3.0
    } else {
        1000.0 * ((mel - 15.0) * (6.4_f64).ln() / 27.0).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AudioConfig {
        AudioConfig::default()
    }

    #[test]
    fn mel_conversion_roundtrip() {
        let test_freqs = [40.0, 100.0, 440.0, 1000.0, 4000.0, 11025.0];
        for &freq in &test_freqs {
            let mel = hz_to_mel_slaney(freq);
            let back = mel_to_hz_slaney(mel);
            assert!(
                (freq - back).abs() < 0.01,
                "roundtrip failed for {freq} Hz: got {back}"
            );
        }
    }

    #[test]
    fn mel_1000hz_is_boundary() {
        let mel = hz_to_mel_slaney(1000.0);
        assert!(
            (mel - 15.0).abs() < 1e-10,
            "mel(1000 Hz) should be 15.0, got {mel}"
        );
    }

    #[test]
    fn hann_window_properties() {
        let w = hann_window(2048);
        assert_eq!(w.len(), 2048);
        assert!(w[0].abs() < 1e-10);
        assert!((w[1024] - 1.0).abs() < 1e-10);
        assert!((w[100] - w[2048 - 100]).abs() < 1e-10);
    }

    #[test]
    fn filterbank_shape_and_coverage() {
        let fb = mel_filterbank(2048, 256, 22050, 0.0, 11025.0);
        assert_eq!(fb.len(), 256);
        assert_eq!(fb[0].len(), 1025); // n_fft/2 + 1
        for (i, filter) in fb.iter().enumerate() {
            let sum: f64 = filter.iter().sum();
            assert!(sum > 0.0, "filter {i} is all zeros");
            for (j, &w) in filter.iter().enumerate() {
                assert!(w >= 0.0, "negative weight at mel={i}, bin={j}: {w}");
            }
        }
    }

    #[test]
    fn reflect_pad_basic() {
        let signal = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let padded = reflect_pad(&signal, 2, 2);
        assert_eq!(padded, vec![3.0, 2.0, 1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0]);
    }

    #[test]
    fn normalized_mel_shape_and_range() {
        let mel = MelGen::new(test_config());

        // 0.5 seconds of a 440 Hz sine at 22050 Hz.
        let samples: Vec<f32> = (0..11025)
            .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 22050.0).sin() as f32)
            .collect();
        let spec = mel.get_normalized_mel(&samples);

        assert_eq!(spec.len(), 256, "should have 256 mel bins");
        let num_frames = spec[0].len();
        assert!(num_frames > 30, "expected >30 frames, got {num_frames}");
        assert!(spec.iter().all(|row| row.len() == num_frames));

        let mut min_val = f32::INFINITY;
        let mut max_val = f32::NEG_INFINITY;
        for row in &spec {
            for &v in row {
                assert!((0.0..=1.0).contains(&v), "value {v} out of [0,1]");
                min_val = min_val.min(v);
                max_val = max_val.max(v);
            }
        }
        assert!(max_val > min_val, "sine wave should produce variation");
    }

    #[test]
    fn silence_maps_to_floor() {
        let mel = MelGen::new(test_config());
        let spec = mel.get_normalized_mel(&vec![0.0f32; 11025]);
        // With zero input every bin sits at (or just above) the log floor.
        for row in &spec {
            for &v in row {
                assert!(v < 0.3, "silence bin unexpectedly energetic: {v}");
            }
        }
    }
}
