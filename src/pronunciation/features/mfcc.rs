use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

use super::fft::{apply_filterbank, create_mel_filterbank, next_power_of_two, power_spectrum};
use super::math::{frame_starts, hamming_window, pre_emphasis};
use crate::pronunciation::MfccTrack;

pub const DEFAULT_MFCC_FRAME: usize = 2048;
/// Short hop for isolated-word recordings, which yield few frames otherwise.
pub const DEFAULT_MFCC_HOP: usize = 128;
pub const DEFAULT_MEL_FILTERS: usize = 60;
pub const DEFAULT_MFCC_COEFFS: usize = 13;
pub const DEFAULT_MIN_MEL_HZ: f64 = 100.0;
pub const DEFAULT_MAX_MEL_HZ: f64 = 8000.0;
pub const DEFAULT_LIFTER: usize = 22;
pub const DEFAULT_DELTA_WINDOW: usize = 2;
const LOG_FLOOR: f64 = 1e-10;
const NORM_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MfccConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    #[serde(alias = "numMelFilters")]
    pub num_filters: usize,
    #[serde(alias = "numMFCCCoeffs")]
    pub num_coeffs: usize,
    pub min_freq: f64,
    pub max_freq: f64,
    #[serde(alias = "preEmphasisAlpha")]
    pub pre_emphasis: f64,
    /// Cepstral lifter length `L`; zero disables liftering.
    pub lifter: usize,
    pub delta_window: usize,
    /// Subtract the per-coefficient track mean from coefficients `1..`.
    pub mean_normalize: bool,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_MFCC_FRAME,
            hop_size: DEFAULT_MFCC_HOP,
            num_filters: DEFAULT_MEL_FILTERS,
            num_coeffs: DEFAULT_MFCC_COEFFS,
            min_freq: DEFAULT_MIN_MEL_HZ,
            max_freq: DEFAULT_MAX_MEL_HZ,
            pre_emphasis: 0.97,
            lifter: DEFAULT_LIFTER,
            delta_window: DEFAULT_DELTA_WINDOW,
            mean_normalize: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MfccAnalyzer {
    config: MfccConfig,
}

impl MfccAnalyzer {
    pub fn new(config: MfccConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, samples: &[f64], sample_rate: f64) -> MfccTrack {
        let cfg = &self.config;
        let fft_size = next_power_of_two(cfg.frame_size);
        let max_freq = cfg.max_freq.min(sample_rate / 2.0);
        let filterbank = create_mel_filterbank(
            cfg.num_filters,
            fft_size,
            sample_rate,
            cfg.min_freq,
            max_freq,
            true,
        );
        if filterbank.is_empty() || samples.len() < cfg.frame_size {
            warn!(
                samples = samples.len(),
                frame_size = cfg.frame_size,
                "no MFCC frames could be computed"
            );
            return MfccTrack::empty(cfg.num_coeffs);
        }

        let window = hamming_window(cfg.frame_size);
        let lifter = lifter_weights(cfg.num_coeffs, cfg.lifter);
        let mut times = Vec::new();
        let mut flat = Vec::new();
        for start in frame_starts(samples.len(), cfg.frame_size, cfg.hop_size) {
            let emphasized = pre_emphasis(&samples[start..start + cfg.frame_size], cfg.pre_emphasis);
            let windowed: Vec<f64> = emphasized.iter().zip(&window).map(|(s, w)| s * w).collect();
            let energies = apply_filterbank(&power_spectrum(&windowed), &filterbank);
            let log_energies: Vec<f64> = energies.iter().map(|e| (e + LOG_FLOOR).ln()).collect();
            let cepstrum = dct_ii(&log_energies, cfg.num_coeffs);
            flat.extend(cepstrum.iter().zip(&lifter).map(|(c, l)| c * l));
            times.push(start as f64 / sample_rate);
        }

        let mut coeffs = Array2::from_shape_vec((times.len(), cfg.num_coeffs), flat)
            .unwrap_or_else(|_| Array2::zeros((0, cfg.num_coeffs)));
        if cfg.mean_normalize {
            cepstral_mean_normalize(&mut coeffs);
        }
        let deltas = compute_delta_matrix(&coeffs, cfg.delta_window);
        let delta_deltas = compute_delta_matrix(&deltas, cfg.delta_window);
        debug!(frames = times.len(), coeffs = cfg.num_coeffs, "mfcc track extracted");
        MfccTrack {
            times,
            coeffs,
            deltas,
            delta_deltas,
        }
    }
}

/// DCT-II of `input`, keeping the first `num_coeffs` terms, scaled by `sqrt(2 / M)`.
pub fn dct_ii(input: &[f64], num_coeffs: usize) -> Vec<f64> {
    let m = input.len();
    if m == 0 {
        return vec![0.0; num_coeffs];
    }
    let scale = (2.0 / m as f64).sqrt();
    (0..num_coeffs)
        .map(|n| {
            scale
                * input
                    .iter()
                    .enumerate()
                    .map(|(k, value)| value * (PI * n as f64 * (k as f64 + 0.5) / m as f64).cos())
                    .sum::<f64>()
        })
        .collect()
}

/// Sinusoidal lifter `1 + (L / 2) sin(pi n / L)`.
pub fn lifter_weights(num_coeffs: usize, lifter: usize) -> Vec<f64> {
    if lifter == 0 {
        return vec![1.0; num_coeffs];
    }
    let l = lifter as f64;
    (0..num_coeffs)
        .map(|n| 1.0 + (l / 2.0) * (PI * n as f64 / l).sin())
        .collect()
}

/// Subtracts each column mean from coefficients `1..`. Coefficient 0 keeps the
/// absolute log energy.
pub fn cepstral_mean_normalize(coeffs: &mut Array2<f64>) {
    if coeffs.nrows() == 0 {
        return;
    }
    for mut column in coeffs.axis_iter_mut(Axis(1)).skip(1) {
        let mean = column.mean().unwrap_or(0.0);
        column.mapv_inplace(|v| v - mean);
    }
}

/// Regression deltas over `+-window` frames, clamping at the track edges.
pub fn compute_delta_matrix(input: &Array2<f64>, window: usize) -> Array2<f64> {
    let (frames, coeffs) = input.dim();
    if frames == 0 || window == 0 {
        return Array2::zeros((frames, coeffs));
    }
    let denominator = 2.0 * (1..=window).map(|n| (n * n) as f64).sum::<f64>();
    let mut output = Array2::zeros((frames, coeffs));
    for t in 0..frames {
        let mut numerator = Array1::zeros(coeffs);
        for n in 1..=window {
            let prev = input.row(t.saturating_sub(n));
            let next = input.row((t + n).min(frames - 1));
            numerator += &((&next - &prev) * n as f64);
        }
        output.row_mut(t).assign(&(numerator / denominator));
    }
    output
}

/// `1 - cos(a, b)`; zero-norm vectors count as maximally distant.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a < NORM_EPSILON || norm_b < NORM_EPSILON {
        return 1.0;
    }
    1.0 - (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn dct_of_constant_has_only_dc() {
        let out = dct_ii(&[2.0; 8], 4);
        assert_abs_diff_eq!(out[0], 0.5 * 16.0, epsilon = 1e-9);
        for value in &out[1..] {
            assert_abs_diff_eq!(*value, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn lifter_leaves_c0_untouched() {
        let weights = lifter_weights(13, 22);
        assert_abs_diff_eq!(weights[0], 1.0, epsilon = 1e-12);
        assert!(weights[1..].iter().all(|w| *w > 1.0));
    }

    #[test]
    fn delta_of_linear_ramp_is_slope() {
        let input = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let deltas = compute_delta_matrix(&input, 2);
        assert_abs_diff_eq!(deltas[[3, 0]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn cmn_skips_energy_coefficient() {
        let mut coeffs = array![[5.0, 1.0], [7.0, 3.0]];
        cepstral_mean_normalize(&mut coeffs);
        assert_eq!(coeffs, array![[5.0, -1.0], [7.0, 1.0]]);
    }

    #[test]
    fn distance_helpers() {
        assert_abs_diff_eq!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cosine_distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(euclidean_distance(&[0.0, 3.0], &[4.0, 0.0]), 5.0, epsilon = 1e-12);
    }
}
