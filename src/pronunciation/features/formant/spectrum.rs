//! LPC envelope and peak picking, used when pole recovery yields too few formants.

use std::f64::consts::PI;

use crate::pronunciation::features::math::{c_abs, c_add, c_from_polar, c_mul, complex};

pub const DEFAULT_SPECTRUM_POINTS: usize = 512;
/// Peak thresholds as fractions of the log-envelope range, tried from strictest down.
const PEAK_THRESHOLDS: [f64; 4] = [0.5, 0.3, 0.15, 0.0];
const WANTED_PEAKS: usize = 3;
const ENVELOPE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct LpcSpectrum {
    pub frequencies: Vec<f64>,
    /// `gain / |A(e^{jw})|`.
    pub magnitudes: Vec<f64>,
}

/// Evaluates the all-pole envelope on `num_points` frequencies from DC up to (excluding)
/// Nyquist.
pub fn compute_lpc_spectrum(
    coefficients: &[f64],
    gain: f64,
    num_points: usize,
    sample_rate: f64,
) -> LpcSpectrum {
    let (frequencies, magnitudes) = (0..num_points)
        .map(|k| {
            let omega = PI * k as f64 / num_points as f64;
            let response = coefficients
                .iter()
                .enumerate()
                .fold(complex(0.0, 0.0), |acc, (power, &coeff)| {
                    c_add(acc, c_mul(complex(coeff, 0.0), c_from_polar(1.0, -omega * power as f64)))
                });
            let magnitude = gain / c_abs(response).max(ENVELOPE_EPSILON);
            (omega * sample_rate / (2.0 * PI), magnitude)
        })
        .unzip();
    LpcSpectrum {
        frequencies,
        magnitudes,
    }
}

/// Local maxima of the log envelope with parabolic sub-bin refinement, in ascending
/// frequency. Thresholds relax until at least three peaks appear.
pub fn pick_peaks(spectrum: &LpcSpectrum, sample_rate: f64) -> Vec<f64> {
    let n = spectrum.magnitudes.len();
    if n < 3 {
        return Vec::new();
    }
    let log: Vec<f64> = spectrum
        .magnitudes
        .iter()
        .map(|m| m.max(ENVELOPE_EPSILON).ln())
        .collect();
    let floor = log.iter().copied().fold(f64::INFINITY, f64::min);
    let ceiling = log.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = ceiling - floor;
    if range <= 0.0 || !range.is_finite() {
        return Vec::new();
    }
    let bin_hz = sample_rate / (2.0 * n as f64);

    let mut peaks = Vec::new();
    for threshold in PEAK_THRESHOLDS {
        let level = floor + threshold * range;
        peaks = (1..n - 1)
            .filter(|&i| log[i] > log[i - 1] && log[i] >= log[i + 1] && log[i] >= level)
            .map(|i| (i as f64 + parabolic_offset(log[i - 1], log[i], log[i + 1])) * bin_hz)
            .collect();
        if peaks.len() >= WANTED_PEAKS {
            break;
        }
    }
    peaks
}

fn parabolic_offset(left: f64, centre: f64, right: f64) -> f64 {
    let denom = left - 2.0 * centre + right;
    if denom.abs() < ENVELOPE_EPSILON {
        0.0
    } else {
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Single resonance at `freq` with pole radius `r`.
    fn resonator(freq: f64, r: f64, sample_rate: f64) -> Vec<f64> {
        let theta = 2.0 * PI * freq / sample_rate;
        vec![1.0, -2.0 * r * theta.cos(), r * r]
    }

    #[test]
    fn envelope_peaks_at_resonance() {
        let rate = 10_000.0;
        let spectrum = compute_lpc_spectrum(&resonator(1200.0, 0.97, rate), 1.0, 512, rate);
        let peaks = pick_peaks(&spectrum, rate);
        assert_eq!(peaks.len(), 1);
        assert_abs_diff_eq!(peaks[0], 1200.0, epsilon = 15.0);
    }

    #[test]
    fn flat_envelope_has_no_peaks() {
        let spectrum = compute_lpc_spectrum(&[1.0], 1.0, 64, 8000.0);
        assert!(pick_peaks(&spectrum, 8000.0).is_empty());
    }
}
