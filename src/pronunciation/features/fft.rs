//! Radix-2 FFT, spectra, spectrograms and mel filterbanks.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

use super::math::{
    c_abs, c_add, c_from_polar, c_mul, c_sub, complex, frame_starts, hamming_window, hz_to_mel,
    mel_to_hz, Complex,
};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SPECTROGRAM_HOP: usize = 512;
/// Dynamic range kept by dB spectrograms before normalisation to `0..=1`.
pub const DB_FLOOR: f64 = 60.0;
pub const DEFAULT_ROLLOFF_FRACTION: f64 = 0.85;
const MAGNITUDE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpectrogramConfig {
    pub fft_size: usize,
    pub hop_size: usize,
    /// Upper frequency kept in linear-bin output; `None` keeps everything up to Nyquist.
    pub max_freq: Option<f64>,
    #[serde(alias = "useDB")]
    pub use_db: bool,
    pub use_mel: bool,
    pub num_mel_bins: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            hop_size: DEFAULT_SPECTROGRAM_HOP,
            max_freq: None,
            use_db: false,
            use_mel: false,
            num_mel_bins: 64,
        }
    }
}

/// Time x frequency magnitudes. Zero frames when the buffer was shorter than one FFT frame,
/// in which case `diagnostic` says so.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectrogram {
    pub times: Vec<f64>,
    /// Centre frequency of every column, in Hz.
    pub frequencies: Vec<f64>,
    pub values: Array2<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Spectrogram {
    pub fn frame_count(&self) -> usize {
        self.times.len()
    }

    fn empty(diagnostic: String) -> Self {
        Self {
            times: Vec::new(),
            frequencies: Vec::new(),
            values: Array2::zeros((0, 0)),
            diagnostic: Some(diagnostic),
        }
    }
}

pub fn next_power_of_two(len: usize) -> usize {
    len.max(1).next_power_of_two()
}

/// In-place iterative Cooley-Tukey. `buffer.len()` must be a power of two.
pub fn fft_in_place(buffer: &mut [Complex]) {
    let n = buffer.len();
    if n <= 1 {
        return;
    }
    debug_assert!(n.is_power_of_two(), "fft length {n} is not a power of two");

    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            buffer.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let step = c_from_polar(1.0, -2.0 * PI / len as f64);
        for start in (0..n).step_by(len) {
            let mut twiddle = complex(1.0, 0.0);
            for k in 0..len / 2 {
                let even = buffer[start + k];
                let odd = c_mul(buffer[start + k + len / 2], twiddle);
                buffer[start + k] = c_add(even, odd);
                buffer[start + k + len / 2] = c_sub(even, odd);
                twiddle = c_mul(twiddle, step);
            }
        }
        len <<= 1;
    }
}

/// Complex spectrum of `signal`, zero-padded to the next power of two.
pub fn complex_spectrum(signal: &[f64]) -> Vec<Complex> {
    let n = next_power_of_two(signal.len());
    let mut buffer: Vec<Complex> = signal.iter().map(|&s| complex(s, 0.0)).collect();
    buffer.resize(n, complex(0.0, 0.0));
    fft_in_place(&mut buffer);
    buffer
}

/// Magnitude spectrum of length `n / 2`, `n` being the padded FFT length.
pub fn compute_fft(signal: &[f64]) -> Vec<f64> {
    if signal.is_empty() {
        return Vec::new();
    }
    let spectrum = complex_spectrum(signal);
    let half = spectrum.len() / 2;
    spectrum[..half].iter().map(|&bin| c_abs(bin)).collect()
}

pub fn power_spectrum(signal: &[f64]) -> Vec<f64> {
    compute_fft(signal).into_iter().map(|m| m * m).collect()
}

/// Triangular filters with edges evenly spaced on the mel scale. Each filter spans
/// `num_bins` linear bins (bin `k` centred on `k * sample_rate / fft_size`). With
/// `area_normalize` each triangle is scaled by `2 / (right - left)` so filters of
/// different widths carry equal total weight.
pub fn create_mel_filterbank(
    num_filters: usize,
    fft_size: usize,
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
    area_normalize: bool,
) -> Vec<Vec<f64>> {
    let num_bins = fft_size / 2;
    if num_filters == 0 || num_bins == 0 || max_hz <= min_hz {
        return Vec::new();
    }
    let min_mel = hz_to_mel(min_hz);
    let max_mel = hz_to_mel(max_hz);
    let edges: Vec<f64> = (0..num_filters + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f64 / (num_filters + 1) as f64))
        .collect();
    let bin_hz = sample_rate / fft_size as f64;

    (0..num_filters)
        .map(|filter| {
            let (left, centre, right) = (edges[filter], edges[filter + 1], edges[filter + 2]);
            let scale = if area_normalize {
                2.0 / (right - left)
            } else {
                1.0
            };
            (0..num_bins)
                .map(|bin| {
                    let freq = bin as f64 * bin_hz;
                    let weight = if freq > left && freq <= centre {
                        (freq - left) / (centre - left)
                    } else if freq > centre && freq < right {
                        (right - freq) / (right - centre)
                    } else {
                        0.0
                    };
                    weight * scale
                })
                .collect()
        })
        .collect()
}

/// Projects a linear spectrum through a filterbank.
pub fn apply_filterbank(spectrum: &[f64], filterbank: &[Vec<f64>]) -> Vec<f64> {
    filterbank
        .iter()
        .map(|filter| filter.iter().zip(spectrum).map(|(w, s)| w * s).sum())
        .collect()
}

/// Sliding Hamming-windowed magnitude spectra.
pub fn compute_spectrogram(
    samples: &[f64],
    sample_rate: f64,
    config: &SpectrogramConfig,
) -> Spectrogram {
    let fft_size = next_power_of_two(config.fft_size);
    if samples.len() < fft_size {
        let message = format!(
            "buffer of {} samples is shorter than one {fft_size}-sample FFT frame",
            samples.len()
        );
        warn!(samples = samples.len(), fft_size, "spectrogram skipped");
        return Spectrogram::empty(message);
    }

    let window = hamming_window(fft_size);
    let bin_hz = sample_rate / fft_size as f64;
    let nyquist = sample_rate / 2.0;
    let max_freq = config.max_freq.unwrap_or(nyquist).min(nyquist);
    let kept_bins = ((max_freq / bin_hz).floor() as usize + 1).min(fft_size / 2);
    let filterbank = config.use_mel.then(|| {
        create_mel_filterbank(config.num_mel_bins, fft_size, sample_rate, 0.0, max_freq, true)
    });

    let mut times = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for start in frame_starts(samples.len(), fft_size, config.hop_size) {
        let frame: Vec<f64> = samples[start..start + fft_size]
            .iter()
            .zip(&window)
            .map(|(s, w)| s * w)
            .collect();
        let magnitude = compute_fft(&frame);
        let row = match &filterbank {
            Some(bank) => apply_filterbank(&magnitude, bank),
            None => magnitude[..kept_bins].to_vec(),
        };
        times.push(start as f64 / sample_rate);
        rows.push(row);
    }

    let frequencies: Vec<f64> = match &filterbank {
        Some(bank) => {
            let max_mel = hz_to_mel(max_freq);
            (1..=bank.len())
                .map(|i| mel_to_hz(max_mel * i as f64 / (bank.len() + 1) as f64))
                .collect()
        }
        None => (0..kept_bins).map(|bin| bin as f64 * bin_hz).collect(),
    };

    if config.use_db {
        to_normalized_db(&mut rows);
    }

    let cols = frequencies.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let values = Array2::from_shape_vec((times.len(), cols), flat)
        .unwrap_or_else(|_| Array2::zeros((0, cols)));
    debug!(frames = times.len(), bins = cols, "spectrogram computed");
    Spectrogram {
        times,
        frequencies,
        values,
        diagnostic: None,
    }
}

/// Converts magnitudes to dB, clips everything below `max - DB_FLOOR` and maps onto `0..=1`.
fn to_normalized_db(rows: &mut [Vec<f64>]) {
    let mut peak = f64::NEG_INFINITY;
    for value in rows.iter_mut().flat_map(|row| row.iter_mut()) {
        *value = 20.0 * (*value + MAGNITUDE_EPSILON).log10();
        peak = peak.max(*value);
    }
    let floor = peak - DB_FLOOR;
    for value in rows.iter_mut().flat_map(|row| row.iter_mut()) {
        *value = ((*value - floor) / DB_FLOOR).clamp(0.0, 1.0);
    }
}

/// Magnitude-weighted mean frequency of a spectrum of `fft_size / 2` bins.
pub fn spectral_centroid(magnitude: &[f64], sample_rate: f64, fft_size: usize) -> f64 {
    let bin_hz = sample_rate / fft_size as f64;
    let total: f64 = magnitude.iter().sum();
    if total <= MAGNITUDE_EPSILON {
        return 0.0;
    }
    magnitude
        .iter()
        .enumerate()
        .map(|(bin, m)| bin as f64 * bin_hz * m)
        .sum::<f64>()
        / total
}

/// Frequency below which `fraction` of the spectral energy lies.
pub fn spectral_rolloff(magnitude: &[f64], sample_rate: f64, fft_size: usize, fraction: f64) -> f64 {
    let bin_hz = sample_rate / fft_size as f64;
    let total: f64 = magnitude.iter().map(|m| m * m).sum();
    if total <= MAGNITUDE_EPSILON {
        return 0.0;
    }
    let target = total * fraction;
    let mut cumulative = 0.0;
    for (bin, m) in magnitude.iter().enumerate() {
        cumulative += m * m;
        if cumulative >= target {
            return bin as f64 * bin_hz;
        }
    }
    (magnitude.len().saturating_sub(1)) as f64 * bin_hz
}

/// Half-wave rectified L2 difference between consecutive spectra.
pub fn spectral_flux(previous: &[f64], current: &[f64]) -> f64 {
    current
        .iter()
        .zip(previous)
        .map(|(curr, prev)| (curr - prev).max(0.0).powi(2))
        .sum::<f64>()
        .sqrt()
}
