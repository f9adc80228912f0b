use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fft::power_spectrum;
use super::math::{frame_starts, rms, zero_crossing_rate};
use crate::pronunciation::{FeatureFrame, IntensityFrame};

pub const DEFAULT_INTENSITY_FRAME: usize = 2048;
pub const DEFAULT_INTENSITY_HOP: usize = 512;
/// Share of the spectrum (from DC) counted as "low" when computing spectral tilt.
pub const TILT_SPLIT: f64 = 0.3;
pub const PEAK_NEIGHBORHOOD: usize = 3;
/// Peaks must reach this fraction of the track maximum.
pub const PEAK_MIN_HEIGHT: f64 = 0.35;
const ENERGY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntensityConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub tilt_split: f64,
    pub peak_neighborhood: usize,
    pub peak_min_height: f64,
}

impl Default for IntensityConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_INTENSITY_FRAME,
            hop_size: DEFAULT_INTENSITY_HOP,
            tilt_split: TILT_SPLIT,
            peak_neighborhood: PEAK_NEIGHBORHOOD,
            peak_min_height: PEAK_MIN_HEIGHT,
        }
    }
}

/// A local maximum of the intensity envelope, used as a syllable-stress proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub index: usize,
    pub time: f64,
    /// Relative to the strongest frame of the track, so in `0..=1`.
    pub height: f64,
}

#[derive(Debug, Clone, Default)]
pub struct IntensityAnalyzer {
    config: IntensityConfig,
}

impl IntensityAnalyzer {
    pub fn new(config: IntensityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntensityConfig {
        &self.config
    }

    /// RMS energy per frame.
    pub fn extract_intensity(&self, samples: &[f64], sample_rate: f64) -> Vec<IntensityFrame> {
        self.per_frame(samples, sample_rate, rms)
    }

    pub fn extract_zcr(&self, samples: &[f64], sample_rate: f64) -> Vec<FeatureFrame<f64>> {
        self.per_frame(samples, sample_rate, zero_crossing_rate)
    }

    /// Low-band over high-band spectral energy. Zero for silent frames.
    pub fn extract_spectral_tilt(&self, samples: &[f64], sample_rate: f64) -> Vec<FeatureFrame<f64>> {
        let split = self.config.tilt_split;
        self.per_frame(samples, sample_rate, |frame| spectral_tilt(frame, split))
    }

    pub fn find_peaks(&self, track: &[IntensityFrame]) -> Vec<Peak> {
        let peaks = find_peaks(track, self.config.peak_neighborhood, self.config.peak_min_height);
        debug!(frames = track.len(), peaks = peaks.len(), "stress peaks detected");
        peaks
    }

    fn per_frame(
        &self,
        samples: &[f64],
        sample_rate: f64,
        measure: impl Fn(&[f64]) -> f64,
    ) -> Vec<FeatureFrame<f64>> {
        let size = self.config.frame_size;
        frame_starts(samples.len(), size, self.config.hop_size)
            .map(|start| FeatureFrame {
                time: start as f64 / sample_rate,
                value: measure(&samples[start..start + size]),
            })
            .collect()
    }
}

pub fn spectral_tilt(frame: &[f64], split: f64) -> f64 {
    let power = power_spectrum(frame);
    let boundary = ((power.len() as f64 * split).round() as usize).min(power.len());
    let low: f64 = power[..boundary].iter().sum();
    let high: f64 = power[boundary..].iter().sum();
    if low + high <= ENERGY_EPSILON {
        return 0.0;
    }
    low / high.max(ENERGY_EPSILON)
}

/// Frames that are the maximum of their `+-neighborhood` window (strictly above
/// earlier neighbours, so plateaus yield one peak) and reach `min_height` of the
/// track maximum. A silent track has no peaks.
pub fn find_peaks(track: &[IntensityFrame], neighborhood: usize, min_height: f64) -> Vec<Peak> {
    let max = track.iter().map(|frame| frame.value).fold(0.0, f64::max);
    if max <= ENERGY_EPSILON {
        return Vec::new();
    }
    let threshold = min_height * max;
    (0..track.len())
        .filter(|&i| {
            let value = track[i].value;
            let start = i.saturating_sub(neighborhood);
            let end = (i + neighborhood + 1).min(track.len());
            value >= threshold
                && track[start..i].iter().all(|f| f.value < value)
                && track[i + 1..end].iter().all(|f| f.value <= value)
        })
        .map(|i| Peak {
            index: i,
            time: track[i].time,
            height: track[i].value / max,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn track(values: &[f64]) -> Vec<IntensityFrame> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| FeatureFrame {
                time: i as f64 * 0.01,
                value,
            })
            .collect()
    }

    #[test]
    fn finds_separated_peaks_above_threshold() {
        let envelope = track(&[0.0, 0.2, 1.0, 0.3, 0.1, 0.0, 0.1, 0.2, 0.6, 0.2, 0.0, 0.3, 0.1]);
        let peaks = find_peaks(&envelope, 3, 0.35);
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![2, 8]);
        assert_abs_diff_eq!(peaks[1].height, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn plateau_counts_once() {
        let peaks = find_peaks(&track(&[0.0, 1.0, 1.0, 0.0]), 3, 0.35);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 1);
    }

    #[test]
    fn silence_has_no_peaks_and_zero_tilt() {
        assert!(find_peaks(&track(&[0.0; 10]), 3, 0.35).is_empty());
        assert_eq!(spectral_tilt(&[0.0; 256], TILT_SPLIT), 0.0);
    }

    #[test]
    fn low_tone_tilts_low() {
        let rate = 8000.0;
        let tone: Vec<f64> = (0..1024)
            .map(|i| (2.0 * std::f64::consts::PI * 200.0 * i as f64 / rate).sin())
            .collect();
        assert!(spectral_tilt(&tone, TILT_SPLIT) > 10.0);
    }

    #[test]
    fn intensity_frames_follow_hop() {
        let analyzer = IntensityAnalyzer::new(IntensityConfig {
            frame_size: 4,
            hop_size: 2,
            ..IntensityConfig::default()
        });
        let frames = analyzer.extract_intensity(&[1.0; 10], 100.0);
        assert_eq!(frames.len(), 4);
        assert_abs_diff_eq!(frames[1].time, 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(frames[3].value, 1.0, epsilon = 1e-12);
    }
}
