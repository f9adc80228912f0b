use serde::{Deserialize, Serialize};
use tracing::debug;

use super::math::{frame_starts, median};
use crate::pronunciation::PitchFrame;

pub const DEFAULT_MIN_PITCH_HZ: f64 = 75.0;
pub const DEFAULT_MAX_PITCH_HZ: f64 = 500.0;
pub const DEFAULT_PITCH_FRAME: usize = 2048;
pub const DEFAULT_PITCH_HOP: usize = 256;
/// Frames whose best normalised correlation falls below this are unvoiced.
pub const VOICING_THRESHOLD: f64 = 0.2;
/// Interpolated peaks this close to the highest one count as tied; the shortest tied lag
/// is the period.
const PERIOD_TIE_TOLERANCE: f64 = 0.01;
const OCTAVE_UPPER_RATIO: f64 = 1.5;
const OCTAVE_LOWER_RATIO: f64 = 0.67;
const SMOOTHING_WINDOW: usize = 5;
const ENERGY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PitchConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_pitch: f64,
    pub max_pitch: f64,
    pub voicing_threshold: f64,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_PITCH_FRAME,
            hop_size: DEFAULT_PITCH_HOP,
            min_pitch: DEFAULT_MIN_PITCH_HZ,
            max_pitch: DEFAULT_MAX_PITCH_HZ,
            voicing_threshold: VOICING_THRESHOLD,
        }
    }
}

/// Summary statistics over the voiced part of a pitch track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchStatistics {
    pub voiced_frames: usize,
    pub voiced_percentage: f64,
    pub mean_hz: Option<f64>,
    pub min_hz: Option<f64>,
    pub max_hz: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PitchAnalyzer {
    config: PitchConfig,
}

impl PitchAnalyzer {
    pub fn new(config: PitchConfig) -> Self {
        Self { config }
    }

    /// Raw per-frame estimates followed by the cleaning pipeline.
    pub fn analyze(&self, samples: &[f64], sample_rate: f64) -> Vec<PitchFrame> {
        let raw = self.estimate_frames(samples, sample_rate);
        let pitches: Vec<f64> = raw.iter().map(|frame| frame.pitch_hz).collect();
        let cleaned = clean_pitch_track(&pitches);
        let frames: Vec<PitchFrame> = raw
            .iter()
            .zip(cleaned)
            .map(|(frame, pitch_hz)| PitchFrame { pitch_hz, ..*frame })
            .collect();
        debug!(
            frames = frames.len(),
            voiced = frames.iter().filter(|f| f.is_voiced()).count(),
            "pitch track extracted"
        );
        frames
    }

    /// Per-frame autocorrelation estimates, without any cross-frame cleaning.
    pub fn estimate_frames(&self, samples: &[f64], sample_rate: f64) -> Vec<PitchFrame> {
        let cfg = &self.config;
        let min_lag = (sample_rate / cfg.max_pitch).floor().max(1.0) as usize;
        let max_lag = (sample_rate / cfg.min_pitch).ceil() as usize;
        frame_starts(samples.len(), cfg.frame_size, cfg.hop_size)
            .map(|start| {
                let frame = &samples[start..start + cfg.frame_size];
                let (pitch_hz, confidence) = estimate_frame_pitch(
                    frame,
                    sample_rate,
                    min_lag,
                    max_lag,
                    cfg.voicing_threshold,
                );
                PitchFrame {
                    time: start as f64 / sample_rate,
                    pitch_hz,
                    confidence,
                }
            })
            .collect()
    }
}

/// Returns `(pitch_hz, confidence)`; pitch is zero for unvoiced frames.
fn estimate_frame_pitch(
    frame: &[f64],
    sample_rate: f64,
    min_lag: usize,
    max_lag: usize,
    threshold: f64,
) -> (f64, f64) {
    let max_lag = max_lag.min(frame.len().saturating_sub(2));
    if min_lag >= max_lag {
        return (0.0, 0.0);
    }
    // Index 0 holds lag `min_lag - 1` so every candidate lag has a left neighbour.
    let correlations: Vec<f64> = (min_lag - 1..=max_lag + 1)
        .map(|lag| normalized_autocorrelation(frame, lag))
        .collect();
    let at = |lag: usize| correlations[lag + 1 - min_lag];

    let Some((best_lag, best)) = (min_lag..=max_lag)
        .map(|lag| (lag, at(lag)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
    else {
        return (0.0, 0.0);
    };
    if !best.is_finite() || best < threshold {
        return (0.0, best.max(0.0).min(1.0));
    }

    // Multiples of the period peak as high as the period itself, so heights are compared
    // at the interpolated vertex and near-ties go to the shortest lag.
    let peaks: Vec<(usize, f64)> = (min_lag..=max_lag)
        .filter(|&lag| at(lag) >= at(lag - 1) && at(lag) >= at(lag + 1))
        .map(|lag| (lag, peak_height(at(lag - 1), at(lag), at(lag + 1))))
        .collect();
    let top = peaks.iter().map(|&(_, height)| height).fold(best, f64::max);
    let chosen = peaks
        .iter()
        .find(|&&(_, height)| top - height <= PERIOD_TIE_TOLERANCE)
        .map_or(best_lag, |&(lag, _)| lag);

    let refined = parabolic_offset(at(chosen - 1), at(chosen), at(chosen + 1));
    let period = chosen as f64 + refined;
    (sample_rate / period, best.clamp(0.0, 1.0))
}

fn normalized_autocorrelation(frame: &[f64], lag: usize) -> f64 {
    if lag >= frame.len() {
        return 0.0;
    }
    let head = &frame[..frame.len() - lag];
    let tail = &frame[lag..];
    let mut corr = 0.0;
    let mut energy_head = 0.0;
    let mut energy_tail = 0.0;
    for (a, b) in head.iter().zip(tail) {
        corr += a * b;
        energy_head += a * a;
        energy_tail += b * b;
    }
    let denom = (energy_head * energy_tail).sqrt();
    if denom < ENERGY_EPSILON {
        0.0
    } else {
        corr / denom
    }
}

/// Vertex height of the parabola through three equally spaced samples.
fn peak_height(left: f64, centre: f64, right: f64) -> f64 {
    centre - 0.25 * (left - right) * parabolic_offset(left, centre, right)
}

fn parabolic_offset(left: f64, centre: f64, right: f64) -> f64 {
    let denom = left - 2.0 * centre + right;
    if denom.abs() < ENERGY_EPSILON {
        0.0
    } else {
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    }
}

/// Cleaning passes, in order: boundary octave check, interior octave correction,
/// outlier interpolation, 5-point median smoothing, final outlier interpolation.
/// Octave correction has to precede smoothing, otherwise the median turns a genuine
/// octave jump into an unrecoverable in-between value.
pub fn clean_pitch_track(pitches: &[f64]) -> Vec<f64> {
    let mut track = pitches.to_vec();
    correct_boundary_octave(&mut track);
    correct_interior_octaves(&mut track);
    interpolate_outliers(&mut track);
    let mut track = median_smooth_voiced(&track, SMOOTHING_WINDOW);
    interpolate_outliers(&mut track);
    track
}

fn is_octave_jump(value: f64, reference: f64) -> bool {
    let ratio = value / reference;
    !(OCTAVE_LOWER_RATIO..=OCTAVE_UPPER_RATIO).contains(&ratio)
}

/// Halved or doubled `value`, whichever lands closest to `reference`, if that beats `value`.
fn octave_candidate(value: f64, reference: f64) -> Option<f64> {
    [value / 2.0, value * 2.0]
        .into_iter()
        .min_by(|a, b| (a - reference).abs().total_cmp(&(b - reference).abs()))
        .filter(|candidate| (candidate - reference).abs() < (value - reference).abs())
}

fn correct_boundary_octave(track: &mut [f64]) {
    if track.len() < 2 || track[0] <= 0.0 || track[1] <= 0.0 {
        return;
    }
    if is_octave_jump(track[0], track[1]) {
        if let Some(fixed) = octave_candidate(track[0], track[1]) {
            track[0] = fixed;
        }
    }
}

/// An interior voiced frame is corrected only when it sits an octave away from every
/// voiced neighbour, against the median of those neighbours. Frames are visited in
/// order, so a corrected frame becomes the left neighbour of the next one.
fn correct_interior_octaves(track: &mut [f64]) {
    for idx in 1..track.len().saturating_sub(1) {
        let value = track[idx];
        if value <= 0.0 {
            continue;
        }
        let neighbours: Vec<f64> = [track[idx - 1], track[idx + 1]]
            .into_iter()
            .filter(|&v| v > 0.0)
            .collect();
        if !neighbours.iter().all(|&n| is_octave_jump(value, n)) {
            continue;
        }
        let Some(local) = median(&neighbours) else {
            continue;
        };
        if let Some(fixed) = octave_candidate(value, local) {
            track[idx] = fixed;
        }
    }
}

/// Replaces single-step jumps relative to the previous frame with the midpoint of the
/// neighbours (or the previous value when the next frame is unvoiced).
fn interpolate_outliers(track: &mut [f64]) {
    for idx in 1..track.len().saturating_sub(1) {
        let (previous, value, next) = (track[idx - 1], track[idx], track[idx + 1]);
        if value <= 0.0 || previous <= 0.0 || !is_octave_jump(value, previous) {
            continue;
        }
        track[idx] = if next > 0.0 {
            (previous + next) / 2.0
        } else {
            previous
        };
    }
}

/// Median over the voiced frames inside the window; unvoiced frames stay at zero and
/// never pull voiced values down.
fn median_smooth_voiced(track: &[f64], window: usize) -> Vec<f64> {
    let radius = window / 2;
    (0..track.len())
        .map(|idx| {
            if track[idx] <= 0.0 {
                return 0.0;
            }
            let start = idx.saturating_sub(radius);
            let end = (idx + radius + 1).min(track.len());
            let voiced: Vec<f64> = track[start..end].iter().copied().filter(|&v| v > 0.0).collect();
            median(&voiced).unwrap_or(track[idx])
        })
        .collect()
}

pub fn pitch_statistics(frames: &[PitchFrame]) -> PitchStatistics {
    let voiced: Vec<f64> = frames
        .iter()
        .filter(|f| f.is_voiced())
        .map(|f| f.pitch_hz)
        .collect();
    if voiced.is_empty() {
        return PitchStatistics::default();
    }
    PitchStatistics {
        voiced_frames: voiced.len(),
        voiced_percentage: 100.0 * voiced.len() as f64 / frames.len() as f64,
        mean_hz: Some(voiced.iter().sum::<f64>() / voiced.len() as f64),
        min_hz: voiced.iter().copied().reduce(f64::min),
        max_hz: voiced.iter().copied().reduce(f64::max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn restores_single_frame_halving() {
        let track = [200.0, 200.0, 200.0, 100.0, 200.0, 200.0, 200.0];
        let cleaned = clean_pitch_track(&track);
        for value in cleaned {
            assert_abs_diff_eq!(value, 200.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn frames_beside_a_doubling_are_left_alone() {
        let mut track = [180.0, 182.0, 184.0, 372.0, 188.0, 190.0, 192.0];
        correct_interior_octaves(&mut track);
        assert_eq!(track[2], 184.0);
        assert_eq!(track[4], 188.0);
        assert_abs_diff_eq!(track[3], 186.0, epsilon = 1e-9);
    }

    #[test]
    fn shortest_of_tied_period_peaks_wins() {
        let rate = 16_000.0;
        let frame: Vec<f64> = (0..2048)
            .map(|i| (2.0 * PI * 200.0 * i as f64 / rate).sin())
            .collect();
        let (pitch, confidence) = estimate_frame_pitch(&frame, rate, 32, 214, VOICING_THRESHOLD);
        assert_abs_diff_eq!(pitch, 200.0, epsilon = 1.0);
        assert!(confidence > 0.99);
    }

    #[test]
    fn fixes_doubled_first_frame() {
        let track = [400.0, 200.0, 200.0, 200.0];
        let cleaned = clean_pitch_track(&track);
        assert_abs_diff_eq!(cleaned[0], 200.0, epsilon = 1e-9);
    }

    #[test]
    fn keeps_unvoiced_frames_at_zero() {
        let track = [0.0, 180.0, 182.0, 0.0, 0.0, 185.0, 0.0];
        let cleaned = clean_pitch_track(&track);
        assert_eq!(cleaned[0], 0.0);
        assert_eq!(cleaned[3], 0.0);
        assert_eq!(cleaned[4], 0.0);
        assert_eq!(cleaned[6], 0.0);
        assert!(cleaned[1] > 170.0 && cleaned[5] > 170.0);
    }

    #[test]
    fn silence_is_unvoiced_with_zero_confidence() {
        let frames = PitchAnalyzer::default().analyze(&vec![0.0; 8000], 16_000.0);
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.pitch_hz == 0.0 && f.confidence == 0.0));
    }

    #[test]
    fn steady_tone_is_detected() {
        let samples: Vec<f64> = (0..8000)
            .map(|i| (2.0 * PI * 220.0 * i as f64 / 16_000.0).sin())
            .collect();
        let frames = PitchAnalyzer::default().analyze(&samples, 16_000.0);
        for frame in frames {
            assert_abs_diff_eq!(frame.pitch_hz, 220.0, epsilon = 3.0);
            assert!(frame.confidence > 0.9);
        }
    }
}
