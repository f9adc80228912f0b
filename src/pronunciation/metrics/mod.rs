pub mod stress;

use serde::{Deserialize, Serialize};

use crate::pronunciation::alignment::dtw::DtwConfig;
use crate::pronunciation::alignment::{align, AlignmentMode};
use crate::pronunciation::features::math::{median, pearson_correlation};
use crate::pronunciation::features::mfcc::{cosine_distance, euclidean_distance};
use crate::pronunciation::{
    DimensionReport, FormantFrame, IntensityFrame, MfccTrack, PitchFrame, Result, ScoreBreakdown,
};
use stress::{compare_stress_pattern, StressComparison, StressConfig, StressProfile};

pub const MAX_SCORE: f64 = 100.0;
/// Score reported when a dimension has too little data to be measured.
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub pitch: f64,
    pub formants: f64,
    pub mfcc: f64,
    pub stress: f64,
    pub intensity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pitch: 0.25,
            formants: 0.25,
            mfcc: 0.25,
            stress: 0.15,
            intensity: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.pitch + self.formants + self.mfcc + self.stress + self.intensity
    }

    /// Weighted mean of the breakdown, in `0..=100`.
    pub fn combine(&self, breakdown: &ScoreBreakdown) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return NEUTRAL_SCORE;
        }
        let weighted = self.pitch * breakdown.pitch
            + self.formants * breakdown.formants
            + self.mfcc * breakdown.mfcc
            + self.stress * breakdown.stress
            + self.intensity * breakdown.intensity;
        (weighted / total).clamp(0.0, MAX_SCORE)
    }
}

/// Normalised alignment distances at which a dimension's distance score reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    pub pitch_tolerance_semitones: f64,
    /// Share of the pitch score taken by contour correlation.
    pub pitch_correlation_share: f64,
    pub formant_tolerance_khz: f64,
    /// F1, F2 and F3 weights of the formant distance.
    pub formant_weights: [f64; 3],
    pub mfcc_tolerance: f64,
    pub intensity_tolerance: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            pitch_tolerance_semitones: 2.0,
            pitch_correlation_share: 0.25,
            formant_tolerance_khz: 0.3,
            formant_weights: [1.0, 1.0, 0.5],
            mfcc_tolerance: 20.0,
            intensity_tolerance: 0.25,
        }
    }
}

/// Shared inputs of the per-dimension scorers.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    pub mode: AlignmentMode,
    pub dtw: &'a DtwConfig,
    pub scoring: &'a ScoringConfig,
}

impl Scorer<'_> {
    /// Compares pitch contours in semitones relative to each track's median voiced
    /// pitch, so speakers with different registers can still match.
    pub fn score_pitch(&self, reference: &[PitchFrame], learner: &[PitchFrame]) -> Result<DimensionReport> {
        let (Some(reference), Some(learner)) = (semitone_contour(reference), semitone_contour(learner))
        else {
            return Ok(DimensionReport::neutral(
                "no voiced pitch frames in at least one recording",
            ));
        };
        let alignment = align(&reference, &learner, self.mode, self.dtw, |a, b| (a - b).abs())?;
        let distance_score = band_score(
            alignment.normalized_distance,
            self.scoring.pitch_tolerance_semitones,
        );
        let (paired_ref, paired_learner) = alignment.paired_values(&reference, &learner);
        let mut notes = Vec::new();
        let score = match pearson_correlation(&paired_ref, &paired_learner) {
            Some(r) => {
                notes.push(format!("contour correlation {r:.3}"));
                let share = self.scoring.pitch_correlation_share;
                (1.0 - share) * distance_score + share * (r + 1.0) / 2.0 * MAX_SCORE
            }
            None => {
                notes.push("flat contour; correlation undefined".to_string());
                distance_score
            }
        };
        Ok(DimensionReport {
            score,
            distance: Some(alignment.normalized_distance),
            fallback: None,
            notes,
        })
    }

    /// Aligns voiced formant frames in kHz under a weighted Euclidean distance.
    pub fn score_formants(
        &self,
        reference: &[FormantFrame],
        learner: &[FormantFrame],
    ) -> Result<DimensionReport> {
        let reference = voiced_khz(reference);
        let learner = voiced_khz(learner);
        if reference.is_empty() || learner.is_empty() {
            return Ok(DimensionReport::neutral(
                "no voiced formant frames in at least one recording",
            ));
        }
        let weights = self.scoring.formant_weights;
        let alignment = align(&reference, &learner, self.mode, self.dtw, |a, b| {
            a.iter()
                .zip(b)
                .zip(&weights)
                .map(|((x, y), w)| w * (x - y).powi(2))
                .sum::<f64>()
                .sqrt()
        })?;
        Ok(DimensionReport {
            score: band_score(alignment.normalized_distance, self.scoring.formant_tolerance_khz),
            distance: Some(alignment.normalized_distance),
            fallback: None,
            notes: vec![format!(
                "{} reference and {} learner voiced frames",
                reference.len(),
                learner.len()
            )],
        })
    }

    /// Euclidean distance over cepstral coefficients `1..`; `c0` is overall level and
    /// says little about articulation.
    pub fn score_mfcc(&self, reference: &MfccTrack, learner: &MfccTrack) -> Result<DimensionReport> {
        let reference = cepstral_rows(reference);
        let learner = cepstral_rows(learner);
        if reference.is_empty() || learner.is_empty() {
            return Ok(DimensionReport::neutral("no MFCC frames in at least one recording"));
        }
        let alignment = align(&reference, &learner, self.mode, self.dtw, |a, b| {
            euclidean_distance(a, b)
        })?;
        let mean_cosine = alignment
            .path
            .iter()
            .map(|&(i, j)| cosine_distance(&reference[i], &learner[j]))
            .sum::<f64>()
            / alignment.path.len().max(1) as f64;
        Ok(DimensionReport {
            score: band_score(alignment.normalized_distance, self.scoring.mfcc_tolerance),
            distance: Some(alignment.normalized_distance),
            fallback: None,
            notes: vec![format!("mean cosine distance {mean_cosine:.3}")],
        })
    }

    /// Compares intensity envelopes normalised to their own maximum.
    pub fn score_intensity(
        &self,
        reference: &[IntensityFrame],
        learner: &[IntensityFrame],
    ) -> Result<DimensionReport> {
        let (Some(reference), Some(learner)) = (normalized_envelope(reference), normalized_envelope(learner))
        else {
            return Ok(DimensionReport::neutral("silent intensity envelope in at least one recording"));
        };
        let alignment = align(&reference, &learner, self.mode, self.dtw, |a, b| (a - b).abs())?;
        Ok(DimensionReport {
            score: band_score(alignment.normalized_distance, self.scoring.intensity_tolerance),
            distance: Some(alignment.normalized_distance),
            fallback: None,
            notes: Vec::new(),
        })
    }
}

pub fn score_stress(
    reference: &StressProfile,
    learner: &StressProfile,
    config: &StressConfig,
) -> (DimensionReport, StressComparison) {
    let comparison = compare_stress_pattern(reference, learner, config);
    let mut notes = vec![format!(
        "{} of {} reference peaks matched ({} learner peaks)",
        comparison.matched, comparison.native_peaks, comparison.user_peaks
    )];
    if let (Some(position), Some(pattern)) = (comparison.position_score, comparison.pattern_score) {
        notes.push(format!("position {position:.1}, pattern {pattern:.1}"));
    }
    let report = DimensionReport {
        score: comparison.score,
        distance: None,
        fallback: comparison.reason.clone(),
        notes,
    };
    (report, comparison)
}

/// `100` at zero distance, falling linearly to `0` at `tolerance`.
pub fn band_score(distance: f64, tolerance: f64) -> f64 {
    if !distance.is_finite() {
        return 0.0;
    }
    if tolerance <= 0.0 {
        return if distance <= 0.0 { MAX_SCORE } else { 0.0 };
    }
    MAX_SCORE * (1.0 - (distance / tolerance).min(1.0)).max(0.0)
}

/// Voiced frames as semitones from the median voiced pitch, with unvoiced gaps filled
/// from the nearest voiced neighbour. `None` when nothing is voiced.
pub fn semitone_contour(frames: &[PitchFrame]) -> Option<Vec<f64>> {
    let voiced: Vec<f64> = frames
        .iter()
        .filter(|frame| frame.is_voiced())
        .map(|frame| frame.pitch_hz)
        .collect();
    let reference = median(&voiced)?;
    let contour: Vec<Option<f64>> = frames
        .iter()
        .map(|frame| {
            frame
                .is_voiced()
                .then(|| 12.0 * (frame.pitch_hz / reference).log2())
        })
        .collect();
    Some(fill_gaps(&contour))
}

/// Forward fill, then backward fill for any leading gap.
pub fn fill_gaps(values: &[Option<f64>]) -> Vec<f64> {
    let mut last = None;
    let mut filled: Vec<Option<f64>> = values
        .iter()
        .map(|value| {
            if value.is_some() {
                last = *value;
            }
            last
        })
        .collect();
    let mut next = None;
    for value in filled.iter_mut().rev() {
        match value {
            Some(v) => next = Some(*v),
            None => *value = next,
        }
    }
    filled.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

fn voiced_khz(frames: &[FormantFrame]) -> Vec<[f64; 3]> {
    frames
        .iter()
        .filter(|frame| frame.voiced)
        .map(|frame| [frame.f1 / 1000.0, frame.f2 / 1000.0, frame.f3 / 1000.0])
        .collect()
}

fn cepstral_rows(track: &MfccTrack) -> Vec<Vec<f64>> {
    track
        .coeffs
        .rows()
        .into_iter()
        .map(|row| row.iter().skip(1).copied().collect())
        .collect()
}

fn normalized_envelope(frames: &[IntensityFrame]) -> Option<Vec<f64>> {
    let max = frames.iter().map(|frame| frame.value).fold(0.0, f64::max);
    (max > f64::EPSILON).then(|| frames.iter().map(|frame| frame.value / max).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pitch(values: &[f64]) -> Vec<PitchFrame> {
        values
            .iter()
            .enumerate()
            .map(|(i, &pitch_hz)| PitchFrame {
                time: i as f64 * 0.01,
                pitch_hz,
                confidence: if pitch_hz > 0.0 { 0.9 } else { 0.0 },
            })
            .collect()
    }

    #[test]
    fn band_score_is_linear_inside_tolerance() {
        assert_eq!(band_score(0.0, 2.0), 100.0);
        assert_abs_diff_eq!(band_score(0.5, 2.0), 75.0, epsilon = 1e-12);
        assert_eq!(band_score(3.0, 2.0), 0.0);
        assert_eq!(band_score(f64::NAN, 2.0), 0.0);
    }

    #[test]
    fn semitone_contour_is_register_independent() {
        let low = semitone_contour(&pitch(&[100.0, 0.0, 200.0, 100.0])).unwrap();
        let high = semitone_contour(&pitch(&[200.0, 0.0, 400.0, 200.0])).unwrap();
        assert_eq!(low, high);
        assert_abs_diff_eq!(low[2], 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(low[1], low[0], epsilon = 1e-12);
    }

    #[test]
    fn fill_gaps_handles_leading_and_trailing_gaps() {
        let filled = fill_gaps(&[None, Some(1.0), None, Some(3.0), None]);
        assert_eq!(filled, vec![1.0, 1.0, 1.0, 3.0, 3.0]);
        assert_eq!(fill_gaps(&[None, None]), vec![0.0, 0.0]);
    }

    #[test]
    fn combine_weights_breakdown() {
        let breakdown = ScoreBreakdown {
            pitch: 100.0,
            formants: 100.0,
            mfcc: 100.0,
            stress: 0.0,
            intensity: 0.0,
        };
        assert_abs_diff_eq!(ScoreWeights::default().combine(&breakdown), 75.0, epsilon = 1e-9);
    }

    #[test]
    fn unvoiced_pitch_is_neutral() {
        let dtw = DtwConfig::default();
        let scoring = ScoringConfig::default();
        let scorer = Scorer {
            mode: AlignmentMode::Dtw,
            dtw: &dtw,
            scoring: &scoring,
        };
        let report = scorer.score_pitch(&pitch(&[0.0; 4]), &pitch(&[120.0; 4])).unwrap();
        assert_eq!(report.score, NEUTRAL_SCORE);
        assert!(report.is_fallback());
    }
}
