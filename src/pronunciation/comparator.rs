use serde::Serialize;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::pronunciation::features::{FeatureExtractor, FeatureTracks};
use crate::pronunciation::metrics::stress::{StressComparison, StressProfile};
use crate::pronunciation::metrics::{score_stress, Scorer};
use crate::pronunciation::{
    ComparisonResult, DetailedReport, RecordingSummary, Result, SampleBuffer, ScoreBreakdown,
};

/// Score plus the feature tracks it was computed from, for rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub result: ComparisonResult,
    pub stress: StressComparison,
    pub reference: FeatureTracks,
    pub learner: FeatureTracks,
}

/// Scores a learner recording against a native reference.
#[derive(Debug, Clone)]
pub struct PronunciationComparator {
    config: AnalysisConfig,
    extractor: FeatureExtractor,
}

impl PronunciationComparator {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let extractor = FeatureExtractor::new(&config);
        Ok(Self { config, extractor })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn compare(&self, reference: &SampleBuffer, learner: &SampleBuffer) -> Result<Comparison> {
        let reference_tracks = self.extractor.extract_labelled("reference", reference)?;
        let learner_tracks = self.extractor.extract_labelled("learner", learner)?;
        let (result, stress) = self.score(&reference_tracks, &learner_tracks)?;
        Ok(Comparison {
            result,
            stress,
            reference: reference_tracks,
            learner: learner_tracks,
        })
    }

    /// Scores two already extracted recordings.
    pub fn score(
        &self,
        reference: &FeatureTracks,
        learner: &FeatureTracks,
    ) -> Result<(ComparisonResult, StressComparison)> {
        let scorer = Scorer {
            mode: self.config.alignment,
            dtw: &self.config.dtw,
            scoring: &self.config.scoring,
        };
        let pitch = scorer.score_pitch(&reference.pitch, &learner.pitch)?;
        let formants = scorer.score_formants(&reference.formants.frames, &learner.formants.frames)?;
        let mfcc = scorer.score_mfcc(&reference.mfcc, &learner.mfcc)?;
        let intensity = scorer.score_intensity(&reference.intensity, &learner.intensity)?;
        let (stress, stress_comparison) = score_stress(
            &StressProfile::new(reference.stress_peaks.clone(), reference.duration_secs),
            &StressProfile::new(learner.stress_peaks.clone(), learner.duration_secs),
            &self.config.stress,
        );

        let breakdown = ScoreBreakdown {
            pitch: pitch.score,
            formants: formants.score,
            mfcc: mfcc.score,
            stress: stress.score,
            intensity: intensity.score,
        };
        let overall_score = self.config.scoring.weights.combine(&breakdown);
        let detailed_report = DetailedReport {
            alignment: self.config.alignment.as_str().to_string(),
            reference: summarize(reference),
            learner: summarize(learner),
            pitch,
            formants,
            mfcc,
            stress,
            intensity,
        };

        debug!(?breakdown, "dimension scores");
        info!(
            overall = overall_score,
            alignment = self.config.alignment.as_str(),
            fallbacks = ?detailed_report.fallback_dimensions(),
            "pronunciation compared"
        );
        Ok((
            ComparisonResult {
                overall_score,
                breakdown,
                detailed_report,
            },
            stress_comparison,
        ))
    }
}

fn summarize(tracks: &FeatureTracks) -> RecordingSummary {
    let diagnostics = &tracks.formants.diagnostics;
    RecordingSummary {
        duration_secs: tracks.duration_secs,
        pitch_frames: tracks.pitch.len(),
        voiced_percentage: tracks.pitch_statistics.voiced_percentage,
        mean_pitch_hz: tracks.pitch_statistics.mean_hz,
        formant_frames: tracks.formants.frames.len(),
        voiced_formant_frames: tracks.formants.voiced_frames().count(),
        lpc_fallback_frames: diagnostics.fallback_frames() + diagnostics.peak_picking_frames,
        mfcc_frames: tracks.mfcc.frame_count(),
        stress_peaks: tracks.stress_peaks.len(),
        spectrogram_diagnostic: tracks.spectrogram_diagnostic.clone(),
    }
}
