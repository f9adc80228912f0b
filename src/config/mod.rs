use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pronunciation::alignment::dtw::DtwConfig;
use crate::pronunciation::alignment::AlignmentMode;
use crate::pronunciation::features::fft::{next_power_of_two, SpectrogramConfig};
use crate::pronunciation::features::formant::FormantConfig;
use crate::pronunciation::features::intensity::IntensityConfig;
use crate::pronunciation::features::mfcc::MfccConfig;
use crate::pronunciation::features::pitch::PitchConfig;
use crate::pronunciation::metrics::stress::StressConfig;
use crate::pronunciation::metrics::ScoringConfig;
use crate::pronunciation::PronunciationError;

/// Every tunable of an analysis run. Defaults are the empirically tuned values for
/// short isolated-word recordings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    pub spectrogram: SpectrogramConfig,
    pub pitch: PitchConfig,
    pub formants: FormantConfig,
    pub mfcc: MfccConfig,
    pub intensity: IntensityConfig,
    pub stress: StressConfig,
    pub dtw: DtwConfig,
    pub scoring: ScoringConfig,
    pub alignment: AlignmentMode,
}

/// Flat option names accepted at the top level of a config file, applied on top of
/// the nested sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigOverrides {
    pub fft_size: Option<usize>,
    /// Spectrogram hop; the other analyzers keep their own hop settings.
    pub hop_size: Option<usize>,
    pub lpc_order: Option<usize>,
    pub pre_emphasis_alpha: Option<f64>,
    pub num_mel_filters: Option<usize>,
    #[serde(alias = "numMFCCCoeffs")]
    pub num_mfcc_coeffs: Option<usize>,
    pub pitch_range: Option<PitchRange>,
    pub dtw_window: Option<usize>,
    pub stress_tolerance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PitchRange {
    pub min: f64,
    pub max: f64,
}

impl AnalysisConfig {
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(size) = overrides.fft_size {
            self.spectrogram.fft_size = size;
        }
        if let Some(hop) = overrides.hop_size {
            self.spectrogram.hop_size = hop;
        }
        if let Some(order) = overrides.lpc_order {
            self.formants.lpc_order = order;
        }
        if let Some(alpha) = overrides.pre_emphasis_alpha {
            self.formants.pre_emphasis = alpha;
            self.mfcc.pre_emphasis = alpha;
        }
        if let Some(filters) = overrides.num_mel_filters {
            self.mfcc.num_filters = filters;
        }
        if let Some(coeffs) = overrides.num_mfcc_coeffs {
            self.mfcc.num_coeffs = coeffs;
        }
        if let Some(range) = overrides.pitch_range {
            self.pitch.min_pitch = range.min;
            self.pitch.max_pitch = range.max;
        }
        if let Some(window) = overrides.dtw_window {
            self.dtw.window = window;
        }
        if let Some(tolerance) = overrides.stress_tolerance {
            self.stress.time_tolerance_ratio = tolerance;
        }
    }

    /// Parses a JSON document holding nested sections and/or flat overrides.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).context("config is not valid JSON")?;
        let mut config: Self = serde_json::from_value(value.clone())
            .context("config does not match the analysis settings schema")?;
        let overrides: ConfigOverrides =
            serde_json::from_value(value).context("invalid top-level config option")?;
        config.apply(&overrides);
        Ok(config)
    }

    /// Shortest buffer every frame-based analyzer can produce a frame for.
    pub fn min_samples(&self) -> usize {
        [
            self.pitch.frame_size,
            self.mfcc.frame_size,
            self.intensity.frame_size,
            next_power_of_two(self.spectrogram.fft_size),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn validate(&self) -> crate::pronunciation::Result<()> {
        let check = |ok: bool, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(PronunciationError::config(message))
            }
        };
        check(self.spectrogram.fft_size > 0, "fftSize must be positive")?;
        check(
            self.spectrogram.hop_size > 0
                && self.pitch.hop_size > 0
                && self.mfcc.hop_size > 0
                && self.intensity.hop_size > 0,
            "hop sizes must be positive",
        )?;
        check(
            self.pitch.min_pitch > 0.0 && self.pitch.min_pitch < self.pitch.max_pitch,
            "pitch range must satisfy 0 < min < max",
        )?;
        check(
            self.pitch.frame_size > 2,
            "pitch frame must hold more than two samples",
        )?;
        check(
            self.formants.lpc_order >= 4,
            "lpcOrder must be at least 4 to resolve three formants",
        )?;
        check(
            self.formants.frame_ms > 0.0 && self.formants.hop_ms > 0.0,
            "formant frame and hop durations must be positive",
        )?;
        check(
            (0.0..1.0).contains(&self.formants.pre_emphasis)
                && (0.0..1.0).contains(&self.mfcc.pre_emphasis),
            "pre-emphasis must lie in [0, 1)",
        )?;
        check(
            self.mfcc.frame_size > 0 && self.mfcc.num_filters > 0 && self.mfcc.num_coeffs > 1,
            "MFCC analysis needs a positive frame, filters and at least two coefficients",
        )?;
        check(
            self.mfcc.num_coeffs <= self.mfcc.num_filters,
            "numMFCCCoeffs cannot exceed numMelFilters",
        )?;
        check(
            self.mfcc.min_freq >= 0.0 && self.mfcc.min_freq < self.mfcc.max_freq,
            "MFCC frequency range must satisfy 0 <= min < max",
        )?;
        check(self.intensity.frame_size > 0, "intensity frame must be positive")?;
        check(
            (0.0..=1.0).contains(&self.stress.pattern_weight),
            "stress pattern weight must lie in [0, 1]",
        )?;
        let weights = &self.scoring.weights;
        check(
            [weights.pitch, weights.formants, weights.mfcc, weights.stress, weights.intensity]
                .iter()
                .all(|w| *w >= 0.0)
                && weights.total() > 0.0,
            "score weights must be non-negative with a positive sum",
        )
    }
}

/// Reads a JSON config file, or returns the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {:?}", path))?;
    let config = AnalysisConfig::from_json_str(&raw)
        .with_context(|| format!("failed to parse config file at {:?}", path))?;
    config.validate()?;
    debug!(path = %path.display(), "analysis config loaded");
    Ok(config)
}
