pub mod alignment;
pub mod cli;
pub mod comparator;
pub mod features;
pub mod metrics;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;

use alignment::dtw::StepPattern;
pub use comparator::{Comparison, PronunciationComparator};
pub use features::{FeatureExtractor, FeatureTracks};

/// Convenient alias for results returned by pronunciation modules.
pub type Result<T> = std::result::Result<T, PronunciationError>;

/// Lowest sample rate the analyzers accept; formant analysis needs a Nyquist above F3.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Failures surfaced to callers. Per-frame numerical trouble never ends up here;
/// it is absorbed as an unvoiced or held-over frame and counted in the report.
#[derive(Debug, Clone, PartialEq)]
pub enum PronunciationError {
    EmptyBuffer {
        label: &'static str,
    },
    InvalidSampleRate(u32),
    NonFiniteSample {
        label: &'static str,
        index: usize,
    },
    BufferTooShort {
        label: &'static str,
        samples: usize,
        required: usize,
    },
    EmptySequence,
    InvalidFrame {
        sequence: usize,
        index: usize,
        field: String,
    },
    InvalidConfig(String),
}

impl PronunciationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl Display for PronunciationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBuffer { label } => write!(f, "{label} recording contains no samples"),
            Self::InvalidSampleRate(rate) => write!(
                f,
                "sample rate {rate} Hz is outside the supported range \
                 {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz"
            ),
            Self::NonFiniteSample { label, index } => {
                write!(f, "{label} recording has a non-finite sample at index {index}")
            }
            Self::BufferTooShort {
                label,
                samples,
                required,
            } => write!(
                f,
                "{label} recording has {samples} samples, at least {required} are required"
            ),
            Self::EmptySequence => write!(f, "alignment requires two non-empty sequences"),
            Self::InvalidFrame {
                sequence,
                index,
                field,
            } => write!(
                f,
                "frame {index} of sequence {sequence} is missing a finite `{field}` component"
            ),
            Self::InvalidConfig(message) => write!(f, "invalid analysis configuration: {message}"),
        }
    }
}

impl Error for PronunciationError {}

/// Decoded mono recording. Immutable once built; analyzers only read it.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Result<Self> {
        Self::labelled("input", samples, sample_rate)
    }

    /// Same as [`SampleBuffer::new`], naming the recording in any error.
    pub fn labelled(
        label: &'static str,
        samples: impl Into<Arc<[f32]>>,
        sample_rate: u32,
    ) -> Result<Self> {
        let samples = samples.into();
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(PronunciationError::InvalidSampleRate(sample_rate));
        }
        if samples.is_empty() {
            return Err(PronunciationError::EmptyBuffer { label });
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(PronunciationError::NonFiniteSample { label, index });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Widened copy used by the analyzers, which all work in `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        self.samples.iter().map(|&s| s as f64).collect()
    }
}

/// One value per hop interval; tracks stay dense even across unvoiced stretches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureFrame<T> {
    pub time: f64,
    pub value: T,
}

/// RMS intensity of one frame (always `>= 0`).
pub type IntensityFrame = FeatureFrame<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchFrame {
    pub time: f64,
    /// Zero when the frame is unvoiced.
    pub pitch_hz: f64,
    /// Normalised autocorrelation peak in `0..=1`.
    pub confidence: f64,
}

impl PitchFrame {
    pub fn is_voiced(&self) -> bool {
        self.pitch_hz > 0.0
    }
}

/// Formant estimate for one frame. When `voiced`, `f1 < f2 < f3` holds and all three
/// sit inside the plausible ranges enforced by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FormantFrame {
    pub time: f64,
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
    pub voiced: bool,
}

/// MFCC matrices share a frame axis: row `t` of each matrix belongs to `times[t]`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfccTrack {
    pub times: Vec<f64>,
    pub coeffs: Array2<f64>,
    pub deltas: Array2<f64>,
    pub delta_deltas: Array2<f64>,
}

impl MfccTrack {
    pub fn empty(num_coeffs: usize) -> Self {
        Self {
            times: Vec::new(),
            coeffs: Array2::zeros((0, num_coeffs)),
            deltas: Array2::zeros((0, num_coeffs)),
            delta_deltas: Array2::zeros((0, num_coeffs)),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.times.len()
    }
}

/// Output of a dynamic time warping run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DtwResult {
    pub distance: f64,
    /// `distance / (len1 + len2)`.
    pub normalized_distance: f64,
    pub step_pattern: StepPattern,
    /// `(len1 + 1) x (len2 + 1)` cumulative costs, with `cost[[0, 0]] == 0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_matrix: Option<Array2<f64>>,
    /// `len1 x len2` frame distances, infinite outside the band.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_cost: Option<Array2<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub pitch: f64,
    pub formants: f64,
    pub mfcc: f64,
    pub stress: f64,
    pub intensity: f64,
}

/// Diagnostics for one scored dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionReport {
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Set when the dimension fell back to a neutral score, with the reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    pub notes: Vec<String>,
}

impl DimensionReport {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            score: metrics::NEUTRAL_SCORE,
            distance: None,
            fallback: Some(reason.into()),
            notes: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Per-recording counts that let callers judge how much of a score is backed by signal.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub duration_secs: f64,
    pub pitch_frames: usize,
    pub voiced_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_pitch_hz: Option<f64>,
    pub formant_frames: usize,
    pub voiced_formant_frames: usize,
    pub lpc_fallback_frames: usize,
    pub mfcc_frames: usize,
    pub stress_peaks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectrogram_diagnostic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedReport {
    pub alignment: String,
    pub reference: RecordingSummary,
    pub learner: RecordingSummary,
    pub pitch: DimensionReport,
    pub formants: DimensionReport,
    pub mfcc: DimensionReport,
    pub stress: DimensionReport,
    pub intensity: DimensionReport,
}

impl DetailedReport {
    /// Names of dimensions whose score is a neutral default rather than a measurement.
    pub fn fallback_dimensions(&self) -> Vec<&'static str> {
        [
            ("pitch", &self.pitch),
            ("formants", &self.formants),
            ("mfcc", &self.mfcc),
            ("stress", &self.stress),
            ("intensity", &self.intensity),
        ]
        .into_iter()
        .filter(|(_, report)| report.is_fallback())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Verdict for one reference/learner pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// Weighted score in `0..=100`.
    pub overall_score: f64,
    pub breakdown: ScoreBreakdown,
    pub detailed_report: DetailedReport,
}
