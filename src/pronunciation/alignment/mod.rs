pub mod dtw;
pub mod resample;

use serde::{Deserialize, Serialize};

use crate::pronunciation::{PronunciationError, Result};
use dtw::{recover_path, Dtw, DtwConfig};

/// How paired feature tracks are brought onto a common time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlignmentMode {
    /// Tempo-invariant dynamic time warping.
    #[default]
    Dtw,
    /// Both tracks resampled to the longer length and compared index by index.
    #[serde(alias = "point")]
    PointByPoint,
}

impl AlignmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dtw => "dtw",
            Self::PointByPoint => "pointByPoint",
        }
    }
}

/// Two tracks matched frame to frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub distance: f64,
    /// `distance / (len1 + len2)`, comparable across modes.
    pub normalized_distance: f64,
    /// `(i, j)` index pairs, monotonic in both.
    pub path: Vec<(usize, usize)>,
}

impl Alignment {
    /// Values of both tracks along the path, for correlation measures.
    pub fn paired_values<T: Copy>(&self, seq1: &[T], seq2: &[T]) -> (Vec<T>, Vec<T>) {
        self.path.iter().map(|&(i, j)| (seq1[i], seq2[j])).unzip()
    }
}

/// Aligns two sequences under `mode` with an arbitrary frame distance.
pub fn align<T>(
    seq1: &[T],
    seq2: &[T],
    mode: AlignmentMode,
    config: &DtwConfig,
    distance: impl Fn(&T, &T) -> f64,
) -> Result<Alignment> {
    match mode {
        AlignmentMode::Dtw => {
            let result = Dtw::new(config.window)
                .with_cost_matrix()
                .compute_with_step_pattern(seq1, seq2, config.step_pattern, distance)?;
            if !result.distance.is_finite() {
                return Err(PronunciationError::config(format!(
                    "step pattern {:?} cannot align sequences of {} and {} frames",
                    config.step_pattern,
                    seq1.len(),
                    seq2.len()
                )));
            }
            let path = recover_path(&result);
            Ok(Alignment {
                distance: result.distance,
                normalized_distance: result.normalized_distance,
                path,
            })
        }
        AlignmentMode::PointByPoint => resample::align_point_by_point(seq1, seq2, distance),
    }
}
