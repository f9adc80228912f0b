use std::collections::{BTreeMap, HashMap};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::pronunciation::{DtwResult, FormantFrame, PronunciationError, Result};

pub const DEFAULT_DTW_WINDOW: usize = 20;

/// Local recursion used to fill the cumulative cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepPattern {
    /// `d + min(diag, up, left)`.
    #[default]
    Symmetric1,
    /// Like `Symmetric1` with the diagonal step charged twice, so path length no
    /// longer favours diagonals.
    Symmetric2,
    /// Every step advances the first sequence by one and the second by zero, one or two.
    /// The path starts on the first frame of both sequences.
    Asymmetric,
}

impl StepPattern {
    /// Predecessor cells of `(i, j)` in the cumulative matrix, each with the multiple
    /// of the local distance its step adds. Diagonal first.
    fn predecessors(self, i: usize, j: usize) -> impl Iterator<Item = ((usize, usize), f64)> {
        let steps = match self {
            Self::Symmetric1 => [Some((1, 1, 1.0)), Some((1, 0, 1.0)), Some((0, 1, 1.0))],
            Self::Symmetric2 => [Some((1, 1, 2.0)), Some((1, 0, 1.0)), Some((0, 1, 1.0))],
            Self::Asymmetric => [
                Some((1, 1, 1.0)),
                Some((1, 0, 1.0)),
                (i > 1).then_some((1, 2, 1.0)),
            ],
        };
        steps
            .into_iter()
            .flatten()
            .filter(move |&(di, dj, _)| di <= i && dj <= j)
            .map(move |(di, dj, weight)| ((i - di, j - dj), weight))
    }
}

/// Named numeric components of a multi-dimensional frame.
pub trait FeatureComponents {
    fn component(&self, name: &str) -> Option<f64>;
}

impl FeatureComponents for FormantFrame {
    fn component(&self, name: &str) -> Option<f64> {
        match name {
            "f1" => Some(self.f1),
            "f2" => Some(self.f2),
            "f3" => Some(self.f3),
            "time" => Some(self.time),
            _ => None,
        }
    }
}

impl FeatureComponents for HashMap<String, f64> {
    fn component(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl FeatureComponents for BTreeMap<String, f64> {
    fn component(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DtwConfig {
    /// Sakoe-Chiba half-width around the scaled diagonal, in frames.
    #[serde(alias = "dtwWindow")]
    pub window: usize,
    pub step_pattern: StepPattern,
}

impl Default for DtwConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_DTW_WINDOW,
            step_pattern: StepPattern::Symmetric1,
        }
    }
}

/// Banded dynamic time warping over arbitrary frame types.
#[derive(Debug, Clone, Copy)]
pub struct Dtw {
    window: usize,
    keep_cost_matrix: bool,
}

impl Default for Dtw {
    fn default() -> Self {
        Self::new(DEFAULT_DTW_WINDOW)
    }
}

impl Dtw {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            keep_cost_matrix: false,
        }
    }

    /// Keep the cumulative and local cost matrices with every result, for [`recover_path`].
    pub fn with_cost_matrix(mut self) -> Self {
        self.keep_cost_matrix = true;
        self
    }

    pub fn compute_1d(&self, seq1: &[f64], seq2: &[f64]) -> Result<DtwResult> {
        self.compute_custom(seq1, seq2, |a, b| (a - b).abs())
    }

    /// Weighted Euclidean distance over the named components. Every frame of both
    /// sequences must carry every weighted component as a finite value.
    pub fn compute_multi_dim<T: FeatureComponents>(
        &self,
        seq1: &[T],
        seq2: &[T],
        weights: &[(&str, f64)],
    ) -> Result<DtwResult> {
        let seq1 = extract_components(0, seq1, weights)?;
        let seq2 = extract_components(1, seq2, weights)?;
        self.compute_custom(&seq1, &seq2, |a, b| {
            a.iter()
                .zip(b)
                .zip(weights)
                .map(|((x, y), (_, weight))| weight * (x - y).powi(2))
                .sum::<f64>()
                .sqrt()
        })
    }

    pub fn compute_custom<T>(
        &self,
        seq1: &[T],
        seq2: &[T],
        distance: impl Fn(&T, &T) -> f64,
    ) -> Result<DtwResult> {
        self.compute_with_step_pattern(seq1, seq2, StepPattern::Symmetric1, distance)
    }

    /// The distance is infinite when the pattern cannot reach the final cell, which
    /// happens with [`StepPattern::Asymmetric`] when `seq2` is more than twice as long.
    pub fn compute_with_step_pattern<T>(
        &self,
        seq1: &[T],
        seq2: &[T],
        pattern: StepPattern,
        distance: impl Fn(&T, &T) -> f64,
    ) -> Result<DtwResult> {
        let (n, m) = (seq1.len(), seq2.len());
        if n == 0 || m == 0 {
            return Err(PronunciationError::EmptySequence);
        }
        let window = self.window.max(m.div_ceil(n));
        let mut cost = Array2::from_elem((n + 1, m + 1), f64::INFINITY);
        let mut local = Array2::from_elem((n, m), f64::INFINITY);
        cost[[0, 0]] = 0.0;

        for i in 1..=n {
            let centre = (i * m + n / 2) / n;
            let lo = centre.saturating_sub(window).max(1);
            let hi = (centre + window).min(m);
            for j in lo..=hi {
                let d = distance(&seq1[i - 1], &seq2[j - 1]);
                local[[i - 1, j - 1]] = d;
                let best = pattern
                    .predecessors(i, j)
                    .map(|(cell, weight)| cost[cell] + weight * d)
                    .fold(f64::INFINITY, f64::min);
                cost[[i, j]] = best;
            }
        }

        let distance = cost[[n, m]];
        let keep = self.keep_cost_matrix;
        Ok(DtwResult {
            distance,
            normalized_distance: distance / (n + m) as f64,
            step_pattern: pattern,
            cost_matrix: keep.then_some(cost),
            local_cost: keep.then_some(local),
        })
    }
}

fn extract_components<T: FeatureComponents>(
    sequence: usize,
    frames: &[T],
    weights: &[(&str, f64)],
) -> Result<Vec<Vec<f64>>> {
    frames
        .iter()
        .enumerate()
        .map(|(index, frame)| {
            weights
                .iter()
                .map(|(name, _)| {
                    frame
                        .component(name)
                        .filter(|value| value.is_finite())
                        .ok_or_else(|| PronunciationError::InvalidFrame {
                            sequence,
                            index,
                            field: (*name).to_string(),
                        })
                })
                .collect()
        })
        .collect()
}

/// Back-traces the optimal alignment through the matrices kept by
/// [`Dtw::with_cost_matrix`], following the step pattern the result was computed with.
/// Returns `(i, j)` index pairs into the two sequences from start to end. Ties prefer
/// the diagonal. Empty when the matrices were not kept or the final cell is unreachable.
pub fn recover_path(result: &DtwResult) -> Vec<(usize, usize)> {
    let (Some(cost), Some(local)) = (&result.cost_matrix, &result.local_cost) else {
        return Vec::new();
    };
    let (rows, cols) = cost.dim();
    if rows < 2 || cols < 2 || !cost[[rows - 1, cols - 1]].is_finite() {
        return Vec::new();
    }
    let (mut i, mut j) = (rows - 1, cols - 1);
    let mut path = Vec::with_capacity(rows + cols);
    while i > 0 && j > 0 {
        path.push((i - 1, j - 1));
        let d = local[[i - 1, j - 1]];
        let best = result
            .step_pattern
            .predecessors(i, j)
            .map(|(cell, weight)| (cell, cost[cell] + weight * d))
            .filter(|(_, total)| total.is_finite())
            .reduce(|best, candidate| if candidate.1 < best.1 { candidate } else { best });
        match best {
            Some((cell, _)) => (i, j) = cell,
            None => break,
        }
    }
    path.reverse();
    path
}
