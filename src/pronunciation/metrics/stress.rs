//! Stress-pattern comparison over intensity peaks.

use serde::{Deserialize, Serialize};

use super::{MAX_SCORE, NEUTRAL_SCORE};
use crate::pronunciation::features::intensity::Peak;

pub const TIME_TOLERANCE_RATIO: f64 = 0.15;
pub const MIN_TIME_TOLERANCE_SECS: f64 = 0.1;
pub const MAX_HEIGHT_DIFFERENCE: f64 = 0.4;
pub const COUNT_PENALTY: f64 = 10.0;
pub const PATTERN_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StressConfig {
    /// Match window as a share of the native recording's duration.
    #[serde(alias = "stressTolerance")]
    pub time_tolerance_ratio: f64,
    pub min_time_tolerance: f64,
    pub max_height_difference: f64,
    /// Points lost per peak the learner has too many or too few.
    pub count_penalty: f64,
    /// Share of the pattern score in the combined score; the position score gets the rest.
    pub pattern_weight: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            time_tolerance_ratio: TIME_TOLERANCE_RATIO,
            min_time_tolerance: MIN_TIME_TOLERANCE_SECS,
            max_height_difference: MAX_HEIGHT_DIFFERENCE,
            count_penalty: COUNT_PENALTY,
            pattern_weight: PATTERN_WEIGHT,
        }
    }
}

/// Stress peaks of one recording together with its duration.
#[derive(Debug, Clone, PartialEq)]
pub struct StressProfile {
    pub peaks: Vec<Peak>,
    pub duration: f64,
}

impl StressProfile {
    pub fn new(peaks: Vec<Peak>, duration: f64) -> Self {
        Self { peaks, duration }
    }

    fn strongest(&self) -> Option<&Peak> {
        self.peaks
            .iter()
            .max_by(|a, b| a.height.total_cmp(&b.height))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressComparison {
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_score: Option<f64>,
    pub matched: usize,
    pub native_peaks: usize,
    pub user_peaks: usize,
    /// Why the score is neutral, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn compare_stress_pattern(
    native: &StressProfile,
    user: &StressProfile,
    config: &StressConfig,
) -> StressComparison {
    let neutral = |reason: &str| StressComparison {
        score: NEUTRAL_SCORE,
        native_peaks: native.peaks.len(),
        user_peaks: user.peaks.len(),
        reason: Some(reason.to_string()),
        ..StressComparison::default()
    };
    let (Some(native_main), Some(user_main)) = (native.strongest(), user.strongest()) else {
        return neutral("no stress peaks detected in at least one recording");
    };
    if native.duration <= 0.0 || user.duration <= 0.0 {
        return neutral("recording duration is zero");
    }

    let offset = native_main.time / native.duration - user_main.time / user.duration;
    let position_score = (MAX_SCORE - 200.0 * offset.abs()).max(0.0);

    let matched = count_matches(native, user, config);
    let count_difference = native.peaks.len().abs_diff(user.peaks.len()) as f64;
    let pattern_score = (matched as f64 / native.peaks.len() as f64 * MAX_SCORE
        - config.count_penalty * count_difference)
        .clamp(0.0, MAX_SCORE);

    let score = config.pattern_weight * pattern_score + (1.0 - config.pattern_weight) * position_score;
    StressComparison {
        score: score.clamp(0.0, MAX_SCORE),
        position_score: Some(position_score),
        pattern_score: Some(pattern_score),
        matched,
        native_peaks: native.peaks.len(),
        user_peaks: user.peaks.len(),
        reason: None,
    }
}

/// Greedy in native order; each user peak can satisfy one native peak only.
fn count_matches(native: &StressProfile, user: &StressProfile, config: &StressConfig) -> usize {
    let tolerance = (config.time_tolerance_ratio * native.duration).max(config.min_time_tolerance);
    let mut used = vec![false; user.peaks.len()];
    native
        .peaks
        .iter()
        .filter(|target| {
            let found = user.peaks.iter().enumerate().position(|(idx, candidate)| {
                !used[idx]
                    && (candidate.time - target.time).abs() <= tolerance
                    && (candidate.height - target.height).abs() < config.max_height_difference
            });
            if let Some(idx) = found {
                used[idx] = true;
            }
            found.is_some()
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(time: f64, height: f64) -> Peak {
        Peak {
            index: 0,
            time,
            height,
        }
    }

    #[test]
    fn extra_user_peaks_cost_points() {
        let native = StressProfile::new(vec![peak(0.2, 1.0)], 1.0);
        let user = StressProfile::new(vec![peak(0.2, 1.0), peak(0.6, 0.5), peak(0.8, 0.5)], 1.0);
        let comparison = compare_stress_pattern(&native, &user, &StressConfig::default());
        assert_eq!(comparison.matched, 1);
        assert_eq!(comparison.pattern_score, Some(80.0));
    }

    #[test]
    fn one_user_peak_cannot_match_twice() {
        let native = StressProfile::new(vec![peak(0.30, 1.0), peak(0.35, 0.9)], 1.0);
        let user = StressProfile::new(vec![peak(0.32, 1.0)], 1.0);
        let comparison = compare_stress_pattern(&native, &user, &StressConfig::default());
        assert_eq!(comparison.matched, 1);
    }

    #[test]
    fn missing_peaks_give_neutral_score() {
        let native = StressProfile::new(vec![peak(0.2, 1.0)], 1.0);
        let user = StressProfile::new(Vec::new(), 1.0);
        let comparison = compare_stress_pattern(&native, &user, &StressConfig::default());
        assert_eq!(comparison.score, NEUTRAL_SCORE);
        assert!(comparison.reason.is_some());
    }
}
