//! Formant tracking from LPC poles.
//!
//! Each frame that passes the energy/ZCR gate is windowed, pre-emphasised and fitted
//! with an all-pole model. Poles come from polynomial root finding; when too few usable
//! poles survive, peaks of the LPC envelope stand in. Frames that still cannot produce
//! `F2 > F1` are marked unvoiced and hold the last valid formants.

pub mod lpc;
pub mod roots;
pub mod spectrum;

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::math::{
    c_abs, c_arg, frame_starts, hamming_window, pre_emphasis, rms, zero_crossing_rate, Complex,
};
use crate::audio::resample;
use crate::pronunciation::FormantFrame;
use lpc::{autocorrelation, levinson_durbin, LpcAnalysis};
use roots::{find_roots_adaptive, RootFinder};
use spectrum::{compute_lpc_spectrum, pick_peaks, DEFAULT_SPECTRUM_POINTS};

pub const DEFAULT_LPC_ORDER: usize = 14;
pub const DEFAULT_PRE_EMPHASIS: f64 = 0.97;
pub const DEFAULT_MAX_FORMANT_HZ: f64 = 5500.0;
pub const DEFAULT_FRAME_MS: f64 = 25.0;
pub const DEFAULT_HOP_MS: f64 = 10.0;
/// Voicing gate: frame RMS must exceed this share of the recording's mean frame RMS.
pub const ENERGY_RATIO: f64 = 0.1;
pub const ENERGY_FLOOR: f64 = 0.001;
pub const MAX_VOICED_ZCR: f64 = 0.5;

const MIN_POLE_RADIUS: f64 = 0.3;
const MAX_POLE_RADIUS: f64 = 0.995;
const MIN_POLE_ANGLE: f64 = 0.01;
const MIN_CANDIDATE_HZ: f64 = 90.0;
const MAX_BANDWIDTH_HZ: f64 = 1500.0;
/// Candidates at or below this bandwidth are tried first when assigning formants.
const NARROW_BANDWIDTH_HZ: f64 = 500.0;

pub const F1_RANGE: (f64, f64) = (150.0, 1500.0);
pub const F2_RANGE: (f64, f64) = (500.0, 3500.0);
pub const F3_MAX: f64 = 4500.0;
const F1_F2_MIN_GAP: f64 = 100.0;
const F2_F3_MIN_GAP: f64 = 150.0;
const F3_FROM_F2_SLOPE: f64 = 1.4;
const F3_FROM_F2_OFFSET: f64 = 600.0;

/// Jumps larger than these (F1, F2, F3) against the previous voiced frame get blended.
const INERTIA_LIMITS: [f64; 3] = [300.0, 500.0, 600.0];
const INERTIA_PREVIOUS_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormantConfig {
    pub frame_ms: f64,
    pub hop_ms: f64,
    pub lpc_order: usize,
    #[serde(alias = "preEmphasisAlpha")]
    pub pre_emphasis: f64,
    /// Highest formant of interest; audio is downsampled to twice this before LPC.
    pub max_formant_hz: f64,
    pub energy_ratio: f64,
    pub energy_floor: f64,
    pub max_zcr: f64,
}

impl Default for FormantConfig {
    fn default() -> Self {
        Self {
            frame_ms: DEFAULT_FRAME_MS,
            hop_ms: DEFAULT_HOP_MS,
            lpc_order: DEFAULT_LPC_ORDER,
            pre_emphasis: DEFAULT_PRE_EMPHASIS,
            max_formant_hz: DEFAULT_MAX_FORMANT_HZ,
            energy_ratio: ENERGY_RATIO,
            energy_floor: ENERGY_FLOOR,
            max_zcr: MAX_VOICED_ZCR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Formants {
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
}

impl Formants {
    fn is_ordered(&self) -> bool {
        self.f1 < self.f2 && self.f2 < self.f3
    }
}

/// A pole converted to a resonance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantCandidate {
    pub frequency: f64,
    pub bandwidth: f64,
}

/// How many frames took each route through the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormantDiagnostics {
    pub gated_frames: usize,
    pub lpc_rejected: usize,
    pub laguerre_frames: usize,
    pub peak_picking_frames: usize,
    pub unresolved_frames: usize,
}

impl FormantDiagnostics {
    /// Frames that passed the voicing gate but still ended up unvoiced.
    pub fn fallback_frames(&self) -> usize {
        self.lpc_rejected + self.unresolved_frames
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FormantTrack {
    pub frames: Vec<FormantFrame>,
    pub diagnostics: FormantDiagnostics,
}

impl FormantTrack {
    pub fn voiced_frames(&self) -> impl Iterator<Item = &FormantFrame> {
        self.frames.iter().filter(|frame| frame.voiced)
    }
}

/// Route a single frame took to its estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameEstimate {
    Gated,
    LpcRejected,
    Unresolved,
    Resolved {
        formants: Formants,
        method: RootFinder,
        peak_picked: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct FormantExtractor {
    config: FormantConfig,
}

impl FormantExtractor {
    pub fn new(config: FormantConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, samples: &[f64], sample_rate: f64) -> FormantTrack {
        let cfg = &self.config;
        let (signal, rate) = self.analysis_signal(samples, sample_rate);
        let frame_len = ((cfg.frame_ms * rate / 1000.0).round() as usize).max(cfg.lpc_order + 2);
        let hop = ((cfg.hop_ms * rate / 1000.0).round() as usize).max(1);
        let starts: Vec<usize> = frame_starts(signal.len(), frame_len, hop).collect();
        let window = hamming_window(frame_len);

        let energies: Vec<f64> = starts
            .iter()
            .map(|&start| rms(&signal[start..start + frame_len]))
            .collect();
        let mean_energy = energies.iter().sum::<f64>() / energies.len().max(1) as f64;
        let threshold = (cfg.energy_ratio * mean_energy).max(cfg.energy_floor);

        let estimates: Vec<(f64, FrameEstimate)> = starts
            .iter()
            .zip(&energies)
            .map(|(&start, &energy)| {
                let frame = &signal[start..start + frame_len];
                let estimate = if energy > threshold && zero_crossing_rate(frame) < cfg.max_zcr {
                    estimate_frame(frame, &window, rate, cfg)
                } else {
                    FrameEstimate::Gated
                };
                (start as f64 / rate, estimate)
            })
            .collect();

        let track = assemble_track(&estimates);
        debug!(
            frames = track.frames.len(),
            voiced = track.voiced_frames().count(),
            lpc_rejected = track.diagnostics.lpc_rejected,
            peak_picking = track.diagnostics.peak_picking_frames,
            "formant track extracted"
        );
        track
    }

    /// Downsamples to twice the highest formant of interest so the LPC order covers
    /// the formant region only.
    fn analysis_signal(&self, samples: &[f64], sample_rate: f64) -> (Vec<f64>, f64) {
        let target = 2.0 * self.config.max_formant_hz;
        if sample_rate <= target * 1.05 {
            return (samples.to_vec(), sample_rate);
        }
        match resample::downsample(samples, sample_rate, target) {
            Ok(reduced) => (reduced, target),
            Err(err) => {
                warn!(error = %err, "formant downsampling failed; analysing at source rate");
                (samples.to_vec(), sample_rate)
            }
        }
    }
}

fn estimate_frame(frame: &[f64], window: &[f64], rate: f64, cfg: &FormantConfig) -> FrameEstimate {
    let windowed: Vec<f64> = frame.iter().zip(window).map(|(s, w)| s * w).collect();
    let emphasized = pre_emphasis(&windowed, cfg.pre_emphasis);
    let autocorr = autocorrelation(&emphasized, cfg.lpc_order);
    match levinson_durbin(&autocorr, cfg.lpc_order) {
        Some(lpc) => estimate_from_lpc(&lpc, rate),
        None => FrameEstimate::LpcRejected,
    }
}

fn estimate_from_lpc(lpc: &LpcAnalysis, rate: f64) -> FrameEstimate {
    let solution = find_roots_adaptive(&lpc.coefficients);
    let candidates = candidates_from_roots(&solution.roots, rate);
    if let Some(formants) = select_formants(&candidates) {
        return FrameEstimate::Resolved {
            formants,
            method: solution.method,
            peak_picked: false,
        };
    }
    match formants_from_envelope(lpc, rate) {
        Some(formants) => FrameEstimate::Resolved {
            formants,
            method: solution.method,
            peak_picked: true,
        },
        None => FrameEstimate::Unresolved,
    }
}

fn formants_from_envelope(lpc: &LpcAnalysis, rate: f64) -> Option<Formants> {
    let envelope = compute_lpc_spectrum(&lpc.coefficients, lpc.gain(), DEFAULT_SPECTRUM_POINTS, rate);
    let peaks = pick_peaks(&envelope, rate);
    assign_formants(
        peaks
            .into_iter()
            .filter(|&f| f >= MIN_CANDIDATE_HZ && f <= DEFAULT_MAX_FORMANT_HZ),
    )
}

/// Maps poles `z = r e^{i theta}` to resonances, keeping the upper half plane only and
/// discarding degenerate, near-DC, out-of-band and overly broad poles. Sorted by frequency.
pub fn candidates_from_roots(roots: &[Complex], sample_rate: f64) -> Vec<FormantCandidate> {
    let mut candidates: Vec<FormantCandidate> = roots
        .iter()
        .filter_map(|root| {
            let radius = c_abs(*root);
            let theta = c_arg(*root);
            if radius <= MIN_POLE_RADIUS || radius >= MAX_POLE_RADIUS || theta <= MIN_POLE_ANGLE {
                return None;
            }
            let frequency = theta.abs() * sample_rate / (2.0 * PI);
            let bandwidth = -radius.ln() * sample_rate / PI;
            let in_band = (MIN_CANDIDATE_HZ..=DEFAULT_MAX_FORMANT_HZ).contains(&frequency);
            (in_band && bandwidth < MAX_BANDWIDTH_HZ).then_some(FormantCandidate {
                frequency,
                bandwidth,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    candidates
}

/// Assigns formants from the narrow-bandwidth candidates first, so a broad pole lying
/// between two true resonances cannot take the F2 slot. Falls back to every candidate.
pub fn select_formants(candidates: &[FormantCandidate]) -> Option<Formants> {
    let narrow = candidates
        .iter()
        .filter(|c| c.bandwidth <= NARROW_BANDWIDTH_HZ)
        .map(|c| c.frequency);
    assign_formants(narrow).or_else(|| assign_formants(candidates.iter().map(|c| c.frequency)))
}

/// Picks F1, F2 and F3 from ascending candidate frequencies by range. F3 falls back to
/// `1.4 * F2 + 600` (capped at the F3 ceiling) when no candidate fits.
pub fn assign_formants(frequencies: impl IntoIterator<Item = f64>) -> Option<Formants> {
    let mut sorted: Vec<f64> = frequencies.into_iter().filter(|f| f.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);

    let f1 = sorted
        .iter()
        .copied()
        .find(|f| (F1_RANGE.0..=F1_RANGE.1).contains(f))?;
    let f2 = sorted
        .iter()
        .copied()
        .find(|&f| f > f1 + F1_F2_MIN_GAP && (F2_RANGE.0..=F2_RANGE.1).contains(&f))?;
    let f3 = sorted
        .iter()
        .copied()
        .find(|&f| f > f2 + F2_F3_MIN_GAP && f <= F3_MAX)
        .unwrap_or_else(|| (F3_FROM_F2_SLOPE * f2 + F3_FROM_F2_OFFSET).min(F3_MAX));
    let formants = Formants { f1, f2, f3 };
    formants.is_ordered().then_some(formants)
}

/// Blends each formant 70/30 with the previous voiced frame when it jumps further than
/// its limit. A blend that would break `F1 < F2 < F3` is dropped in favour of `current`.
pub fn apply_inertia(previous: Option<Formants>, current: Formants) -> Formants {
    let Some(previous) = previous else {
        return current;
    };
    let blend = |prev: f64, cur: f64, limit: f64| {
        if (cur - prev).abs() > limit {
            INERTIA_PREVIOUS_WEIGHT * prev + (1.0 - INERTIA_PREVIOUS_WEIGHT) * cur
        } else {
            cur
        }
    };
    let smoothed = Formants {
        f1: blend(previous.f1, current.f1, INERTIA_LIMITS[0]),
        f2: blend(previous.f2, current.f2, INERTIA_LIMITS[1]),
        f3: blend(previous.f3, current.f3, INERTIA_LIMITS[2]),
    };
    if smoothed.is_ordered() {
        smoothed
    } else {
        current
    }
}

/// Carried between frames while folding the estimates into a track.
#[derive(Debug, Clone, Copy, Default)]
struct TrackState {
    previous_voiced: Option<Formants>,
}

fn assemble_track(estimates: &[(f64, FrameEstimate)]) -> FormantTrack {
    let mut diagnostics = FormantDiagnostics::default();
    let frames = estimates
        .iter()
        .scan(TrackState::default(), |state, &(time, estimate)| {
            let resolved = match estimate {
                FrameEstimate::Gated => {
                    diagnostics.gated_frames += 1;
                    None
                }
                FrameEstimate::LpcRejected => {
                    diagnostics.lpc_rejected += 1;
                    None
                }
                FrameEstimate::Unresolved => {
                    diagnostics.unresolved_frames += 1;
                    None
                }
                FrameEstimate::Resolved {
                    formants,
                    method,
                    peak_picked,
                } => {
                    if method == RootFinder::Laguerre {
                        diagnostics.laguerre_frames += 1;
                    }
                    if peak_picked {
                        diagnostics.peak_picking_frames += 1;
                    }
                    Some(apply_inertia(state.previous_voiced, formants))
                }
            };
            let frame = match resolved {
                Some(formants) => {
                    state.previous_voiced = Some(formants);
                    FormantFrame {
                        time,
                        f1: formants.f1,
                        f2: formants.f2,
                        f3: formants.f3,
                        voiced: true,
                    }
                }
                None => {
                    let held = state.previous_voiced;
                    FormantFrame {
                        time,
                        f1: held.map_or(0.0, |f| f.f1),
                        f2: held.map_or(0.0, |f| f.f2),
                        f3: held.map_or(0.0, |f| f.f3),
                        voiced: false,
                    }
                }
            };
            Some(frame)
        })
        .collect();
    FormantTrack {
        frames,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pronunciation::features::math::c_from_polar;
    use approx::assert_abs_diff_eq;

    fn candidate(frequency: f64, bandwidth: f64) -> FormantCandidate {
        FormantCandidate {
            frequency,
            bandwidth,
        }
    }

    /// `A(z)` with one conjugate pole pair per `(hz, radius)` resonance.
    fn all_pole_model(resonances: &[(f64, f64)], rate: f64) -> LpcAnalysis {
        let coefficients = resonances.iter().fold(vec![1.0], |poly, &(hz, radius)| {
            let theta = 2.0 * PI * hz / rate;
            let section = [1.0, -2.0 * radius * theta.cos(), radius * radius];
            let mut product = vec![0.0; poly.len() + 2];
            for (i, a) in poly.iter().enumerate() {
                for (j, b) in section.iter().enumerate() {
                    product[i + j] += a * b;
                }
            }
            product
        });
        LpcAnalysis {
            reflection: vec![0.0; coefficients.len() - 1],
            coefficients,
            error: 1.0,
        }
    }

    #[test]
    fn assigns_formants_by_range() {
        let formants = assign_formants([80.0, 420.0, 480.0, 1900.0, 2600.0]).unwrap();
        assert_eq!((formants.f1, formants.f2, formants.f3), (420.0, 1900.0, 2600.0));
    }

    #[test]
    fn estimates_missing_f3_from_f2() {
        let formants = assign_formants([700.0, 1200.0]).unwrap();
        assert_abs_diff_eq!(formants.f3, 1.4 * 1200.0 + 600.0, epsilon = 1e-9);
        let capped = assign_formants([700.0, 3400.0]).unwrap();
        assert_eq!(capped.f3, F3_MAX);
    }

    #[test]
    fn needs_f2_above_f1() {
        assert!(assign_formants([600.0, 650.0]).is_none());
        assert!(assign_formants([]).is_none());
    }

    #[test]
    fn inertia_blends_large_jumps_only() {
        let previous = Formants {
            f1: 500.0,
            f2: 1500.0,
            f3: 2500.0,
        };
        let current = Formants {
            f1: 900.0,
            f2: 1600.0,
            f3: 2550.0,
        };
        let smoothed = apply_inertia(Some(previous), current);
        assert_abs_diff_eq!(smoothed.f1, 0.7 * 500.0 + 0.3 * 900.0, epsilon = 1e-9);
        assert_eq!(smoothed.f2, 1600.0);
        assert_eq!(smoothed.f3, 2550.0);
    }

    #[test]
    fn pole_filters_drop_degenerate_roots() {
        let rate = 11_000.0;
        let theta = |hz: f64| 2.0 * PI * hz / rate;
        let roots = [
            c_from_polar(0.97, theta(700.0)),
            c_from_polar(0.97, -theta(700.0)),
            c_from_polar(0.999, theta(1200.0)),
            c_from_polar(0.2, theta(1800.0)),
            c_from_polar(0.9, 0.001),
            c_from_polar(0.5, theta(2500.0)),
        ];
        let candidates = candidates_from_roots(&roots, rate);
        assert_eq!(candidates.len(), 1);
        assert_abs_diff_eq!(candidates[0].frequency, 700.0, epsilon = 1e-6);
        assert_abs_diff_eq!(candidates[0].bandwidth, -(0.97f64).ln() * rate / PI, epsilon = 1e-6);
    }

    #[test]
    fn broad_pole_between_resonances_does_not_take_f2() {
        let candidates = [
            candidate(509.0, 60.0),
            candidate(1190.0, 640.0),
            candidate(1510.0, 75.0),
            candidate(2512.0, 110.0),
        ];
        let formants = select_formants(&candidates).unwrap();
        assert_eq!((formants.f1, formants.f2, formants.f3), (509.0, 1510.0, 2512.0));
    }

    #[test]
    fn broad_candidates_used_when_narrow_ones_fall_short() {
        let candidates = [candidate(620.0, 80.0), candidate(1400.0, 900.0)];
        let formants = select_formants(&candidates).unwrap();
        assert_eq!((formants.f1, formants.f2), (620.0, 1400.0));
    }

    #[test]
    fn envelope_peaks_stand_in_for_discarded_poles() {
        let rate = 11_000.0;
        // The 1500 Hz pole sits beyond the radius cut, so only F1 survives as a candidate.
        let lpc = all_pole_model(&[(500.0, 0.97), (1500.0, 0.997)], rate);
        let FrameEstimate::Resolved {
            formants,
            method,
            peak_picked,
        } = estimate_from_lpc(&lpc, rate)
        else {
            panic!("frame should resolve from the envelope");
        };
        assert!(peak_picked);
        assert_eq!(method, RootFinder::DurandKerner);
        assert_abs_diff_eq!(formants.f1, 500.0, epsilon = 15.0);
        assert_abs_diff_eq!(formants.f2, 1500.0, epsilon = 15.0);
        assert_abs_diff_eq!(formants.f3, 1.4 * formants.f2 + 600.0, epsilon = 1e-9);
    }

    #[test]
    fn pole_candidates_resolve_without_envelope() {
        let rate = 11_000.0;
        let lpc = all_pole_model(&[(500.0, 0.97), (1500.0, 0.97), (2500.0, 0.96)], rate);
        let FrameEstimate::Resolved {
            formants,
            peak_picked,
            ..
        } = estimate_from_lpc(&lpc, rate)
        else {
            panic!("frame should resolve from poles");
        };
        assert!(!peak_picked);
        assert_abs_diff_eq!(formants.f1, 500.0, epsilon = 1e-6);
        assert_abs_diff_eq!(formants.f2, 1500.0, epsilon = 1e-6);
        assert_abs_diff_eq!(formants.f3, 2500.0, epsilon = 1e-6);
    }

    #[test]
    fn diagnostics_count_fallback_routes() {
        let formants = Formants {
            f1: 500.0,
            f2: 1500.0,
            f3: 2500.0,
        };
        let estimates = [
            (
                0.0,
                FrameEstimate::Resolved {
                    formants,
                    method: RootFinder::Laguerre,
                    peak_picked: false,
                },
            ),
            (
                0.01,
                FrameEstimate::Resolved {
                    formants,
                    method: RootFinder::DurandKerner,
                    peak_picked: true,
                },
            ),
            (
                0.02,
                FrameEstimate::Resolved {
                    formants,
                    method: RootFinder::Laguerre,
                    peak_picked: true,
                },
            ),
            (0.03, FrameEstimate::LpcRejected),
        ];
        let track = assemble_track(&estimates);
        assert_eq!(track.diagnostics.laguerre_frames, 2);
        assert_eq!(track.diagnostics.peak_picking_frames, 2);
        assert_eq!(track.diagnostics.lpc_rejected, 1);
        assert_eq!(track.voiced_frames().count(), 3);
    }

    #[test]
    fn unvoiced_frames_hold_last_valid_formants() {
        let formants = Formants {
            f1: 600.0,
            f2: 1700.0,
            f3: 2600.0,
        };
        let estimates = [
            (0.0, FrameEstimate::Gated),
            (
                0.01,
                FrameEstimate::Resolved {
                    formants,
                    method: RootFinder::DurandKerner,
                    peak_picked: false,
                },
            ),
            (0.02, FrameEstimate::Unresolved),
        ];
        let track = assemble_track(&estimates);
        assert_eq!(track.frames[0].f1, 0.0);
        assert!(!track.frames[0].voiced);
        assert!(track.frames[1].voiced);
        assert!(!track.frames[2].voiced);
        assert_eq!(track.frames[2].f2, 1700.0);
        assert_eq!(track.diagnostics.unresolved_frames, 1);
        assert_eq!(track.diagnostics.fallback_frames(), 1);
    }
}
