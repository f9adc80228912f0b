mod common;

use approx::assert_abs_diff_eq;
use pronalyzer::config::AnalysisConfig;
use pronalyzer::pronunciation::alignment::AlignmentMode;
use pronalyzer::pronunciation::comparator::PronunciationComparator;
use pronalyzer::pronunciation::metrics::NEUTRAL_SCORE;
use pronalyzer::pronunciation::{PronunciationError, SampleBuffer};

const RATE: u32 = 16_000;

fn word() -> SampleBuffer {
    common::buffer(&common::two_syllables(RATE as f64, 1.2), RATE)
}

fn comparator(alignment: AlignmentMode) -> PronunciationComparator {
    PronunciationComparator::new(AnalysisConfig {
        alignment,
        ..AnalysisConfig::default()
    })
    .unwrap()
}

#[test]
fn identical_recordings_score_perfectly() {
    for mode in [AlignmentMode::Dtw, AlignmentMode::PointByPoint] {
        let buffer = word();
        let comparison = comparator(mode).compare(&buffer, &buffer).unwrap();
        let result = &comparison.result;
        let breakdown = result.breakdown;
        for (name, score) in [
            ("pitch", breakdown.pitch),
            ("formants", breakdown.formants),
            ("mfcc", breakdown.mfcc),
            ("stress", breakdown.stress),
            ("intensity", breakdown.intensity),
        ] {
            assert!((score - 100.0).abs() < 1e-6, "{mode:?} {name} scored {score}");
        }
        assert_abs_diff_eq!(result.overall_score, 100.0, epsilon = 1e-6);
        assert!(result.detailed_report.fallback_dimensions().is_empty());
        assert_eq!(result.detailed_report.alignment, mode.as_str());
        assert_eq!(comparison.stress.matched, comparison.stress.native_peaks);
    }
}

#[test]
fn different_vowel_scores_lower() {
    let rate = RATE as f64;
    let len = (rate * 1.2) as usize;
    let other = common::vowel(rate, len, 220.0, &[(300.0, 80.0), (2300.0, 100.0), (3000.0, 150.0)]);
    let learner = common::buffer(&other, RATE);
    let result = comparator(AlignmentMode::Dtw)
        .compare(&word(), &learner)
        .unwrap()
        .result;
    assert!(result.overall_score < 90.0, "scored {}", result.overall_score);
    assert!(result.breakdown.formants < 100.0);
    assert!((0.0..=100.0).contains(&result.overall_score));
}

#[test]
fn silence_yields_finite_neutral_scores() {
    let silence = common::buffer(&vec![0.0; RATE as usize], RATE);
    let comparison = comparator(AlignmentMode::Dtw)
        .compare(&silence, &silence)
        .unwrap();
    let result = &comparison.result;
    assert!(result.overall_score.is_finite());
    assert_eq!(result.breakdown.stress, NEUTRAL_SCORE);
    assert_eq!(result.breakdown.pitch, NEUTRAL_SCORE);
    assert!(comparison.reference.pitch.iter().all(|frame| frame.pitch_hz == 0.0));
    assert!(comparison.reference.formants.frames.iter().all(|frame| !frame.voiced));
    let fallbacks = result.detailed_report.fallback_dimensions();
    assert!(fallbacks.contains(&"pitch") && fallbacks.contains(&"stress"));
}

#[test]
fn invalid_buffers_are_rejected() {
    assert_eq!(
        SampleBuffer::labelled("learner", Vec::<f32>::new(), RATE).unwrap_err(),
        PronunciationError::EmptyBuffer { label: "learner" }
    );
    assert_eq!(
        SampleBuffer::new(vec![0.0_f32; 4000], 4_000).unwrap_err(),
        PronunciationError::InvalidSampleRate(4_000)
    );
    assert!(matches!(
        SampleBuffer::new(vec![0.0, f32::NAN], RATE),
        Err(PronunciationError::NonFiniteSample { index: 1, .. })
    ));
}

#[test]
fn short_learner_recording_is_named() {
    let short = common::buffer(&[0.1; 1000], RATE);
    let err = comparator(AlignmentMode::Dtw)
        .compare(&word(), &short)
        .unwrap_err();
    assert_eq!(
        err,
        PronunciationError::BufferTooShort {
            label: "learner",
            samples: 1000,
            required: 2048,
        }
    );
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut config = AnalysisConfig::default();
    config.pitch.min_pitch = 400.0;
    config.pitch.max_pitch = 100.0;
    assert!(matches!(
        PronunciationComparator::new(config),
        Err(PronunciationError::InvalidConfig(_))
    ));
}
