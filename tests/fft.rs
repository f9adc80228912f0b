mod common;

use std::f64::consts::PI;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use pronalyzer::pronunciation::features::fft::{
    compute_fft, compute_spectrogram, create_mel_filterbank, next_power_of_two, spectral_centroid,
    spectral_rolloff, SpectrogramConfig,
};

fn direct_dft_magnitudes(signal: &[f64]) -> Vec<f64> {
    let n = next_power_of_two(signal.len());
    let mut padded = signal.to_vec();
    padded.resize(n, 0.0);
    (0..n / 2)
        .map(|k| {
            let (re, im) = padded.iter().enumerate().fold((0.0, 0.0), |(re, im), (t, x)| {
                let angle = -2.0 * PI * k as f64 * t as f64 / n as f64;
                (re + x * angle.cos(), im + x * angle.sin())
            });
            (re * re + im * im).sqrt()
        })
        .collect()
}

#[test]
fn fft_matches_direct_dft() {
    let signals = [
        common::noise(64, 1),
        common::noise(100, 2),
        common::sine(440.0, 8000.0, 512),
        [common::sine(300.0, 8000.0, 300), common::noise(212, 3)].concat(),
    ];
    for signal in &signals {
        let fast = compute_fft(signal);
        let slow = direct_dft_magnitudes(signal);
        assert_eq!(fast.len(), slow.len());
        for (f, s) in fast.iter().zip(&slow) {
            assert_relative_eq!(*f, *s, max_relative = 1e-6, epsilon = 1e-9);
        }
    }
}

#[test]
fn short_buffer_yields_empty_spectrogram_with_diagnostic() {
    let spectrogram = compute_spectrogram(&[0.1; 100], 16_000.0, &SpectrogramConfig::default());
    assert_eq!(spectrogram.frame_count(), 0);
    assert!(spectrogram.diagnostic.is_some());
}

#[test]
fn db_spectrogram_is_normalised() {
    let config = SpectrogramConfig {
        fft_size: 512,
        hop_size: 256,
        use_db: true,
        ..SpectrogramConfig::default()
    };
    let spectrogram = compute_spectrogram(&common::sine(1000.0, 16_000.0, 4096), 16_000.0, &config);
    assert_eq!(spectrogram.values.dim(), (15, 256));
    assert!(spectrogram.values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(spectrogram.values.iter().any(|v| *v > 0.999));
}

#[test]
fn mel_spectrogram_has_one_column_per_filter() {
    let config = SpectrogramConfig {
        fft_size: 1024,
        use_mel: true,
        num_mel_bins: 40,
        ..SpectrogramConfig::default()
    };
    let spectrogram = compute_spectrogram(&common::noise(8192, 4), 16_000.0, &config);
    assert_eq!(spectrogram.frequencies.len(), 40);
    assert_eq!(spectrogram.values.ncols(), 40);
    assert!(spectrogram.frequencies.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn mel_filters_cover_requested_band() {
    let bank = create_mel_filterbank(20, 1024, 16_000.0, 100.0, 8000.0, false);
    assert_eq!(bank.len(), 20);
    assert!(bank.iter().all(|filter| filter.len() == 512));
    for filter in &bank {
        let peak = filter.iter().copied().fold(0.0, f64::max);
        assert!(peak > 0.5 && peak <= 1.0);
    }
    // Nothing below 100 Hz (bins 0..=6 at 15.6 Hz per bin).
    assert!(bank[0][..6].iter().all(|w| *w == 0.0));
}

#[test]
fn spectral_shape_of_pure_tone() {
    let n = 1024;
    let rate = 8000.0;
    let magnitude = compute_fft(&common::sine(1000.0, rate, n));
    let centroid = spectral_centroid(&magnitude, rate, n);
    assert_abs_diff_eq!(centroid, 1000.0, epsilon = 60.0);
    let rolloff = spectral_rolloff(&magnitude, rate, n, 0.85);
    assert_abs_diff_eq!(rolloff, 1000.0, epsilon = 20.0);
}
