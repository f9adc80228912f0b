#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::Path;

use pronalyzer::pronunciation::SampleBuffer;

pub fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
        .collect()
}

/// Linear frequency glide; returns the samples and the instantaneous frequency at `t`.
pub fn glide(f_start: f64, f_end: f64, sample_rate: f64, len: usize) -> (Vec<f64>, impl Fn(f64) -> f64) {
    let duration = len as f64 / sample_rate;
    let freq_at = move |t: f64| f_start + (f_end - f_start) * t / duration;
    let mut phase = 0.0_f64;
    let samples = (0..len)
        .map(|i| {
            let sample = phase.sin() * 0.5;
            phase += 2.0 * PI * freq_at(i as f64 / sample_rate) / sample_rate;
            sample
        })
        .collect();
    (samples, freq_at)
}

/// Deterministic white noise in `-1..1`.
pub fn noise(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        })
        .collect()
}

/// Impulse train at `f0` through a cascade of two-pole resonators, normalised to a
/// peak of 0.5.
pub fn vowel(sample_rate: f64, len: usize, f0: f64, formants: &[(f64, f64)]) -> Vec<f64> {
    let period = sample_rate / f0;
    let mut signal: Vec<f64> = (0..len)
        .map(|i| {
            let phase = i as f64 % period;
            if phase < 1.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    for &(freq, bandwidth) in formants {
        let r = (-PI * bandwidth / sample_rate).exp();
        let theta = 2.0 * PI * freq / sample_rate;
        let (a1, a2) = (2.0 * r * theta.cos(), -r * r);
        let (mut y1, mut y2) = (0.0, 0.0);
        for sample in signal.iter_mut() {
            let y = *sample + a1 * y1 + a2 * y2;
            y2 = y1;
            y1 = y;
            *sample = y;
        }
    }
    normalize(&mut signal, 0.5);
    signal
}

/// Two syllable-like bursts (strong then weak) of a synthetic vowel.
pub fn two_syllables(sample_rate: f64, duration: f64) -> Vec<f64> {
    let len = (sample_rate * duration) as usize;
    let carrier = vowel(sample_rate, len, 140.0, &[(600.0, 80.0), (1400.0, 100.0), (2500.0, 150.0)]);
    carrier
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let t = i as f64 / sample_rate;
            let bump = |centre: f64, width: f64, height: f64| {
                height * (-((t - centre) / width).powi(2)).exp()
            };
            s * (bump(0.3 * duration, 0.08 * duration, 1.0) + bump(0.7 * duration, 0.08 * duration, 0.6))
        })
        .collect()
}

pub fn normalize(signal: &mut [f64], peak: f64) {
    let max = signal.iter().fold(0.0_f64, |acc, s| acc.max(s.abs()));
    if max > 0.0 {
        signal.iter_mut().for_each(|s| *s *= peak / max);
    }
}

pub fn buffer(samples: &[f64], sample_rate: u32) -> SampleBuffer {
    let samples: Vec<f32> = samples.iter().map(|&s| s as f32).collect();
    SampleBuffer::new(samples, sample_rate).expect("valid buffer")
}

pub fn write_wav(path: &Path, samples: &[f64], sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for &sample in samples {
        writer
            .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f64) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2]
}
