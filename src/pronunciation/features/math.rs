//! Numeric primitives shared by the analyzers.

use std::f64::consts::PI;

/// Complex value. Arithmetic goes through the free functions below rather than
/// operator impls so the root solvers read as explicit formulae.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

pub const fn complex(re: f64, im: f64) -> Complex {
    Complex { re, im }
}

pub fn c_add(a: Complex, b: Complex) -> Complex {
    complex(a.re + b.re, a.im + b.im)
}

pub fn c_sub(a: Complex, b: Complex) -> Complex {
    complex(a.re - b.re, a.im - b.im)
}

pub fn c_mul(a: Complex, b: Complex) -> Complex {
    complex(a.re * b.re - a.im * b.im, a.re * b.im + a.im * b.re)
}

pub fn c_scale(a: Complex, factor: f64) -> Complex {
    complex(a.re * factor, a.im * factor)
}

/// Division; a zero divisor yields non-finite parts, which callers treat as divergence.
pub fn c_div(a: Complex, b: Complex) -> Complex {
    let denom = b.re * b.re + b.im * b.im;
    complex(
        (a.re * b.re + a.im * b.im) / denom,
        (a.im * b.re - a.re * b.im) / denom,
    )
}

pub fn c_abs(a: Complex) -> f64 {
    a.re.hypot(a.im)
}

pub fn c_arg(a: Complex) -> f64 {
    a.im.atan2(a.re)
}

/// Principal square root.
pub fn c_sqrt(a: Complex) -> Complex {
    let modulus = c_abs(a);
    if modulus == 0.0 {
        return complex(0.0, 0.0);
    }
    let re = ((modulus + a.re) / 2.0).sqrt();
    let im = ((modulus - a.re) / 2.0).sqrt();
    complex(re, if a.im < 0.0 { -im } else { im })
}

/// `e^{i theta}`.
pub fn c_from_polar(radius: f64, theta: f64) -> Complex {
    complex(radius * theta.cos(), radius * theta.sin())
}

pub fn c_is_finite(a: Complex) -> bool {
    a.re.is_finite() && a.im.is_finite()
}

/// Symmetric Hamming window of length `size`.
pub fn hamming_window(size: usize) -> Vec<f64> {
    match size {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (size - 1) as f64;
            (0..size)
                .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// Median of a slice; even lengths average the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Pearson correlation over the common prefix of both slices. `None` when fewer than
/// two points overlap or either side has no variance.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let len = a.len().min(b.len());
    if len < 2 {
        return None;
    }
    let (a, b) = (&a[..len], &b[..len]);
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;
    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((covariance / denom).clamp(-1.0, 1.0))
}

/// Root mean square of a frame.
pub fn rms(frame: &[f64]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f64>() / frame.len() as f64).sqrt()
}

/// Fraction of adjacent sample pairs whose sign differs.
pub fn zero_crossing_rate(frame: &[f64]) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f64 / (frame.len() - 1) as f64
}

/// `y[i] = x[i] - alpha * x[i - 1]`, with `y[0] = x[0]`.
pub fn pre_emphasis(frame: &[f64], alpha: f64) -> Vec<f64> {
    let mut output = Vec::with_capacity(frame.len());
    let mut previous = 0.0;
    for (idx, &sample) in frame.iter().enumerate() {
        output.push(if idx == 0 { sample } else { sample - alpha * previous });
        previous = sample;
    }
    output
}

/// Start offsets of every complete frame of `frame_size` samples stepped by `hop`.
pub fn frame_starts(len: usize, frame_size: usize, hop: usize) -> impl Iterator<Item = usize> {
    let last = if frame_size == 0 || len < frame_size {
        None
    } else {
        Some(len - frame_size)
    };
    (0..)
        .map(move |idx| idx * hop.max(1))
        .take_while(move |&start| last.is_some_and(|last| start <= last))
}
