//! Autocorrelation-method LPC.

/// Coefficients with magnitude above this mark a frame as numerically degenerate.
pub const MAX_COEFFICIENT_MAGNITUDE: f64 = 100.0;
/// White-noise correction added to `r[0]` to keep near-singular frames solvable.
const WHITE_NOISE_CORRECTION: f64 = 1e-9;
const MIN_RESIDUAL_RATIO: f64 = 1e-12;

/// All-pole model `A(z) = 1 + a1 z^-1 + ... + ap z^-p`.
#[derive(Debug, Clone, PartialEq)]
pub struct LpcAnalysis {
    /// `[1, a1, ..., ap]`. Read highest power first, this is also the characteristic
    /// polynomial `z^p + a1 z^(p-1) + ... + ap` whose roots are the model's poles.
    pub coefficients: Vec<f64>,
    pub reflection: Vec<f64>,
    /// Final prediction error power.
    pub error: f64,
}

impl LpcAnalysis {
    pub fn gain(&self) -> f64 {
        self.error.max(0.0).sqrt()
    }
}

/// Biased autocorrelation `r[k] = sum x[n] x[n + k]` for `k = 0..=max_lag`.
pub fn autocorrelation(frame: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            if lag >= frame.len() {
                return 0.0;
            }
            frame[..frame.len() - lag]
                .iter()
                .zip(&frame[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Levinson-Durbin solution of the Yule-Walker equations. `None` for silent frames and
/// for solutions with non-finite or implausibly large coefficients.
pub fn levinson_durbin(autocorr: &[f64], order: usize) -> Option<LpcAnalysis> {
    if order == 0 || autocorr.len() <= order {
        return None;
    }
    let r0 = autocorr[0] * (1.0 + WHITE_NOISE_CORRECTION);
    if r0 <= 0.0 || !r0.is_finite() {
        return None;
    }

    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    let mut reflection = Vec::with_capacity(order);
    let mut error = r0;

    for i in 1..=order {
        if error <= r0 * MIN_RESIDUAL_RATIO {
            // Perfectly predictable so far; higher orders add nothing.
            reflection.resize(order, 0.0);
            break;
        }
        let acc: f64 = autocorr[i] + (1..i).map(|j| a[j] * autocorr[i - j]).sum::<f64>();
        let k = -acc / error;
        let previous = a.clone();
        for j in 1..i {
            a[j] = previous[j] + k * previous[i - j];
        }
        a[i] = k;
        reflection.push(k);
        error *= 1.0 - k * k;
    }

    let degenerate = a
        .iter()
        .any(|c| !c.is_finite() || c.abs() > MAX_COEFFICIENT_MAGNITUDE);
    if degenerate || !error.is_finite() {
        return None;
    }
    Some(LpcAnalysis {
        coefficients: a,
        reflection,
        error: error.max(0.0),
    })
}
