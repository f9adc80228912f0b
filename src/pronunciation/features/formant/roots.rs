//! Polynomial root finding for LPC pole recovery.
//!
//! Polynomials are real coefficient slices ordered highest power first, so the LPC
//! vector `[1, a1, ..., ap]` can be passed straight in.

use std::f64::consts::PI;

use tracing::debug;

use crate::pronunciation::features::math::{
    c_abs, c_add, c_div, c_from_polar, c_is_finite, c_mul, c_scale, c_sqrt, c_sub, complex,
    Complex,
};

pub const DURAND_KERNER_MAX_ITERATIONS: usize = 200;
pub const LAGUERRE_MAX_ITERATIONS: usize = 50;
pub const CONVERGENCE_TOLERANCE: f64 = 1e-10;
/// A root counts as recovered when `|p(z)|` is this small relative to the sum of the
/// magnitudes of the terms of `p(z)`.
const RESIDUAL_TOLERANCE: f64 = 1e-6;
const COINCIDENT_EPSILON: f64 = 1e-14;

/// Strategy used to factor a polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootFinder {
    /// Simultaneous iteration on all roots.
    DurandKerner,
    /// One root at a time, deflating the polynomial after each.
    Laguerre,
}

/// Roots that passed the residual check, and the method that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct RootSolution {
    pub roots: Vec<Complex>,
    pub method: RootFinder,
}

impl RootFinder {
    /// Every root estimate the method produced, recovered or not.
    pub fn find_roots(&self, poly: &[f64]) -> Vec<Complex> {
        let Some(monic) = monic(poly) else {
            return Vec::new();
        };
        match self {
            Self::DurandKerner => durand_kerner(&monic),
            Self::Laguerre => laguerre_with_deflation(&monic),
        }
    }
}

/// Durand-Kerner first; Laguerre with deflation when fewer than half the roots are
/// recovered.
pub fn find_roots_adaptive(poly: &[f64]) -> RootSolution {
    let degree = poly.len().saturating_sub(1);
    let primary = recovered(poly, RootFinder::DurandKerner.find_roots(poly));
    if primary.len() * 2 >= degree {
        return RootSolution {
            roots: primary,
            method: RootFinder::DurandKerner,
        };
    }
    let fallback = recovered(poly, RootFinder::Laguerre.find_roots(poly));
    debug!(
        degree,
        durand_kerner = primary.len(),
        laguerre = fallback.len(),
        "root finding fell back to Laguerre"
    );
    RootSolution {
        roots: fallback,
        method: RootFinder::Laguerre,
    }
}

/// Horner evaluation of a real polynomial at a complex point.
pub fn evaluate(poly: &[f64], z: Complex) -> Complex {
    poly.iter().fold(complex(0.0, 0.0), |acc, &coeff| {
        c_add(c_mul(acc, z), complex(coeff, 0.0))
    })
}

fn recovered(poly: &[f64], roots: Vec<Complex>) -> Vec<Complex> {
    roots
        .into_iter()
        .filter(|&z| is_recovered(poly, z))
        .collect()
}

fn is_recovered(poly: &[f64], z: Complex) -> bool {
    if !c_is_finite(z) {
        return false;
    }
    let modulus = c_abs(z);
    let scale: f64 = poly
        .iter()
        .rev()
        .enumerate()
        .map(|(power, coeff)| coeff.abs() * modulus.powi(power as i32))
        .sum();
    c_abs(evaluate(poly, z)) <= RESIDUAL_TOLERANCE * scale.max(f64::MIN_POSITIVE)
}

fn monic(poly: &[f64]) -> Option<Vec<Complex>> {
    let lead = *poly.first()?;
    if poly.len() < 2 || lead == 0.0 || !lead.is_finite() {
        return None;
    }
    Some(poly.iter().map(|&c| complex(c / lead, 0.0)).collect())
}

fn evaluate_complex(poly: &[Complex], z: Complex) -> Complex {
    poly.iter()
        .fold(complex(0.0, 0.0), |acc, &coeff| c_add(c_mul(acc, z), coeff))
}

fn durand_kerner(poly: &[Complex]) -> Vec<Complex> {
    let degree = poly.len() - 1;
    // Powers of a seed that is neither real nor on the unit circle keep the starting
    // points distinct and off any symmetry axis of a real polynomial.
    let seed = complex(0.4, 0.9);
    let mut roots: Vec<Complex> = std::iter::successors(Some(complex(1.0, 0.0)), |&z| {
        Some(c_mul(z, seed))
    })
    .take(degree)
    .collect();

    for _ in 0..DURAND_KERNER_MAX_ITERATIONS {
        let mut max_correction: f64 = 0.0;
        for i in 0..degree {
            let numerator = evaluate_complex(poly, roots[i]);
            let mut denominator = complex(1.0, 0.0);
            for j in 0..degree {
                if i == j {
                    continue;
                }
                let mut gap = c_sub(roots[i], roots[j]);
                if c_abs(gap) < COINCIDENT_EPSILON {
                    gap = complex(COINCIDENT_EPSILON, COINCIDENT_EPSILON);
                }
                denominator = c_mul(denominator, gap);
            }
            let correction = c_div(numerator, denominator);
            if !c_is_finite(correction) {
                continue;
            }
            roots[i] = c_sub(roots[i], correction);
            max_correction = max_correction.max(c_abs(correction));
        }
        if max_correction < CONVERGENCE_TOLERANCE {
            break;
        }
    }
    roots
}

fn laguerre_with_deflation(poly: &[Complex]) -> Vec<Complex> {
    let mut remaining = poly.to_vec();
    let mut roots = Vec::with_capacity(poly.len() - 1);
    while remaining.len() > 1 {
        let root = if remaining.len() == 2 {
            c_div(c_scale(remaining[1], -1.0), remaining[0])
        } else {
            laguerre(&remaining, complex(0.0, 0.0))
        };
        // Polish against the undeflated polynomial to shed accumulated deflation error.
        let polished = laguerre(poly, root);
        let root = if c_is_finite(polished) { polished } else { root };
        if !c_is_finite(root) {
            break;
        }
        roots.push(root);
        remaining = deflate(&remaining, root);
    }
    roots
}

fn laguerre(poly: &[Complex], start: Complex) -> Complex {
    let degree = (poly.len() - 1) as f64;
    let mut z = start;
    for iteration in 0..LAGUERRE_MAX_ITERATIONS {
        let (p, dp, ddp) = evaluate_with_derivatives(poly, z);
        if c_abs(p) == 0.0 {
            return z;
        }
        let g = c_div(dp, p);
        let g2 = c_mul(g, g);
        let h = c_sub(g2, c_div(ddp, p));
        let discriminant = c_sqrt(c_scale(
            c_sub(c_scale(h, degree), g2),
            degree - 1.0,
        ));
        let plus = c_add(g, discriminant);
        let minus = c_sub(g, discriminant);
        let denominator = if c_abs(plus) >= c_abs(minus) { plus } else { minus };
        let step = if c_abs(denominator) > 0.0 {
            c_div(complex(degree, 0.0), denominator)
        } else {
            // Stationary point: kick the estimate off it.
            c_from_polar(1.0 + c_abs(z), iteration as f64 * PI / 7.0)
        };
        z = c_sub(z, step);
        if c_abs(step) < CONVERGENCE_TOLERANCE * c_abs(z).max(1.0) {
            break;
        }
    }
    z
}

fn evaluate_with_derivatives(poly: &[Complex], z: Complex) -> (Complex, Complex, Complex) {
    let zero = complex(0.0, 0.0);
    let mut p = zero;
    let mut dp = zero;
    let mut ddp = zero;
    for &coeff in poly {
        ddp = c_add(c_mul(ddp, z), dp);
        dp = c_add(c_mul(dp, z), p);
        p = c_add(c_mul(p, z), coeff);
    }
    (p, dp, c_scale(ddp, 2.0))
}

/// Synthetic division by `(z - root)`, dropping the remainder.
fn deflate(poly: &[Complex], root: Complex) -> Vec<Complex> {
    let mut quotient = Vec::with_capacity(poly.len() - 1);
    let mut carry = complex(0.0, 0.0);
    for &coeff in &poly[..poly.len() - 1] {
        carry = c_add(c_mul(carry, root), coeff);
        quotient.push(carry);
    }
    quotient
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains_root(roots: &[Complex], re: f64, im: f64) -> bool {
        roots
            .iter()
            .any(|z| c_abs(c_sub(*z, complex(re, im))) < 1e-6)
    }

    /// (z - 0.5)(z^2 - 2 * 0.9cos(1) z + 0.81)
    fn cubic() -> Vec<f64> {
        let c = 2.0 * 0.9 * 1f64.cos();
        vec![1.0, -c - 0.5, 0.81 + 0.5 * c, -0.405]
    }

    #[test]
    fn durand_kerner_factors_cubic() {
        let roots = RootFinder::DurandKerner.find_roots(&cubic());
        assert_eq!(roots.len(), 3);
        assert!(contains_root(&roots, 0.5, 0.0));
        assert!(contains_root(&roots, 0.9 * 1f64.cos(), 0.9 * 1f64.sin()));
        assert!(contains_root(&roots, 0.9 * 1f64.cos(), -0.9 * 1f64.sin()));
    }

    #[test]
    fn laguerre_matches_durand_kerner() {
        let roots = RootFinder::Laguerre.find_roots(&cubic());
        assert_eq!(roots.len(), 3);
        assert!(contains_root(&roots, 0.5, 0.0));
        assert!(contains_root(&roots, 0.9 * 1f64.cos(), 0.9 * 1f64.sin()));
    }

    #[test]
    fn adaptive_prefers_durand_kerner_when_it_converges() {
        let solution = find_roots_adaptive(&cubic());
        assert_eq!(solution.method, RootFinder::DurandKerner);
        assert_eq!(solution.roots.len(), 3);
    }

    #[test]
    fn adaptive_falls_back_to_laguerre_when_durand_kerner_stalls() {
        // Roots of modulus 1e6: the unit-scale starting points never reach them.
        let mut poly = vec![0.0; 7];
        poly[0] = 1.0;
        poly[6] = 1e36;
        assert!(recovered(&poly, RootFinder::DurandKerner.find_roots(&poly)).len() * 2 < 6);

        let solution = find_roots_adaptive(&poly);
        assert_eq!(solution.method, RootFinder::Laguerre);
        assert_eq!(solution.roots.len(), 6);
        for root in &solution.roots {
            assert!((c_abs(*root) / 1e6 - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn degenerate_polynomials_have_no_roots() {
        assert!(RootFinder::DurandKerner.find_roots(&[]).is_empty());
        assert!(RootFinder::Laguerre.find_roots(&[0.0, 1.0]).is_empty());
        assert!(find_roots_adaptive(&[3.0]).roots.is_empty());
    }
}
