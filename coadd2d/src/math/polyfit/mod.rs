//! Weighted polynomial least squares with optional sigma clipping.
//!
//! Abscissae are mapped to `[-1, 1]` before building the design matrix so
//! that fits over thousands of pixels stay well conditioned.

use nalgebra::{DMatrix, DVector};

use super::statistics::robust_sigma;


/// Polynomial in a normalized coordinate `t = (x - center) / half_range`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
    center: f64,
    half_range: f64,
}

impl Polynomial {
    /// A polynomial that is `value` everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            coeffs: vec![value],
            center: 0.0,
            half_range: 1.0,
        }
    }

    pub fn order(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn eval(&self, x: f64) -> f64 {
        let t = (x - self.center) / self.half_range;
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
    }
}

/// Weighted least-squares polynomial fit of order `order`.
///
/// Points with non-positive or non-finite weight are ignored. The order is
/// lowered when fewer than `order + 1` points remain; `None` is returned when
/// no point remains or the system is degenerate.
pub fn fit_weighted(xs: &[f64], ys: &[f64], ws: &[f64], order: usize) -> Option<Polynomial> {
    assert_eq!(xs.len(), ys.len(), "xs and ys must have the same length");
    assert_eq!(xs.len(), ws.len(), "xs and ws must have the same length");

    let used: Vec<usize> = (0..xs.len())
        .filter(|&i| ws[i] > 0.0 && ws[i].is_finite() && ys[i].is_finite() && xs[i].is_finite())
        .collect();
    if used.is_empty() {
        return None;
    }

    let (min, max) = used.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
        (lo.min(xs[i]), hi.max(xs[i]))
    });
    let center = 0.5 * (min + max);
    let half_range = if max > min { 0.5 * (max - min) } else { 1.0 };

    let distinct = count_distinct(used.iter().map(|&i| xs[i]));
    let ncoeff = (order + 1).min(distinct);

    let design = DMatrix::from_fn(used.len(), ncoeff, |row, col| {
        let i = used[row];
        let t = (xs[i] - center) / half_range;
        ws[i].sqrt() * t.powi(col as i32)
    });
    let rhs = DVector::from_iterator(used.len(), used.iter().map(|&i| ws[i].sqrt() * ys[i]));

    let solution = design.svd(true, true).solve(&rhs, 1e-12).ok()?;
    let coeffs: Vec<f64> = solution.iter().copied().collect();
    if coeffs.iter().any(|c| !c.is_finite()) {
        return None;
    }

    Some(Polynomial {
        coeffs,
        center,
        half_range,
    })
}

fn count_distinct(values: impl Iterator<Item = f64>) -> usize {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Outcome of [`fit_clipped`].
#[derive(Debug, Clone)]
pub struct ClippedFit {
    pub poly: Polynomial,
    /// `true` for points that were used in the final fit.
    pub used: Vec<bool>,
}

/// Weighted polynomial fit with iterative rejection.
///
/// Normalized residuals `(y - p(x))·√w` are compared against `sigrej` times
/// their robust scatter; rejected points get zero weight in the next pass.
pub fn fit_clipped(
    xs: &[f64],
    ys: &[f64],
    ws: &[f64],
    order: usize,
    sigrej: f64,
    max_iter: usize,
) -> Option<ClippedFit> {
    let mut weights = ws.to_vec();
    let mut poly = fit_weighted(xs, ys, &weights, order)?;

    for _ in 0..max_iter {
        let chi: Vec<f64> = (0..xs.len())
            .filter(|&i| weights[i] > 0.0)
            .map(|i| (ys[i] - poly.eval(xs[i])) * weights[i].sqrt())
            .collect();
        let Some(scale) = robust_sigma(&chi).filter(|s| *s > 0.0) else {
            break;
        };

        let mut rejected = 0;
        for i in 0..xs.len() {
            if weights[i] <= 0.0 {
                continue;
            }
            let chi = (ys[i] - poly.eval(xs[i])) * weights[i].sqrt();
            if chi.abs() > sigrej * scale {
                weights[i] = 0.0;
                rejected += 1;
            }
        }
        if rejected == 0 {
            break;
        }
        match fit_weighted(xs, ys, &weights, order) {
            Some(refit) => poly = refit,
            None => break,
        }
    }

    let used = weights.iter().map(|&w| w > 0.0 && w.is_finite()).collect();
    Some(ClippedFit { poly, used })
}
