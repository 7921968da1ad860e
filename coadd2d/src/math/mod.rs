//! Numerical helpers shared by the combiner and the re-extraction engine.

pub mod polyfit;
pub mod profile;
pub mod statistics;

/// FWHM to Gaussian sigma conversion factor.
///
/// For a Gaussian distribution, FWHM = 2√(2ln2) × σ ≈ 2.3548 × σ.
pub const FWHM_TO_SIGMA: f64 = 2.354_820_045_030_949;

/// Convert FWHM to Gaussian sigma.
#[inline]
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / FWHM_TO_SIGMA
}

/// Convert Gaussian sigma to FWHM.
#[inline]
pub fn sigma_to_fwhm(sigma: f64) -> f64 {
    sigma * FWHM_TO_SIGMA
}

/// Length of the overlap of the intervals `[a0, a1)` and `[b0, b1)`.
#[inline]
pub fn interval_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}
