//! Boxcar and optimal extraction along a trace.

use common::{BitBuffer2, Buffer2};

use super::trace::Trace;
use super::Extraction1d;
use crate::combine::CombinedFrame;
use crate::math::{fwhm_to_sigma, interval_overlap};

/// Profile half-width in units of σ.
const PROFILE_EXTENT: f64 = 4.0;
/// Upper bound on rejection passes per row.
const MAX_REJECT_ITERATIONS: usize = 5;

/// Sky-subtracted image the extractions work on, with the sign of the trace
/// folded in so negative traces extract as positive flux.
pub(crate) struct ExtractionImage<'a> {
    pub frame: &'a CombinedFrame,
    pub residual_sky: &'a Buffer2<f64>,
}

impl ExtractionImage<'_> {
    #[inline]
    fn flux(&self, idx: usize, sign: f64) -> f64 {
        sign * (self.frame.sciimg[idx] - self.residual_sky[idx])
    }

    fn column_range(&self, lo: f64, hi: f64) -> std::ops::RangeInclusive<usize> {
        let width = self.frame.shape().0;
        let first = lo.floor().max(0.0) as usize;
        let last = (hi.ceil().max(0.0) as usize).min(width.saturating_sub(1));
        first..=last
    }
}

/// Sum over `[spat - radius, spat + radius]` with fractional edge pixels.
///
/// Pixel `x` covers `[x - 0.5, x + 0.5)`. The wavelength is the
/// weight-averaged wavelength image, bad pixels included.
pub(crate) fn boxcar(image: &ExtractionImage, trace: &Trace, radius: f64) -> Extraction1d {
    let frame = image.frame;
    let height = trace.spat.len();
    let mut out = Extraction1d::with_len(height);

    for (y, &center) in trace.spat.iter().enumerate() {
        let (lo, hi) = (center - radius, center + radius);
        let mut flux = 0.0;
        let mut var = 0.0;
        let mut wave = 0.0;
        let mut wsum = 0.0;
        for x in image.column_range(lo - 0.5, hi + 0.5) {
            let b = interval_overlap(x as f64 - 0.5, x as f64 + 0.5, lo, hi);
            if b <= 0.0 {
                continue;
            }
            let idx = frame.sciimg.index_of(x, y);
            wave += b * frame.waveimg[idx];
            wsum += b;
            if frame.is_good(idx) {
                flux += b * image.flux(idx, trace.sign);
                var += b * b / frame.ivar[idx];
            }
        }

        out.wave[y] = if wsum > 0.0 {
            wave / wsum
        } else {
            frame.wave_grid.center_wave(y)
        };
        if var > 0.0 {
            out.counts[y] = flux;
            out.counts_ivar[y] = 1.0 / var;
            out.good[y] = true;
        }
    }
    out
}

/// Normalized Gaussian profile sampled at the columns of `range`.
fn row_profile(range: std::ops::RangeInclusive<usize>, center: f64, sigma: f64) -> Vec<(usize, f64)> {
    let mut profile: Vec<(usize, f64)> = range
        .map(|x| {
            let d = (x as f64 - center) / sigma;
            (x, (-0.5 * d * d).exp())
        })
        .collect();
    let norm: f64 = profile.iter().map(|(_, p)| p).sum();
    if norm > 0.0 {
        for (_, p) in &mut profile {
            *p /= norm;
        }
    }
    profile
}

/// Horne optimal extraction with a Gaussian profile of the trace FWHM.
///
/// Pixels deviating by more than `reject_sigma` from the scaled profile are
/// rejected one at a time and recorded in `rejected`.
pub(crate) fn optimal(
    image: &ExtractionImage,
    trace: &Trace,
    reject_sigma: f64,
    rejected: &mut BitBuffer2,
) -> Extraction1d {
    let frame = image.frame;
    let sigma = fwhm_to_sigma(trace.fwhm);
    let half_width = PROFILE_EXTENT * sigma;
    let height = trace.spat.len();
    let mut out = Extraction1d::with_len(height);
    let reject_chi2 = reject_sigma * reject_sigma;

    for (y, &center) in trace.spat.iter().enumerate() {
        let profile = row_profile(
            image.column_range(center - half_width, center + half_width),
            center,
            sigma,
        );

        let wave: f64 = profile
            .iter()
            .map(|&(x, p)| p * frame.waveimg[(x, y)])
            .sum();
        out.wave[y] = if profile.is_empty() {
            frame.wave_grid.center_wave(y)
        } else {
            wave
        };

        let mut usable: Vec<bool> = profile
            .iter()
            .map(|&(x, _)| frame.is_good(frame.sciimg.index_of(x, y)))
            .collect();

        for pass in 0..=MAX_REJECT_ITERATIONS {
            let mut sum_pfw = 0.0;
            let mut sum_p2w = 0.0;
            let mut sum_p = 0.0;
            for (&(x, p), _) in profile.iter().zip(&usable).filter(|(_, u)| **u) {
                let idx = frame.sciimg.index_of(x, y);
                let w = frame.ivar[idx];
                sum_pfw += p * image.flux(idx, trace.sign) * w;
                sum_p2w += p * p * w;
                sum_p += p;
            }
            if sum_p2w <= 0.0 {
                out.counts[y] = 0.0;
                out.counts_ivar[y] = 0.0;
                out.good[y] = false;
                break;
            }
            let flux = sum_pfw / sum_p2w;
            out.counts[y] = flux;
            out.counts_ivar[y] = sum_p2w / sum_p;
            out.good[y] = true;

            let worst = profile
                .iter()
                .zip(&usable)
                .enumerate()
                .filter(|(_, (_, u))| **u)
                .map(|(k, (&(x, p), _))| {
                    let idx = frame.sciimg.index_of(x, y);
                    let resid = image.flux(idx, trace.sign) - flux * p;
                    (k, resid * resid * frame.ivar[idx])
                })
                .max_by(|a, b| a.1.total_cmp(&b.1));
            match worst {
                Some((k, chi2)) if chi2 > reject_chi2 && pass < MAX_REJECT_ITERATIONS => {
                    usable[k] = false;
                    rejected.set_xy(profile[k].0, y, true);
                }
                _ => break,
            }
        }
    }
    out
}

/// Add `sign · counts · profile` of `trace` into `model`.
pub(crate) fn add_object_model(model: &mut Buffer2<f64>, trace: &Trace, spectrum: &Extraction1d) {
    let width = model.width();
    let sigma = fwhm_to_sigma(trace.fwhm);
    let half_width = PROFILE_EXTENT * sigma;

    for (y, &center) in trace.spat.iter().enumerate() {
        if !spectrum.good[y] {
            continue;
        }
        let first = (center - half_width).floor().max(0.0) as usize;
        let last = ((center + half_width).ceil().max(0.0) as usize).min(width.saturating_sub(1));
        for (x, p) in row_profile(first..=last, center, sigma) {
            model[(x, y)] += trace.sign * spectrum.counts[y] * p;
        }
    }
}
